//! KBFS client daemon
//!
//! Bootstraps the client configuration from flags and the environment, then
//! either reports what was built and exits, or keeps running until
//! interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use kbfs_init::{init, InitOptions, InterruptCallback, StorageRoot};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "kbfsd")]
#[command(about = "KBFS client bootstrap", long_about = None)]
struct Cli {
    /// Run as this fixture user instead of the identity daemon
    #[arg(long, default_value = "")]
    local_user: String,

    /// Persist local tiers under this directory; an empty value means the
    /// working directory, omitting the flag keeps everything in memory
    #[arg(long)]
    server_root: Option<String>,

    /// Write a CPU profile here
    #[arg(long)]
    cpu_profile: Option<PathBuf>,

    /// Write a heap snapshot here on shutdown
    #[arg(long)]
    mem_profile: Option<PathBuf>,

    /// Log filter directives; falls back to RUST_LOG, then `info`
    #[arg(long)]
    log_filter: Option<String>,

    /// Keep running until interrupted
    #[arg(long)]
    daemon: bool,
}

impl Cli {
    fn init_options(&self) -> InitOptions {
        InitOptions {
            local_user: self.local_user.clone(),
            storage_root: StorageRoot::from_option(self.server_root.as_deref()),
            cpu_profile_path: self.cpu_profile.clone(),
            mem_profile_path: self.mem_profile.clone(),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        match &self.log_filter {
            Some(directives) => EnvFilter::new(directives),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_env_filter(cli.env_filter()).init();

    let options = cli.init_options();
    let on_interrupt: InterruptCallback = Box::new(|| info!("kbfsd interrupted"));
    let (config, lifecycle) = init(&options, Some(on_interrupt))
        .await
        .map_err(|e| {
            error!(error = %e, stage = e.stage(), "initialization failed");
            e
        })
        .context("kbfsd could not start")?;

    info!(
        mode = ?config.mode(),
        md_server = ?config.md_server().storage(),
        key_server = ?config.key_server().storage(),
        block_server = ?config.block_server().storage(),
        shared_peer = config.key_server_shares_metadata(),
        local_user = config.local_user().map(|u| u.name.as_str()),
        "client configuration ready"
    );

    if cli.daemon {
        info!("running until interrupted");
        // The interrupt listener shuts down and exits the process.
        std::future::pending::<()>().await;
    }

    config.shutdown_tiers().await;
    lifecycle
        .shutdown(options.mem_profile_path.as_deref())
        .context("shutdown failed")?;
    info!("kbfsd exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_root_is_tri_state() {
        let absent = Cli::try_parse_from(["kbfsd"]).unwrap();
        assert_eq!(absent.init_options().storage_root, StorageRoot::Ephemeral);

        let empty = Cli::try_parse_from(["kbfsd", "--server-root", ""]).unwrap();
        assert_eq!(empty.init_options().storage_root, StorageRoot::WorkingDir);

        let explicit = Cli::try_parse_from(["kbfsd", "--server-root=/tmp/x"]).unwrap();
        assert_eq!(
            explicit.init_options().storage_root,
            StorageRoot::Path(PathBuf::from("/tmp/x"))
        );
    }

    #[test]
    fn test_profile_and_user_flags() {
        let cli = Cli::try_parse_from([
            "kbfsd",
            "--local-user",
            "max",
            "--cpu-profile",
            "cpu.prof",
            "--mem-profile",
            "mem.prof",
            "--daemon",
        ])
        .unwrap();
        let options = cli.init_options();

        assert_eq!(options.local_user, "max");
        assert_eq!(options.cpu_profile_path, Some(PathBuf::from("cpu.prof")));
        assert_eq!(options.mem_profile_path, Some(PathBuf::from("mem.prof")));
        assert!(cli.daemon);
    }
}
