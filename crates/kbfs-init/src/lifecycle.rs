//! Process lifecycle: CPU profiling, heap snapshot and interrupt handling.
//!
//! Shutdown runs at most once per manager. The interrupt listener and the
//! graceful-exit path may both call [`LifecycleManager::shutdown`]; whichever
//! gets there first does the work and the other blocks until it is done, so
//! the interrupt path never exits over a half-written snapshot.

use crate::error::LifecycleError;
use crate::sampler::ProcessSampler;
use kbfs_core::Profiler;
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Exit status after an interrupt-triggered shutdown
pub const INTERRUPT_EXIT_CODE: i32 = 1;

/// Callback run after interrupt-triggered shutdown, before exit
pub type InterruptCallback = Box<dyn FnOnce() + Send>;

/// Where the manager is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Nothing started
    Idle,
    /// CPU profile being written
    Profiling,
    /// Shutdown has run
    ShutDown,
}

#[derive(Debug)]
struct LifecycleState {
    phase: LifecyclePhase,
    cpu_profile: Option<PathBuf>,
}

/// Owns profiling state and the shutdown gate
pub struct LifecycleManager {
    profiler: Arc<dyn Profiler>,
    state: Mutex<LifecycleState>,
    /// Held for the whole shutdown body
    shutdown_gate: Mutex<()>,
    shut_down: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

fn requested(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| !p.as_os_str().is_empty())
}

impl LifecycleManager {
    /// Manager driving `profiler`
    pub fn new(profiler: Arc<dyn Profiler>) -> Self {
        Self {
            profiler,
            state: Mutex::new(LifecycleState {
                phase: LifecyclePhase::Idle,
                cpu_profile: None,
            }),
            shutdown_gate: Mutex::new(()),
            shut_down: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    /// Current phase
    pub fn phase(&self) -> LifecyclePhase {
        self.state.lock().phase
    }

    /// CPU profile being written, if any
    pub fn cpu_profile(&self) -> Option<PathBuf> {
        self.state.lock().cpu_profile.clone()
    }

    /// Whether shutdown has run
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Begin CPU profiling into `cpu_profile`; no-op when absent or empty
    pub fn start(&self, cpu_profile: Option<&Path>) -> Result<(), LifecycleError> {
        let Some(path) = requested(cpu_profile) else {
            return Ok(());
        };

        let mut state = self.state.lock();
        if state.phase != LifecyclePhase::Idle {
            return Err(LifecycleError::AlreadyProfiling);
        }

        let out = File::create(path).map_err(|source| LifecycleError::CpuProfile {
            path: path.to_path_buf(),
            source,
        })?;
        self.profiler
            .start_cpu(out)
            .map_err(|e| LifecycleError::Profiler(e.to_string()))?;

        state.phase = LifecyclePhase::Profiling;
        state.cpu_profile = Some(path.to_path_buf());
        info!(path = %path.display(), "CPU profiling started");
        Ok(())
    }

    /// Stop profiling and write a heap snapshot to `mem_profile` if given.
    ///
    /// Only the first call does anything. A concurrent call waits for the
    /// first to finish, then returns `Ok(())`.
    pub fn shutdown(&self, mem_profile: Option<&Path>) -> Result<(), LifecycleError> {
        let _gate = self.shutdown_gate.lock();
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("shutdown already ran");
            return Ok(());
        }

        {
            let mut state = self.state.lock();
            if state.phase == LifecyclePhase::Profiling {
                self.profiler.stop_cpu();
                info!("CPU profiling stopped");
            }
            state.phase = LifecyclePhase::ShutDown;
        }

        let Some(path) = requested(mem_profile) else {
            return Ok(());
        };
        let snapshot_err = |source| LifecycleError::HeapSnapshot {
            path: path.to_path_buf(),
            source,
        };
        let mut out = File::create(path).map_err(snapshot_err)?;
        self.profiler
            .write_heap_snapshot(&mut out)
            .map_err(snapshot_err)?;
        info!(path = %path.display(), "heap snapshot written");
        Ok(())
    }

    /// Shutdown, then `on_interrupt`, then the exit status to use.
    ///
    /// A shutdown error is logged and does not stop the sequence.
    pub fn interrupt_sequence(
        &self,
        mem_profile: Option<&Path>,
        on_interrupt: Option<InterruptCallback>,
    ) -> i32 {
        if let Err(e) = self.shutdown(mem_profile) {
            warn!(error = %e, "shutdown failed during interrupt");
        }
        if let Some(callback) = on_interrupt {
            callback();
        }
        INTERRUPT_EXIT_CODE
    }

    /// Watch for Ctrl-C (and SIGTERM on unix) and exit after
    /// [`LifecycleManager::interrupt_sequence`].
    ///
    /// Replaces any listener already installed. Returns `false` outside a
    /// Tokio runtime.
    pub fn spawn_interrupt_listener(
        self: &Arc<Self>,
        mem_profile: Option<PathBuf>,
        on_interrupt: Option<InterruptCallback>,
    ) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime; interrupt listener not installed");
            return false;
        };

        // The task holds a weak reference so the manager can still be dropped.
        let manager = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            wait_for_interrupt().await;
            info!("interrupt received, shutting down");
            let code = match manager.upgrade() {
                Some(manager) => manager.interrupt_sequence(mem_profile.as_deref(), on_interrupt),
                None => INTERRUPT_EXIT_CODE,
            };
            std::process::exit(code);
        });

        if let Some(previous) = self.listener.lock().replace(task) {
            previous.abort();
        }
        true
    }

    /// Whether an interrupt listener is installed and still waiting
    pub fn has_interrupt_listener(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Remove the interrupt listener, releasing the signal handlers to the
    /// caller
    pub fn stop_interrupt_listener(&self) {
        if let Some(task) = self.listener.lock().take() {
            task.abort();
            debug!("interrupt listener stopped");
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new(Arc::new(ProcessSampler::new()))
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("state", &*self.state.lock())
            .field("shut_down", &self.is_shut_down())
            .field("listening", &self.has_interrupt_listener())
            .finish_non_exhaustive()
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.stop_interrupt_listener();
    }
}

async fn wait_for_interrupt() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbfs_testkit::{ProfilerEvent, RecordingProfiler};
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn manager() -> (Arc<RecordingProfiler>, LifecycleManager) {
        let profiler = Arc::new(RecordingProfiler::new());
        (profiler.clone(), LifecycleManager::new(profiler))
    }

    #[test]
    fn test_empty_paths_mean_not_requested() {
        let (profiler, manager) = manager();
        manager.start(None).unwrap();
        manager.start(Some(Path::new(""))).unwrap();
        assert_eq!(manager.phase(), LifecyclePhase::Idle);

        manager.shutdown(Some(Path::new(""))).unwrap();
        assert_eq!(manager.phase(), LifecyclePhase::ShutDown);
        assert!(profiler.events().is_empty());
    }

    #[test]
    fn test_profile_then_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cpu = dir.path().join("cpu.prof");
        let mem = dir.path().join("mem.prof");
        let (profiler, manager) = manager();

        manager.start(Some(&cpu)).unwrap();
        assert_eq!(manager.phase(), LifecyclePhase::Profiling);
        assert_eq!(manager.cpu_profile(), Some(cpu.clone()));
        assert!(matches!(
            manager.start(Some(&cpu)),
            Err(LifecycleError::AlreadyProfiling)
        ));

        manager.shutdown(Some(&mem)).unwrap();
        assert_eq!(
            profiler.events(),
            vec![
                ProfilerEvent::StartCpu,
                ProfilerEvent::StopCpu,
                ProfilerEvent::HeapSnapshot
            ]
        );
        assert_eq!(std::fs::read_to_string(&mem).unwrap(), "heap\n");
    }

    #[test]
    fn test_unwritable_targets_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no/such/dir/out.prof");
        let (profiler, manager) = manager();

        assert!(matches!(
            manager.start(Some(&missing)),
            Err(LifecycleError::CpuProfile { .. })
        ));
        assert_eq!(manager.phase(), LifecyclePhase::Idle);

        assert!(matches!(
            manager.shutdown(Some(&missing)),
            Err(LifecycleError::HeapSnapshot { .. })
        ));
        assert_eq!(profiler.count(ProfilerEvent::HeapSnapshot), 0);
    }

    #[test]
    fn test_shutdown_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let (profiler, manager) = manager();
        manager.start(Some(&dir.path().join("cpu.prof"))).unwrap();

        manager.shutdown(Some(&dir.path().join("a.prof"))).unwrap();
        manager.shutdown(Some(&dir.path().join("b.prof"))).unwrap();

        assert_eq!(profiler.count(ProfilerEvent::StopCpu), 1);
        assert_eq!(profiler.count(ProfilerEvent::HeapSnapshot), 1);
        assert!(!dir.path().join("b.prof").exists());
    }

    #[test]
    fn test_interrupt_sequence_survives_snapshot_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (_, manager) = manager();
        let called = Arc::new(AtomicUsize::new(0));
        let seen = called.clone();

        let code = manager.interrupt_sequence(
            Some(&dir.path().join("missing/mem.prof")),
            Some(Box::new(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            })),
        );

        assert_eq!(code, INTERRUPT_EXIT_CODE);
        assert_eq!(called.load(Ordering::SeqCst), 1);
        assert!(manager.is_shut_down());
    }

    #[test]
    fn test_listener_needs_a_runtime() {
        let manager = Arc::new(LifecycleManager::new(Arc::new(RecordingProfiler::new())));
        assert!(!manager.spawn_interrupt_listener(None, None));
        assert!(!manager.has_interrupt_listener());
    }

    #[tokio::test]
    async fn test_listener_can_be_stopped() {
        let manager = Arc::new(LifecycleManager::new(Arc::new(RecordingProfiler::new())));
        assert!(manager.spawn_interrupt_listener(None, None));
        assert!(manager.spawn_interrupt_listener(None, None));
        assert!(manager.has_interrupt_listener());

        manager.stop_interrupt_listener();
        assert!(!manager.has_interrupt_listener());
    }

    #[test]
    fn test_late_shutdown_waits_for_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mem = dir.path().join("mem.prof");
        let profiler =
            Arc::new(RecordingProfiler::new().with_snapshot_delay(Duration::from_millis(300)));
        let manager = Arc::new(LifecycleManager::new(profiler.clone()));

        let graceful = {
            let manager = manager.clone();
            let mem = mem.clone();
            thread::spawn(move || manager.shutdown(Some(&mem)))
        };
        thread::sleep(Duration::from_millis(50));

        let code = manager.interrupt_sequence(Some(&mem), None);
        assert_eq!(code, INTERRUPT_EXIT_CODE);
        // The snapshot is complete by the time the interrupt path would exit.
        assert_eq!(std::fs::read_to_string(&mem).unwrap(), "heap\n");

        graceful.join().unwrap().unwrap();
        assert_eq!(profiler.count(ProfilerEvent::HeapSnapshot), 1);
    }
}
