//! Process sampling profiler backed by `sysinfo`

use kbfs_core::Profiler;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use sysinfo::{get_current_pid, Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Default time between CPU samples
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// One line of the CPU profile
#[derive(Debug, Clone, Serialize)]
pub struct CpuSample {
    /// Milliseconds since sampling started
    pub elapsed_ms: u64,
    /// CPU usage in percent of one core
    pub cpu_usage: f32,
    /// Resident memory in bytes
    pub memory_bytes: u64,
    /// Virtual memory in bytes
    pub virtual_memory_bytes: u64,
}

/// The heap snapshot document
#[derive(Debug, Clone, Serialize)]
pub struct HeapSnapshot {
    /// Process id
    pub pid: u32,
    /// Wall-clock time of the snapshot
    pub taken_at_unix_ms: u64,
    /// Resident memory in bytes
    pub memory_bytes: u64,
    /// Virtual memory in bytes
    pub virtual_memory_bytes: u64,
}

/// Stop flag the sampling thread sleeps on
#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }

    /// Sleep up to `timeout`; true once stop was requested
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

struct Sampling {
    stop: Arc<StopSignal>,
    worker: thread::JoinHandle<()>,
}

/// Samples this process's CPU and memory on a background thread
pub struct ProcessSampler {
    interval: Duration,
    sampling: Mutex<Option<Sampling>>,
}

impl ProcessSampler {
    /// Sampler with [`DEFAULT_SAMPLE_INTERVAL`]
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_SAMPLE_INTERVAL)
    }

    /// Sampler taking one sample per `interval`
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            sampling: Mutex::new(None),
        }
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

struct ProcessReader {
    system: System,
    pid: Pid,
}

impl ProcessReader {
    fn new() -> io::Result<Self> {
        let pid = get_current_pid().map_err(io::Error::other)?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }

    /// Resident memory, virtual memory and CPU usage
    fn read(&mut self) -> (u64, u64, f32) {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        match self.system.process(self.pid) {
            Some(process) => (
                process.memory(),
                process.virtual_memory(),
                process.cpu_usage(),
            ),
            None => (0, 0, 0.0),
        }
    }
}

fn write_sample(
    out: &mut BufWriter<File>,
    reader: &mut ProcessReader,
    started: Instant,
) -> io::Result<()> {
    let (memory_bytes, virtual_memory_bytes, cpu_usage) = reader.read();
    let sample = CpuSample {
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        cpu_usage,
        memory_bytes,
        virtual_memory_bytes,
    };
    serde_json::to_writer(&mut *out, &sample)?;
    out.write_all(b"\n")
}

fn run_sampler(out: File, mut reader: ProcessReader, interval: Duration, stop: &StopSignal) {
    let mut out = BufWriter::new(out);
    let started = Instant::now();
    loop {
        let last = stop.wait(interval);
        if let Err(e) = write_sample(&mut out, &mut reader, started) {
            warn!(error = %e, "CPU sampler stopped after write failure");
            return;
        }
        if last {
            break;
        }
    }
    if let Err(e) = out.flush() {
        warn!(error = %e, "failed to flush CPU profile");
    }
}

impl Profiler for ProcessSampler {
    fn start_cpu(&self, out: File) -> io::Result<()> {
        let mut sampling = self.sampling.lock();
        if sampling.is_some() {
            return Err(io::Error::other("CPU sampling already running"));
        }

        let reader = ProcessReader::new()?;
        let stop = Arc::new(StopSignal::default());
        let signal = Arc::clone(&stop);
        let interval = self.interval;
        let worker = thread::Builder::new()
            .name("kbfs-cpu-sampler".into())
            .spawn(move || run_sampler(out, reader, interval, &signal))?;

        *sampling = Some(Sampling { stop, worker });
        debug!(?interval, "CPU sampling started");
        Ok(())
    }

    fn stop_cpu(&self) {
        let Some(sampling) = self.sampling.lock().take() else {
            return;
        };
        sampling.stop.stop();
        if sampling.worker.join().is_err() {
            warn!("CPU sampler thread panicked");
        }
        debug!("CPU sampling stopped");
    }

    fn write_heap_snapshot(&self, out: &mut File) -> io::Result<()> {
        let mut reader = ProcessReader::new()?;
        let (memory_bytes, virtual_memory_bytes, _) = reader.read();
        let taken_at_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        let snapshot = HeapSnapshot {
            pid: reader.pid.as_u32(),
            taken_at_unix_ms,
            memory_bytes,
            virtual_memory_bytes,
        };
        serde_json::to_writer_pretty(&mut *out, &snapshot)?;
        out.write_all(b"\n")?;
        out.flush()
    }
}

impl Drop for ProcessSampler {
    fn drop(&mut self) {
        self.stop_cpu();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_samples_are_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpu.prof");
        let sampler = ProcessSampler::with_interval(Duration::from_millis(5));

        sampler.start_cpu(File::create(&path).unwrap()).unwrap();
        assert!(sampler.start_cpu(File::create(dir.path().join("other")).unwrap()).is_err());
        thread::sleep(Duration::from_millis(30));
        sampler.stop_cpu();
        sampler.stop_cpu();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(!lines.is_empty());
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("memory_bytes").is_some());
        }
    }

    #[test]
    fn test_stop_wakes_a_long_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpu.prof");
        let sampler = ProcessSampler::with_interval(Duration::from_secs(3600));

        sampler.start_cpu(File::create(&path).unwrap()).unwrap();
        let started = Instant::now();
        sampler.stop_cpu();

        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_heap_snapshot_is_one_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mem.prof");
        let mut out = File::create(&path).unwrap();

        ProcessSampler::new().write_heap_snapshot(&mut out).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["pid"].as_u64(), Some(u64::from(std::process::id())));
    }
}
