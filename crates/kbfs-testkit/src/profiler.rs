//! Profiler double

use kbfs_core::Profiler;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Write};
use std::thread;
use std::time::Duration;

/// Calls received by a [`RecordingProfiler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ProfilerEvent {
    StartCpu,
    StopCpu,
    HeapSnapshot,
}

/// Records calls and writes a marker line to every file it is given
#[derive(Debug, Default)]
pub struct RecordingProfiler {
    events: Mutex<Vec<ProfilerEvent>>,
    cpu_out: Mutex<Option<File>>,
    snapshot_delay: Option<Duration>,
}

impl RecordingProfiler {
    /// Profiler with no calls recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before writing each heap snapshot
    pub fn with_snapshot_delay(mut self, delay: Duration) -> Self {
        self.snapshot_delay = Some(delay);
        self
    }

    /// Calls so far, in order
    pub fn events(&self) -> Vec<ProfilerEvent> {
        self.events.lock().clone()
    }

    /// Times `event` was recorded
    pub fn count(&self, event: ProfilerEvent) -> usize {
        self.events.lock().iter().filter(|e| **e == event).count()
    }

    /// Whether a CPU profile file is currently held
    pub fn is_sampling(&self) -> bool {
        self.cpu_out.lock().is_some()
    }
}

impl Profiler for RecordingProfiler {
    fn start_cpu(&self, mut out: File) -> io::Result<()> {
        self.events.lock().push(ProfilerEvent::StartCpu);
        writeln!(out, "cpu")?;
        *self.cpu_out.lock() = Some(out);
        Ok(())
    }

    fn stop_cpu(&self) {
        self.events.lock().push(ProfilerEvent::StopCpu);
        self.cpu_out.lock().take();
    }

    fn write_heap_snapshot(&self, out: &mut File) -> io::Result<()> {
        self.events.lock().push(ProfilerEvent::HeapSnapshot);
        if let Some(delay) = self.snapshot_delay {
            thread::sleep(delay);
        }
        writeln!(out, "heap")
    }
}
