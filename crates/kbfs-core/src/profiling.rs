//! Process profiling capability.
//!
//! The lifecycle layer opens the output files itself and hands them over, so
//! a profiler only ever sees handles that were successfully created.

use std::fs::File;
use std::io;

/// Continuous CPU sampling plus one-shot heap snapshots
pub trait Profiler: Send + Sync {
    /// Begin sampling into `out`
    fn start_cpu(&self, out: File) -> io::Result<()>;

    /// Stop sampling and flush; a no-op when not sampling
    fn stop_cpu(&self);

    /// Write one snapshot of current memory use
    fn write_heap_snapshot(&self, out: &mut File) -> io::Result<()>;
}
