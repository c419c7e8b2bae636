//! KBFS Testing Infrastructure
//!
//! Test doubles for the construction seams of the bootstrap layer:
//!
//! - [`CountingTiers`]: a `TierBuilder` that records every constructor call,
//!   can be told to fail one of them, and never touches disk or network
//! - [`FakeRemoteServer`]: an in-memory peer serving both metadata and keys
//! - [`MockIdentityService`]: a networked identity provider with injectable
//!   failures
//! - [`RecordingProfiler`]: a profiler that only records what it was asked

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod identity;
pub mod profiler;
pub mod tiers;

pub use identity::{IdentityStage, MockIdentityService, MOCK_UID_INDEX};
pub use profiler::{ProfilerEvent, RecordingProfiler};
pub use tiers::{CountingTiers, FakeRemoteServer, TierKind};
