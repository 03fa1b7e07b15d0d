//! Workspace placeholder crate.
//!
//! Re-exports the playback orchestration core and its runtime helpers so a host
//! UI can depend on `hifi-player-workspace` and toggle the pieces it needs with
//! feature flags instead of wiring each member crate.

#[cfg(feature = "playback")]
pub use core_playback as playback;

#[cfg(feature = "runtime")]
pub use core_runtime as runtime;
