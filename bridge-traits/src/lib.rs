//! # Host Bridge Traits
//!
//! Capabilities the playback core needs from its host but does not implement
//! itself.
//!
//! ## Traits
//!
//! - [`SettingsStore`](storage::SettingsStore) - Persisted user preferences
//!   (the requested streaming quality lives here)
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! Catalog and audio-device collaborators are playback specific and live in
//! `core-playback::traits`.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep messages actionable.
//!
//! ## Thread Safety
//!
//! On native targets every bridge trait requires `Send + Sync`
//! ([`PlatformSendSync`](platform::PlatformSendSync)). On `wasm32` the bound is
//! dropped because browser handles are single-threaded.

pub mod error;
pub mod logging;
pub mod platform;
pub mod storage;

pub use error::BridgeError;

pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use platform::{PlatformSend, PlatformSendSync};
pub use storage::{MemorySettingsStore, SettingsStore};
