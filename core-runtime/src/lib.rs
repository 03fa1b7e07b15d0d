//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the playback core:
//! - Logging and tracing initialization
//! - The event bus used to notify UI stores
//!
//! ## Overview
//!
//! `core-playback` publishes [`events::CoreEvent`]s and logs through
//! `tracing`; this crate owns the subscriber setup and the broadcast channel
//! so host applications configure both in one place.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
