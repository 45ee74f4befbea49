//! # YTPB Common Library
//!
//! Shared vocabulary for YouTube playback tracking:
//! - Error type
//! - Event types (extension event-type strings and their groupings)
//! - Native player state codes and platform error messages
//! - Configuration loading
//! - Video time quantization helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::EventType;
