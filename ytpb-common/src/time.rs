//! Timestamp and video time utilities
//!
//! Video times are seconds as `f64`, the unit the player API reports. Milestone
//! detection quantizes them to half-second buckets.

use chrono::{DateTime, Utc};

/// Smallest step between two milestone buckets, in seconds
pub const MILESTONE_BUCKET_SECS: f64 = 0.5;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Floor a video time to the nearest 0.5 seconds
///
/// `10.0 → 10.0`, `10.4 → 10.0`, `10.5 → 10.5`, `10.7 → 10.5`
pub fn floored_video_time(video_time: f64) -> f64 {
    let remainder = video_time % 1.0;
    video_time - remainder
        + if remainder >= MILESTONE_BUCKET_SECS {
            MILESTONE_BUCKET_SECS
        } else {
            0.0
        }
}

/// Video time (seconds) at `fraction` of `duration`, floored to 0.5 seconds
pub fn video_time_from_fraction(duration: f64, fraction: f64) -> f64 {
    floored_video_time(duration * fraction)
}
