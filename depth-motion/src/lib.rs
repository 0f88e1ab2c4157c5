//! # Depth Motion Detection Library
//!
//! This library decides, frame over frame, whether a tracked subject in front of a depth sensor
//! is moving. Depth frames are paired with a body-index mask, the in-motion area of the selected
//! subject is estimated in square metres, and an adaptive noise floor decides whether that area
//! is significant.
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use depth_motion::prelude::v1::*;
//! ```
//!
//! The building blocks are [`stats::RollingStatistics`], [`detection::MotionDetector`] and the
//! multi-subject owner [`monitor::MotionMonitor`].

pub mod camera;
pub mod detection;
pub mod frame;
pub mod monitor;
pub mod properties;
pub mod stats;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            camera::DepthCamera,
            detection::{DetectorSettings, MotionDetector},
            frame::*,
            monitor::{LogTelemetry, MotionMonitor, NullTelemetry, SubjectMotion, Telemetry},
            properties::*,
            stats::RollingStatistics,
        };
        pub use anyhow::{anyhow, Error, Result};
    }
}
