//! Real-time person detection and counting from a webcam feed.
//!
//! The crate is organized as a small library that the `headcount` binary is
//! assembled from: webcam capture ([`video`]), ONNX inference ([`nn`]),
//! generic object detection with non-maximum suppression ([`detection`]), the
//! YOLOv8 decoding layer ([`person`]), and a debug GUI ([`gui`]).
//!
//! # Environment Variables
//!
//! Some parts of headcount can be overridden by setting environment variables:
//!
//! * `HEADCOUNT_MODEL`: Path of the YOLOv8 detection model to load. If unset,
//!   `yolov8n.onnx` in the current directory is used.
//! * `HEADCOUNT_CAMERA`: Forces the device to use for [`Camera`]s created
//!   without an explicit device name. If unset, the first device that supports
//!   a compatible image format will be used.
//! * `HEADCOUNT_JPEG_BACKEND`: Configures the JPEG image decoder to use.
//!   Allowed values are:
//!   * `mozjpeg`: uses the [mozjpeg] library to decode JPEG images.
//!   * `image`: uses the decoder of the [image] crate.
//!
//! [mozjpeg]: https://github.com/mozilla/mozjpeg
//! [image]: https://github.com/image-rs/image
//! [`Camera`]: video::camera::Camera

use log::LevelFilter;

pub mod detection;
pub mod filter;
pub mod gui;
pub mod image;
pub mod iter;
pub mod nn;
pub mod num;
pub mod person;
pub mod termination;
pub mod timer;
pub mod video;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and headcount will log at *debug* level, `wgpu` at *warn*
/// level. `RUST_LOG` can override both.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
