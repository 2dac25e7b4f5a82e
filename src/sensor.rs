// SPDX-License-Identifier: Apache-2.0

//! Common sensor types and error handling.
//!
//! This module provides device-agnostic types shared by the acquisition
//! session, the coordinate mapper, and device implementations: stream
//! identifiers, frame geometry descriptions, the coordinate-space point
//! types, and the crate-wide [`Error`] enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw depth samples above this value are sensor noise or invalid returns.
///
/// The meaningful depth domain is `[0, MAX_DEPTH]` in millimeters; `0` is the
/// "no return" sentinel.
pub const MAX_DEPTH: u16 = 10_000;

/// One independently-rated channel of sensor data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    /// 16-bit raw depth samples in millimeters.
    Depth,
    /// Color pixels in the configured [`ColorFormat`].
    Color,
    /// 16-bit infrared intensity.
    Infrared,
    /// 8-bit per-pixel body index (which tracked body covers this pixel).
    BodyIndex,
    /// Skeletal body list (joints, not pixels).
    Body,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StreamKind::Depth => write!(f, "depth"),
            StreamKind::Color => write!(f, "color"),
            StreamKind::Infrared => write!(f, "infrared"),
            StreamKind::BodyIndex => write!(f, "body-index"),
            StreamKind::Body => write!(f, "body"),
        }
    }
}

/// Pixel layout of the color stream.
///
/// The format is decided once at session construction and never probed
/// mid-algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorFormat {
    /// 8-bit RGBA quads, 4 bytes per pixel.
    #[default]
    Rgba,
    /// Packed YUY2, 2 bytes per pixel.
    Yuy2,
}

impl ColorFormat {
    /// Bytes per pixel for this format.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ColorFormat::Rgba => 4,
            ColorFormat::Yuy2 => 2,
        }
    }
}

/// Immutable per-stream frame geometry, queried once at stream init.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescription {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per pixel element.
    pub bytes_per_pixel: u32,
}

impl FrameDescription {
    /// Total number of pixels in one frame.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Total byte length of one frame.
    pub fn byte_len(&self) -> usize {
        self.pixel_count() * self.bytes_per_pixel as usize
    }
}

/// Integer pixel coordinate in the depth frame, stored as f32 for batch
/// interop with the device calibration routines.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DepthPoint {
    pub x: f32,
    pub y: f32,
}

impl DepthPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Pixel coordinate in the color frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ColorPoint {
    pub x: f32,
    pub y: f32,
}

impl ColorPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 3D point in the sensor's camera space (meters, unbounded).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl CameraPoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Common error type for bridge operations.
#[derive(Debug)]
pub enum Error {
    /// No device present, or the device is already claimed.
    DeviceUnavailable,
    /// A stream was queried or used before being initialized.
    StreamNotInitialized(StreamKind),
    /// Stream initialization or reconfiguration attempted after `start()`.
    AlreadyStarted,
    /// Invalid depth clipping range (requires `0 <= near < far`).
    InvalidRange { near: f32, far: f32 },
    /// The device calibration call failed; the mapping result is unusable.
    MappingUnavailable,
    /// I/O error from the underlying device transport.
    Io(std::io::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DeviceUnavailable => write!(f, "no depth device available"),
            Error::StreamNotInitialized(kind) => {
                write!(f, "{} stream not initialized", kind)
            }
            Error::AlreadyStarted => {
                write!(f, "cannot configure once acquisition has started")
            }
            Error::InvalidRange { near, far } => {
                write!(f, "invalid clipping range: near {} >= far {}", near, far)
            }
            Error::MappingUnavailable => write!(f, "device calibration mapping unavailable"),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
