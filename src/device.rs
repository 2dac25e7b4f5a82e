// SPDX-License-Identifier: Apache-2.0

//! Depth device abstraction.
//!
//! This module provides the [`DepthDevice`] trait that abstracts the physical
//! sensor behind the acquisition session, enabling:
//!
//! - **Live operation**: a driver wrapping the vendor runtime
//! - **Testing**: replaying pre-staged frames without hardware
//!
//! All frame pulls are non-blocking polls: `Ok(true)` means a new frame was
//! written into the caller's buffer, `Ok(false)` means nothing was ready this
//! tick (a normal steady-state outcome, not an error).
//!
//! [`SimulatedDevice`] is the built-in hardware-free implementation. Frames
//! are staged through a [`SimulatedDeviceController`] that shares state with
//! the device, so tests can keep feeding frames after the session has taken
//! ownership of the device. Its calibration model is a simple pinhole
//! projection with a depth-dependent disparity shift toward the color frame.

use crate::body::{BodyCandidate, MAX_BODIES};
use crate::sensor::{
    CameraPoint, ColorFormat, ColorPoint, DepthPoint, Error, FrameDescription, StreamKind,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Trait for depth sensor implementations.
///
/// The session owns the device for the lifetime of the acquisition loop;
/// mapping calls arrive from the consumer thread through the same shared
/// handle.
pub trait DepthDevice: Send {
    /// Acquire the sensor.
    ///
    /// # Errors
    /// [`Error::DeviceUnavailable`] when no sensor is present or it is
    /// already claimed.
    fn open(&mut self) -> Result<(), Error>;

    /// Release the sensor. Idempotent; safe without a prior successful
    /// [`Self::open`].
    fn close(&mut self);

    /// Frame geometry for a stream.
    fn frame_description(&self, kind: StreamKind) -> Result<FrameDescription, Error>;

    /// Poll for a new raw depth frame into `dst` (millimeter samples).
    fn poll_depth(&mut self, dst: &mut [u16]) -> Result<bool, Error>;

    /// Poll for a new color frame into `dst`, already in `format` layout.
    fn poll_color(&mut self, format: ColorFormat, dst: &mut [u8]) -> Result<bool, Error>;

    /// Poll for a new infrared frame into `dst`.
    fn poll_infrared(&mut self, dst: &mut [u16]) -> Result<bool, Error>;

    /// Poll for a new body-index frame into `dst`.
    fn poll_body_index(&mut self, dst: &mut [u8]) -> Result<bool, Error>;

    /// Configure skeletal tracking before bodies are polled; `seated`
    /// selects the seated tracker pipeline (upper-body joints only).
    fn enable_body_tracking(&mut self, seated: bool) -> Result<(), Error>;

    /// Poll for a new body frame into the fixed candidate slots.
    fn poll_bodies(&mut self, dst: &mut [BodyCandidate]) -> Result<bool, Error>;

    /// Batch-project depth pixels with their raw samples into camera space.
    ///
    /// `points`, `depths` and `out` must have equal lengths.
    ///
    /// # Errors
    /// [`Error::MappingUnavailable`] when the calibration path fails; `out`
    /// contents are unspecified in that case.
    fn map_depth_to_camera(
        &self,
        points: &[DepthPoint],
        depths: &[u16],
        out: &mut [CameraPoint],
    ) -> Result<(), Error>;

    /// Batch-project depth pixels with their raw samples into color-pixel
    /// space. Outputs are the device's raw (unclamped) coordinates and may
    /// fall outside the color frame.
    fn map_depth_to_color(
        &self,
        points: &[DepthPoint],
        depths: &[u16],
        out: &mut [ColorPoint],
    ) -> Result<(), Error>;
}

/// Pinhole intrinsics used by the simulated calibration model.
#[derive(Clone, Copy, Debug)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

/// Depth-frame intrinsics of the simulated sensor.
pub const SIM_DEPTH_INTRINSICS: Intrinsics = Intrinsics {
    fx: 365.456,
    fy: 365.456,
    cx: 254.878,
    cy: 205.395,
};

/// Horizontal disparity constant of the simulated depth→color model, in
/// pixel-millimeters: the color-space shift for a sample at depth `d` is
/// `SIM_DISPARITY / d - 40`.
pub const SIM_DISPARITY: f32 = 40_000.0;

const SIM_DEPTH_DESC: FrameDescription = FrameDescription {
    width: 512,
    height: 424,
    bytes_per_pixel: 2,
};

const SIM_COLOR_DESC: FrameDescription = FrameDescription {
    width: 1920,
    height: 1080,
    bytes_per_pixel: 4,
};

#[derive(Default)]
struct SimState {
    present: bool,
    opened: bool,
    closed_count: u32,
    calibration_ok: bool,
    depth_frames: VecDeque<Vec<u16>>,
    color_frames: VecDeque<Vec<u8>>,
    infrared_frames: VecDeque<Vec<u16>>,
    body_index_frames: VecDeque<Vec<u8>>,
    body_frames: VecDeque<Vec<BodyCandidate>>,
    seated_mode: Option<bool>,
    poll_count: u64,
}

/// Hardware-free [`DepthDevice`] for tests and replay.
///
/// Streams deliver frames staged via the paired
/// [`SimulatedDeviceController`]; an empty queue reads as "not ready this
/// tick".
pub struct SimulatedDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDevice {
    /// Create a present, openable device and its controller.
    pub fn new() -> (Self, SimulatedDeviceController) {
        Self::with_presence(true)
    }

    /// Create a device that fails to open, for session-failure tests.
    pub fn unavailable() -> (Self, SimulatedDeviceController) {
        Self::with_presence(false)
    }

    fn with_presence(present: bool) -> (Self, SimulatedDeviceController) {
        let state = Arc::new(Mutex::new(SimState {
            present,
            calibration_ok: true,
            ..SimState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            SimulatedDeviceController { state },
        )
    }

    fn pop_frame<T: Copy>(queue: &mut VecDeque<Vec<T>>, dst: &mut [T]) -> bool {
        match queue.pop_front() {
            Some(frame) => {
                debug_assert_eq!(frame.len(), dst.len(), "staged frame size mismatch");
                let len = frame.len().min(dst.len());
                dst[..len].copy_from_slice(&frame[..len]);
                true
            }
            None => false,
        }
    }
}

impl DepthDevice for SimulatedDevice {
    fn open(&mut self) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if !state.present || state.opened {
            return Err(Error::DeviceUnavailable);
        }
        state.opened = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.opened {
            state.opened = false;
            state.closed_count += 1;
        }
    }

    fn frame_description(&self, kind: StreamKind) -> Result<FrameDescription, Error> {
        match kind {
            StreamKind::Depth | StreamKind::Infrared => Ok(SIM_DEPTH_DESC),
            StreamKind::Color => Ok(SIM_COLOR_DESC),
            StreamKind::BodyIndex => Ok(FrameDescription {
                bytes_per_pixel: 1,
                ..SIM_DEPTH_DESC
            }),
            StreamKind::Body => Err(Error::StreamNotInitialized(StreamKind::Body)),
        }
    }

    fn poll_depth(&mut self, dst: &mut [u16]) -> Result<bool, Error> {
        let mut state = self.state.lock().unwrap();
        state.poll_count += 1;
        Ok(Self::pop_frame(&mut state.depth_frames, dst))
    }

    fn poll_color(&mut self, _format: ColorFormat, dst: &mut [u8]) -> Result<bool, Error> {
        let mut state = self.state.lock().unwrap();
        state.poll_count += 1;
        Ok(Self::pop_frame(&mut state.color_frames, dst))
    }

    fn poll_infrared(&mut self, dst: &mut [u16]) -> Result<bool, Error> {
        let mut state = self.state.lock().unwrap();
        state.poll_count += 1;
        Ok(Self::pop_frame(&mut state.infrared_frames, dst))
    }

    fn poll_body_index(&mut self, dst: &mut [u8]) -> Result<bool, Error> {
        let mut state = self.state.lock().unwrap();
        state.poll_count += 1;
        Ok(Self::pop_frame(&mut state.body_index_frames, dst))
    }

    fn enable_body_tracking(&mut self, seated: bool) -> Result<(), Error> {
        self.state.lock().unwrap().seated_mode = Some(seated);
        Ok(())
    }

    fn poll_bodies(&mut self, dst: &mut [BodyCandidate]) -> Result<bool, Error> {
        let mut state = self.state.lock().unwrap();
        state.poll_count += 1;
        let Some(frame) = state.body_frames.pop_front() else {
            return Ok(false);
        };

        for (i, slot) in dst.iter_mut().enumerate() {
            *slot = frame.get(i).copied().unwrap_or_else(BodyCandidate::untracked);
        }
        Ok(true)
    }

    fn map_depth_to_camera(
        &self,
        points: &[DepthPoint],
        depths: &[u16],
        out: &mut [CameraPoint],
    ) -> Result<(), Error> {
        if !self.state.lock().unwrap().calibration_ok {
            return Err(Error::MappingUnavailable);
        }

        let k = SIM_DEPTH_INTRINSICS;
        for ((point, &depth), camera) in points.iter().zip(depths).zip(out.iter_mut()) {
            if depth == 0 {
                // No return: no geometry to project.
                *camera = CameraPoint::default();
                continue;
            }
            let z = depth as f32 / 1000.0;
            *camera = CameraPoint {
                x: (point.x - k.cx) * z / k.fx,
                y: (k.cy - point.y) * z / k.fy,
                z,
            };
        }
        Ok(())
    }

    fn map_depth_to_color(
        &self,
        points: &[DepthPoint],
        depths: &[u16],
        out: &mut [ColorPoint],
    ) -> Result<(), Error> {
        if !self.state.lock().unwrap().calibration_ok {
            return Err(Error::MappingUnavailable);
        }

        let scale_x = SIM_COLOR_DESC.width as f32 / SIM_DEPTH_DESC.width as f32;
        let scale_y = SIM_COLOR_DESC.height as f32 / SIM_DEPTH_DESC.height as f32;
        for ((point, &depth), color) in points.iter().zip(depths).zip(out.iter_mut()) {
            if depth == 0 {
                // Kinect-style "no mapping" marker, far outside the frame.
                *color = ColorPoint::new(-1.0e6, -1.0e6);
                continue;
            }
            let disparity = SIM_DISPARITY / depth as f32 - 40.0;
            *color = ColorPoint {
                x: point.x * scale_x + disparity,
                y: point.y * scale_y,
            };
        }
        Ok(())
    }
}

/// Shared-state handle for staging frames into a [`SimulatedDevice`].
#[derive(Clone)]
pub struct SimulatedDeviceController {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDeviceController {
    /// Stage a raw depth frame (must match the depth frame description).
    pub fn push_depth_frame(&self, frame: Vec<u16>) {
        self.state.lock().unwrap().depth_frames.push_back(frame);
    }

    /// Stage a color frame in the session's configured format.
    pub fn push_color_frame(&self, frame: Vec<u8>) {
        self.state.lock().unwrap().color_frames.push_back(frame);
    }

    /// Stage an infrared frame.
    pub fn push_infrared_frame(&self, frame: Vec<u16>) {
        self.state.lock().unwrap().infrared_frames.push_back(frame);
    }

    /// Stage a body-index frame.
    pub fn push_body_index_frame(&self, frame: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .body_index_frames
            .push_back(frame);
    }

    /// Stage a body frame. Slots beyond the provided candidates read as
    /// untracked; candidates beyond [`MAX_BODIES`] are ignored by pollers.
    pub fn push_bodies(&self, mut candidates: Vec<BodyCandidate>) {
        candidates.truncate(MAX_BODIES);
        self.state.lock().unwrap().body_frames.push_back(candidates);
    }

    /// Toggle the calibration path; when off, mapping calls fail with
    /// [`Error::MappingUnavailable`].
    pub fn set_calibration_ok(&self, ok: bool) {
        self.state.lock().unwrap().calibration_ok = ok;
    }

    /// Number of times the device has been closed.
    pub fn closed_count(&self) -> u32 {
        self.state.lock().unwrap().closed_count
    }

    /// Seated-mode selection passed to [`DepthDevice::enable_body_tracking`],
    /// or `None` when body tracking was never enabled.
    pub fn seated_mode(&self) -> Option<bool> {
        self.state.lock().unwrap().seated_mode
    }

    /// Whether the device is currently open.
    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().opened
    }

    /// Total poll calls across all streams, for loop-shutdown assertions.
    pub fn poll_count(&self) -> u64 {
        self.state.lock().unwrap().poll_count
    }
}
