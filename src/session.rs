// SPDX-License-Identifier: Apache-2.0

//! Acquisition session: device lifecycle, background polling, and the
//! consumer-facing publish/update step.
//!
//! A [`Session`] owns the device and one [`StreamPair`] per initialized
//! stream. Streams are initialized before [`Session::start`], which spawns
//! the acquisition worker thread; the worker polls the device, fills back
//! buffers, and marks frames ready. The consumer calls [`Session::update`]
//! once per cycle to publish pending frames and derive the depth display
//! views, then reads the front buffers through the accessors.
//!
//! ```text
//! ┌────────────────┐  poll   ┌─────────────────┐  try_swap  ┌──────────┐
//! │  DepthDevice   │ ──────► │  StreamPair × 5  │ ◄───────── │ update() │
//! │  (sensor/sim)  │         │  (back buffers)  │            │ consumer │
//! └────────────────┘         └─────────────────┘            └──────────┘
//!        ▲                                                        │
//!        └──────────── map_depth_* (batch calibration) ◄──────────┘
//! ```
//!
//! Exactly two actors touch the buffers: the worker writes back buffers, the
//! consumer swaps and reads front buffers. `stop()` joins the worker before
//! anything else may release device resources.

use crate::body::{Body, BodyCandidate, MAX_BODIES};
use crate::buffer::{FrontGuard, StreamPair};
use crate::device::DepthDevice;
use crate::mapper::CoordinateMapper;
use crate::quantize::DepthLookupTable;
use crate::sensor::{
    CameraPoint, ColorFormat, ColorPoint, DepthPoint, Error, FrameDescription, StreamKind,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Idle sleep between device polls when no stream had new data.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Session-wide configuration, decided once at construction.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Pixel layout of the color stream.
    pub color_format: ColorFormat,
    /// Derive the normalized `raw / 65535.0` float depth view on publish.
    pub normalized_depth: bool,
    /// Materialize the derived depth display views at all. When off,
    /// publishing only swaps buffers and the display accessors go stale.
    pub materialize_views: bool,
    /// Acquisition loop idle sleep.
    pub poll_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            color_format: ColorFormat::default(),
            normalized_depth: false,
            materialize_views: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// One buffer pair per stream; `None` until the stream is initialized.
#[derive(Default)]
struct Streams {
    depth: Option<StreamPair<u16>>,
    color: Option<StreamPair<u8>>,
    infrared: Option<StreamPair<u16>>,
    body_index: Option<StreamPair<u8>>,
    bodies: Option<StreamPair<Body>>,
}

#[derive(Default, Clone, Copy)]
struct Descriptions {
    depth: Option<FrameDescription>,
    color: Option<FrameDescription>,
    infrared: Option<FrameDescription>,
    body_index: Option<FrameDescription>,
}

/// Frame-acquisition bridge over a [`DepthDevice`].
pub struct Session<D: DepthDevice> {
    device: Arc<Mutex<D>>,
    config: BridgeConfig,
    streams: Arc<Streams>,
    descs: Descriptions,
    seated_mode: bool,
    depth_gray: Vec<u8>,
    depth_norm: Vec<f32>,
    lut: DepthLookupTable,
    mapper: CoordinateMapper,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    started: bool,
}

impl<D: DepthDevice + 'static> Session<D> {
    /// Acquire the device and create an idle session with no streams.
    ///
    /// # Errors
    /// [`Error::DeviceUnavailable`] when the sensor cannot be claimed.
    pub fn open(mut device: D, config: BridgeConfig) -> Result<Self, Error> {
        device.open()?;
        Ok(Self {
            device: Arc::new(Mutex::new(device)),
            config,
            streams: Arc::new(Streams::default()),
            descs: Descriptions::default(),
            seated_mode: false,
            depth_gray: Vec::new(),
            depth_norm: Vec::new(),
            lut: DepthLookupTable::new(),
            mapper: CoordinateMapper::new(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
            started: false,
        })
    }

    fn ensure_not_started(&self) -> Result<(), Error> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        Ok(())
    }

    /// The stream set is uniquely owned until the worker thread spawns, and
    /// every init path is guarded by `ensure_not_started`.
    fn streams_mut(&mut self) -> &mut Streams {
        Arc::get_mut(&mut self.streams).expect("stream set shared before start")
    }

    /// Initialize the depth stream and its derived display views.
    pub fn init_depth_stream(&mut self) -> Result<(), Error> {
        self.ensure_not_started()?;
        let desc = self
            .device
            .lock()
            .unwrap()
            .frame_description(StreamKind::Depth)?;

        let count = desc.pixel_count();
        self.streams_mut().depth = Some(StreamPair::new(count));
        self.depth_gray = vec![0; count];
        self.depth_norm = vec![0.0; count];
        self.descs.depth = Some(desc);
        debug!(width = desc.width, height = desc.height, "depth stream initialized");
        Ok(())
    }

    /// Initialize the color stream in the session's configured format.
    pub fn init_color_stream(&mut self) -> Result<(), Error> {
        self.ensure_not_started()?;
        let desc = self
            .device
            .lock()
            .unwrap()
            .frame_description(StreamKind::Color)?;

        let byte_len = desc.pixel_count() * self.config.color_format.bytes_per_pixel();
        self.streams_mut().color = Some(StreamPair::new(byte_len));
        self.descs.color = Some(desc);
        debug!(width = desc.width, height = desc.height, "color stream initialized");
        Ok(())
    }

    /// Initialize the infrared stream.
    pub fn init_infrared_stream(&mut self) -> Result<(), Error> {
        self.ensure_not_started()?;
        let desc = self
            .device
            .lock()
            .unwrap()
            .frame_description(StreamKind::Infrared)?;

        self.streams_mut().infrared = Some(StreamPair::new(desc.pixel_count()));
        self.descs.infrared = Some(desc);
        debug!(width = desc.width, height = desc.height, "infrared stream initialized");
        Ok(())
    }

    /// Initialize the body-index stream.
    pub fn init_body_index_stream(&mut self) -> Result<(), Error> {
        self.ensure_not_started()?;
        let desc = self
            .device
            .lock()
            .unwrap()
            .frame_description(StreamKind::BodyIndex)?;

        self.streams_mut().body_index = Some(StreamPair::new(desc.pixel_count()));
        self.descs.body_index = Some(desc);
        debug!(width = desc.width, height = desc.height, "body-index stream initialized");
        Ok(())
    }

    /// Initialize skeletal body tracking with fixed capacity
    /// [`MAX_BODIES`]. `seated` selects the device's seated tracker
    /// pipeline.
    pub fn init_body_stream(&mut self, seated: bool) -> Result<(), Error> {
        self.ensure_not_started()?;
        self.device.lock().unwrap().enable_body_tracking(seated)?;
        self.streams_mut().bodies = Some(StreamPair::new(MAX_BODIES));
        self.seated_mode = seated;
        debug!(seated, "body stream initialized");
        Ok(())
    }

    /// Frame geometry of an initialized stream.
    pub fn frame_description(&self, kind: StreamKind) -> Result<FrameDescription, Error> {
        let desc = match kind {
            StreamKind::Depth => self.descs.depth,
            StreamKind::Color => self.descs.color,
            StreamKind::Infrared => self.descs.infrared,
            StreamKind::BodyIndex => self.descs.body_index,
            StreamKind::Body => None,
        };
        desc.ok_or(Error::StreamNotInitialized(kind))
    }

    /// Spawn the acquisition worker. Stream initialization is rejected from
    /// here on.
    pub fn start(&mut self) -> Result<(), Error> {
        self.ensure_not_started()?;
        self.started = true;
        self.stop_flag.store(false, Ordering::Release);

        let device = Arc::clone(&self.device);
        let streams = Arc::clone(&self.streams);
        let stop = Arc::clone(&self.stop_flag);
        let color_format = self.config.color_format;
        let interval = self.config.poll_interval;

        self.worker = Some(
            thread::Builder::new()
                .name("depthbridge-acq".to_string())
                .spawn(move || acquisition_loop(device, streams, stop, color_format, interval))?,
        );
        debug!("acquisition started");
        Ok(())
    }

    /// Publish pending frames and derive the depth display views.
    ///
    /// Called once per consumer cycle. Streams swap in a fixed order (depth,
    /// color, infrared, bodies, body-index); streams without pending data
    /// keep their previous front buffer untouched.
    pub fn update(&mut self) {
        if !self.started {
            warn!("update called before start");
            return;
        }

        if let Some(pair) = &self.streams.depth {
            if pair.try_swap() && self.config.materialize_views {
                let front = pair.read_front();
                for (gray, &raw) in self.depth_gray.iter_mut().zip(front.iter()) {
                    *gray = self.lut.value(raw);
                }
                if self.config.normalized_depth {
                    for (norm, &raw) in self.depth_norm.iter_mut().zip(front.iter()) {
                        *norm = raw as f32 / 65535.0;
                    }
                }
            }
        }

        if let Some(pair) = &self.streams.color {
            pair.try_swap();
        }
        if let Some(pair) = &self.streams.infrared {
            pair.try_swap();
        }
        if let Some(pair) = &self.streams.bodies {
            pair.try_swap();
        }
        if let Some(pair) = &self.streams.body_index {
            pair.try_swap();
        }
    }

    /// Whether the most recent [`Self::update`] published a new frame for
    /// `kind`. Uninitialized streams always report `false`.
    pub fn is_frame_new(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Depth => self.streams.depth.as_ref().is_some_and(StreamPair::is_frame_new),
            StreamKind::Color => self.streams.color.as_ref().is_some_and(StreamPair::is_frame_new),
            StreamKind::Infrared => {
                self.streams.infrared.as_ref().is_some_and(StreamPair::is_frame_new)
            }
            StreamKind::BodyIndex => {
                self.streams.body_index.as_ref().is_some_and(StreamPair::is_frame_new)
            }
            StreamKind::Body => {
                self.streams.bodies.as_ref().is_some_and(StreamPair::is_frame_new)
            }
        }
    }

    /// Whether any stream published a new frame in the most recent update.
    pub fn is_any_frame_new(&self) -> bool {
        [
            StreamKind::Depth,
            StreamKind::Color,
            StreamKind::Infrared,
            StreamKind::BodyIndex,
            StreamKind::Body,
        ]
        .iter()
        .any(|&kind| self.is_frame_new(kind))
    }

    /// Grayscale depth display view (empty until the depth stream is
    /// initialized).
    pub fn depth_pixels(&self) -> &[u8] {
        &self.depth_gray
    }

    /// Normalized float depth view; only derived when the session was
    /// configured with `normalized_depth`.
    pub fn normalized_depth_pixels(&self) -> &[f32] {
        &self.depth_norm
    }

    /// Raw 16-bit depth front buffer.
    pub fn raw_depth_pixels(&self) -> FrontGuard<'_, u16> {
        match &self.streams.depth {
            Some(pair) => pair.read_front(),
            None => FrontGuard::empty(),
        }
    }

    /// Color front buffer in the configured [`ColorFormat`].
    pub fn color_pixels(&self) -> FrontGuard<'_, u8> {
        match &self.streams.color {
            Some(pair) => pair.read_front(),
            None => FrontGuard::empty(),
        }
    }

    /// Infrared front buffer.
    pub fn infrared_pixels(&self) -> FrontGuard<'_, u16> {
        match &self.streams.infrared {
            Some(pair) => pair.read_front(),
            None => FrontGuard::empty(),
        }
    }

    /// Body-index front buffer.
    pub fn body_index_pixels(&self) -> FrontGuard<'_, u8> {
        match &self.streams.body_index {
            Some(pair) => pair.read_front(),
            None => FrontGuard::empty(),
        }
    }

    /// Snapshot copy of the current tracked-body list.
    pub fn bodies(&self) -> Vec<Body> {
        match &self.streams.bodies {
            Some(pair) => pair.snapshot(),
            None => Vec::new(),
        }
    }

    /// Reconfigure depth clipping and rebuild the quantization table.
    ///
    /// Rejects `near >= far` with [`Error::InvalidRange`]; the previous
    /// table stays in effect on error. The rebuild happens here, on the
    /// consumer thread, before the next depth publish uses it.
    pub fn set_depth_clipping(&mut self, near_clip: f32, far_clip: f32) -> Result<(), Error> {
        self.lut.configure(near_clip, far_clip)
    }

    /// Switch the depth display direction (near-white vs. far-white).
    pub fn set_near_white(&mut self, near_white: bool) {
        self.lut.set_near_white(near_white);
    }

    /// Toggle materialization of the derived depth display views.
    pub fn set_materialize_views(&mut self, materialize: bool) {
        self.config.materialize_views = materialize;
    }

    /// Toggle derivation of the normalized float depth view.
    pub fn set_normalized_depth(&mut self, normalized: bool) {
        self.config.normalized_depth = normalized;
    }

    /// Current session configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Whether the body stream runs in seated mode.
    pub fn seated_mode(&self) -> bool {
        self.seated_mode
    }

    fn depth_desc(&self) -> Result<FrameDescription, Error> {
        self.descs
            .depth
            .ok_or(Error::StreamNotInitialized(StreamKind::Depth))
    }

    fn color_desc(&self) -> Result<FrameDescription, Error> {
        self.descs
            .color
            .ok_or(Error::StreamNotInitialized(StreamKind::Color))
    }

    /// Project depth pixels into camera space using the current raw depth
    /// front buffer.
    pub fn map_depth_points_to_camera(
        &mut self,
        points: &[DepthPoint],
    ) -> Result<Vec<CameraPoint>, Error> {
        let desc = self.depth_desc()?;
        let depth = match &self.streams.depth {
            Some(pair) => pair.read_front(),
            None => FrontGuard::empty(),
        };
        let device = self.device.lock().unwrap();
        self.mapper.depth_to_camera(&*device, desc, &depth, points)
    }

    /// Project depth pixels into camera space against an explicit depth
    /// image (e.g. a retained earlier frame).
    pub fn map_depth_points_to_camera_with(
        &mut self,
        points: &[DepthPoint],
        depth_image: &[u16],
    ) -> Result<Vec<CameraPoint>, Error> {
        let desc = self.depth_desc()?;
        let device = self.device.lock().unwrap();
        self.mapper
            .depth_to_camera(&*device, desc, depth_image, points)
    }

    /// Project the entire depth frame into camera space (point cloud).
    pub fn map_depth_frame_to_camera(&mut self) -> Result<Vec<CameraPoint>, Error> {
        let desc = self.depth_desc()?;
        let depth = match &self.streams.depth {
            Some(pair) => pair.read_front(),
            None => FrontGuard::empty(),
        };
        let device = self.device.lock().unwrap();
        self.mapper.depth_frame_to_camera(&*device, desc, &depth)
    }

    /// Project depth pixels into color-pixel space, clamped onto the color
    /// frame edges.
    pub fn map_depth_points_to_color(
        &mut self,
        points: &[DepthPoint],
    ) -> Result<Vec<ColorPoint>, Error> {
        let depth_desc = self.depth_desc()?;
        let color_desc = self.color_desc()?;
        let depth = match &self.streams.depth {
            Some(pair) => pair.read_front(),
            None => FrontGuard::empty(),
        };
        let device = self.device.lock().unwrap();
        self.mapper
            .depth_to_color(&*device, depth_desc, color_desc, &depth, points)
    }

    /// Same as [`Self::map_depth_points_to_color`] against an explicit depth
    /// image.
    pub fn map_depth_points_to_color_with(
        &mut self,
        points: &[DepthPoint],
        depth_image: &[u16],
    ) -> Result<Vec<ColorPoint>, Error> {
        let depth_desc = self.depth_desc()?;
        let color_desc = self.color_desc()?;
        let device = self.device.lock().unwrap();
        self.mapper
            .depth_to_color(&*device, depth_desc, color_desc, depth_image, points)
    }

    /// Rasterize the current color front buffer into a depth-sized image;
    /// unmappable pixels stay zero.
    pub fn map_depth_to_color_image(&mut self, dst: &mut Vec<u8>) -> Result<(), Error> {
        let depth_desc = self.depth_desc()?;
        let color_desc = self.color_desc()?;
        let depth = match &self.streams.depth {
            Some(pair) => pair.read_front(),
            None => FrontGuard::empty(),
        };
        let color = match &self.streams.color {
            Some(pair) => pair.read_front(),
            None => FrontGuard::empty(),
        };
        let device = self.device.lock().unwrap();
        self.mapper
            .depth_to_color_image(&*device, depth_desc, color_desc, &depth, &color, dst)
    }
}

impl<D: DepthDevice> Session<D> {
    /// Signal the acquisition worker and block until it has fully exited.
    ///
    /// After `stop()` returns, no back buffer is being written and the
    /// device receives no further polls, so resources may be released.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.stop_flag.store(true, Ordering::Release);
            if worker.join().is_err() {
                error!("acquisition worker panicked");
            }
            debug!("acquisition stopped");
        }
    }

    /// Stop acquisition and release the device. Idempotent.
    pub fn close(&mut self) {
        self.stop();
        self.device.lock().unwrap().close();
    }
}

impl<D: DepthDevice> Drop for Session<D> {
    fn drop(&mut self) {
        self.close();
    }
}

/// One poll pass over every initialized stream.
///
/// Returns `true` when any stream produced a new frame. Per-tick retrieval
/// misses and transient poll errors are absorbed here; only `stop()` ends
/// the loop.
fn poll_streams<D: DepthDevice>(
    device: &mut D,
    streams: &Streams,
    color_format: ColorFormat,
    candidates: &mut [BodyCandidate],
) -> bool {
    let mut any = false;

    if let Some(pair) = &streams.depth {
        match pair.produce(|buf| device.poll_depth(buf)) {
            Ok(fresh) => any |= fresh,
            Err(err) => trace!("depth poll miss: {}", err),
        }
    }

    if let Some(pair) = &streams.color {
        match pair.produce(|buf| device.poll_color(color_format, buf)) {
            Ok(fresh) => any |= fresh,
            Err(err) => trace!("color poll miss: {}", err),
        }
    }

    if let Some(pair) = &streams.infrared {
        match pair.produce(|buf| device.poll_infrared(buf)) {
            Ok(fresh) => any |= fresh,
            Err(err) => trace!("infrared poll miss: {}", err),
        }
    }

    if let Some(pair) = &streams.body_index {
        match pair.produce(|buf| device.poll_body_index(buf)) {
            Ok(fresh) => any |= fresh,
            Err(err) => trace!("body-index poll miss: {}", err),
        }
    }

    if let Some(pair) = &streams.bodies {
        match device.poll_bodies(candidates) {
            Ok(true) => {
                let result = pair.produce(|slots| {
                    for (slot, candidate) in slots.iter_mut().zip(candidates.iter()) {
                        *slot = Body::from_candidate(candidate);
                    }
                    Ok(true)
                });
                debug_assert!(result.is_ok());
                any = true;
            }
            Ok(false) => {}
            Err(err) => trace!("body poll miss: {}", err),
        }
    }

    any
}

fn acquisition_loop<D: DepthDevice>(
    device: Arc<Mutex<D>>,
    streams: Arc<Streams>,
    stop: Arc<AtomicBool>,
    color_format: ColorFormat,
    interval: Duration,
) {
    let mut candidates = vec![BodyCandidate::untracked(); MAX_BODIES];

    while !stop.load(Ordering::Acquire) {
        let any = {
            let mut device = device.lock().unwrap();
            poll_streams(&mut *device, &streams, color_format, &mut candidates)
        };

        if !any {
            thread::sleep(interval);
        }
    }
}
