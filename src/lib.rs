// SPDX-License-Identifier: Apache-2.0

//! Multi-stream frame-acquisition bridge for depth-sensing cameras.
//!
//! The bridge sits between a depth sensor's native frame delivery and a
//! consumer application with its own render/update cadence. A background
//! worker polls the device as fast as frames arrive; the consumer pulls
//! published frames at its own rate without ever blocking on the sensor or
//! observing a torn frame.
//!
//! ```text
//!               producer (worker thread)        consumer (app thread)
//!              ┌──────────────────────┐        ┌─────────────────────┐
//!  ┌────────┐  │ poll_depth ──► back  │        │ update():           │
//!  │ Depth  │  │ poll_color ──► back  │  swap  │   publish pending   │
//!  │ Device ├─►│ poll_ir    ──► back  │ ─────► │   derive gray/norm  │
//!  │        │  │ poll_index ──► back  │        │ depth_pixels()      │
//!  └────────┘  │ poll_bodies──► back  │        │ bodies(), ...       │
//!              └──────────────────────┘        └─────────────────────┘
//! ```
//!
//! Each stream (depth, color, infrared, body index, bodies) owns a
//! [`StreamPair`] of equally sized buffers: the worker fills the back buffer
//! and marks it ready, and the consumer's [`Session::update`] swaps ready
//! pairs in O(1) without copying pixels. Raw depth additionally derives an
//! 8-bit grayscale view through a precomputed [`DepthLookupTable`] and an
//! optional normalized float view.
//!
//! Hardware access goes through the [`DepthDevice`] trait; the crate ships a
//! [`SimulatedDevice`] with a pinhole calibration model so every layer above
//! the sensor runs and tests without hardware.
//!
//! # Example
//!
//! ```
//! use depthbridge::{BridgeConfig, Session, SimulatedDevice, StreamKind};
//!
//! let (device, _controller) = SimulatedDevice::new();
//! let mut session = Session::open(device, BridgeConfig::default())?;
//! session.init_depth_stream()?;
//! session.set_depth_clipping(500.0, 4000.0)?;
//! session.start()?;
//!
//! // Once per app frame:
//! session.update();
//! if session.is_frame_new(StreamKind::Depth) {
//!     let gray = session.depth_pixels();
//!     assert_eq!(gray.len(), session.frame_description(StreamKind::Depth)?.pixel_count());
//! }
//! session.close();
//! # Ok::<(), depthbridge::Error>(())
//! ```

pub mod body;
pub mod buffer;
pub mod device;
pub mod mapper;
pub mod quantize;
pub mod sensor;
pub mod session;

pub use body::{Body, BodyCandidate, Joint, JointType, TrackingState, JOINT_COUNT, MAX_BODIES};
pub use buffer::{FrontGuard, StreamPair};
pub use device::{DepthDevice, SimulatedDevice, SimulatedDeviceController};
pub use mapper::CoordinateMapper;
pub use quantize::{DepthLookupTable, DEFAULT_FAR_CLIP, DEFAULT_NEAR_CLIP};
pub use sensor::{
    CameraPoint, ColorFormat, ColorPoint, DepthPoint, Error, FrameDescription, StreamKind,
    MAX_DEPTH,
};
pub use session::{BridgeConfig, Session, DEFAULT_POLL_INTERVAL};
