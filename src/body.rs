// SPDX-License-Identifier: Apache-2.0

//! Skeletal tracking primitives.
//!
//! A [`Body`] is either untracked (empty joint map) or tracked with exactly
//! one [`Joint`] per [`JointType`]. The device reports raw [`BodyCandidate`]
//! slots each body frame; the acquisition loop converts them into `Body`
//! values, enforcing the tracked/untracked invariant.

use std::collections::HashMap;

/// Maximum number of simultaneously trackable bodies.
pub const MAX_BODIES: usize = 6;

/// Number of joints in the fixed skeletal enumeration.
pub const JOINT_COUNT: usize = 25;

/// Fixed skeletal joint enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum JointType {
    SpineBase,
    SpineMid,
    Neck,
    Head,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    HandLeft,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HandRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
    SpineShoulder,
    HandTipLeft,
    ThumbLeft,
    HandTipRight,
    ThumbRight,
}

impl JointType {
    /// All joints, in enumeration order. Index matches the device's joint
    /// array layout.
    pub const ALL: [JointType; JOINT_COUNT] = [
        JointType::SpineBase,
        JointType::SpineMid,
        JointType::Neck,
        JointType::Head,
        JointType::ShoulderLeft,
        JointType::ElbowLeft,
        JointType::WristLeft,
        JointType::HandLeft,
        JointType::ShoulderRight,
        JointType::ElbowRight,
        JointType::WristRight,
        JointType::HandRight,
        JointType::HipLeft,
        JointType::KneeLeft,
        JointType::AnkleLeft,
        JointType::FootLeft,
        JointType::HipRight,
        JointType::KneeRight,
        JointType::AnkleRight,
        JointType::FootRight,
        JointType::SpineShoulder,
        JointType::HandTipLeft,
        JointType::ThumbLeft,
        JointType::HandTipRight,
        JointType::ThumbRight,
    ];
}

/// Per-joint tracking confidence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrackingState {
    #[default]
    NotTracked,
    Inferred,
    Tracked,
}

/// 3D joint position in camera space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JointPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Unit quaternion joint orientation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointOrientation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for JointOrientation {
    fn default() -> Self {
        // Identity rotation.
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// One tracked joint: position, orientation, and per-joint tracking state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Joint {
    pub position: JointPosition,
    pub orientation: JointOrientation,
    pub tracking_state: TrackingState,
}

/// Raw per-slot body data as reported by the device each body frame.
///
/// `joints` is indexed by [`JointType::ALL`] order and is only meaningful
/// when `tracked` is set.
#[derive(Clone, Copy, Debug, Default)]
pub struct BodyCandidate {
    pub tracked: bool,
    pub joints: [Joint; JOINT_COUNT],
}

impl BodyCandidate {
    /// An empty, untracked slot.
    pub fn untracked() -> Self {
        Self::default()
    }
}

/// A published body snapshot.
///
/// Invariant: `tracked == false` implies an empty joint map; `tracked ==
/// true` implies exactly [`JOINT_COUNT`] entries, one per [`JointType`].
#[derive(Clone, Debug, Default)]
pub struct Body {
    pub tracked: bool,
    pub joints: HashMap<JointType, Joint>,
}

impl Body {
    /// An untracked body with no joints.
    pub fn untracked() -> Self {
        Self::default()
    }

    /// Build a body from a device candidate slot, enforcing the
    /// tracked/untracked joint invariant.
    pub fn from_candidate(candidate: &BodyCandidate) -> Self {
        if !candidate.tracked {
            return Self::untracked();
        }

        let mut joints = HashMap::with_capacity(JOINT_COUNT);
        for (i, joint_type) in JointType::ALL.iter().enumerate() {
            joints.insert(*joint_type, candidate.joints[i]);
        }
        Self {
            tracked: true,
            joints,
        }
    }

    /// Look up a joint; `None` when the body is untracked.
    pub fn joint(&self, joint_type: JointType) -> Option<&Joint> {
        self.joints.get(&joint_type)
    }
}
