// SPDX-License-Identifier: Apache-2.0

//! Raw depth to 8-bit display quantization.
//!
//! Depth frames arrive as 16-bit millimeter samples with a meaningful domain
//! of `[0, 10000]`. For visualization they are quantized through a
//! precomputed 10,001-entry lookup table: a clamped affine mapping of the
//! raw value between the near and far clipping distances onto the display
//! endpoints. The table is fully rebuilt whenever the clipping parameters or
//! the direction flag change; rebuilds happen on the consumer thread, never
//! inside the acquisition loop.

use crate::sensor::{Error, MAX_DEPTH};

/// Number of table entries: one per raw depth value in `[0, MAX_DEPTH]`.
pub const TABLE_LEN: usize = MAX_DEPTH as usize + 1;

/// Default near clipping distance in millimeters.
pub const DEFAULT_NEAR_CLIP: f32 = 500.0;

/// Default far clipping distance in millimeters.
pub const DEFAULT_FAR_CLIP: f32 = 4000.0;

/// Precomputed raw-depth → display-value lookup table.
///
/// Entry 0 is always 0: a raw sample of 0 means "no return" and renders as
/// the sentinel black regardless of the clipping configuration.
#[derive(Debug, Clone)]
pub struct DepthLookupTable {
    table: Vec<u8>,
    near_clip: f32,
    far_clip: f32,
    near_white: bool,
}

impl DepthLookupTable {
    /// Create a table with the default clipping range and near-white
    /// direction (closer surfaces render brighter).
    pub fn new() -> Self {
        let mut lut = Self {
            table: vec![0; TABLE_LEN],
            near_clip: DEFAULT_NEAR_CLIP,
            far_clip: DEFAULT_FAR_CLIP,
            near_white: true,
        };
        lut.rebuild();
        lut
    }

    /// Reconfigure the clipping range and rebuild the table.
    ///
    /// Rejects ranges where `near >= far`, or where either bound is negative
    /// or non-finite, with [`Error::InvalidRange`]; the previous table stays
    /// in effect on error.
    pub fn configure(&mut self, near_clip: f32, far_clip: f32) -> Result<(), Error> {
        if !near_clip.is_finite() || !far_clip.is_finite() || near_clip < 0.0 || near_clip >= far_clip {
            return Err(Error::InvalidRange {
                near: near_clip,
                far: far_clip,
            });
        }

        self.near_clip = near_clip;
        self.far_clip = far_clip;
        self.rebuild();
        Ok(())
    }

    /// Switch between near-white (default) and far-white display direction
    /// and rebuild the table.
    pub fn set_near_white(&mut self, near_white: bool) {
        if self.near_white != near_white {
            self.near_white = near_white;
            self.rebuild();
        }
    }

    /// Current near clipping distance in millimeters.
    pub fn near_clip(&self) -> f32 {
        self.near_clip
    }

    /// Current far clipping distance in millimeters.
    pub fn far_clip(&self) -> f32 {
        self.far_clip
    }

    /// Whether near surfaces map to white (255) and far to black (0).
    pub fn near_white(&self) -> bool {
        self.near_white
    }

    /// Display value for a raw depth sample.
    ///
    /// Samples beyond [`MAX_DEPTH`] are clamped onto the last table entry.
    #[inline]
    pub fn value(&self, raw: u16) -> u8 {
        self.table[raw.min(MAX_DEPTH) as usize]
    }

    /// The full table, indexed by clamped raw depth.
    pub fn table(&self) -> &[u8] {
        &self.table
    }

    /// Full O(TABLE_LEN) rebuild; the mapping is affine-clamped across the
    /// whole domain, so incremental patching is never correct.
    fn rebuild(&mut self) {
        let near_color = if self.near_white { 255.0f32 } else { 0.0 };
        let far_color = if self.near_white { 0.0f32 } else { 255.0 };

        self.table[0] = 0;
        let span = self.far_clip - self.near_clip;
        for (raw, entry) in self.table.iter_mut().enumerate().skip(1) {
            let t = ((raw as f32 - self.near_clip) / span).clamp(0.0, 1.0);
            *entry = (near_color + t * (far_color - near_color)).clamp(0.0, 255.0) as u8;
        }
    }
}

impl Default for DepthLookupTable {
    fn default() -> Self {
        Self::new()
    }
}
