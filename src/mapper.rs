// SPDX-License-Identifier: Apache-2.0

//! Batch coordinate-space reprojection.
//!
//! The device calibration primitives project *dense* batches: every pixel of
//! the depth frame paired with its raw sample. [`CoordinateMapper`] owns that
//! batching: it caches the identity lattice of depth-pixel coordinates
//! (rebuilt only when the depth frame description changes), runs the device
//! projection into reusable scratch buffers, and gathers the requested subset
//! of results by `y * width + x` index.
//!
//! The two depth→color query forms deliberately differ at the edges:
//! point queries clamp out-of-frame results onto the nearest color-frame
//! edge (no gaps for visualization consumers), while whole-image
//! rasterization leaves unmappable pixels at zero as a "no mapping" sentinel.

use crate::device::DepthDevice;
use crate::sensor::{CameraPoint, ColorPoint, DepthPoint, Error, FrameDescription};

/// Stateless-by-contract batch converter with cached lattice and scratch
/// buffers.
///
/// All outputs are pure functions of the inputs; the internal buffers only
/// avoid reallocation between calls.
#[derive(Debug, Default)]
pub struct CoordinateMapper {
    lattice_desc: Option<FrameDescription>,
    lattice: Vec<DepthPoint>,
    camera_scratch: Vec<CameraPoint>,
    color_scratch: Vec<ColorPoint>,
}

impl CoordinateMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the identity depth-pixel lattice if the description changed.
    fn ensure_lattice(&mut self, desc: FrameDescription) {
        if self.lattice_desc == Some(desc) {
            return;
        }

        self.lattice.clear();
        self.lattice.reserve(desc.pixel_count());
        for y in 0..desc.height {
            for x in 0..desc.width {
                self.lattice.push(DepthPoint::new(x as f32, y as f32));
            }
        }
        self.lattice_desc = Some(desc);
    }

    fn project_camera<D: DepthDevice + ?Sized>(
        &mut self,
        device: &D,
        desc: FrameDescription,
        depth_image: &[u16],
    ) -> Result<(), Error> {
        debug_assert_eq!(depth_image.len(), desc.pixel_count());
        self.ensure_lattice(desc);
        self.camera_scratch
            .resize(desc.pixel_count(), CameraPoint::default());
        device.map_depth_to_camera(&self.lattice, depth_image, &mut self.camera_scratch)
    }

    fn project_color<D: DepthDevice + ?Sized>(
        &mut self,
        device: &D,
        desc: FrameDescription,
        depth_image: &[u16],
    ) -> Result<(), Error> {
        debug_assert_eq!(depth_image.len(), desc.pixel_count());
        self.ensure_lattice(desc);
        self.color_scratch
            .resize(desc.pixel_count(), ColorPoint::default());
        device.map_depth_to_color(&self.lattice, depth_image, &mut self.color_scratch)
    }

    fn gather_index(point: DepthPoint, desc: FrameDescription) -> usize {
        let idx = point.y as usize * desc.width as usize + point.x as usize;
        debug_assert!(
            idx < desc.pixel_count(),
            "depth point ({}, {}) outside {}x{} frame",
            point.x,
            point.y,
            desc.width,
            desc.height
        );
        idx
    }

    /// Project the requested depth pixels into camera space.
    ///
    /// Requests must lie within the depth frame bounds; in release builds an
    /// out-of-bounds request gathers a zero point.
    pub fn depth_to_camera<D: DepthDevice + ?Sized>(
        &mut self,
        device: &D,
        depth_desc: FrameDescription,
        depth_image: &[u16],
        requests: &[DepthPoint],
    ) -> Result<Vec<CameraPoint>, Error> {
        self.project_camera(device, depth_desc, depth_image)?;

        Ok(requests
            .iter()
            .map(|&point| {
                let idx = Self::gather_index(point, depth_desc);
                self.camera_scratch.get(idx).copied().unwrap_or_default()
            })
            .collect())
    }

    /// Project every pixel of the depth frame into camera space, in
    /// `y * width + x` order.
    pub fn depth_frame_to_camera<D: DepthDevice + ?Sized>(
        &mut self,
        device: &D,
        depth_desc: FrameDescription,
        depth_image: &[u16],
    ) -> Result<Vec<CameraPoint>, Error> {
        self.project_camera(device, depth_desc, depth_image)?;
        Ok(self.camera_scratch.clone())
    }

    /// Project the requested depth pixels into color-pixel space.
    ///
    /// Outputs are clamped onto `[0, color_w-1] × [0, color_h-1]`: values
    /// outside the color frame snap to its nearest edge rather than being
    /// dropped. Callers that need to disqualify by bounds must use
    /// [`Self::depth_to_color_image`] or probe the device output directly.
    pub fn depth_to_color<D: DepthDevice + ?Sized>(
        &mut self,
        device: &D,
        depth_desc: FrameDescription,
        color_desc: FrameDescription,
        depth_image: &[u16],
        requests: &[DepthPoint],
    ) -> Result<Vec<ColorPoint>, Error> {
        self.project_color(device, depth_desc, depth_image)?;

        let max_x = color_desc.width as f32 - 1.0;
        let max_y = color_desc.height as f32 - 1.0;
        Ok(requests
            .iter()
            .map(|&point| {
                let idx = Self::gather_index(point, depth_desc);
                let mapped = self.color_scratch.get(idx).copied().unwrap_or_default();
                ColorPoint {
                    x: mapped.x.clamp(0.0, max_x),
                    y: mapped.y.clamp(0.0, max_y),
                }
            })
            .collect())
    }

    /// Rasterize a depth-sized image by sampling the color frame at each
    /// mapped location.
    ///
    /// `dst` is sized to `depth pixels × bytes_per_pixel` and zeroed first;
    /// depth pixels whose mapping lands outside the color frame stay zero
    /// (transparent black), which is the "no mapping available" sentinel of
    /// this call form. Degraded (all-zero) output is possible when the whole
    /// frame maps out of view and is not an error.
    pub fn depth_to_color_image<D: DepthDevice + ?Sized>(
        &mut self,
        device: &D,
        depth_desc: FrameDescription,
        color_desc: FrameDescription,
        depth_image: &[u16],
        color_image: &[u8],
        dst: &mut Vec<u8>,
    ) -> Result<(), Error> {
        self.project_color(device, depth_desc, depth_image)?;

        let bpp = color_desc.bytes_per_pixel as usize;
        dst.clear();
        dst.resize(depth_desc.pixel_count() * bpp, 0);

        let color_w = color_desc.width as usize;
        for (i, mapped) in self.color_scratch.iter().enumerate() {
            if mapped.x < 0.0
                || mapped.x >= color_desc.width as f32
                || mapped.y < 0.0
                || mapped.y >= color_desc.height as f32
            {
                continue;
            }

            let src = (mapped.y as usize * color_w + mapped.x as usize) * bpp;
            if src + bpp <= color_image.len() {
                dst[i * bpp..(i + 1) * bpp].copy_from_slice(&color_image[src..src + bpp]);
            }
        }
        Ok(())
    }
}
