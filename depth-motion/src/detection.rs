//! Motion detection module

use crate::camera::{voxel_width, DepthCamera, REFERENCE_INVERSE_FOCAL_LENGTH};
use crate::frame::{BodyIndexFrame, DepthFrame, NO_DEPTH};
use crate::properties::*;
use crate::stats::{RollingStatistics, DEFAULT_CAPACITY};
use anyhow::{ensure, Result};

/// Upper bound of the tunable depth change threshold, in mm.
const MAX_DELTA_Z: u16 = 2000;
/// Upper bound of the tunable motion area threshold, in m².
const MAX_MOTION_AREA: f32 = 1.0;

/// Tuning parameters of a [`MotionDetector`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Serialize, ::serde::Deserialize),
    serde(default)
)]
pub struct DetectorSettings {
    /// Cumulative depth change (in mm) over 2 frames for a pixel to be considered in motion.
    ///
    /// Higher values require faster motions.
    pub delta_z_threshold: u16,
    /// Area (in m²) above the noise floor that has to be in motion to count as movement.
    ///
    /// Higher values require more of the body to move.
    pub motion_area_threshold: f32,
    /// Number of low motion frames required to snap the noise floor down to a new low.
    ///
    /// Higher values require holding still for longer between motions.
    pub noise_floor_reset_frames: usize,
    /// Record per-pixel motion flags on every update.
    pub motion_mask: bool,
    /// Sample every `stride`-th row and column.
    pub stride: usize,
    /// Window of the steady-state noise floor statistics.
    pub long_window: usize,
    /// Fraction of the gap the noise floor moves per frame when drifting upwards.
    pub growth_dampener: f32,
    /// Size of a depth pixel at 1 metre distance.
    pub inverse_focal_length: f32,
    /// Number of motion area samples kept.
    pub history_capacity: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            delta_z_threshold: 100,
            motion_area_threshold: 0.001,
            noise_floor_reset_frames: 10,
            motion_mask: false,
            stride: 2,
            long_window: 30,
            growth_dampener: 0.01,
            inverse_focal_length: REFERENCE_INVERSE_FOCAL_LENGTH,
            history_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl DetectorSettings {
    /// Use the pixel geometry of `camera` instead of the reference sensor constant.
    pub fn with_camera(mut self, camera: &DepthCamera) -> Self {
        self.inverse_focal_length = camera.inverse_focal_length();
        self
    }

    /// Check the settings for values a detector can not be built with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.stride > 0, "sampling stride must be non-zero");
        ensure!(
            self.history_capacity > 0,
            "motion history capacity must be non-zero"
        );
        ensure!(
            (1..=self.history_capacity).contains(&self.noise_floor_reset_frames),
            "noise floor reset frame count must be in 1..={}",
            self.history_capacity
        );
        ensure!(
            (1..=self.history_capacity).contains(&self.long_window),
            "long window must be in 1..={}",
            self.history_capacity
        );
        ensure!(
            (0.0..=1.0).contains(&self.growth_dampener),
            "growth dampener must be in 0..=1"
        );
        ensure!(
            self.motion_area_threshold.is_finite() && self.inverse_focal_length.is_finite(),
            "thresholds must be finite"
        );
        Ok(())
    }
}

impl Properties for DetectorSettings {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        let cap = self.history_capacity;

        vec![
            (
                "delta_z_threshold",
                PropertyMut::depth(&mut self.delta_z_threshold, 1, MAX_DELTA_Z),
            ),
            (
                "motion_area_threshold",
                PropertyMut::float(&mut self.motion_area_threshold, 0.0, MAX_MOTION_AREA),
            ),
            (
                "noise_floor_reset_frames",
                PropertyMut::usize(&mut self.noise_floor_reset_frames, 1, cap),
            ),
            ("long_window", PropertyMut::usize(&mut self.long_window, 1, cap)),
            (
                "growth_dampener",
                PropertyMut::float(&mut self.growth_dampener, 0.0, 1.0),
            ),
            ("motion_mask", PropertyMut::bool(&mut self.motion_mask)),
        ]
    }
}

/// Adaptive noise floor depth motion detector.
///
/// The detector tracks a single subject of the body-index mask. Every sampled pixel of the
/// subject is compared against the two previous depth readings at the same location, and pixels
/// whose depth changed by more than `delta_z_threshold` over the two frames are in motion. Their
/// physical area is summed up and compared against a noise floor that quickly follows the signal
/// downwards, but only slowly upwards.
pub struct MotionDetector {
    width: usize,
    height: usize,
    settings: DetectorSettings,
    history: RollingStatistics,
    motion_area: f32,
    motion_area_average: f32,
    motion_area_std_dev: f32,
    motion_pixel_count: u32,
    /// Last two depth frames at sampling resolution.
    depth_history: [Vec<u16>; 2],
    /// Slot of `depth_history` holding the last frame. The other holds the one before it.
    last: usize,
    motion_mask: Vec<bool>,
}

impl MotionDetector {
    /// Create a new detector.
    ///
    /// # Arguments
    ///
    /// * `width` - width of the depth and body-index frames.
    /// * `height` - height of the depth and body-index frames.
    /// * `settings` - tuning parameters.
    pub fn new(width: usize, height: usize, settings: DetectorSettings) -> Result<Self> {
        ensure!(width > 0 && height > 0, "frame dimensions must be non-zero");
        settings.validate()?;

        let history = RollingStatistics::new(settings.history_capacity)?;
        let samples = sampled_len(width, settings.stride) * sampled_len(height, settings.stride);

        Ok(Self {
            width,
            height,
            settings,
            history,
            motion_area: 0.0,
            motion_area_average: 0.0,
            motion_area_std_dev: 0.0,
            motion_pixel_count: 0,
            depth_history: [vec![NO_DEPTH; samples], vec![NO_DEPTH; samples]],
            last: 0,
            motion_mask: vec![false; samples],
        })
    }

    /// Clear all history, as if the detector was freshly created.
    pub fn reset(&mut self) {
        self.history.reset();

        self.motion_area = 0.0;
        self.motion_area_average = 0.0;
        self.motion_area_std_dev = 0.0;
        self.motion_pixel_count = 0;
        self.last = 0;

        self.depth_history
            .iter_mut()
            .for_each(|h| h.iter_mut().for_each(|d| *d = NO_DEPTH));
        self.motion_mask.iter_mut().for_each(|m| *m = false);
    }

    /// Process the next pair of frames.
    ///
    /// If either frame is missing, nothing happens. Frames of the wrong size are rejected
    /// without touching any state.
    ///
    /// # Arguments
    ///
    /// * `subject` - body-index label of the subject to track.
    /// * `depth` - depth frame.
    /// * `body` - body-index frame.
    pub fn update(
        &mut self,
        subject: u8,
        depth: Option<DepthFrame>,
        body: Option<BodyIndexFrame>,
    ) -> Result<()> {
        let (depth, body) = match (depth, body) {
            (Some(depth), Some(body)) => (depth, body),
            _ => return Ok(()),
        };

        let dim = (self.width, self.height);
        ensure!(
            depth.dim() == dim && body.dim() == dim,
            "expected {:?} frames, got depth {:?} and body index {:?}",
            dim,
            depth.dim(),
            body.dim()
        );

        let stride = self.settings.stride;
        let threshold = self.settings.delta_z_threshold as i32;
        let inverse_focal_length = self.settings.inverse_focal_length;
        let mask_enabled = self.settings.motion_mask;
        let sampled_width = sampled_len(self.width, stride);

        if mask_enabled {
            self.motion_mask.iter_mut().for_each(|m| *m = false);
        }

        let [first, second] = &mut self.depth_history;
        let (last, older) = if self.last == 0 {
            (&*first, second)
        } else {
            (&*second, first)
        };

        let mut pixel_count = 0;
        let mut area = 0.0;

        let rows = depth
            .as_slice()
            .chunks_exact(self.width)
            .zip(body.as_slice().chunks_exact(self.width))
            .step_by(stride);

        for (srow, (depth_row, body_row)) in rows.enumerate() {
            let cols = depth_row.iter().zip(body_row).step_by(stride);

            for (scol, (&d, &b)) in cols.enumerate() {
                if b != subject {
                    continue;
                }

                let idx = srow * sampled_width + scol;
                let (l, ll) = (last[idx], older[idx]);

                if d != NO_DEPTH && l != NO_DEPTH && ll != NO_DEPTH {
                    let delta = d as i32 - l as i32;
                    let last_delta = l as i32 - ll as i32;

                    if (delta + last_delta).abs() > threshold {
                        pixel_count += 1;

                        let w = voxel_width(d, inverse_focal_length);
                        area += w * w;

                        if mask_enabled {
                            self.motion_mask[idx] = true;
                        }
                    }
                }

                // The slot two frames back is overwritten, making it the newest one.
                older[idx] = d;
            }
        }

        self.motion_pixel_count = pixel_count;
        self.update_noise_floor(area);

        self.last ^= 1;

        Ok(())
    }

    /// Record the area of the current frame and move the noise floor.
    fn update_noise_floor(&mut self, area: f32) {
        self.history.record_value(area);
        self.motion_area = area;

        let long_window = self.settings.long_window;
        let short_window = self.settings.noise_floor_reset_frames;

        let long_average = self.history.average(long_window);
        let long_std_dev = self.history.standard_deviation(long_window);
        let short_average = self.history.average(short_window);
        let short_std_dev = self.history.standard_deviation(short_window);

        if short_average + short_std_dev < self.motion_area_average {
            // The signal settled at a new low.
            self.motion_area_average = short_average;
            self.motion_area_std_dev = short_std_dev;
        } else if long_average > self.motion_area_average {
            let damp = self.settings.growth_dampener;
            self.motion_area_average += damp * (long_average - self.motion_area_average);
            self.motion_area_std_dev += damp * (long_std_dev - self.motion_area_std_dev);
        } else {
            self.motion_area_average = long_average;
            self.motion_area_std_dev = long_std_dev;
        }
    }

    /// Check whether the subject moved in the last update.
    ///
    /// This is true when the motion area exceeds the noise floor by 2 standard deviations plus
    /// `motion_area_threshold`.
    pub fn did_player_move(&self) -> bool {
        self.motion_area
            > self.motion_area_average
                + self.motion_area_std_dev * 2.0
                + self.settings.motion_area_threshold
    }

    /// Check whether a pixel was in motion in the last update.
    ///
    /// Returns `None` if the pixel is not evaluated. That is the case for pixels off the
    /// sampling grid, out of bounds, or whenever the motion mask is disabled.
    pub fn did_pixel_move(&self, row: usize, col: usize) -> Option<bool> {
        let stride = self.settings.stride;

        if !self.settings.motion_mask
            || row >= self.height
            || col >= self.width
            || row % stride != 0
            || col % stride != 0
        {
            return None;
        }

        let idx = (row / stride) * sampled_len(self.width, stride) + col / stride;

        Some(self.motion_mask[idx])
    }

    /// Get the motion mask at sampling resolution, if it is enabled.
    ///
    /// Elements are in row-major order, with dimensions given by
    /// [`sampled_dim`](Self::sampled_dim).
    pub fn motion_mask(&self) -> Option<&[bool]> {
        if self.settings.motion_mask {
            Some(&self.motion_mask)
        } else {
            None
        }
    }

    /// Enable or disable the motion mask.
    pub fn enable_motion_mask(&mut self, enable: bool) {
        if enable != self.settings.motion_mask {
            self.motion_mask.iter_mut().for_each(|m| *m = false);
        }
        self.settings.motion_mask = enable;
    }

    /// Get width and height of the input frames.
    pub fn dim(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Get width and height of the sampling grid.
    pub fn sampled_dim(&self) -> (usize, usize) {
        let stride = self.settings.stride;
        (
            sampled_len(self.width, stride),
            sampled_len(self.height, stride),
        )
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Number of pixels in motion on the last update.
    pub fn motion_pixel_count(&self) -> u32 {
        self.motion_pixel_count
    }

    /// Area in motion on the last update, in m².
    pub fn motion_area(&self) -> f32 {
        self.motion_area
    }

    /// Noise floor average.
    pub fn motion_area_average(&self) -> f32 {
        self.motion_area_average
    }

    /// Noise floor standard deviation.
    pub fn motion_area_std_dev(&self) -> f32 {
        self.motion_area_std_dev
    }

    pub fn delta_z_threshold(&self) -> u16 {
        self.settings.delta_z_threshold
    }

    /// Set the depth change threshold. Clamped to `1..=2000`.
    pub fn set_delta_z_threshold(&mut self, threshold: u16) {
        self.settings.delta_z_threshold = threshold.clamp(1, MAX_DELTA_Z);
    }

    pub fn motion_area_threshold(&self) -> f32 {
        self.settings.motion_area_threshold
    }

    /// Set the motion area threshold. Clamped to `0..=1`, NaN is ignored.
    pub fn set_motion_area_threshold(&mut self, threshold: f32) {
        if !threshold.is_nan() {
            self.settings.motion_area_threshold = threshold.clamp(0.0, MAX_MOTION_AREA);
        }
    }

    pub fn noise_floor_reset_frames(&self) -> usize {
        self.settings.noise_floor_reset_frames
    }

    /// Set the short noise floor window. Clamped to `1..=history_capacity`.
    pub fn set_noise_floor_reset_frames(&mut self, frames: usize) {
        self.settings.noise_floor_reset_frames =
            frames.clamp(1, self.settings.history_capacity);
    }
}

impl Properties for MotionDetector {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        self.settings.props_mut()
    }
}

/// Number of samples taken along `len` pixels. `len` must be non-zero.
fn sampled_len(len: usize, stride: usize) -> usize {
    (len - 1) / stride + 1
}
