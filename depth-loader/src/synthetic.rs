//! Seeded synthetic depth scenes.

use crate::{FrameBuffers, FrameSource};
use anyhow::{ensure, Result};
use depth_motion::frame::{NO_BODY, NO_DEPTH};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::ops::Range;

/// Depth change of the moving arm per frame, in mm.
const ARM_STEP: u16 = 120;

/// A single subject standing in front of a wall.
///
/// The subject (body index 0) occupies the middle third of the image and stands still, apart
/// from sensor noise and dropouts. During motion bursts the upper left part of the subject, the
/// "arm", is pushed back and forth towards the camera.
pub struct SyntheticScene {
    width: usize,
    height: usize,
    frames: usize,
    frame: usize,
    background: u16,
    subject: u16,
    noise: u16,
    dropout: f64,
    bursts: Vec<Range<usize>>,
    rng: StdRng,
}

impl SyntheticScene {
    /// Create a new scene with 300 frames and no motion.
    ///
    /// # Arguments
    ///
    /// * `width` - width of the frames.
    /// * `height` - height of the frames.
    /// * `seed` - seed of the noise generator.
    pub fn new(width: usize, height: usize, seed: u64) -> Self {
        Self {
            width,
            height,
            frames: 300,
            frame: 0,
            background: 3500,
            subject: 1800,
            noise: 8,
            dropout: 0.005,
            bursts: vec![],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_frames(mut self, frames: usize) -> Self {
        self.frames = frames;
        self
    }

    /// Move the arm for `len` frames starting at frame `start`.
    pub fn with_burst(mut self, start: usize, len: usize) -> Self {
        self.bursts.push(start..(start + len));
        self
    }

    /// Set the amplitude of uniform depth noise, in mm.
    pub fn with_noise(mut self, noise: u16) -> Self {
        self.noise = noise;
        self
    }

    /// Set the probability of a pixel having no depth reading.
    pub fn with_dropout(mut self, dropout: f64) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&dropout),
            "dropout must be a probability"
        );
        self.dropout = dropout;
        Ok(self)
    }

    /// Check whether the arm moves on given frame.
    pub fn is_moving(&self, frame: usize) -> bool {
        self.bursts.iter().any(|b| b.contains(&frame))
    }

    /// Depth offset of the arm towards the camera.
    fn arm_offset(&self, frame: usize) -> u16 {
        let start = match self.bursts.iter().find(|b| b.contains(&frame)) {
            Some(b) => b.start,
            None => return 0,
        };

        // Triangle wave going 1, 2, 3, 4, 3, 2, 1, 0 steps out.
        let phase = (frame - start) % 8;
        let level = if phase < 4 { phase + 1 } else { 7 - phase };

        level as u16 * ARM_STEP
    }

    fn subject_bounds(&self) -> (Range<usize>, Range<usize>) {
        let cols = (self.width / 3)..(self.width * 2 / 3);
        let rows = (self.height / 4)..self.height;
        (rows, cols)
    }

    fn arm_bounds(&self) -> (Range<usize>, Range<usize>) {
        let (rows, cols) = self.subject_bounds();
        let arm_rows = rows.start..(rows.start + rows.len() / 3);
        let arm_cols = cols.start..(cols.start + cols.len() / 2);
        (arm_rows, arm_cols)
    }
}

impl FrameSource for SyntheticScene {
    fn dim(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn next_frame(&mut self, frames: &mut FrameBuffers) -> Result<bool> {
        ensure!(
            frames.dim() == self.dim(),
            "frame buffers are {:?}, scene is {:?}",
            frames.dim(),
            self.dim()
        );

        if self.frame >= self.frames {
            return Ok(false);
        }

        let (rows, cols) = self.subject_bounds();
        let (arm_rows, arm_cols) = self.arm_bounds();
        let arm_offset = self.arm_offset(self.frame);
        let noise = self.noise as i32;

        for (i, (depth, body)) in frames
            .depth
            .iter_mut()
            .zip(frames.body.iter_mut())
            .enumerate()
        {
            let (row, col) = (i / self.width, i % self.width);

            let (base, label) = if rows.contains(&row) && cols.contains(&col) {
                let offset = if arm_rows.contains(&row) && arm_cols.contains(&col) {
                    arm_offset
                } else {
                    0
                };
                (self.subject - offset, 0)
            } else {
                (self.background, NO_BODY)
            };

            *body = label;

            *depth = if self.rng.gen_bool(self.dropout) {
                NO_DEPTH
            } else {
                // Noise never produces a missing reading or wraps around.
                let d = base as i32 + self.rng.gen_range(-noise..=noise);
                d.clamp(1, u16::MAX as i32) as u16
            };
        }

        frames.has_depth = true;
        frames.has_body = true;
        self.frame += 1;

        Ok(true)
    }

    fn get_framerate(&self) -> Option<f64> {
        Some(30.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depth_motion::prelude::v1::*;

    const W: usize = 128;
    const H: usize = 96;

    #[test]
    fn layout() {
        let mut scene = SyntheticScene::new(W, H, 1)
            .with_noise(0)
            .with_dropout(0.0)
            .unwrap()
            .with_burst(1, 4);
        let mut frames = FrameBuffers::new(W, H);

        assert!(scene.next_frame(&mut frames).unwrap());

        let depth = frames.depth_frame().unwrap().unwrap();
        let body = frames.body_frame().unwrap().unwrap();

        assert_eq!(depth.get(0, 0), Some(3500));
        assert_eq!(body.get(0, 0), Some(NO_BODY));
        assert_eq!(depth.get(H - 1, W / 2), Some(1800));
        assert_eq!(body.get(H - 1, W / 2), Some(0));
        assert_eq!(body.subjects(), vec![0]);

        assert!(scene.next_frame(&mut frames).unwrap());
        assert_eq!(frames.depth[(H / 4) * W + W / 3], 1800 - ARM_STEP);
    }

    #[test]
    fn exhausts() {
        let mut scene = SyntheticScene::new(4, 4, 0).with_frames(2);
        let mut frames = FrameBuffers::new(4, 4);

        assert!(scene.next_frame(&mut frames).unwrap());
        assert!(scene.next_frame(&mut frames).unwrap());
        assert!(!scene.next_frame(&mut frames).unwrap());
        assert!(SyntheticScene::new(4, 4, 0).with_dropout(1.5).is_err());
    }

    #[test]
    fn heavy_noise_stays_in_range() {
        let mut scene = SyntheticScene::new(8, 8, 3)
            .with_noise(5000)
            .with_dropout(0.0)
            .unwrap();
        let mut frames = FrameBuffers::new(8, 8);

        for _ in 0..4 {
            assert!(scene.next_frame(&mut frames).unwrap());
            assert!(frames.depth.iter().all(|&d| d != NO_DEPTH && d <= 3500 + 5000));
        }
    }

    #[test]
    fn detector_follows_bursts() {
        let mut scene = SyntheticScene::new(W, H, 42)
            .with_frames(120)
            .with_burst(40, 20)
            .with_burst(90, 10);
        let mut frames = FrameBuffers::new(W, H);
        let mut detector = MotionDetector::new(W, H, Default::default()).unwrap();

        let mut detected = [false; 2];
        let mut frame = 0;

        while scene.next_frame(&mut frames).unwrap() {
            detector
                .update(0, frames.depth_frame().unwrap(), frames.body_frame().unwrap())
                .unwrap();

            let moved = detector.did_player_move();

            if (40..60).contains(&frame) {
                detected[0] |= moved;
            } else if (90..100).contains(&frame) {
                detected[1] |= moved;
            } else if !(60..63).contains(&frame) && !(100..103).contains(&frame) {
                assert!(!moved, "spurious motion on frame {}", frame);
            }

            frame += 1;
        }

        assert_eq!(frame, 120);
        assert_eq!(detected, [true, true]);
    }
}
