//! # Borrowed sensor frames

use anyhow::{ensure, Result};

/// Depth value reported for pixels without a valid reading.
pub const NO_DEPTH: u16 = 0;
/// Body-index label of pixels that belong to no tracked body.
pub const NO_BODY: u8 = 255;
/// Maximum number of simultaneously tracked bodies.
pub const MAX_BODIES: usize = 6;

/// Width of the reference depth sensor.
pub const DEPTH_WIDTH: usize = 512;
/// Height of the reference depth sensor.
pub const DEPTH_HEIGHT: usize = 424;

/// Row-major grid of per-pixel values borrowed from the caller.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
}

/// Depth readings in millimetres. [`NO_DEPTH`] marks a missing reading.
pub type DepthFrame<'a> = Frame<'a, u16>;
/// Body labels in `0..MAX_BODIES`, or [`NO_BODY`].
pub type BodyIndexFrame<'a> = Frame<'a, u8>;

impl<'a, T: Copy> Frame<'a, T> {
    /// Wrap a buffer as a frame.
    ///
    /// # Arguments
    ///
    /// * `data` - pixel values in row-major order.
    /// * `width` - width of the frame.
    /// * `height` - height of the frame.
    pub fn new(data: &'a [T], width: usize, height: usize) -> Result<Self> {
        ensure!(width > 0 && height > 0, "frame dimensions must be non-zero");
        ensure!(
            data.len() == width * height,
            "frame buffer holds {} pixels, expected {}x{}",
            data.len(),
            width,
            height
        );

        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Get width and height of the frame.
    pub fn dim(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Get the value at given row and column.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row < self.height && col < self.width {
            Some(self.data[row * self.width + col])
        } else {
            None
        }
    }
}

impl<'a> Frame<'a, u8> {
    /// Collect the tracked body labels present in this frame, in ascending order.
    pub fn subjects(&self) -> Vec<u8> {
        let mut present = [false; MAX_BODIES];

        self.data
            .iter()
            .filter(|&&b| (b as usize) < MAX_BODIES)
            .for_each(|&b| present[b as usize] = true);

        present
            .iter()
            .enumerate()
            .filter(|&(_, &p)| p)
            .map(|(i, _)| i as u8)
            .collect()
    }
}
