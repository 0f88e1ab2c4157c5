//! # Depth camera geometry

use nalgebra as na;

use crate::frame::{DEPTH_HEIGHT, DEPTH_WIDTH};

/// Inverse focal length of the reference depth sensor, derived from its vertical field of view.
pub const REFERENCE_INVERSE_FOCAL_LENGTH: f32 = 0.0027089166;

/// Pinhole depth camera with square pixels.
///
/// The principal point is at the center of the image. All intrinsics are in pixel units.
#[derive(Clone, Copy, Debug)]
pub struct DepthCamera {
    width: usize,
    height: usize,
    fov_y: f32,
}

impl DepthCamera {
    /// Create a new camera
    ///
    /// # Arguments
    ///
    /// * `width` - horizontal resolution in pixels.
    /// * `height` - vertical resolution in pixels.
    /// * `fov_y` - vertical field-of-view (in degrees).
    pub fn new(width: usize, height: usize, fov_y: f32) -> Self {
        Self {
            width,
            height,
            fov_y,
        }
    }

    /// Nominal geometry of the Kinect v2 depth sensor.
    pub fn kinect_v2() -> Self {
        Self::new(DEPTH_WIDTH, DEPTH_HEIGHT, 60.0)
    }

    /// Get width and height of the image.
    pub fn dim(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Focal length in pixels.
    pub fn focal_length(&self) -> f32 {
        (self.height as f32 * 0.5) / (self.fov_y.to_radians() * 0.5).tan()
    }

    /// Size of a single pixel at 1 metre distance, in metres.
    pub fn inverse_focal_length(&self) -> f32 {
        1.0 / self.focal_length()
    }

    /// Get camera intrinsic parameters.
    pub fn intrinsics(&self) -> na::Matrix3<f32> {
        let f = self.focal_length();
        let (cx, cy) = (self.width as f32 * 0.5, self.height as f32 * 0.5);

        na::matrix![
            f, 0.0, cx;
            0.0, f, cy;
            0.0, 0.0, 1.0
        ]
    }

    /// Get the camera's field of view.
    ///
    /// Returns horizontal and vertical field of view in degrees as a tuple.
    ///
    /// # Examples
    ///
    /// ```
    /// # use assert_approx_eq::assert_approx_eq;
    /// use depth_motion::camera::DepthCamera;
    ///
    /// let camera = DepthCamera::new(200, 100, 90.0);
    ///
    /// let (h, v) = camera.fov();
    ///
    /// assert_approx_eq!(v, 90.0f32, 0.01);
    /// assert_approx_eq!(h, 126.87f32, 0.01);
    /// ```
    pub fn fov(&self) -> (f32, f32) {
        let tx = (self.width as f32 * 0.5) / self.focal_length();
        (tx.atan().to_degrees() * 2.0, self.fov_y)
    }

    /// Physical width covered by one pixel at given depth.
    ///
    /// # Arguments
    ///
    /// * `depth_mm` - distance to the camera in millimetres.
    pub fn voxel_width(&self, depth_mm: u16) -> f32 {
        voxel_width(depth_mm, self.inverse_focal_length())
    }

    /// Physical area covered by one pixel at given depth.
    pub fn voxel_area(&self, depth_mm: u16) -> f32 {
        let w = self.voxel_width(depth_mm);
        w * w
    }

    /// Unproject a pixel with a depth reading into camera space (metres).
    ///
    /// # Arguments
    ///
    /// * `row` - pixel row.
    /// * `col` - pixel column.
    /// * `depth_mm` - depth reading at the pixel.
    pub fn unproject(&self, row: usize, col: usize, depth_mm: u16) -> na::Point3<f32> {
        let k = self.intrinsics();
        let z = depth_mm as f32 / 1000.0;

        // Y axis points up, image rows go down.
        na::Point3::new(
            (col as f32 - k[(0, 2)]) * z / k[(0, 0)],
            (k[(1, 2)] - row as f32) * z / k[(1, 1)],
            z,
        )
    }
}

/// Physical width covered by one pixel at `depth_mm`, given the inverse focal length.
pub fn voxel_width(depth_mm: u16, inverse_focal_length: f32) -> f32 {
    (depth_mm as f32 / 1000.0) * inverse_focal_length
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn kinect_focal_length_near_reference() {
        let camera = DepthCamera::kinect_v2();

        assert_approx_eq!(
            camera.inverse_focal_length(),
            REFERENCE_INVERSE_FOCAL_LENGTH,
            0.0001
        );
    }

    #[test]
    fn voxel_scales_with_depth() {
        let camera = DepthCamera::new(100, 100, 90.0);

        // 90 degrees over 100 pixels gives a focal length of 50 pixels.
        assert_approx_eq!(camera.focal_length(), 50.0, 0.001);
        assert_approx_eq!(camera.voxel_width(1000), 0.02);
        assert_approx_eq!(camera.voxel_width(2000), 0.04);
        assert_approx_eq!(camera.voxel_area(2000), 0.0016);
    }

    #[test]
    fn unproject_center_and_edge() {
        let camera = DepthCamera::new(100, 100, 90.0);

        let center = camera.unproject(50, 50, 2000);
        assert_approx_eq!(center.x, 0.0);
        assert_approx_eq!(center.y, 0.0);
        assert_approx_eq!(center.z, 2.0);

        let edge = camera.unproject(0, 100, 1000);
        assert_approx_eq!(edge.x, 1.0, 0.001);
        assert_approx_eq!(edge.y, 1.0, 0.001);
    }

    #[test]
    fn intrinsics_layout() {
        let k = DepthCamera::new(512, 424, 60.0).intrinsics();

        assert_approx_eq!(k[(0, 2)], 256.0);
        assert_approx_eq!(k[(1, 2)], 212.0);
        assert_eq!(k[(0, 0)], k[(1, 1)]);
        assert_eq!(k[(2, 2)], 1.0);
    }
}
