use crate::error::FieldError;
use crate::image::DepthImage;
use crate::toolshape::ToolShape;

/// The scaled depth matrix in physical Z units, bordered by a halo of -inf
/// cells so a cutter overhanging the image edge never sees material there.
/// Interior values lie in [-z_cut, 0] with 0 at the stock surface.
#[derive(Debug, Clone)]
pub struct HeightField {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
    border: usize,
    stride: usize,
}

impl HeightField {
    /// Scale `image` into carve depths and pad with a halo of width
    /// `border`.
    ///
    /// Intensities are first mapped into [0,1] (stretched over [min,max]
    /// when `normalize` is set and the image is not constant, divided by
    /// 255 otherwise), then into [-z_cut, 0]: darker pixels carve deeper,
    /// or lighter ones when `invert` is set.
    pub fn from_image(
        image: &DepthImage,
        z_cut: f64,
        invert: bool,
        normalize: bool,
        border: usize,
    ) -> Result<Self, FieldError> {
        let rows = image.height();
        let cols = image.width();
        let stride = cols + 2 * border;
        let mut data = vec![f32::NEG_INFINITY; stride * (rows + 2 * border)];

        let src = image.pixels();
        let (lo, hi) = src
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let stretch = normalize && hi > lo;
        let depth = z_cut as f32;

        for row in 0..rows {
            for col in 0..cols {
                let v = src[row * cols + col];
                let unit = if stretch { (v - lo) / (hi - lo) } else { v / 255.0 };
                let z = if invert {
                    -(unit * depth)
                } else {
                    unit * depth - depth
                };
                data[(row + border) * stride + col + border] = z;
            }
        }

        Ok(Self {
            data,
            rows,
            cols,
            border,
            stride,
        })
    }

    /// Interior height at (row, col); row 0 is the top image row.
    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.data[(row + self.border) * self.stride + col + self.border]
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn border(&self) -> usize {
        self.border
    }

    /// Minimum over the non-halo interior.
    pub fn min(&self) -> f32 {
        self.interior_fold(f32::INFINITY, f32::min)
    }

    /// Maximum over the non-halo interior.
    pub fn max(&self) -> f32 {
        self.interior_fold(f32::NEG_INFINITY, f32::max)
    }

    fn interior_fold(&self, init: f32, f: impl Fn(f32, f32) -> f32) -> f32 {
        let mut acc = init;
        for row in 0..self.rows {
            let base = (row + self.border) * self.stride + self.border;
            for &v in &self.data[base..base + self.cols] {
                acc = f(acc, v);
            }
        }
        acc
    }

    /// Lowest Z the tool tip may occupy centered over interior cell
    /// (row, col) without the cutter intruding on any pixel under its disk.
    ///
    /// The shape's halo requirement must not exceed this field's border;
    /// halo cells at -inf and out-of-disk cells at +inf both fall out of
    /// the maximum through ordinary IEEE arithmetic.
    pub fn sweep(&self, row: usize, col: usize, shape: &ToolShape) -> f32 {
        let half = shape.half() as i64;
        debug_assert!(shape.half() <= self.border);
        let mut max_z = f32::NEG_INFINITY;
        for dy in -half..=half {
            for dx in -half..=half {
                let h = self.data[(row as i64 + self.border as i64 + dy) as usize * self.stride
                    + (col as i64 + self.border as i64 + dx) as usize];
                let z = h - shape.at(dy, dx);
                if z > max_z {
                    max_z = z;
                }
            }
        }
        max_z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relief_core::Tool;

    fn gray(data: &[u8], w: usize, h: usize) -> DepthImage {
        DepthImage::from_gray8(data, w, h).unwrap()
    }

    #[test]
    fn test_default_mapping_darker_is_deeper() {
        let im = gray(&[0, 255], 2, 1);
        let hf = HeightField::from_image(&im, 2.0, false, false, 0).unwrap();
        assert!((hf.at(0, 0) - (-2.0)).abs() < 1e-6);
        assert!(hf.at(0, 1).abs() < 1e-6);
    }

    #[test]
    fn test_inverted_mapping_lighter_is_deeper() {
        let im = gray(&[0, 255], 2, 1);
        let hf = HeightField::from_image(&im, 2.0, true, false, 0).unwrap();
        assert!(hf.at(0, 0).abs() < 1e-6);
        assert!((hf.at(0, 1) - (-2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_stretches_range() {
        let im = gray(&[100, 150], 2, 1);
        let hf = HeightField::from_image(&im, 1.0, false, true, 0).unwrap();
        assert!((hf.at(0, 0) - (-1.0)).abs() < 1e-6);
        assert!(hf.at(0, 1).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_constant_image_divides_by_255() {
        let im = gray(&[128; 4], 2, 2);
        let hf = HeightField::from_image(&im, 1.0, false, true, 0).unwrap();
        let expected = 128.0 / 255.0 - 1.0;
        assert!((hf.at(1, 1) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_interior_bounds_invariant() {
        let im = gray(&[0, 17, 99, 180, 254, 255], 3, 2);
        let hf = HeightField::from_image(&im, 3.0, false, true, 2).unwrap();
        assert!(hf.min() >= -3.0 - 1e-6);
        assert!(hf.max() <= 1e-6);
    }

    #[test]
    fn test_min_max_ignore_halo() {
        let im = gray(&[128; 9], 3, 3);
        let hf = HeightField::from_image(&im, 1.0, false, false, 3).unwrap();
        assert!(hf.min().is_finite());
        assert!((hf.min() - hf.max()).abs() < 1e-6);
    }

    #[test]
    fn test_sweep_flat_tool_flat_field() {
        let im = gray(&[128; 16], 4, 4);
        let hf = HeightField::from_image(&im, 1.0, false, false, 0).unwrap();
        let shape = ToolShape::build(&Tool::flat(1.0), 1.0, 0.0).unwrap();
        let z = hf.sweep(2, 2, &shape);
        assert!((z - hf.at(2, 2)).abs() < 1e-6);
    }

    #[test]
    fn test_sweep_blocked_by_neighboring_peak() {
        // A shallow pit next to tall stock: a wide flat tool cannot reach
        // the pit floor.
        #[rustfmt::skip]
        let pixels = [
            255u8, 255, 255,
            255,   0,   255,
            255, 255, 255,
        ];
        let im = gray(&pixels, 3, 3);
        let hf = HeightField::from_image(&im, 1.0, false, false, 1).unwrap();
        let shape = ToolShape::build(&Tool::flat(3.0), 1.0, 0.0).unwrap();
        let z = hf.sweep(1, 1, &shape);
        // Blocked at the surface by the surrounding stock.
        assert!(z.abs() < 1e-6);
        assert!(hf.at(1, 1) < -0.9);
    }

    #[test]
    fn test_sweep_never_gouges_footprint() {
        let pixels: Vec<u8> = (0..=255).step_by(4).map(|v| v as u8).collect();
        let im = gray(&pixels, 8, 8);
        let shape = ToolShape::build(&Tool::ball(2.0), 1.0, 0.0).unwrap();
        let hf = HeightField::from_image(&im, 2.0, false, false, shape.half()).unwrap();
        let half = shape.half() as i64;
        for row in 0..8 {
            for col in 0..8 {
                let tip = hf.sweep(row, col, &shape);
                for dy in -half..=half {
                    for dx in -half..=half {
                        let r = row as i64 + dy;
                        let c = col as i64 + dx;
                        if r < 0 || c < 0 || r >= 8 || c >= 8 {
                            continue;
                        }
                        let clearance = tip + shape.at(dy, dx) - hf.at(r as usize, c as usize);
                        assert!(
                            clearance >= -1e-4,
                            "tool at ({row},{col}) gouges pixel ({r},{c}) by {clearance}"
                        );
                    }
                }
            }
        }
    }
}
