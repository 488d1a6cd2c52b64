use relief_core::Tool;

use crate::error::FieldError;

/// The cutter's lower envelope sampled on the image grid: a square matrix
/// holding, for each cell offset from the axis, how far the underside sits
/// above the tip. Cells outside the cutter disk hold +inf so they can never
/// win a swept-height query. Read-only after construction.
#[derive(Debug, Clone)]
pub struct ToolShape {
    data: Vec<f32>,
    side: usize,
}

impl ToolShape {
    /// Sample `tool` at `pixel_size` spacing. `rough_offset` widens the
    /// effective radius so a roughing pass leaves that much stock for the
    /// finish cutter.
    pub fn build(tool: &Tool, pixel_size: f64, rough_offset: f64) -> Result<Self, FieldError> {
        let radius = tool.radius() + rough_offset;
        if radius < pixel_size / 2.0 {
            return Err(FieldError::ToolFinerThanPixel {
                diameter: tool.diameter,
                pixel_size,
            });
        }
        let half = ((radius - pixel_size / 2.0) / pixel_size).ceil().max(0.0) as usize;
        let side = 2 * half + 1;

        let mut data = vec![f32::INFINITY; side * side];
        let mut minimum = f64::INFINITY;
        for dy in -(half as i64)..=half as i64 {
            for dx in -(half as i64)..=half as i64 {
                let r = ((dx * dx + dy * dy) as f64).sqrt() * pixel_size;
                if r < radius {
                    let z = tool.envelope(r, radius);
                    minimum = minimum.min(z);
                    data[(dy + half as i64) as usize * side + (dx + half as i64) as usize] =
                        z as f32;
                }
            }
        }

        // Shift so the tip sits at exactly zero.
        for cell in &mut data {
            if cell.is_finite() {
                *cell -= minimum as f32;
            }
        }

        Ok(Self { data, side })
    }

    /// Matrix side length (always odd).
    pub fn side(&self) -> usize {
        self.side
    }

    /// Halo width the height field needs for this cutter.
    pub fn half(&self) -> usize {
        self.side / 2
    }

    /// Envelope offset at cell offset (dy, dx) from the axis; +inf when the
    /// cell lies outside the disk.
    pub fn at(&self, dy: i64, dx: i64) -> f32 {
        let half = self.half() as i64;
        self.data[(dy + half) as usize * self.side + (dx + half) as usize]
    }
}
