//! Spatial model - geographically referenced rectangular grids

use serde::{Deserialize, Serialize};

use crate::error::{PagerError, Result};

/// Relative tolerance used when comparing grid bounds and resolutions.
const GEO_TOLERANCE: f64 = 1e-6;

/// Cell position in a grid (row 0 is the northern edge)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellPos {
    pub row: usize,
    pub col: usize,
}

/// Bounds, resolution and shape of a grid. Bounds are cell centres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoDict {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
}

impl GeoDict {
    /// Build a geodict from its south-west cell centre, resolution and shape.
    pub fn new(xmin: f64, ymin: f64, dx: f64, dy: f64, nx: usize, ny: usize) -> Self {
        Self {
            xmin,
            xmax: xmin + dx * nx.saturating_sub(1) as f64,
            ymin,
            ymax: ymin + dy * ny.saturating_sub(1) as f64,
            dx,
            dy,
            nx,
            ny,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.nx * self.ny
    }

    /// Convert cell position to flat row-major index
    pub fn pos_to_index(&self, pos: CellPos) -> Option<usize> {
        if pos.row < self.ny && pos.col < self.nx {
            Some(pos.row * self.nx + pos.col)
        } else {
            None
        }
    }

    /// Whether the bounding boxes of two grids overlap.
    pub fn intersects(&self, other: &GeoDict) -> bool {
        let (ax0, ax1, ay0, ay1) = self.edges();
        let (bx0, bx1, by0, by1) = other.edges();
        ax0 < bx1 && bx0 < ax1 && ay0 < by1 && by0 < ay1
    }

    /// Same bounds, resolution and shape, within a small tolerance.
    pub fn is_aligned_with(&self, other: &GeoDict) -> bool {
        self.nx == other.nx
            && self.ny == other.ny
            && close(self.xmin, other.xmin, self.dx)
            && close(self.xmax, other.xmax, self.dx)
            && close(self.ymin, other.ymin, self.dy)
            && close(self.ymax, other.ymax, self.dy)
            && close(self.dx, other.dx, self.dx)
            && close(self.dy, other.dy, self.dy)
    }

    // outer edges of the grid, half a cell beyond the centres
    fn edges(&self) -> (f64, f64, f64, f64) {
        (
            self.xmin - self.dx / 2.0,
            self.xmax + self.dx / 2.0,
            self.ymin - self.dy / 2.0,
            self.ymax + self.dy / 2.0,
        )
    }
}

fn close(a: f64, b: f64, scale: f64) -> bool {
    (a - b).abs() <= GEO_TOLERANCE * scale.abs().max(1.0)
}

/// A rectangular array of values with its geographic frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "RawGrid<T>",
    bound(deserialize = "T: Deserialize<'de> + Copy")
)]
pub struct Grid2D<T> {
    geodict: GeoDict,
    data: Vec<T>,
}

/// Unchecked wire form of a grid; deserialization goes through `Grid2D::new`.
#[derive(Deserialize)]
struct RawGrid<T> {
    geodict: GeoDict,
    data: Vec<T>,
}

impl<T: Copy> TryFrom<RawGrid<T>> for Grid2D<T> {
    type Error = PagerError;

    fn try_from(raw: RawGrid<T>) -> Result<Self> {
        Self::new(raw.geodict, raw.data)
    }
}

impl<T: Copy> Grid2D<T> {
    pub fn new(geodict: GeoDict, data: Vec<T>) -> Result<Self> {
        if data.len() != geodict.cell_count() {
            return Err(PagerError::GridShape {
                expected: geodict.cell_count(),
                actual: data.len(),
            });
        }
        Ok(Self { geodict, data })
    }

    /// Build a grid from nested rows, north to south.
    pub fn from_rows(geodict: GeoDict, rows: &[Vec<T>]) -> Result<Self> {
        let data: Vec<T> = rows.iter().flatten().copied().collect();
        if rows.len() != geodict.ny || rows.iter().any(|row| row.len() != geodict.nx) {
            return Err(PagerError::GridShape {
                expected: geodict.cell_count(),
                actual: data.len(),
            });
        }
        Self::new(geodict, data)
    }

    pub fn filled(geodict: GeoDict, value: T) -> Self {
        Self {
            data: vec![value; geodict.cell_count()],
            geodict,
        }
    }

    pub fn geodict(&self) -> &GeoDict {
        &self.geodict
    }

    pub fn rows(&self) -> usize {
        self.geodict.ny
    }

    pub fn cols(&self) -> usize {
        self.geodict.nx
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        self.geodict
            .pos_to_index(CellPos { row, col })
            .map(|idx| self.data[idx])
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Grid2D<U> {
        Grid2D {
            geodict: self.geodict,
            data: self.data.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Values along the four map edges.
    pub fn border_values(&self) -> Vec<T> {
        let (rows, cols) = (self.rows(), self.cols());
        if rows == 0 || cols == 0 {
            return Vec::new();
        }
        let mut values = Vec::with_capacity(2 * (rows + cols));
        for col in 0..cols {
            values.push(self.data[col]);
            values.push(self.data[(rows - 1) * cols + col]);
        }
        for row in 0..rows {
            values.push(self.data[row * cols]);
            values.push(self.data[row * cols + cols - 1]);
        }
        values
    }
}

/// Require every grid to share the first grid's frame.
pub fn check_alignment(frames: &[(&str, &GeoDict)]) -> Result<()> {
    let Some((first_name, first)) = frames.first() else {
        return Ok(());
    };
    for (name, frame) in &frames[1..] {
        if !first.is_aligned_with(frame) {
            return Err(PagerError::Alignment(format!(
                "{name} grid ({}x{}) does not match {first_name} grid ({}x{})",
                frame.ny, frame.nx, first.ny, first.nx
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> GeoDict {
        GeoDict::new(0.5, 0.5, 1.0, 1.0, 5, 4)
    }

    #[test]
    fn test_geodict_bounds() {
        let geodict = frame();
        assert_eq!(geodict.xmax, 4.5);
        assert_eq!(geodict.ymax, 3.5);
        assert_eq!(geodict.cell_count(), 20);
    }

    #[test]
    fn test_pos_to_index() {
        let geodict = frame();
        assert_eq!(geodict.pos_to_index(CellPos { row: 2, col: 3 }), Some(13));
        assert!(geodict.pos_to_index(CellPos { row: 4, col: 0 }).is_none());
        assert!(geodict.pos_to_index(CellPos { row: 0, col: 5 }).is_none());
    }

    #[test]
    fn test_get_reads_row_major() {
        let grid = Grid2D::new(frame(), (0..20).collect::<Vec<u32>>()).unwrap();
        assert_eq!(grid.get(0, 0), Some(0));
        assert_eq!(grid.get(3, 4), Some(19));
        assert_eq!(grid.get(4, 0), None);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = Grid2D::new(frame(), vec![0.0_f64; 19]).unwrap_err();
        assert!(matches!(err, PagerError::GridShape { expected: 20, actual: 19 }));
    }

    #[test]
    fn test_deserialize_checks_shape() {
        let geodict = serde_json::to_value(GeoDict::new(0.0, 0.0, 1.0, 1.0, 3, 3)).unwrap();
        let short = serde_json::json!({ "geodict": geodict, "data": [1.0, 2.0] });
        let err = serde_json::from_value::<Grid2D<f64>>(short).unwrap_err();
        assert!(err.to_string().contains("describes 9 cells"), "{err}");

        let data = vec![0.0_f64; 9];
        let full = serde_json::json!({ "geodict": geodict, "data": data });
        let grid: Grid2D<f64> = serde_json::from_value(full).unwrap();
        assert_eq!(grid.border_values().len(), 12);
    }

    #[test]
    fn test_alignment_and_intersection() {
        let a = frame();
        let b = GeoDict::new(0.5, 0.5, 1.0, 1.0, 5, 4);
        let shifted = GeoDict::new(2.5, 0.5, 1.0, 1.0, 5, 4);
        let far = GeoDict::new(100.0, 50.0, 1.0, 1.0, 5, 4);
        assert!(a.is_aligned_with(&b));
        assert!(!a.is_aligned_with(&shifted));
        assert!(a.intersects(&shifted));
        assert!(!a.intersects(&far));
        assert!(check_alignment(&[("mmi", &a), ("population", &shifted)]).is_err());
    }

    #[test]
    fn test_border_values() {
        let geodict = GeoDict::new(0.0, 0.0, 1.0, 1.0, 3, 3);
        let grid = Grid2D::new(geodict, (1..=9).collect::<Vec<i32>>()).unwrap();
        let border = grid.border_values();
        assert!(!border.contains(&5));
        assert_eq!(border.iter().max(), Some(&9));
    }
}
