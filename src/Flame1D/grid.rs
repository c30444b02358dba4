//! Axial grid shared by every domain of the composite problem.
//!
//! The grid is a single ordered arena of positions; domains refer to it by point index. Refinement
//! only ever inserts midpoints, so an existing point keeps its position while its index may shift.
use super::flame_error::FlameError;
use super::flame_utils::linear_interpolate;

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    z: Vec<f64>,
    pub max_points: usize,
}

impl Grid {
    /// `n_points` evenly spaced positions over [0, length]
    pub fn uniform(n_points: usize, length: f64, max_points: usize) -> Result<Self, FlameError> {
        if n_points < 3 {
            return Err(FlameError::InvalidInput(format!(
                "a flame grid needs at least 3 points, got {}",
                n_points
            )));
        }
        if !length.is_finite() || length <= 0.0 {
            return Err(FlameError::InvalidInput(format!(
                "domain length must be positive, got {}",
                length
            )));
        }
        let dz = length / (n_points - 1) as f64;
        let z = (0..n_points).map(|j| j as f64 * dz).collect();
        Self::from_points(z, max_points)
    }

    pub fn from_points(z: Vec<f64>, max_points: usize) -> Result<Self, FlameError> {
        if z.len() < 3 {
            return Err(FlameError::InvalidInput(format!(
                "a flame grid needs at least 3 points, got {}",
                z.len()
            )));
        }
        if z.iter().any(|v| !v.is_finite()) || z.windows(2).any(|w| w[1] <= w[0]) {
            return Err(FlameError::InvalidInput(
                "grid positions must be finite and strictly increasing".to_string(),
            ));
        }
        if z.len() > max_points {
            return Err(FlameError::RefinementLimitExceeded {
                points: z.len(),
                max_points,
            });
        }
        Ok(Self { z, max_points })
    }

    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    pub fn z(&self, j: usize) -> f64 {
        self.z[j]
    }

    pub fn points(&self) -> &[f64] {
        &self.z
    }

    /// width of interval j, between points j and j+1
    pub fn dz(&self, j: usize) -> f64 {
        self.z[j + 1] - self.z[j]
    }

    pub fn length(&self) -> f64 {
        self.z[self.z.len() - 1] - self.z[0]
    }

    /// positions mapped onto [0, 1]
    pub fn normalized(&self) -> Vec<f64> {
        let z0 = self.z[0];
        let l = self.length();
        self.z.iter().map(|z| (z - z0) / l).collect()
    }

    /// Grid with a midpoint inserted into each listed interval.
    ///
    /// The receiver is left untouched; the caller swaps the new grid in once the solution has been
    /// interpolated onto it.
    pub fn with_midpoints(&self, intervals: &[usize]) -> Result<Grid, FlameError> {
        let mut marked = vec![false; self.z.len() - 1];
        for &i in intervals {
            if i < marked.len() {
                marked[i] = true;
            }
        }
        let added = marked.iter().filter(|m| **m).count();
        let total = self.z.len() + added;
        if total > self.max_points {
            return Err(FlameError::RefinementLimitExceeded {
                points: total,
                max_points: self.max_points,
            });
        }
        let mut z = Vec::with_capacity(total);
        for j in 0..self.z.len() {
            z.push(self.z[j]);
            if j < marked.len() && marked[j] {
                z.push(0.5 * (self.z[j] + self.z[j + 1]));
            }
        }
        Ok(Grid {
            z,
            max_points: self.max_points,
        })
    }

    /// index of the point at position `z`, if any
    pub fn locate(&self, z: f64) -> Option<usize> {
        let tol = 1e-12 * self.length();
        self.z.iter().position(|zj| (zj - z).abs() <= tol)
    }

    /// values of a profile defined on `old` interpolated onto this grid
    pub fn interpolate_from(&self, old: &Grid, values: &[f64]) -> Vec<f64> {
        self.z
            .iter()
            .map(|z| linear_interpolate(old.points(), values, *z))
            .collect()
    }

    /// Position where a profile first crosses `target`, by linear interpolation.
    pub fn crossing_position(&self, values: &[f64], target: f64) -> Option<f64> {
        for j in 0..self.z.len() - 1 {
            let (a, b) = (values[j] - target, values[j + 1] - target);
            if a == 0.0 {
                return Some(self.z[j]);
            }
            if a * b < 0.0 {
                return Some(self.z[j] + self.dz(j) * a / (a - b));
            }
        }
        if values[values.len() - 1] == target {
            return Some(self.z[self.z.len() - 1]);
        }
        None
    }

    /// Interior point nearest to `position`; ties resolve to the lower index.
    pub fn nearest_interior_point(&self, position: f64) -> usize {
        let tol = 1e-12 * self.length();
        let mut best = 1;
        let mut best_dist = (self.z[1] - position).abs();
        for j in 2..self.z.len() - 1 {
            let dist = (self.z[j] - position).abs();
            if dist < best_dist - tol {
                best = j;
                best_dist = dist;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_grid() {
        let grid = Grid::uniform(6, 0.1, 100).unwrap();
        assert_eq!(grid.len(), 6);
        assert_eq!(grid.z(0), 0.0);
        assert_relative_eq!(grid.z(5), 0.1, epsilon = 1e-15);
        assert_relative_eq!(grid.dz(2), 0.02, epsilon = 1e-15);
        assert_relative_eq!(grid.normalized()[5], 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_invalid_grids() {
        assert!(Grid::uniform(2, 0.1, 100).is_err());
        assert!(Grid::uniform(6, -0.1, 100).is_err());
        assert!(Grid::from_points(vec![0.0, 0.2, 0.1], 100).is_err());
        assert!(matches!(
            Grid::uniform(6, 0.1, 5),
            Err(FlameError::RefinementLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_midpoint_insertion_keeps_order() {
        let grid = Grid::uniform(6, 0.1, 100).unwrap();
        let refined = grid.with_midpoints(&[0, 2, 4]).unwrap();
        assert_eq!(refined.len(), 9);
        assert!(refined.points().windows(2).all(|w| w[1] > w[0]));
        assert_relative_eq!(refined.z(1), 0.01, epsilon = 1e-15);
        // existing points survive refinement
        for z in grid.points() {
            assert!(refined.locate(*z).is_some());
        }
    }

    #[test]
    fn test_midpoint_insertion_limit() {
        let grid = Grid::uniform(6, 0.1, 8).unwrap();
        let err = grid.with_midpoints(&[0, 1, 2]).unwrap_err();
        assert!(matches!(
            err,
            FlameError::RefinementLimitExceeded {
                points: 9,
                max_points: 8
            }
        ));
        assert_eq!(grid.len(), 6);
    }

    #[test]
    fn test_crossing_and_nearest_point() {
        let grid = Grid::uniform(6, 0.1, 100).unwrap();
        let t = [300.0, 300.0, 800.0, 1800.0, 2300.0, 2300.0];
        let z = grid.crossing_position(&t, 1300.0).unwrap();
        assert_relative_eq!(z, 0.05, epsilon = 1e-12);
        // equidistant from points 2 and 3: lower index wins
        assert_eq!(grid.nearest_interior_point(z), 2);
        assert_eq!(grid.nearest_interior_point(0.0), 1);
        assert_eq!(grid.nearest_interior_point(0.1), 4);
        assert!(grid.crossing_position(&t, 5000.0).is_none());
    }

    #[test]
    fn test_interpolation_onto_refined_grid() {
        let grid = Grid::uniform(3, 1.0, 100).unwrap();
        let refined = grid.with_midpoints(&[0, 1]).unwrap();
        let values = refined.interpolate_from(&grid, &[0.0, 2.0, 6.0]);
        assert_eq!(values, vec![0.0, 1.0, 2.0, 4.0, 6.0]);
    }
}
