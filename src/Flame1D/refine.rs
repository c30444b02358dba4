//! Grcar–Smooke style grid refinement of the flow domain.
//!
//! After every converged solve each flow component is checked against three criteria:
//! - slope: the change across an interval must not exceed `slope · (max − min)`;
//! - curve: the change in slope between neighbouring intervals must not exceed
//!   `curve · (max slope − min slope)`;
//! - ratio: neighbouring interval widths must not differ by more than `ratio`.
//!
//! Offending intervals are bisected. Points are never removed.
use super::flame_error::FlameError;
use super::grid::Grid;
use log::debug;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefineCriteria {
    /// largest allowed ratio of neighbouring interval widths
    pub ratio: f64,
    /// largest allowed change across one interval, as a fraction of the component range
    pub slope: f64,
    /// largest allowed change in slope, as a fraction of the slope range
    pub curve: f64,
    /// accepted for compatibility, points are never removed
    pub prune: f64,
    /// intervals narrower than twice this are never split (m)
    pub grid_min: f64,
    /// largest relative change of the mass flux accepted when every interval of a converged grid
    /// is bisected and the stage solved again
    pub grid_tolerance: f64,
}

impl Default for RefineCriteria {
    fn default() -> Self {
        Self {
            ratio: 10.0,
            slope: 0.08,
            curve: 0.1,
            prune: -0.001,
            grid_min: 1e-10,
            grid_tolerance: 0.03,
        }
    }
}

impl RefineCriteria {
    pub fn validate(&self) -> Result<(), FlameError> {
        if !(self.ratio >= 2.0) {
            return Err(FlameError::InvalidInput(format!(
                "refine ratio must be at least 2, got {}",
                self.ratio
            )));
        }
        if !(self.slope > 0.0 && self.slope <= 1.0) || !(self.curve > 0.0 && self.curve <= 1.0) {
            return Err(FlameError::InvalidInput(format!(
                "refine slope and curve must lie in (0, 1], got {} and {}",
                self.slope, self.curve
            )));
        }
        if !(self.grid_min > 0.0) {
            return Err(FlameError::InvalidInput(format!(
                "minimum grid spacing must be positive, got {}",
                self.grid_min
            )));
        }
        if !(self.grid_tolerance > 0.0 && self.grid_tolerance < 1.0) {
            return Err(FlameError::InvalidInput(format!(
                "grid tolerance must lie in (0, 1), got {}",
                self.grid_tolerance
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Refiner {
    pub criteria: RefineCriteria,
    /// components whose range is below `range_floor` times their largest magnitude are ignored
    pub range_floor: f64,
}

impl Refiner {
    pub fn new(criteria: RefineCriteria) -> Result<Self, FlameError> {
        criteria.validate()?;
        Ok(Self {
            criteria,
            range_floor: 0.01,
        })
    }

    pub fn set_criteria(&mut self, criteria: RefineCriteria) -> Result<(), FlameError> {
        criteria.validate()?;
        self.criteria = criteria;
        Ok(())
    }

    /// Intervals to bisect, sorted and without duplicates.
    ///
    /// `values` holds one row per component and one column per grid point.
    pub fn analyze(&self, grid: &Grid, values: &DMatrix<f64>, names: &[String]) -> Vec<usize> {
        let n = grid.len();
        let mut marked: BTreeSet<usize> = BTreeSet::new();
        let dz: Vec<f64> = (0..n - 1).map(|j| grid.dz(j)).collect();

        for c in 0..values.nrows() {
            let v: Vec<f64> = (0..n).map(|j| values[(c, j)]).collect();
            let vmax = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let vmin = v.iter().cloned().fold(f64::INFINITY, f64::min);
            let range = vmax - vmin;
            let magnitude = vmax.abs().max(vmin.abs());
            if !(range > self.range_floor * magnitude) || range == 0.0 {
                continue;
            }
            let before = marked.len();
            for j in 0..n - 1 {
                if (v[j + 1] - v[j]).abs() > self.criteria.slope * range {
                    marked.insert(j);
                }
            }
            let slopes: Vec<f64> = (0..n - 1).map(|j| (v[j + 1] - v[j]) / dz[j]).collect();
            let smax = slopes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let smin = slopes.iter().cloned().fold(f64::INFINITY, f64::min);
            let srange = smax - smin;
            if srange > self.range_floor * smax.abs().max(smin.abs()) {
                for j in 1..n - 1 {
                    if (slopes[j] - slopes[j - 1]).abs() > self.criteria.curve * srange {
                        marked.insert(j - 1);
                        marked.insert(j);
                    }
                }
            }
            if marked.len() > before {
                let name = names.get(c).map(String::as_str).unwrap_or("?");
                debug!("component {} marks {} intervals", name, marked.len() - before);
            }
        }
        for j in 1..n - 1 {
            if dz[j] > self.criteria.ratio * dz[j - 1] {
                marked.insert(j);
            }
            if dz[j - 1] > self.criteria.ratio * dz[j] {
                marked.insert(j - 1);
            }
        }
        marked
            .into_iter()
            .filter(|j| dz[*j] > 2.0 * self.criteria.grid_min)
            .collect()
    }
}
