//! # Flame BVP Utilities Module
//!
//! Configuration helpers for the one-dimensional flame solver: tolerances expanded from a handful
//! of values per variable type to every solver component, physical bounds used by the damped
//! Newton iteration, and initial-guess templates mapped onto the current grid.
//!
//! ## Main Structures
//!
//! - **`ToleranceConfig`**: relative tolerance plus absolute tolerances per variable type
//!   ("velocity", "T", "eField", neutral mass fractions, charged mass fractions, "mdot").
//! - **`BoundsConfig`**: lower bounds on mass fractions and the admissible temperature window.
//! - **`InitialTemplate`** / **`InitialConfig`**: piecewise-linear profiles in the normalized axial
//!   coordinate, assembled into a (components × points) initial guess matrix.
use super::flame_error::FlameError;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Solver tolerances by variable type
///
/// Automatically expands to a full map of absolute tolerances for all components
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[allow(non_snake_case)]
pub struct ToleranceConfig {
    /// relative tolerance shared by every component
    pub rtol: f64,
    /// absolute tolerance for velocity (m/s)
    pub velocity: f64,
    /// absolute tolerance for temperature (K)
    pub T: f64,
    /// absolute tolerance for the electric field (V/m)
    pub eField: f64,
    /// absolute tolerance for neutral mass fractions
    pub Y: f64,
    /// absolute tolerance for mass fractions of charged species
    pub Y_charged: f64,
    /// absolute tolerance for the inlet mass flux (kg/m²/s)
    pub mdot: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-4,
            velocity: 1e-9,
            T: 1e-9,
            eField: 1e-2,
            Y: 1e-9,
            Y_charged: 1e-20,
            mdot: 1e-9,
        }
    }
}

impl ToleranceConfig {
    /// Convert to a map of absolute tolerances keyed by component name
    ///
    /// `species` and `charges` give the names and charge numbers of the species components.
    pub fn to_full_tolerance_map(
        &self,
        species: &[String],
        charges: &[f64],
    ) -> HashMap<String, f64> {
        let mut map = HashMap::new();
        map.insert("velocity".to_string(), self.velocity);
        map.insert("T".to_string(), self.T);
        map.insert("temperature".to_string(), self.T);
        map.insert("eField".to_string(), self.eField);
        map.insert("mdot".to_string(), self.mdot);
        for (name, z) in species.iter().zip(charges) {
            let atol = if *z != 0.0 { self.Y_charged } else { self.Y };
            map.insert(name.clone(), atol);
        }
        map
    }

    pub fn validate(&self) -> Result<(), FlameError> {
        let all = [
            self.rtol,
            self.velocity,
            self.T,
            self.eField,
            self.Y,
            self.Y_charged,
            self.mdot,
        ];
        if all.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(FlameError::InvalidInput(
                "all tolerances must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Physical bounds enforced on trial Newton states
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[allow(non_snake_case)]
pub struct BoundsConfig {
    /// how far below zero a mass fraction may go before the state is unphysical
    pub Y_tolerance: f64,
    /// lowest admissible temperature (K)
    pub T_min: f64,
    /// highest admissible temperature (K)
    pub T_max: f64,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            Y_tolerance: 1e-5,
            T_min: 200.0,
            T_max: 6000.0,
        }
    }
}

/// Template types for initial guess generation
#[derive(Debug, Clone, PartialEq)]
pub enum InitialTemplate {
    /// piecewise-linear interpolation between control points in the normalized coordinate
    PiecewiseLinear { locs: Vec<f64>, values: Vec<f64> },
    /// constant value throughout the domain
    Constant { value: f64 },
}

impl InitialTemplate {
    pub fn piecewise(locs: &[f64], values: &[f64]) -> Result<Self, FlameError> {
        if locs.len() < 2 || locs.len() != values.len() {
            return Err(FlameError::InvalidInput(format!(
                "initial guess needs matching locations and values (at least 2), got {} and {}",
                locs.len(),
                values.len()
            )));
        }
        if locs.windows(2).any(|w| w[1] < w[0]) || locs[0] < 0.0 || locs[locs.len() - 1] > 1.0 {
            return Err(FlameError::InvalidInput(
                "initial guess locations must be non-decreasing within [0, 1]".to_string(),
            ));
        }
        Ok(InitialTemplate::PiecewiseLinear {
            locs: locs.to_vec(),
            values: values.to_vec(),
        })
    }

    /// value at normalized position `s` in [0, 1]
    pub fn value_at(&self, s: f64) -> f64 {
        match self {
            InitialTemplate::Constant { value } => *value,
            InitialTemplate::PiecewiseLinear { locs, values } => {
                linear_interpolate(locs, values, s)
            }
        }
    }

    /// values on a grid given in normalized coordinates
    pub fn generate(&self, normalized_grid: &[f64]) -> Vec<f64> {
        normalized_grid.iter().map(|s| self.value_at(*s)).collect()
    }
}

/// Linear interpolation with constant extrapolation beyond the end points.
pub fn linear_interpolate(x: &[f64], y: &[f64], xi: f64) -> f64 {
    let n = x.len();
    if xi <= x[0] {
        return y[0];
    }
    if xi >= x[n - 1] {
        return y[n - 1];
    }
    let i = x.partition_point(|v| *v <= xi).clamp(1, n - 1);
    let (x0, x1) = (x[i - 1], x[i]);
    if x1 == x0 {
        return y[i];
    }
    y[i - 1] + (y[i] - y[i - 1]) * (xi - x0) / (x1 - x0)
}

/// Configuration for generating the initial guess matrix
///
/// Maps component names to templates; components without a template start at zero.
#[derive(Debug, Clone, Default)]
pub struct InitialConfig {
    pub templates: HashMap<String, InitialTemplate>,
}

impl InitialConfig {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    pub fn set_template(&mut self, component: &str, template: InitialTemplate) {
        self.templates.insert(component.to_string(), template);
    }

    /// (components × points) matrix of initial values
    pub fn generate_initial_guess(
        &self,
        components: &[String],
        normalized_grid: &[f64],
    ) -> DMatrix<f64> {
        let n_points = normalized_grid.len();
        let mut data = Vec::with_capacity(components.len() * n_points);
        for point in 0..n_points {
            for component in components {
                let value = self
                    .templates
                    .get(component)
                    .map(|t| t.value_at(normalized_grid[point]))
                    .unwrap_or(0.0);
                data.push(value);
            }
        }
        DMatrix::from_vec(components.len(), n_points, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_piecewise_template() {
        let t = InitialTemplate::piecewise(&[0.0, 0.3, 0.7, 1.0], &[300.0, 300.0, 2000.0, 2000.0])
            .unwrap();
        assert_eq!(t.value_at(0.0), 300.0);
        assert_eq!(t.value_at(0.2), 300.0);
        assert_relative_eq!(t.value_at(0.5), 1150.0, epsilon = 1e-9);
        assert_eq!(t.value_at(0.9), 2000.0);
        assert_eq!(t.value_at(1.5), 2000.0);
        let values = t.generate(&[0.0, 0.5, 1.0]);
        assert_relative_eq!(values[1], 1150.0, epsilon = 1e-9);
    }

    #[test]
    fn test_piecewise_template_invalid() {
        assert!(InitialTemplate::piecewise(&[0.0], &[1.0]).is_err());
        assert!(InitialTemplate::piecewise(&[0.0, 1.0], &[1.0]).is_err());
        assert!(InitialTemplate::piecewise(&[0.5, 0.2], &[1.0, 2.0]).is_err());
        assert!(InitialTemplate::piecewise(&[0.0, 1.5], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_initial_guess_matrix() {
        let mut config = InitialConfig::new();
        config.set_template("T", InitialTemplate::piecewise(&[0.0, 1.0], &[300.0, 900.0]).unwrap());
        config.set_template("velocity", InitialTemplate::Constant { value: 0.3 });
        let components = vec!["velocity".to_string(), "T".to_string(), "eField".to_string()];
        let guess = config.generate_initial_guess(&components, &[0.0, 0.5, 1.0]);
        assert_eq!(guess.shape(), (3, 3));
        assert_eq!(guess[(0, 1)], 0.3);
        assert_relative_eq!(guess[(1, 1)], 600.0);
        assert_eq!(guess[(1, 2)], 900.0);
        assert_eq!(guess[(2, 2)], 0.0);
    }

    #[test]
    fn test_tolerance_map() {
        let tol = ToleranceConfig::default();
        let species = vec!["CH4".to_string(), "E".to_string()];
        let map = tol.to_full_tolerance_map(&species, &[0.0, -1.0]);
        assert_eq!(map["CH4"], tol.Y);
        assert_eq!(map["E"], tol.Y_charged);
        assert_eq!(map["T"], tol.T);
        assert!(tol.validate().is_ok());
        let bad = ToleranceConfig {
            rtol: 0.0,
            ..ToleranceConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
