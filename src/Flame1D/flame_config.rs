//! # Flame Configuration
//!
//! Every numeric knob of a flame-speed run, serializable to JSON. Fields missing from a file keep
//! their defaults.
//!
//! | Field | Default | Units |
//! |-------|---------|-------|
//! | `pressure` | 101325 | Pa |
//! | `inlet_temperature` | 300 | K |
//! | `inlet_velocity` | 0.3 | m/s |
//! | `domain_length` | 0.1 | m |
//! | `initial_points` | 6 | - |
//! | `max_points` | 500 | - |
//! | `guess_locations` | [0.0, 0.3, 0.7, 1.0] | normalized, at least 4 |
//! | `refine` | ratio 10, slope 0.08, curve 0.1, grid_tolerance 0.03 | - |
//! | `fuel` / `oxidizer` | "CH4" / "O2:0.21,N2:0.79" | mole fractions |
//!
//! ```json
//! { "inlet_velocity": 0.4, "refine": { "slope": 0.05 }, "newton": { "max_iterations": 80 } }
//! ```
use super::flame_error::FlameError;
use super::flame_utils::{BoundsConfig, ToleranceConfig};
use super::newton_solver::{NewtonConfig, TimeStepConfig};
use super::refine::RefineCriteria;
use crate::Providers::methane_air_ions::MechanismConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlameConfig {
    pub pressure: f64,
    pub inlet_temperature: f64,
    pub inlet_velocity: f64,
    pub domain_length: f64,
    pub initial_points: usize,
    pub max_points: usize,
    /// control points of the piecewise-linear initial guess; the profiles hold their inlet values
    /// up to the second point and their burnt values from the second-to-last point on
    pub guess_locations: Vec<f64>,
    pub fuel: String,
    pub oxidizer: String,
    pub refine: RefineCriteria,
    pub tolerances: ToleranceConfig,
    pub bounds: BoundsConfig,
    pub newton: NewtonConfig,
    pub time_step: TimeStepConfig,
    pub mechanism: MechanismConfig,
}

impl Default for FlameConfig {
    fn default() -> Self {
        Self {
            pressure: 101325.0,
            inlet_temperature: 300.0,
            inlet_velocity: 0.3,
            domain_length: 0.1,
            initial_points: 6,
            max_points: 500,
            guess_locations: vec![0.0, 0.3, 0.7, 1.0],
            fuel: "CH4".to_string(),
            oxidizer: "O2:0.21,N2:0.79".to_string(),
            refine: RefineCriteria::default(),
            tolerances: ToleranceConfig::default(),
            bounds: BoundsConfig::default(),
            newton: NewtonConfig::default(),
            time_step: TimeStepConfig::default(),
            mechanism: MechanismConfig::default(),
        }
    }
}

impl FlameConfig {
    pub fn from_file(path: &Path) -> Result<Self, FlameError> {
        let content = std::fs::read_to_string(path)?;
        let config: FlameConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FlameError> {
        let positive = [
            ("pressure", self.pressure),
            ("inlet_temperature", self.inlet_temperature),
            ("inlet_velocity", self.inlet_velocity),
            ("domain_length", self.domain_length),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(FlameError::InvalidInput(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.initial_points < 3 || self.max_points < self.initial_points {
            return Err(FlameError::InvalidInput(format!(
                "need 3 <= initial_points <= max_points, got {} and {}",
                self.initial_points, self.max_points
            )));
        }
        let locs = &self.guess_locations;
        if locs.len() < 4
            || locs.windows(2).any(|w| w[1] <= w[0])
            || locs.first() != Some(&0.0)
            || locs.last() != Some(&1.0)
        {
            return Err(FlameError::InvalidInput(format!(
                "guess locations must be at least 4 increasing values from 0 to 1, got {:?}",
                locs
            )));
        }
        self.refine.validate()?;
        self.tolerances.validate()?;
        self.newton.validate()?;
        self.time_step.validate()?;
        if !(self.bounds.T_min < self.inlet_temperature && self.bounds.T_max > self.inlet_temperature) {
            return Err(FlameError::InvalidInput(format!(
                "inlet temperature {} K lies outside the bounds [{}, {}] K",
                self.inlet_temperature, self.bounds.T_min, self.bounds.T_max
            )));
        }
        Ok(())
    }
}
