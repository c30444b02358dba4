//! Damped Newton iteration with a pseudo-transient fallback.
//!
//! Convergence is judged on the Newton step, not on the residual: the step of every component is
//! weighted by `rtol·mean|x_c| + atol_c` and the solve has converged once the weighted RMS of every
//! component is below one. A damped step is accepted when the step norm computed with the frozen
//! Jacobian at the trial point is smaller than the undamped one; otherwise the damping factor is
//! reduced geometrically down to `min_damping`.
//!
//! The time stepper adds `-(x - x_old)/dt` to differential rows and takes backward-Euler steps,
//! growing `dt` after successful steps and halving it after failed ones.
use super::band_matrix::BandMatrix;
use super::flame_error::FlameError;
use log::{debug, info, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// The nonlinear system seen by the Newton iteration
pub trait NonlinearSystem {
    fn size(&self) -> usize;
    /// residual at `x`; `rdt > 0` together with `x_old` switches the transient terms on
    fn residual(
        &self,
        x: &DVector<f64>,
        rdt: f64,
        x_old: Option<&DVector<f64>>,
    ) -> Result<DVector<f64>, FlameError>;
    fn jacobian(
        &self,
        x: &DVector<f64>,
        rdt: f64,
        x_old: Option<&DVector<f64>>,
    ) -> Result<BandMatrix, FlameError>;
    /// largest component-wise weighted RMS norm of `step`
    fn step_norm(&self, x: &DVector<f64>, step: &DVector<f64>) -> f64;
    /// physical admissibility of a trial state
    fn in_bounds(&self, x: &DVector<f64>) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NewtonConfig {
    pub max_iterations: usize,
    /// factor applied to the damping coefficient after a rejected trial step
    pub damping_factor: f64,
    /// smallest damping coefficient tried before the iteration gives up
    pub min_damping: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            damping_factor: 0.5,
            min_damping: 1e-3,
        }
    }
}

impl NewtonConfig {
    pub fn validate(&self) -> Result<(), FlameError> {
        if self.max_iterations == 0
            || !(self.damping_factor > 0.0 && self.damping_factor < 1.0)
            || !(self.min_damping > 0.0 && self.min_damping < 1.0)
        {
            return Err(FlameError::InvalidInput(format!(
                "invalid Newton settings: {:?}",
                self
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewtonResult {
    pub x: DVector<f64>,
    pub iterations: usize,
    /// weighted norm of the last undamped step
    pub step_norm: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DampedNewton {
    pub config: NewtonConfig,
}

impl DampedNewton {
    pub fn new(config: NewtonConfig) -> Self {
        Self { config }
    }

    pub fn solve<S: NonlinearSystem + ?Sized>(
        &self,
        system: &S,
        x0: &DVector<f64>,
        rdt: f64,
        x_old: Option<&DVector<f64>>,
    ) -> Result<NewtonResult, FlameError> {
        let mut x = x0.clone();
        for iteration in 1..=self.config.max_iterations {
            let f = system.residual(&x, rdt, x_old)?;
            let mut jac = system.jacobian(&x, rdt, x_old)?;
            jac.factor()?;
            let mut step = -f;
            jac.solve_in_place(&mut step)?;
            let s0 = system.step_norm(&x, &step);
            if !s0.is_finite() {
                return Err(FlameError::NewtonDivergence(format!(
                    "non-finite Newton step at iteration {}",
                    iteration
                )));
            }
            if s0 < 1.0 {
                let x1 = &x + &step;
                if system.in_bounds(&x1) {
                    debug!("Newton converged in {} iterations, |dx| = {:.3e}", iteration, s0);
                    return Ok(NewtonResult {
                        x: x1,
                        iterations: iteration,
                        step_norm: s0,
                    });
                }
            }

            let mut alpha = 1.0;
            loop {
                let trial = &x + alpha * &step;
                if let Some(s1) = self.trial_step_norm(system, &jac, &trial, rdt, x_old) {
                    if s1 < 1.0 {
                        debug!(
                            "Newton converged in {} iterations (damping {:.3e}), |dx| = {:.3e}",
                            iteration, alpha, s1
                        );
                        return Ok(NewtonResult {
                            x: trial,
                            iterations: iteration,
                            step_norm: s1,
                        });
                    }
                    if s1 < s0 {
                        debug!(
                            "iteration {}: damping {:.3e}, |dx| {:.3e} -> {:.3e}",
                            iteration, alpha, s0, s1
                        );
                        x = trial;
                        break;
                    }
                }
                alpha *= self.config.damping_factor;
                if alpha < self.config.min_damping {
                    return Err(FlameError::NewtonDivergence(format!(
                        "damping fell below {:e} at iteration {} (|dx| = {:.3e})",
                        self.config.min_damping, iteration, s0
                    )));
                }
            }
        }
        Err(FlameError::NewtonDivergence(format!(
            "no convergence in {} iterations",
            self.config.max_iterations
        )))
    }

    /// weighted norm of the frozen-Jacobian Newton step at a trial point, None if it is inadmissible
    fn trial_step_norm<S: NonlinearSystem + ?Sized>(
        &self,
        system: &S,
        jac: &BandMatrix,
        trial: &DVector<f64>,
        rdt: f64,
        x_old: Option<&DVector<f64>>,
    ) -> Option<f64> {
        if !system.in_bounds(trial) {
            return None;
        }
        let f1 = system.residual(trial, rdt, x_old).ok()?;
        let mut step1 = -f1;
        jac.solve_in_place(&mut step1).ok()?;
        let s1 = system.step_norm(trial, &step1);
        s1.is_finite().then_some(s1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeStepConfig {
    /// initial pseudo-time step (s)
    pub initial_dt: f64,
    /// number of successful steps before Newton is retried
    pub steps: usize,
    pub growth: f64,
    pub min_dt: f64,
    pub max_dt: f64,
}

impl Default for TimeStepConfig {
    fn default() -> Self {
        Self {
            initial_dt: 1e-5,
            steps: 20,
            growth: 2.0,
            min_dt: 1e-12,
            max_dt: 1e-2,
        }
    }
}

impl TimeStepConfig {
    pub fn validate(&self) -> Result<(), FlameError> {
        if !(self.initial_dt > 0.0)
            || !(self.min_dt > 0.0)
            || !(self.max_dt >= self.initial_dt)
            || !(self.growth >= 1.0)
            || self.steps == 0
        {
            return Err(FlameError::InvalidInput(format!(
                "invalid time stepping settings: {:?}",
                self
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimeStepper {
    pub config: TimeStepConfig,
}

#[derive(Debug, Clone)]
pub struct TimeStepResult {
    pub x: DVector<f64>,
    pub steps_taken: usize,
    pub final_dt: f64,
}

impl TimeStepper {
    pub fn new(config: TimeStepConfig) -> Self {
        Self { config }
    }

    /// Backward-Euler steps from `x0` until `steps` of them have succeeded.
    pub fn advance<S: NonlinearSystem + ?Sized>(
        &self,
        newton: &DampedNewton,
        system: &S,
        x0: &DVector<f64>,
    ) -> Result<TimeStepResult, FlameError> {
        let mut x = x0.clone();
        let mut dt = self.config.initial_dt;
        let mut successes = 0;
        let mut attempts = 0;
        while successes < self.config.steps {
            attempts += 1;
            match newton.solve(system, &x, 1.0 / dt, Some(&x)) {
                Ok(result) => {
                    x = result.x;
                    successes += 1;
                    debug!("time step {} with dt = {:.3e} accepted", successes, dt);
                    dt = (dt * self.config.growth).min(self.config.max_dt);
                }
                Err(FlameError::PropertyEvaluationFailure(msg)) => {
                    return Err(FlameError::PropertyEvaluationFailure(msg));
                }
                Err(e) => {
                    dt *= 0.5;
                    warn!("time step failed ({}), reducing dt to {:.3e}", e, dt);
                    if dt < self.config.min_dt {
                        return Err(FlameError::NewtonDivergence(format!(
                            "time step fell below {:e} after {} attempts",
                            self.config.min_dt, attempts
                        )));
                    }
                }
            }
        }
        info!("{} time steps taken, final dt = {:.3e}", successes, dt);
        Ok(TimeStepResult {
            x,
            steps_taken: successes,
            final_dt: dt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// -x_{i-1} + 2 x_i - x_{i+1} + h² x_i³ = h², Dirichlet zero ends
    struct CubicChain {
        n: usize,
        h2: f64,
    }

    impl NonlinearSystem for CubicChain {
        fn size(&self) -> usize {
            self.n
        }

        fn residual(
            &self,
            x: &DVector<f64>,
            rdt: f64,
            x_old: Option<&DVector<f64>>,
        ) -> Result<DVector<f64>, FlameError> {
            let n = self.n;
            Ok(DVector::from_fn(n, |i, _| {
                let left = if i > 0 { x[i - 1] } else { 0.0 };
                let right = if i + 1 < n { x[i + 1] } else { 0.0 };
                let mut r = (left - 2.0 * x[i] + right) / self.h2 - x[i].powi(3) + 1.0;
                if let Some(old) = x_old {
                    r -= rdt * (x[i] - old[i]);
                }
                r
            }))
        }

        fn jacobian(
            &self,
            x: &DVector<f64>,
            rdt: f64,
            x_old: Option<&DVector<f64>>,
        ) -> Result<BandMatrix, FlameError> {
            let mut jac = BandMatrix::new(self.n, 1, 1);
            for i in 0..self.n {
                let transient = if x_old.is_some() { rdt } else { 0.0 };
                jac.set(i, i, -2.0 / self.h2 - 3.0 * x[i] * x[i] - transient);
                if i > 0 {
                    jac.set(i, i - 1, 1.0 / self.h2);
                }
                if i + 1 < self.n {
                    jac.set(i, i + 1, 1.0 / self.h2);
                }
            }
            Ok(jac)
        }

        fn step_norm(&self, _x: &DVector<f64>, step: &DVector<f64>) -> f64 {
            let w = 1e-10;
            (step.iter().map(|s| (s / w).powi(2)).sum::<f64>() / self.n as f64).sqrt()
        }

        fn in_bounds(&self, x: &DVector<f64>) -> bool {
            x.iter().all(|v| v.is_finite() && *v > -10.0)
        }
    }

    fn chain() -> CubicChain {
        let n = 20;
        let h = 1.0 / (n as f64 + 1.0);
        CubicChain { n, h2: h * h }
    }

    #[test]
    fn test_damped_newton_converges() {
        let system = chain();
        let newton = DampedNewton::default();
        let x0 = DVector::from_element(system.n, 5.0);
        let result = newton.solve(&system, &x0, 0.0, None).unwrap();
        let r = system.residual(&result.x, 0.0, None).unwrap();
        assert!(r.amax() < 1e-6, "residual {}", r.amax());
        // symmetric solution
        assert_relative_eq!(result.x[0], result.x[system.n - 1], epsilon = 1e-9);
        assert!(result.x.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn test_iteration_limit_is_reported() {
        let system = chain();
        let newton = DampedNewton::new(NewtonConfig {
            max_iterations: 1,
            ..NewtonConfig::default()
        });
        let x0 = DVector::from_element(system.n, 50.0);
        let err = newton.solve(&system, &x0, 0.0, None).unwrap_err();
        assert!(matches!(err, FlameError::NewtonDivergence(_)));
    }

    #[test]
    fn test_time_stepping_then_newton() {
        let system = chain();
        let newton = DampedNewton::default();
        let stepper = TimeStepper::new(TimeStepConfig {
            initial_dt: 1e-3,
            steps: 5,
            ..TimeStepConfig::default()
        });
        let x0 = DVector::from_element(system.n, 3.0);
        let stepped = stepper.advance(&newton, &system, &x0).unwrap();
        assert_eq!(stepped.steps_taken, 5);
        let result = newton.solve(&system, &stepped.x, 0.0, None).unwrap();
        let direct = newton.solve(&system, &x0, 0.0, None).unwrap();
        for i in 0..system.n {
            assert_relative_eq!(result.x[i], direct.x[i], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(NewtonConfig::default().validate().is_ok());
        assert!(TimeStepConfig::default().validate().is_ok());
        let bad = NewtonConfig {
            damping_factor: 1.5,
            ..NewtonConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
