//! Two-stage continuation with grid refinement.
//!
//! | State | Leaves to |
//! |-------|-----------|
//! | Initializing | NewtonIterating once the initial guess sits on the grid |
//! | NewtonIterating | Converged, TimeStepping (first failure on a grid), Failed |
//! | TimeStepping | NewtonIterating, Failed |
//! | Converged | Refining, StageAdvancing (no refinement needed or refinement disabled) |
//! | Refining | NewtonIterating on the new grid, StageAdvancing, Failed |
//! | StageAdvancing | NewtonIterating in the field stage, terminal Converged |
//!
//! Every transition is logged and kept in `history`. `check_grid_independence` re-solves a
//! converged stage on the uniformly bisected grid and reports how far the mass flux moves.
use super::domains::{I_E, I_MDOT};
use super::flame_error::FlameError;
use super::flow_equations::SolveStage;
use super::newton_solver::{DampedNewton, TimeStepper};
use super::sim1d::Sim1D;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    Initializing,
    NewtonIterating,
    TimeStepping,
    Converged,
    Refining,
    StageAdvancing,
    Failed,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Solver statistics of one completed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: SolveStage,
    pub grid_points: usize,
    pub newton_iterations: usize,
    pub time_steps: usize,
    pub refinements: usize,
    /// inlet mass flux at convergence (kg/m²/s)
    pub mdot: f64,
}

pub struct ContinuationDriver {
    pub newton: DampedNewton,
    pub stepper: TimeStepper,
    pub refine_grid: bool,
    pub state: DriverState,
    pub history: Vec<DriverState>,
}

impl ContinuationDriver {
    pub fn new(newton: DampedNewton, stepper: TimeStepper, refine_grid: bool) -> Self {
        Self {
            newton,
            stepper,
            refine_grid,
            state: DriverState::Initializing,
            history: vec![DriverState::Initializing],
        }
    }

    fn transition(&mut self, next: DriverState) {
        if next != self.state {
            info!("driver: {} -> {}", self.state, next);
        }
        self.state = next;
        self.history.push(next);
    }

    /// Solves one stage to convergence on a grid that satisfies the refinement criteria.
    ///
    /// On failure the driver ends in `Failed`; `sim.x` keeps the last iterate it converged to.
    pub fn solve_stage(
        &mut self,
        sim: &mut Sim1D,
        stage: SolveStage,
    ) -> Result<StageSummary, FlameError> {
        match self.run_stage(sim, stage) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!("{:?} stage failed: {}", stage, e);
                self.transition(DriverState::Failed);
                Err(e)
            }
        }
    }

    fn run_stage(&mut self, sim: &mut Sim1D, stage: SolveStage) -> Result<StageSummary, FlameError> {
        sim.set_stage(stage);
        let mut summary = StageSummary {
            stage,
            grid_points: sim.n_points(),
            newton_iterations: 0,
            time_steps: 0,
            refinements: 0,
            mdot: f64::NAN,
        };
        loop {
            self.transition(DriverState::NewtonIterating);
            self.solve_on_grid(sim, &mut summary)?;
            sim.check_physical()?;
            self.transition(DriverState::Converged);
            if !self.refine_grid {
                break;
            }
            self.transition(DriverState::Refining);
            let added = sim.refine()?;
            if added == 0 {
                break;
            }
            summary.refinements += 1;
        }
        summary.grid_points = sim.n_points();
        summary.mdot = sim.x[I_MDOT];
        info!(
            "{:?} stage converged on {} points, mdot = {:.6e} kg/m2/s",
            stage, summary.grid_points, summary.mdot
        );
        Ok(summary)
    }

    /// Steady Newton, falling back once to pseudo-time stepping on the current grid.
    fn solve_on_grid(&mut self, sim: &mut Sim1D, summary: &mut StageSummary) -> Result<(), FlameError> {
        let first = self.newton.solve(&*sim, &sim.x, 0.0, None);
        let err = match first {
            Ok(result) => {
                summary.newton_iterations += result.iterations;
                sim.x = result.x;
                return Ok(());
            }
            Err(e @ FlameError::PropertyEvaluationFailure(_)) => return Err(e),
            Err(e) => e,
        };
        warn!("steady Newton failed on {} points: {}", sim.n_points(), err);
        self.transition(DriverState::TimeStepping);
        let stepped = self
            .stepper
            .advance(&self.newton, &*sim, &sim.x)
            .map_err(|e| match e {
                FlameError::PropertyEvaluationFailure(m) => {
                    FlameError::PropertyEvaluationFailure(m)
                }
                other => FlameError::NewtonDivergence(format!("time stepping failed: {}", other)),
            })?;
        summary.time_steps += stepped.steps_taken;
        sim.x = stepped.x;
        self.transition(DriverState::NewtonIterating);
        match self.newton.solve(&*sim, &sim.x, 0.0, None) {
            Ok(result) => {
                summary.newton_iterations += result.iterations;
                sim.x = result.x;
                Ok(())
            }
            Err(e @ FlameError::PropertyEvaluationFailure(_)) => Err(e),
            Err(e) => Err(FlameError::NewtonDivergence(format!(
                "Newton failed after time stepping on {} points: {}",
                sim.n_points(),
                e
            ))),
        }
    }

    /// Relative change of the mass flux when every interval of the converged grid is bisected and
    /// the current stage solved again.
    ///
    /// `sim` is left on its original grid and solution. A change above `grid_tolerance` of the
    /// refinement criteria is logged as a warning.
    pub fn check_grid_independence(&mut self, sim: &mut Sim1D) -> Result<f64, FlameError> {
        let grid = sim.grid.clone();
        let x = sim.x.clone();
        let mdot = x[I_MDOT];
        self.transition(DriverState::Refining);
        let mut summary = StageSummary {
            stage: sim.stage(),
            grid_points: 0,
            newton_iterations: 0,
            time_steps: 0,
            refinements: 1,
            mdot,
        };
        let solved = sim.bisect_all().and_then(|_| {
            self.transition(DriverState::NewtonIterating);
            self.solve_on_grid(sim, &mut summary)
        });
        let fine_mdot = sim.x[I_MDOT];
        let fine_points = sim.n_points();
        sim.grid = grid;
        sim.x = x;
        if let Err(e) = solved {
            self.transition(DriverState::Failed);
            return Err(e);
        }
        self.transition(DriverState::Converged);
        let change = ((fine_mdot - mdot) / mdot).abs();
        let tolerance = sim.refiner.criteria.grid_tolerance;
        if change > tolerance {
            warn!(
                "mdot changes by {:.3e} on {} points, above the grid tolerance {:.3e}",
                change, fine_points, tolerance
            );
        } else {
            info!("mdot changes by {:.3e} on {} points", change, fine_points);
        }
        Ok(change)
    }

    /// Stage 1 without field, then Stage 2 with `e_field` applied at the inlet.
    ///
    /// Returns the summaries of the stages that converged and the error that ended the run, if any.
    pub fn run(
        &mut self,
        sim: &mut Sim1D,
        e_field: f64,
    ) -> (Vec<StageSummary>, Option<FlameError>) {
        let mut summaries = Vec::new();
        match self.solve_stage(sim, SolveStage::NoField) {
            Ok(s) => summaries.push(s),
            Err(e) => return (summaries, Some(e)),
        }
        self.transition(DriverState::StageAdvancing);
        let converged_x = sim.x.clone();
        let converged_grid = sim.grid.clone();
        if let Err(e) = sim.set_applied_field(e_field) {
            return (summaries, Some(e));
        }
        match self.solve_stage(sim, SolveStage::WithField) {
            Ok(s) => {
                summaries.push(s);
                self.transition(DriverState::Converged);
                (summaries, None)
            }
            Err(e) => {
                // keep the Stage-1 profile for output
                sim.grid = converged_grid;
                sim.x = converged_x;
                sim.set_stage(SolveStage::NoField);
                let inlet_field = sim.x[I_E];
                if let Ok(inlet) = sim.inlet_mut() {
                    inlet.set_e_field(inlet_field);
                }
                (summaries, Some(e))
            }
        }
    }
}
