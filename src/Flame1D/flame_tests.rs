#[cfg(test)]
mod tests {
    use super::super::continuation::{ContinuationDriver, DriverState};
    use super::super::domains::{C_T, C_U, C_Y, Domain1D, I_E};
    use super::super::flame_config::FlameConfig;
    use super::super::flame_error::FlameError;
    use super::super::flame_task::{FlameSpeedTask, RunParameters};
    use super::super::flow_equations::{FreeFlow1D, SolveStage};
    use super::super::newton_solver::{DampedNewton, NonlinearSystem, TimeStepper};
    use super::super::results::{FlameProfile, SolutionSnapshot};
    use super::super::sim1d::{FLOW, INLET, Sim1D};
    use crate::Providers::methane_air_ions::MethaneAirIons;
    use crate::Providers::provider_api::{EPS0, Providers};
    use approx::assert_relative_eq;

    fn task(phi: f64, e_field: f64, refine_grid: bool) -> FlameSpeedTask {
        let params = RunParameters {
            phi,
            e_field,
            refine_grid,
            loglevel: 0,
        };
        FlameSpeedTask::new(FlameConfig::default(), params).unwrap()
    }

    fn driver(task: &FlameSpeedTask, refine_grid: bool) -> ContinuationDriver {
        ContinuationDriver::new(
            DampedNewton::new(task.config.newton.clone()),
            TimeStepper::new(task.config.time_step.clone()),
            refine_grid,
        )
    }

    fn task_with_max_points(max_points: usize, e_field: f64) -> FlameSpeedTask {
        let config = FlameConfig {
            max_points,
            ..FlameConfig::default()
        };
        let params = RunParameters {
            phi: 1.0,
            e_field,
            refine_grid: true,
            loglevel: 0,
        };
        FlameSpeedTask::new(config, params).unwrap()
    }

    fn initial_sim<'a>(task: &FlameSpeedTask, providers: Providers<'a>) -> Sim1D<'a> {
        let mixture = task.inlet_mixture(&providers).unwrap();
        task.build_sim(providers, &mixture).unwrap()
    }

    #[test]
    fn test_invalid_parameters_fail_before_setup() {
        for phi in [0.0, -1.0, f64::NAN] {
            let err = FlameSpeedTask::new(FlameConfig::default(), RunParameters::new(phi, 0.0))
                .unwrap_err();
            assert!(matches!(err, FlameError::InvalidInput(_)), "phi = {}", phi);
        }
        let err = FlameSpeedTask::new(
            FlameConfig::default(),
            RunParameters::new(1.0, f64::INFINITY),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
        let config = FlameConfig {
            initial_points: 2,
            ..FlameConfig::default()
        };
        assert!(FlameSpeedTask::new(config, RunParameters::new(1.0, 0.0)).is_err());
    }

    #[test]
    fn test_initial_composite() {
        let gas = MethaneAirIons::default();
        let task = task(1.0, 0.0, true);
        let sim = initial_sim(&task, Providers::from_mechanism(&gas));
        assert_eq!(sim.n_points(), 6);
        assert_eq!(sim.size(), 3 + 6 * 10);
        assert_eq!(sim.bandwidth(), 19);
        assert_eq!(sim.stage(), SolveStage::NoField);

        let t = sim.flow_profile("T").unwrap();
        assert_relative_eq!(t[0], 300.0);
        assert!(t.windows(2).all(|w| w[1] >= w[0]));
        let flow = sim.flow().unwrap();
        let pin = flow.fixed_point(&sim.grid).unwrap();
        assert!(pin == 2 || pin == 3);
        assert_eq!(t[pin], flow.fixed_temperature.unwrap());

        // inlet mass flux is consistent with the guessed inlet velocity
        let mdot = sim.work_value(INLET, 0, 0).unwrap();
        let u0 = sim.work_value(FLOW, C_U, 0).unwrap();
        assert_relative_eq!(u0, 0.3);
        assert!(mdot > 0.3 && mdot < 0.4, "mdot = {}", mdot);

        let rsd = sim.eval(&sim.x, 0.0, None).unwrap();
        assert_eq!(rsd.len(), sim.size());
        // inlet rows hold at the initial guess
        assert!(rsd[1].abs() < 1e-12 && rsd[2].abs() < 1e-12);
    }

    #[test]
    fn test_grouped_jacobian_matches_single_column_difference() {
        let gas = MethaneAirIons::default();
        let task = task(1.0, 0.0, true);
        let sim = initial_sim(&task, Providers::from_mechanism(&gas));
        let jac = sim.jacobian(&sim.x, 0.0, None).unwrap();
        let f0 = sim.eval(&sim.x, 0.0, None).unwrap();
        let n_flow = sim.component_names(FLOW).len();
        // temperature of flow point 3
        let col = 3 + 3 * n_flow + C_T;
        let mut xp = sim.x.clone();
        let delta = 1e-7 * xp[col].abs() + task.config.tolerances.T;
        xp[col] += delta;
        let delta = xp[col] - sim.x[col];
        let f1 = sim.eval(&xp, 0.0, None).unwrap();
        for row in 0..sim.size() {
            let fd = (f1[row] - f0[row]) / delta;
            if jac.in_band(row, col) {
                assert_relative_eq!(jac.get(row, col), fd, epsilon = 1e-6, max_relative = 1e-6);
            } else {
                assert_eq!(fd, 0.0, "row {} outside the band depends on column {}", row, col);
            }
        }
    }

    #[test]
    fn test_refined_grid_stays_monotonic_and_keeps_fixed_point() {
        let gas = MethaneAirIons::default();
        let task = task(1.0, 0.0, true);
        let mut sim = initial_sim(&task, Providers::from_mechanism(&gas));
        let t_fix = sim.flow().unwrap().fixed_temperature.unwrap();
        for _ in 0..6 {
            let before = sim.n_points();
            let added = sim.refine().unwrap();
            assert_eq!(sim.n_points(), before + added);
            assert_eq!(sim.x.len(), sim.size());
            assert!(sim.grid.points().windows(2).all(|w| w[1] > w[0]));
            if added == 0 {
                break;
            }
        }
        assert!(sim.n_points() > 6);
        let pin = sim.flow().unwrap().fixed_point(&sim.grid).unwrap();
        assert_relative_eq!(sim.work_value(FLOW, C_T, pin).unwrap(), t_fix, max_relative = 1e-12);
    }

    #[test]
    fn test_result_extraction_is_pure() {
        let gas = MethaneAirIons::default();
        let task = task(1.0, 1e4, true);
        let mut sim = initial_sim(&task, Providers::from_mechanism(&gas));
        sim.set_applied_field(1e4).unwrap();
        let x = sim.x.clone();
        let first = FlameProfile::from_sim(&sim).unwrap();
        let second = FlameProfile::from_sim(&sim).unwrap();
        assert_eq!(first, second);
        assert_eq!(sim.x, x);
        assert_eq!(first.len(), sim.n_points());
        assert!(first.eField.iter().all(|e| *e == 1e4));
        assert_relative_eq!(first.gap_voltage(), 1e4 * 0.1, max_relative = 1e-12);
        assert_eq!(
            SolutionSnapshot::from_sim(&sim).unwrap(),
            SolutionSnapshot::from_sim(&sim).unwrap()
        );
    }

    #[test]
    fn test_snapshot_restores_refined_state() {
        let gas = MethaneAirIons::default();
        let task = task(1.0, 0.0, true);
        let providers = Providers::from_mechanism(&gas);
        let mut sim = initial_sim(&task, providers);
        sim.refine().unwrap();
        sim.set_stage(SolveStage::WithField);
        let snapshot = SolutionSnapshot::from_sim(&sim).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        snapshot.save(&path).unwrap();
        let loaded = SolutionSnapshot::load(&path).unwrap();

        let mut fresh = initial_sim(&task, providers);
        assert_ne!(fresh.n_points(), sim.n_points());
        fresh.restore(&loaded).unwrap();
        assert_eq!(fresh.grid, sim.grid);
        assert_eq!(fresh.x, sim.x);
        assert_eq!(fresh.stage(), SolveStage::WithField);
        assert_eq!(fresh.domains[FLOW].n_components(), 10);

        let mut broken = loaded.clone();
        broken.component_names.pop();
        assert!(matches!(fresh.restore(&broken), Err(FlameError::InvalidInput(_))));
    }

    #[test]
    fn test_stoichiometric_flame_without_field() {
        let task = task(1.0, 0.0, true);
        let run = task.run_default_mechanism().unwrap();
        assert!(run.converged(), "run failed: {:?}", run.failure);
        assert_eq!(run.stages.len(), 2);
        assert!(run.gap_voltage.is_finite());

        let profile = run.profile.as_ref().unwrap();
        assert_relative_eq!(profile.T[0], 300.0, epsilon = 1e-6);
        assert!(profile.T.windows(2).all(|w| w[1] >= w[0] - 1e-3));
        let t_out = *profile.T.last().unwrap();
        assert_relative_eq!(t_out, run.Tad, max_relative = 0.02);
        let speed = run.flame_speed();
        assert!(speed > 0.05 && speed < 2.0, "flame speed {}", speed);

        // stage 2 refines further, so the eigenvalue may only move within the grid tolerance
        assert_relative_eq!(
            run.stages[0].mdot,
            run.stages[1].mdot,
            max_relative = task.config.refine.grid_tolerance
        );

        // Poisson from E = 0 at the inlet bounds |E| by ∫|q| dz / ε0, hence |V| by L times that
        let snapshot = run.snapshot.as_ref().unwrap();
        let gas = MethaneAirIons::new(task.config.mechanism.clone());
        let providers = Providers::from_mechanism(&gas);
        let flow = FreeFlow1D::new(&providers, task.config.pressure).unwrap();
        let q: Vec<f64> = snapshot
            .flow
            .iter()
            .map(|point| {
                flow.point_properties(&providers, point[C_T], &point[C_Y..])
                    .unwrap()
                    .charge_density
                    .abs()
            })
            .collect();
        let z = &snapshot.grid;
        let field_bound: f64 = (1..z.len())
            .map(|j| 0.5 * (q[j] + q[j - 1]) * (z[j] - z[j - 1]))
            .sum::<f64>()
            / EPS0;
        let max_field = profile.eField.iter().fold(0.0f64, |m, e| m.max(e.abs()));
        assert!(max_field <= 1.01 * field_bound + 1e-6, "max |E| {}", max_field);
        let length = z[z.len() - 1] - z[0];
        assert!(
            run.gap_voltage.abs() <= 1.01 * length * field_bound + 1e-6,
            "gap voltage {} exceeds the space-charge bound {}",
            run.gap_voltage,
            length * field_bound
        );

        let dir = tempfile::tempdir().unwrap();
        let written = run.write_outputs(dir.path()).unwrap();
        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_zero_field_stage_reproduces_stage_one_on_same_grid() {
        let gas = MethaneAirIons::default();
        let task = task(1.0, 0.0, true);
        let mut sim = initial_sim(&task, Providers::from_mechanism(&gas));
        let mut driver = driver(&task, true);
        let first = driver.solve_stage(&mut sim, SolveStage::NoField).unwrap();
        let t1 = sim.flow_profile("T").unwrap();
        let u1 = sim.flow_profile("velocity").unwrap();

        sim.set_applied_field(0.0).unwrap();
        driver.refine_grid = false;
        let second = driver.solve_stage(&mut sim, SolveStage::WithField).unwrap();
        assert_eq!(second.grid_points, first.grid_points);
        assert_relative_eq!(second.mdot, first.mdot, max_relative = 1e-5);
        let t2 = sim.flow_profile("T").unwrap();
        let u2 = sim.flow_profile("velocity").unwrap();
        for j in 0..t1.len() {
            assert_relative_eq!(t2[j], t1[j], epsilon = 1e-2);
            assert_relative_eq!(u2[j], u1[j], max_relative = 1e-5);
        }
    }

    #[test]
    fn test_bisected_grid_keeps_mass_flux_within_grid_tolerance() {
        let gas = MethaneAirIons::default();
        let task = task(1.0, 0.0, true);
        let mut sim = initial_sim(&task, Providers::from_mechanism(&gas));
        let mut driver = driver(&task, true);
        driver.solve_stage(&mut sim, SolveStage::NoField).unwrap();
        let (grid, x) = (sim.grid.clone(), sim.x.clone());

        let change = driver.check_grid_independence(&mut sim).unwrap();
        assert!(
            change <= task.config.refine.grid_tolerance,
            "mdot changed by {} on the bisected grid",
            change
        );
        assert_eq!(sim.grid, grid);
        assert_eq!(sim.x, x);
        assert_eq!(driver.state, DriverState::Converged);
    }

    #[test]
    fn test_field_stage_failure_keeps_stage_one_profile() {
        let task = task_with_max_points(80, 1e4);
        let run = task.run_default_mechanism().unwrap();
        assert!(!run.converged());
        assert_eq!(run.final_state, DriverState::Failed);
        assert!(run.history.contains(&DriverState::StageAdvancing));
        assert!(matches!(
            run.failure,
            Some(FlameError::RefinementLimitExceeded { max_points: 80, .. })
        ));
        assert_eq!(run.stages.len(), 1);
        assert_eq!(run.stages[0].stage, SolveStage::NoField);
        assert!(run.gap_voltage.is_nan());

        let profile = run.profile.as_ref().unwrap();
        assert_eq!(profile.len(), run.stages[0].grid_points);
        assert!(profile.eField.iter().all(|e| *e == 0.0));
        let snapshot = run.snapshot.as_ref().unwrap();
        assert_eq!(snapshot.stage, SolveStage::NoField);
        assert_eq!(snapshot.inlet[I_E], 0.0);

        let dir = tempfile::tempdir().unwrap();
        let written = run.write_outputs(dir.path()).unwrap();
        assert_eq!(written.len(), 3);
        let gap = std::fs::read_to_string(&written[0]).unwrap();
        assert!(gap.lines().nth(1).unwrap().ends_with("nan"));
    }

    #[test]
    fn test_refinement_limit_in_first_stage_keeps_last_profile() {
        let task = task_with_max_points(30, 1e4);
        let run = task.run_default_mechanism().unwrap();
        assert!(run.stages.is_empty());
        assert_eq!(run.final_state, DriverState::Failed);
        assert!(matches!(
            run.failure,
            Some(FlameError::RefinementLimitExceeded { max_points: 30, .. })
        ));
        assert!(run.gap_voltage.is_nan());
        let profile = run.profile.as_ref().unwrap();
        assert!(profile.len() > 6 && profile.len() <= 30);
        assert!(profile.z.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_stoichiometric_flame_with_field() {
        let task = task(1.0, 1e4, true);
        let run = task.run_default_mechanism().unwrap();
        assert!(run.converged(), "run failed: {:?}", run.failure);
        assert!(run.gap_voltage.is_finite());
        let profile = run.profile.as_ref().unwrap();
        let n = profile.len();
        assert!(profile.eField[1..n - 1].iter().all(|e| *e != 0.0));
        assert_eq!(profile.eField[0], 1e4);
    }
}
