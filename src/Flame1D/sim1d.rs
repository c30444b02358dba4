//! # Composite system
//!
//! `Sim1D` concatenates the unknowns of Inlet → FreeFlow → Outlet into one global vector
//! (`[inlet | flow point 0 | … | flow point N-1]`, the outlet has none), owns that vector and the
//! grid, and evaluates the global residual and its banded finite-difference Jacobian.
//!
//! ## Jacobian
//! Every row couples only to its own point and the two neighbouring points, counting the inlet as
//! the point left of flow point 0. Columns of blocks three apart therefore never touch the same
//! row, so one residual evaluation perturbs the same component at every third block and the
//! Jacobian costs `3 · n_components` evaluations regardless of the grid size.
use super::band_matrix::BandMatrix;
use super::domains::{AssemblyContext, C_T, C_E, C_Y, Domain, Domain1D, I_E, I_MDOT, I_T, Inlet1D};
use super::flame_error::FlameError;
use super::flame_utils::{BoundsConfig, InitialConfig, InitialTemplate, ToleranceConfig};
use super::flow_equations::{FreeFlow1D, SolveStage};
use super::grid::Grid;
use super::newton_solver::NonlinearSystem;
use super::refine::{RefineCriteria, Refiner};
use super::results::SolutionSnapshot;
use crate::Providers::provider_api::Providers;
use log::{debug, info};
use nalgebra::{DMatrix, DVector};

/// domain indices in the composite
pub const INLET: usize = 0;
pub const FLOW: usize = 1;
pub const OUTLET: usize = 2;

pub struct Sim1D<'a> {
    pub providers: Providers<'a>,
    pub domains: Vec<Domain>,
    pub grid: Grid,
    /// global unknown vector
    pub x: DVector<f64>,
    pub tolerances: ToleranceConfig,
    pub bounds: BoundsConfig,
    pub refiner: Refiner,
    /// absolute tolerances per domain and component
    atol: Vec<Vec<f64>>,
}

impl<'a> Sim1D<'a> {
    pub fn new(
        providers: Providers<'a>,
        domains: Vec<Domain>,
        grid: Grid,
        tolerances: ToleranceConfig,
        bounds: BoundsConfig,
        criteria: RefineCriteria,
    ) -> Result<Self, FlameError> {
        let sequence_ok = domains.len() == 3
            && matches!(domains[INLET], Domain::Inlet(_))
            && matches!(domains[FLOW], Domain::FreeFlow(_))
            && matches!(domains[OUTLET], Domain::Outlet(_));
        if !sequence_ok {
            return Err(FlameError::InvalidInput(
                "composite must be Inlet, FreeFlow, Outlet in that order".to_string(),
            ));
        }
        tolerances.validate()?;
        let species = providers.thermo.species_names().to_vec();
        let charges = providers.thermo.charges().to_vec();
        let map = tolerances.to_full_tolerance_map(&species, &charges);
        let atol = domains
            .iter()
            .map(|d| {
                d.component_names()
                    .iter()
                    .map(|name| map.get(name).copied().unwrap_or(tolerances.Y))
                    .collect()
            })
            .collect();
        let mut sim = Self {
            providers,
            domains,
            grid,
            x: DVector::zeros(0),
            tolerances,
            bounds,
            refiner: Refiner::new(criteria)?,
            atol,
        };
        sim.x = DVector::zeros(sim.size());
        let inlet = sim.inlet()?.clone();
        sim.x[I_MDOT] = inlet.mdot;
        sim.x[I_T] = inlet.temperature;
        sim.x[I_E] = inlet.e_field;
        Ok(sim)
    }

    pub fn inlet(&self) -> Result<&Inlet1D, FlameError> {
        match &self.domains[INLET] {
            Domain::Inlet(d) => Ok(d),
            _ => Err(FlameError::InvalidInput("domain 0 is not an inlet".to_string())),
        }
    }

    pub fn inlet_mut(&mut self) -> Result<&mut Inlet1D, FlameError> {
        match &mut self.domains[INLET] {
            Domain::Inlet(d) => Ok(d),
            _ => Err(FlameError::InvalidInput("domain 0 is not an inlet".to_string())),
        }
    }

    pub fn flow(&self) -> Result<&FreeFlow1D, FlameError> {
        match &self.domains[FLOW] {
            Domain::FreeFlow(d) => Ok(d),
            _ => Err(FlameError::InvalidInput("domain 1 is not a free flow".to_string())),
        }
    }

    pub fn flow_mut(&mut self) -> Result<&mut FreeFlow1D, FlameError> {
        match &mut self.domains[FLOW] {
            Domain::FreeFlow(d) => Ok(d),
            _ => Err(FlameError::InvalidInput("domain 1 is not a free flow".to_string())),
        }
    }

    /// (start, components, points) of every domain in the global vector
    fn layout(&self) -> Vec<(usize, usize, usize)> {
        let mut start = 0;
        self.domains
            .iter()
            .map(|d| {
                let (nc, np) = (d.n_components(), d.n_points(&self.grid));
                let entry = (start, nc, np);
                start += nc * np;
                entry
            })
            .collect()
    }

    pub fn n_points(&self) -> usize {
        self.grid.len()
    }

    pub fn stage(&self) -> SolveStage {
        self.flow().map(|f| f.stage).unwrap_or(SolveStage::NoField)
    }

    pub fn component_names(&self, domain: usize) -> Vec<String> {
        self.domains
            .get(domain)
            .map(|d| d.component_names())
            .unwrap_or_default()
    }

    pub fn component_index(&self, domain: usize, name: &str) -> Result<usize, FlameError> {
        self.component_names(domain)
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| {
                FlameError::InvalidInput(format!("no component '{}' in domain {}", name, domain))
            })
    }

    fn global_index(&self, domain: usize, component: usize, point: usize) -> Result<usize, FlameError> {
        let layout = self.layout();
        let (start, nc, np) = *layout.get(domain).ok_or_else(|| {
            FlameError::InvalidInput(format!("no domain with index {}", domain))
        })?;
        if component >= nc || point >= np {
            return Err(FlameError::InvalidInput(format!(
                "component {} at point {} is outside domain {}",
                component, point, domain
            )));
        }
        Ok(start + point * nc + component)
    }

    /// current value of one unknown
    pub fn work_value(&self, domain: usize, component: usize, point: usize) -> Result<f64, FlameError> {
        Ok(self.x[self.global_index(domain, component, point)?])
    }

    pub fn set_value(
        &mut self,
        domain: usize,
        component: usize,
        point: usize,
        value: f64,
    ) -> Result<(), FlameError> {
        let i = self.global_index(domain, component, point)?;
        self.x[i] = value;
        Ok(())
    }

    /// flow unknowns as (components × points)
    pub fn flow_solution(&self) -> DMatrix<f64> {
        self.flow_block(&self.x)
    }

    fn flow_block(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let layout = self.layout();
        let (start, nc, np) = layout[FLOW];
        DMatrix::from_column_slice(nc, np, &x.as_slice()[start..start + nc * np])
    }

    /// one flow component over the whole grid
    pub fn flow_profile(&self, name: &str) -> Result<Vec<f64>, FlameError> {
        let c = self.component_index(FLOW, name)?;
        let flow = self.flow_solution();
        Ok(flow.row(c).iter().copied().collect())
    }

    /// Sets a flow component to a piecewise-linear profile in the normalized coordinate.
    pub fn set_initial_guess(
        &mut self,
        component: &str,
        locs: &[f64],
        values: &[f64],
    ) -> Result<(), FlameError> {
        let c = self.component_index(FLOW, component)?;
        let template = InitialTemplate::piecewise(locs, values)?;
        let profile = template.generate(&self.grid.normalized());
        for (j, v) in profile.into_iter().enumerate() {
            self.set_value(FLOW, c, j, v)?;
        }
        Ok(())
    }

    /// Seeds every flow component from `config`; components without a template start at zero.
    pub fn set_initial_profiles(&mut self, config: &InitialConfig) {
        let names = self.component_names(FLOW);
        let guess = config.generate_initial_guess(&names, &self.grid.normalized());
        let (start, nc, np) = self.layout()[FLOW];
        self.x
            .rows_mut(start, nc * np)
            .copy_from_slice(guess.as_slice());
    }

    /// Pins the temperature at the interior point nearest the crossing of `t_fix`.
    pub fn set_fixed_temperature(&mut self, t_fix: f64) -> Result<usize, FlameError> {
        let t = self.flow_profile("T")?;
        let z = self.grid.crossing_position(&t, t_fix).ok_or_else(|| {
            FlameError::InvalidInput(format!(
                "temperature profile never reaches the fixed temperature {:.2} K",
                t_fix
            ))
        })?;
        let j = self.grid.nearest_interior_point(z);
        let z_fix = self.grid.z(j);
        let flow = self.flow_mut()?;
        flow.fixed_temperature = Some(t_fix);
        flow.fixed_position = Some(z_fix);
        self.set_value(FLOW, C_T, j, t_fix)?;
        info!(
            "fixed temperature {:.2} K at point {} (z = {:.5e} m)",
            t_fix, j, z_fix
        );
        Ok(j)
    }

    pub fn set_refine_criteria(&mut self, criteria: RefineCriteria) -> Result<(), FlameError> {
        self.refiner.set_criteria(criteria)
    }

    pub fn set_stage(&mut self, stage: SolveStage) {
        for d in self.domains.iter_mut() {
            d.set_stage(stage);
        }
    }

    /// Applies a field at the inlet and seeds the flow field with it.
    pub fn set_applied_field(&mut self, e_field: f64) -> Result<(), FlameError> {
        self.inlet_mut()?.set_e_field(e_field);
        self.x[I_E] = e_field;
        for j in 0..self.n_points() {
            self.set_value(FLOW, C_E, j, e_field)?;
        }
        Ok(())
    }

    /// Re-seeds grid, unknowns, stage and fixed point from a saved solution.
    pub fn restore(&mut self, snapshot: &SolutionSnapshot) -> Result<(), FlameError> {
        let names = self.component_names(FLOW);
        if snapshot.component_names != names {
            return Err(FlameError::InvalidInput(format!(
                "snapshot components {:?} do not match the flow components {:?}",
                snapshot.component_names, names
            )));
        }
        let n_inlet = self.component_names(INLET).len();
        if snapshot.inlet.len() != n_inlet
            || snapshot.flow.len() != snapshot.grid.len()
            || snapshot.flow.iter().any(|p| p.len() != names.len())
        {
            return Err(FlameError::InvalidInput(
                "snapshot arrays do not match its grid".to_string(),
            ));
        }
        let grid = Grid::from_points(snapshot.grid.clone(), snapshot.max_points)?;
        let mut x = snapshot.inlet.clone();
        x.extend(snapshot.flow.iter().flatten().copied());
        self.grid = grid;
        self.x = DVector::from_vec(x);
        self.inlet_mut()?.set_e_field(snapshot.inlet[I_E]);
        let flow = self.flow_mut()?;
        flow.fixed_temperature = snapshot.fixed_temperature;
        flow.fixed_position = snapshot.fixed_position;
        self.set_stage(snapshot.stage);
        info!(
            "restored {:?} solution on {} points",
            snapshot.stage,
            self.n_points()
        );
        Ok(())
    }

    /// Absolute tolerance of every global unknown.
    fn atol_vector(&self) -> DVector<f64> {
        let mut atol = DVector::zeros(self.size());
        for (d, (start, nc, np)) in self.layout().into_iter().enumerate() {
            for p in 0..np {
                for c in 0..nc {
                    atol[start + p * nc + c] = self.atol[d][c];
                }
            }
        }
        atol
    }

    /// (start, size) of the inlet block followed by one block per flow point
    fn blocks(&self) -> Vec<(usize, usize)> {
        let layout = self.layout();
        let (inlet_start, n_inlet, _) = layout[INLET];
        let (flow_start, n_flow, np) = layout[FLOW];
        let mut blocks = vec![(inlet_start, n_inlet)];
        blocks.extend((0..np).map(|j| (flow_start + j * n_flow, n_flow)));
        blocks
    }

    /// half-bandwidth of the Jacobian
    pub fn bandwidth(&self) -> usize {
        let blocks = self.blocks();
        blocks
            .windows(2)
            .map(|w| w[0].1 + w[1].1 - 1)
            .max()
            .unwrap_or(0)
    }

    /// Evaluates every domain's residual on a frozen copy of `x`.
    pub fn eval(
        &self,
        x: &DVector<f64>,
        rdt: f64,
        x_old: Option<&DVector<f64>>,
    ) -> Result<DVector<f64>, FlameError> {
        let flow_domain = self.flow()?;
        let layout = self.layout();
        let (inlet_start, n_inlet, _) = layout[INLET];
        let flow = self.flow_block(x);
        let flow_old = x_old.map(|old| self.flow_block(old));
        let props = flow_domain.evaluate_properties(&self.providers, &flow)?;
        let fluxes = flow_domain.species_fluxes(&self.grid, &flow, &props);
        let ctx = AssemblyContext {
            providers: self.providers,
            grid: &self.grid,
            stage: flow_domain.stage,
            inlet: &x.as_slice()[inlet_start..inlet_start + n_inlet],
            flow: &flow,
            flow_old: flow_old.as_ref(),
            rdt,
            fixed_point: flow_domain.fixed_point(&self.grid),
            props,
            fluxes,
        };

        let mut blocks: Vec<DMatrix<f64>> = self
            .domains
            .iter()
            .map(|d| {
                let (nc, np) = (d.n_components(), d.n_points(&self.grid));
                let mut block = DMatrix::zeros(nc, np);
                for p in 0..np {
                    block.set_column(p, &DVector::from_vec(d.residual_at(p, &ctx)));
                }
                block
            })
            .collect();
        for d in self.domains.iter() {
            d.boundary_stitch(&ctx, &mut blocks[FLOW]);
        }

        let mut rsd = DVector::zeros(self.size());
        let mut offset = 0;
        for block in blocks.iter() {
            rsd.rows_mut(offset, block.len())
                .copy_from_slice(block.as_slice());
            offset += block.len();
        }
        if let Some(i) = rsd.iter().position(|r| !r.is_finite()) {
            return Err(FlameError::PropertyEvaluationFailure(format!(
                "non-finite residual in row {}",
                i
            )));
        }
        Ok(rsd)
    }

    /// Re-grids the flow where the refinement criteria are violated.
    ///
    /// Returns the number of inserted points; the solution is linearly interpolated onto the new grid.
    pub fn refine(&mut self) -> Result<usize, FlameError> {
        let flow = self.flow_solution();
        let names = self.component_names(FLOW);
        let marked = self.refiner.analyze(&self.grid, &flow, &names);
        if marked.is_empty() {
            return Ok(0);
        }
        let added = self.regrid(&marked)?;
        info!("refine: {} points added, grid has {} points", added, self.grid.len());
        Ok(added)
    }

    /// Bisects every interval of the grid.
    pub fn bisect_all(&mut self) -> Result<usize, FlameError> {
        let intervals: Vec<usize> = (0..self.grid.len() - 1).collect();
        self.regrid(&intervals)
    }

    /// Bisects `intervals` and interpolates the flow solution onto the new grid.
    fn regrid(&mut self, intervals: &[usize]) -> Result<usize, FlameError> {
        let flow = self.flow_solution();
        let new_grid = self.grid.with_midpoints(intervals)?;
        let (nc, np_new) = (flow.nrows(), new_grid.len());
        let mut new_flow = DMatrix::zeros(nc, np_new);
        for c in 0..nc {
            let row: Vec<f64> = flow.row(c).iter().copied().collect();
            let interpolated = new_grid.interpolate_from(&self.grid, &row);
            for (j, v) in interpolated.into_iter().enumerate() {
                new_flow[(c, j)] = v;
            }
        }
        let layout = self.layout();
        let (inlet_start, n_inlet, _) = layout[INLET];
        let mut x = Vec::with_capacity(n_inlet + new_flow.len());
        x.extend_from_slice(&self.x.as_slice()[inlet_start..inlet_start + n_inlet]);
        x.extend_from_slice(new_flow.as_slice());
        let added = np_new - self.grid.len();
        self.grid = new_grid;
        self.x = DVector::from_vec(x);
        Ok(added)
    }

    /// Fails when a mass fraction lies below the bound tolerance anywhere on the grid.
    pub fn check_physical(&self) -> Result<(), FlameError> {
        let flow = self.flow_solution();
        let names = self.component_names(FLOW);
        for j in 0..flow.ncols() {
            for c in C_Y..flow.nrows() {
                if flow[(c, j)] < -self.bounds.Y_tolerance {
                    return Err(FlameError::PropertyEvaluationFailure(format!(
                        "mass fraction of {} is {:.3e} at point {}",
                        names[c], flow[(c, j)], j
                    )));
                }
            }
        }
        Ok(())
    }

    /// Prints the current flow solution.
    pub fn show_solution(&self) {
        use prettytable::{Cell, Row, Table};
        let flow = self.flow_solution();
        let names = self.component_names(FLOW);
        println!("\n>>>>>>>>>>>>>>>>>>>> Inlet <<<<<<<<<<<<<<<<<<<<");
        let inlet_names = self.component_names(INLET);
        for (c, name) in inlet_names.iter().enumerate() {
            println!("  {:>12}: {:.6e}", name, self.x[c]);
        }
        println!("\n>>>>>>>>>>>>>>>>>>>> FreeFlow ({} points) <<<<<<<<<<<<<<<<<<<<", self.n_points());
        let mut table = Table::new();
        let mut header = vec![Cell::new("z (m)")];
        header.extend(names.iter().map(|n| Cell::new(n)));
        table.add_row(Row::new(header));
        for j in 0..flow.ncols() {
            let mut row = vec![Cell::new(&format!("{:.5e}", self.grid.z(j)))];
            row.extend((0..flow.nrows()).map(|c| Cell::new(&format!("{:.4e}", flow[(c, j)]))));
            table.add_row(Row::new(row));
        }
        table.printstd();
        if let Ok(f) = self.flow() {
            if let (Some(t), Some(z)) = (f.fixed_temperature, f.fixed_position) {
                println!("fixed temperature {:.2} K at z = {:.5e} m", t, z);
            }
        }
    }

    /// Smallest electron Debye length over the grid (m).
    pub fn min_debye_length(&self) -> Result<f64, FlameError> {
        let flow_domain = self.flow()?;
        let flow = self.flow_solution();
        let props = flow_domain.evaluate_properties(&self.providers, &flow)?;
        let n_species = flow_domain.n_species();
        let mut min = f64::INFINITY;
        for j in 0..flow.ncols() {
            let y: Vec<f64> = (0..n_species).map(|k| flow[(C_Y + k, j)]).collect();
            min = min.min(flow_domain.debye_length(&props[j], flow[(C_T, j)], &y));
        }
        Ok(min)
    }
}

impl NonlinearSystem for Sim1D<'_> {
    fn size(&self) -> usize {
        self.layout()
            .iter()
            .map(|(_, nc, np)| nc * np)
            .sum()
    }

    fn residual(
        &self,
        x: &DVector<f64>,
        rdt: f64,
        x_old: Option<&DVector<f64>>,
    ) -> Result<DVector<f64>, FlameError> {
        self.eval(x, rdt, x_old)
    }

    fn jacobian(
        &self,
        x: &DVector<f64>,
        rdt: f64,
        x_old: Option<&DVector<f64>>,
    ) -> Result<BandMatrix, FlameError> {
        let blocks = self.blocks();
        let n_blocks = blocks.len();
        let bw = self.bandwidth();
        let mut jac = BandMatrix::new(self.size(), bw, bw);
        let atol = self.atol_vector();
        let f0 = self.eval(x, rdt, x_old)?;
        let max_block = blocks.iter().map(|b| b.1).max().unwrap_or(0);
        let mut xp = x.clone();
        let mut evaluations = 0;
        for group in 0..3 {
            for c in 0..max_block {
                let mut perturbed = Vec::new();
                for b in (group..n_blocks).step_by(3) {
                    let (start, size) = blocks[b];
                    if c >= size {
                        continue;
                    }
                    let col = start + c;
                    let target = x[col] + 1e-7 * x[col].abs() + atol[col];
                    xp[col] = target;
                    perturbed.push((b, col, target - x[col]));
                }
                if perturbed.is_empty() {
                    continue;
                }
                let f1 = self.eval(&xp, rdt, x_old)?;
                evaluations += 1;
                for (b, col, delta) in perturbed {
                    let lo = b.saturating_sub(1);
                    let hi = (b + 1).min(n_blocks - 1);
                    for (row_start, row_size) in &blocks[lo..=hi] {
                        for row in *row_start..row_start + row_size {
                            let d = (f1[row] - f0[row]) / delta;
                            if d != 0.0 {
                                jac.set(row, col, d);
                            }
                        }
                    }
                    xp[col] = x[col];
                }
            }
        }
        debug!("Jacobian from {} residual evaluations", evaluations);
        Ok(jac)
    }

    fn step_norm(&self, x: &DVector<f64>, step: &DVector<f64>) -> f64 {
        let mut worst: f64 = 0.0;
        for (d, (start, nc, np)) in self.layout().into_iter().enumerate() {
            if np == 0 {
                continue;
            }
            for c in 0..nc {
                let mean = (0..np).map(|p| x[start + p * nc + c].abs()).sum::<f64>() / np as f64;
                let w = self.tolerances.rtol * mean + self.atol[d][c];
                let sum: f64 = (0..np)
                    .map(|p| (step[start + p * nc + c] / w).powi(2))
                    .sum();
                let norm = (sum / np as f64).sqrt();
                if !norm.is_finite() {
                    return f64::INFINITY;
                }
                worst = worst.max(norm);
            }
        }
        worst
    }

    fn in_bounds(&self, x: &DVector<f64>) -> bool {
        if x.iter().any(|v| !v.is_finite()) {
            return false;
        }
        let flow = self.flow_block(x);
        (0..flow.ncols()).all(|j| {
            let t = flow[(C_T, j)];
            t >= self.bounds.T_min
                && t <= self.bounds.T_max
                && (C_Y..flow.nrows()).all(|c| flow[(c, j)] >= -self.bounds.Y_tolerance)
        })
    }
}
