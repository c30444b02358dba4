//! # Freely Propagating Premixed Flame with Ion Transport
//!
//! Steady one-dimensional methane/air flame whose mass flux is an eigenvalue fixed by pinning the
//! temperature at one interior point. Charged species are transported in an applied electric
//! field, and the gap voltage across the domain is reported.
//!
//! ## Nomenclature
//!
//! | Symbol | Description | Units |
//! |--------|-------------|-------|
//! | `z` | axial coordinate | m |
//! | `u` | axial velocity | m/s |
//! | `ṁ = ρu` | mass flux | kg/(m²·s) |
//! | `T` | temperature | K |
//! | `E` | electric field (`eField`) | V/m |
//! | `Y_k` | mass fraction of species k | - |
//! | `z_k` | charge number of species k | - |
//! | `μ_k` | mobility | m²/(V·s) |
//! | `q` | space charge density | C/m³ |
//!
//! ### Governing Equations
//! ```text
//! d(ρu)/dz = 0
//! ρu cp dT/dz = d/dz(λ dT/dz) − Σ_k h_k ω̇_k W_k
//! ρu dY_k/dz = −dj_k/dz + ω̇_k W_k
//! dE/dz = q/ε0
//! ```
//! with `j_k = −ρD_k dY_k/dz + z_k μ_k ρ Y_k E` for charged species.
//!
//! ### Solve schedule
//! 1. `SolveStage::NoField`: the field is zero, charged species use
//!    ambipolar diffusion and the electron follows from neutrality.
//! 2. `SolveStage::WithField`: Poisson's equation and drift fluxes are switched on, starting from
//!    the converged Stage-1 solution.
//!
//! Each stage runs damped Newton with a pseudo-time-stepping fallback and refines the grid until
//! the slope, curve and ratio criteria hold.
//!
//! ## Modules
//! - `grid`, `band_matrix`: the axial grid and the banded LU used by Newton.
//! - `domains`, `flow_equations`: Inlet, FreeFlow and Outlet residuals.
//! - `sim1d`: the composite unknown vector, residual and finite-difference Jacobian.
//! - `newton_solver`, `continuation`, `refine`: solver and stage schedule.
//! - `results`, `flame_task`, `flame_config`: outputs, the run driver and its settings.

pub mod band_matrix;
pub mod continuation;
pub mod domains;
pub mod flame_config;
pub mod flame_error;
pub mod flame_task;
mod flame_tests;
pub mod flame_utils;
pub mod flow_equations;
pub mod grid;
pub mod newton_solver;
pub mod refine;
pub mod results;
pub mod sim1d;
