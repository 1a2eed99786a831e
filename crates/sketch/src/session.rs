//! Session facade: owns the parameter store, the geometry list and the
//! constraint registry, and drives the numeric solvers over them.
//!
//! A solve never mutates the store in place. The free-variable solution is
//! staged until [`Session::apply`] commits it, so callers can inspect the
//! [`SolveStatus`] first and discard a result they do not want.

use std::collections::BTreeSet;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use planar_solver::{
    bfgs, dogleg, lm, sqp, Algorithm, ResidualSystem, SolveMethod, SolverConfig,
};

use crate::constraint::{
    Constraint, ConstraintId, ConstraintKind, ConstraintRegistry, Modifiers,
};
use crate::error::Result;
use crate::geometry::{
    Arc, ArcOfEllipse, ArcOfHyperbola, ArcOfParabola, BSpline, Circle, Ellipse, Geometry,
    GeometryId, Hyperbola, Line, Parabola, Point,
};
use crate::params::{ParamIndex, ParameterStore, Tag, UNTAGGED};

/// Outcome of the last [`Session::solve`], including post-solve diagnosis
/// of the driving constraint set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveStatus {
    pub converged: bool,
    pub iterations: usize,
    /// Residual 2-norm of the driving system at termination.
    pub residual: f64,
    /// Algorithm that actually ran (SQP whenever temporary constraints
    /// were present, the requested one otherwise).
    pub method: SolveMethod,
    /// Remaining degrees of freedom: free parameters minus the rank of the
    /// driving Jacobian at the solution.
    pub dof: usize,
    /// Tags of constraints unsatisfied at termination.
    pub conflicting: BTreeSet<Tag>,
    /// Tags of satisfied constraints contributing no Jacobian rank.
    pub redundant: BTreeSet<Tag>,
    /// Tags of satisfied constraints contributing some, but not full, rank.
    pub partially_redundant: BTreeSet<Tag>,
}

impl SolveStatus {
    pub fn fully_constrained(&self) -> bool {
        self.converged && self.dof == 0 && self.conflicting.is_empty()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicting.is_empty()
    }

    pub fn has_redundancies(&self) -> bool {
        !self.redundant.is_empty() || !self.partially_redundant.is_empty()
    }
}

/// The facade over store, geometry and constraints.
#[derive(Debug, Default)]
pub struct Session {
    store: ParameterStore,
    geometries: Vec<Geometry>,
    registry: ConstraintRegistry,
    config: SolverConfig,
    status: Option<SolveStatus>,
    /// Staged `(index, value)` pairs from the last solve.
    pending: Vec<(ParamIndex, f64)>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SolverConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    // ── parameters ──

    pub fn push_param(&mut self, value: f64, fixed: bool) -> ParamIndex {
        self.store.push(value, fixed)
    }

    pub fn push_param_tagged(&mut self, value: f64, fixed: bool, tag: Tag) -> ParamIndex {
        self.store.push_tagged(value, fixed, tag)
    }

    pub fn param(&self, index: ParamIndex) -> Result<f64> {
        self.store.get(index)
    }

    pub fn set_param(&mut self, index: ParamIndex, value: f64, fixed: bool) -> Result<()> {
        self.store.set(index, value, fixed)
    }

    pub fn is_fixed(&self, index: ParamIndex) -> Result<bool> {
        self.store.is_fixed(index)
    }

    pub fn param_count(&self) -> usize {
        self.store.len()
    }

    /// Committed values of every slot, in index order.
    pub fn snapshot(&self) -> Vec<f64> {
        self.store.snapshot()
    }

    // ── geometry ──

    fn add_geometry(&mut self, geometry: Geometry) -> Result<GeometryId> {
        geometry.validate(&self.store)?;
        let id = self.geometries.len();
        self.geometries.push(geometry);
        Ok(id)
    }

    pub fn add_point(&mut self, x: ParamIndex, y: ParamIndex) -> Result<GeometryId> {
        self.add_geometry(Geometry::Point(Point::new(x, y)))
    }

    pub fn add_line(&mut self, start: Point, end: Point) -> Result<GeometryId> {
        self.add_geometry(Geometry::Line(Line::new(start, end)))
    }

    pub fn add_circle(&mut self, center: Point, radius: ParamIndex) -> Result<GeometryId> {
        self.add_geometry(Geometry::Circle(Circle { center, radius }))
    }

    /// Add a circular arc. Its internal rules constraint (endpoints tied to
    /// center, radius and curve parameters) is registered automatically.
    pub fn add_arc(&mut self, arc: Arc) -> Result<GeometryId> {
        let id = self.add_geometry(Geometry::Arc(arc))?;
        self.add_arc_rules(id)?;
        Ok(id)
    }

    pub fn add_ellipse(&mut self, ellipse: Ellipse) -> Result<GeometryId> {
        self.add_geometry(Geometry::Ellipse(ellipse))
    }

    pub fn add_arc_of_ellipse(&mut self, arc: ArcOfEllipse) -> Result<GeometryId> {
        let id = self.add_geometry(Geometry::ArcOfEllipse(arc))?;
        self.add_arc_rules(id)?;
        Ok(id)
    }

    pub fn add_parabola(&mut self, parabola: Parabola) -> Result<GeometryId> {
        self.add_geometry(Geometry::Parabola(parabola))
    }

    pub fn add_arc_of_parabola(&mut self, arc: ArcOfParabola) -> Result<GeometryId> {
        let id = self.add_geometry(Geometry::ArcOfParabola(arc))?;
        self.add_arc_rules(id)?;
        Ok(id)
    }

    pub fn add_hyperbola(&mut self, hyperbola: Hyperbola) -> Result<GeometryId> {
        self.add_geometry(Geometry::Hyperbola(hyperbola))
    }

    pub fn add_arc_of_hyperbola(&mut self, arc: ArcOfHyperbola) -> Result<GeometryId> {
        let id = self.add_geometry(Geometry::ArcOfHyperbola(arc))?;
        self.add_arc_rules(id)?;
        Ok(id)
    }

    pub fn add_bspline(&mut self, bspline: BSpline) -> Result<GeometryId> {
        self.add_geometry(Geometry::BSpline(bspline))
    }

    fn add_arc_rules(&mut self, arc: GeometryId) -> Result<()> {
        self.registry.add(
            ConstraintKind::ArcRules { arc },
            Modifiers::default(),
            UNTAGGED,
            &self.geometries,
            &self.store,
        )?;
        Ok(())
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(id)
    }

    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    // ── constraints ──

    pub fn add_constraint(
        &mut self,
        kind: ConstraintKind,
        modifiers: Modifiers,
        tag: Tag,
    ) -> Result<ConstraintId> {
        self.registry
            .add(kind, modifiers, tag, &self.geometries, &self.store)
    }

    pub fn constraint_count(&self) -> usize {
        self.registry.len()
    }

    /// Residuals of one constraint at the *current* (committed) parameter
    /// values. This is how non-driving constraints are read out.
    pub fn constraint_residual(&self, id: ConstraintId) -> Option<Vec<f64>> {
        let constraint = self.registry.get(id)?;
        let params = self.store.snapshot();
        let mut out = vec![0.0; constraint.residual_count()];
        constraint.eval(&params, &mut out);
        Some(out)
    }

    /// Remove every constraint carrying `tag` and retire the parameters
    /// pushed under it. Any staged solution is discarded as stale.
    pub fn remove_by_tag(&mut self, tag: Tag) -> usize {
        let removed = self.registry.remove_by_tag(tag);
        let retired = self.store.retire_tag(tag);
        if removed > 0 || retired > 0 {
            self.pending.clear();
            self.status = None;
        }
        removed
    }

    /// Drop everything: parameters, geometry, constraints, staged results.
    pub fn clear(&mut self) {
        self.store.clear();
        self.geometries.clear();
        self.registry.clear();
        self.pending.clear();
        self.status = None;
    }

    // ── solving ──

    /// Run the requested algorithm over the free parameters. Temporary
    /// constraints force the SQP path regardless of `algorithm`. The
    /// solution is staged, not committed; call [`Session::apply`].
    pub fn solve(&mut self, algorithm: Algorithm) -> &SolveStatus {
        let free = self.store.free_indices();
        let base = self.store.snapshot();

        let hard: Vec<Constraint> = self
            .registry
            .iter()
            .filter(|c| c.driving && !c.temporary)
            .cloned()
            .collect();
        let soft: Vec<Constraint> = self
            .registry
            .iter()
            .filter(|c| c.driving && c.temporary)
            .cloned()
            .collect();

        // any temporary constraint forces SQP, driving or not; a
        // non-driving temporary still contributes no soft residuals
        let method = if self.registry.iter().any(|c| c.temporary) {
            SolveMethod::Sqp
        } else {
            SolveMethod::from(algorithm)
        };

        let hard_system = ConstraintSystem::new(&hard, &free, &base);
        let mut x: Vec<f64> = free.iter().map(|&i| base[i]).collect();
        let outcome = match method {
            SolveMethod::DogLeg => dogleg::solve(&hard_system, &mut x, &self.config),
            SolveMethod::LevenbergMarquardt => lm::solve(&hard_system, &mut x, &self.config),
            SolveMethod::Bfgs => bfgs::solve(&hard_system, &mut x, &self.config),
            SolveMethod::Sqp => {
                let soft_system = ConstraintSystem::new(&soft, &free, &base);
                sqp::solve(&hard_system, &soft_system, &mut x, &self.config)
            }
        };

        let mut solution = base;
        for (&index, &value) in free.iter().zip(x.iter()) {
            solution[index] = value;
        }

        let diagnosis = diagnose(&hard, &free, &solution, outcome.converged, &self.config);

        if self.config.debug != planar_solver::DebugMode::Off {
            debug!(
                ?method,
                converged = outcome.converged,
                iterations = outcome.iterations,
                residual = outcome.residual,
                dof = diagnosis.dof,
                "solve finished"
            );
        }

        self.pending = free.iter().map(|&i| (i, solution[i])).collect();
        self.status.insert(SolveStatus {
            converged: outcome.converged,
            iterations: outcome.iterations,
            residual: outcome.residual,
            method,
            dof: diagnosis.dof,
            conflicting: diagnosis.conflicting,
            redundant: diagnosis.redundant,
            partially_redundant: diagnosis.partially_redundant,
        })
    }

    /// Status of the last solve, if one ran since the last clear/removal.
    pub fn status(&self) -> Option<&SolveStatus> {
        self.status.as_ref()
    }

    /// Commit the staged solution into the store. Fixed parameters are
    /// untouched by construction. No-op (returning `false`) when no
    /// solution is staged.
    pub fn apply(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        for (index, value) in std::mem::take(&mut self.pending) {
            // skip slots the caller fixed (or that were retired) after the
            // solve; their current value wins over the staged one
            if let Ok(false) = self.store.is_fixed(index) {
                self.store.set(index, value, false).ok();
            }
        }
        true
    }
}

/// Adapter from a constraint list to the solver-facing residual system.
/// `x` covers the free indices; everything else is read from `base`.
struct ConstraintSystem<'a> {
    constraints: &'a [Constraint],
    free: &'a [ParamIndex],
    base: &'a [f64],
    rows: usize,
}

impl<'a> ConstraintSystem<'a> {
    fn new(constraints: &'a [Constraint], free: &'a [ParamIndex], base: &'a [f64]) -> Self {
        let rows = constraints.iter().map(|c| c.residual_count()).sum();
        Self {
            constraints,
            free,
            base,
            rows,
        }
    }

    fn scatter(&self, x: &[f64]) -> Vec<f64> {
        let mut params = self.base.to_vec();
        for (&index, &value) in self.free.iter().zip(x.iter()) {
            params[index] = value;
        }
        params
    }
}

impl ResidualSystem for ConstraintSystem<'_> {
    fn residual_count(&self) -> usize {
        self.rows
    }

    fn eval(&self, x: &[f64], out: &mut [f64]) {
        let params = self.scatter(x);
        let mut cursor = 0;
        for constraint in self.constraints {
            let n = constraint.residual_count();
            constraint.eval(&params, &mut out[cursor..cursor + n]);
            cursor += n;
        }
    }
}

struct Diagnosis {
    dof: usize,
    conflicting: BTreeSet<Tag>,
    redundant: BTreeSet<Tag>,
    partially_redundant: BTreeSet<Tag>,
}

/// Incremental rank analysis of the driving Jacobian at the solution, in
/// registration order. A constraint whose rows raise the accumulated rank
/// by less than their count is degenerate with its predecessors: redundant
/// when satisfied (no rank gained), partially redundant when satisfied with
/// some gain, conflicting when unsatisfied.
fn diagnose(
    constraints: &[Constraint],
    free: &[ParamIndex],
    solution: &[f64],
    converged: bool,
    config: &SolverConfig,
) -> Diagnosis {
    let n = free.len();
    let x: Vec<f64> = free.iter().map(|&i| solution[i]).collect();
    let sat_tol = config.convergence.max(1e-12).sqrt();

    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut rank_before = 0;
    let mut conflicting = BTreeSet::new();
    let mut redundant = BTreeSet::new();
    let mut partially_redundant = BTreeSet::new();

    for constraint in constraints {
        let single = std::slice::from_ref(constraint);
        let system = ConstraintSystem::new(single, free, solution);
        let m = system.residual_count();

        let mut residual = vec![0.0; m];
        system.eval(&x, &mut residual);
        let satisfied = residual.iter().all(|v| v.abs() < sat_tol);

        let jac = system.jacobian(&x);
        for i in 0..m {
            let mut row: Vec<f64> = jac.row(i).iter().copied().collect();
            // normalize so a large constraint scale cannot drown earlier
            // rows under the relative rank tolerance
            let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 1e-300 {
                for v in &mut row {
                    *v /= norm;
                }
            }
            rows.push(row);
        }
        let rank_after = rank(&rows, n);
        let gained = rank_after.saturating_sub(rank_before);
        rank_before = rank_after;

        if gained < m {
            if satisfied {
                if gained == 0 {
                    redundant.insert(constraint.tag);
                } else {
                    partially_redundant.insert(constraint.tag);
                }
            } else {
                conflicting.insert(constraint.tag);
            }
        } else if !satisfied && !converged {
            conflicting.insert(constraint.tag);
        }
    }

    Diagnosis {
        dof: n - rank_before,
        conflicting,
        redundant,
        partially_redundant,
    }
}

fn rank(rows: &[Vec<f64>], n: usize) -> usize {
    if rows.is_empty() || n == 0 {
        return 0;
    }
    let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    let matrix = DMatrix::from_row_slice(rows.len(), n, &flat);
    let svd = matrix.svd(false, false);
    let max_sv = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let tol = (max_sv * 1e-9).max(1e-12);
    svd.singular_values.iter().filter(|sv| **sv > tol).count()
}
