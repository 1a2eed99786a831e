//! Constraint catalog, registry, and residual evaluation.
//!
//! A constraint is registered as a [`ConstraintKind`] descriptor naming
//! geometries by id and scalars by [`ScalarRef`]. At registration time the
//! descriptor is resolved against the session's geometry list into a
//! self-contained program of parameter indices; failures surface then, not
//! at solve time. Each program evaluates to a short vector of *signed*
//! residuals (zero when satisfied), never a pre-squared error.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::{
    Arc, ArcOfEllipse, ArcOfHyperbola, ArcOfParabola, Circle, Geometry, GeometryId, Line, Point,
};
use crate::params::{ParamIndex, ParameterStore, Tag};
use crate::properties::resolve_offset;

/// Index of a constraint within its registry, in registration order.
pub type ConstraintId = usize;

/// A scalar operand of a constraint: a fixed number, a store slot, or a
/// named property of a geometry (resolved to a slot at registration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScalarRef {
    Literal { value: f64 },
    Param { index: ParamIndex },
    Property { geometry: GeometryId, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Scalar {
    Literal(f64),
    Param(ParamIndex),
}

impl Scalar {
    fn value(&self, params: &[f64]) -> f64 {
        match *self {
            Scalar::Literal(v) => v,
            Scalar::Param(index) => params[index],
        }
    }
}

/// The constraint catalog. Geometry operands are ids into the session;
/// dimensional operands are [`ScalarRef`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConstraintKind {
    /// Two points share a location (two residuals, one per coordinate).
    P2PCoincident { a: GeometryId, b: GeometryId },
    /// Euclidean distance between two points equals a scalar.
    P2PDistance {
        a: GeometryId,
        b: GeometryId,
        distance: ScalarRef,
    },
    /// A point lies on the infinite carrier of a line.
    PointOnLine { point: GeometryId, line: GeometryId },
    Horizontal { line: GeometryId },
    Vertical { line: GeometryId },
    Parallel { a: GeometryId, b: GeometryId },
    Perpendicular { a: GeometryId, b: GeometryId },
    /// Signed angle from line `a` to line `b` equals a scalar (radians).
    L2LAngle {
        a: GeometryId,
        b: GeometryId,
        angle: ScalarRef,
    },
    EqualLength { a: GeometryId, b: GeometryId },
    /// Two scalars agree.
    Equal { a: ScalarRef, b: ScalarRef },
    /// A line is tangent to a circle.
    TangentLineCircle { line: GeometryId, circle: GeometryId },
    /// Internal consistency of an arc: ties its endpoint coordinates to the
    /// curve evaluated at its stored curve parameters. Registered
    /// automatically when an arc is added.
    ArcRules { arc: GeometryId },
}

/// Per-constraint behavior flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Modifiers {
    /// Driving constraints shape the solve; non-driving ones are measured
    /// but never enforced.
    pub driving: bool,
    /// Temporary constraints (drag targets) are satisfied best-effort and
    /// force the SQP method.
    pub temporary: bool,
    /// Positive residual weight.
    pub scale: f64,
}

impl Default for Modifiers {
    fn default() -> Self {
        Self {
            driving: true,
            temporary: false,
            scale: 1.0,
        }
    }
}

/// Resolved, self-contained residual program.
#[derive(Debug, Clone)]
enum Program {
    PointsCoincident { a: Point, b: Point },
    PointsDistance { a: Point, b: Point, distance: Scalar },
    PointOnLine { p: Point, l: Line },
    Horizontal { l: Line },
    Vertical { l: Line },
    Parallel { a: Line, b: Line },
    Perpendicular { a: Line, b: Line },
    Angle { a: Line, b: Line, angle: Scalar },
    EqualLength { a: Line, b: Line },
    EqualScalars { a: Scalar, b: Scalar },
    TangentLineCircle { l: Line, c: Circle },
    CircularArcRules(Arc),
    EllipticalArcRules(ArcOfEllipse),
    ParabolicArcRules(ArcOfParabola),
    HyperbolicArcRules(ArcOfHyperbola),
}

/// A registered constraint: the descriptor it was built from, the resolved
/// program, and its modifiers.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub driving: bool,
    pub temporary: bool,
    pub scale: f64,
    pub tag: Tag,
    program: Program,
}

impl Constraint {
    /// Number of residual components this constraint contributes.
    pub fn residual_count(&self) -> usize {
        match &self.program {
            Program::PointsCoincident { .. } => 2,
            Program::CircularArcRules(_)
            | Program::EllipticalArcRules(_)
            | Program::ParabolicArcRules(_)
            | Program::HyperbolicArcRules(_) => 4,
            _ => 1,
        }
    }

    /// Evaluate into `out`, which must hold exactly `residual_count`
    /// elements. `params` is a dense image of the parameter store.
    pub fn eval(&self, params: &[f64], out: &mut [f64]) {
        match &self.program {
            Program::PointsCoincident { a, b } => {
                let (ax, ay) = a.pos(params);
                let (bx, by) = b.pos(params);
                out[0] = ax - bx;
                out[1] = ay - by;
            }
            Program::PointsDistance { a, b, distance } => {
                let (ax, ay) = a.pos(params);
                let (bx, by) = b.pos(params);
                let d = ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt();
                out[0] = d - distance.value(params);
            }
            Program::PointOnLine { p, l } => {
                let (px, py) = p.pos(params);
                let (sx, sy) = l.start.pos(params);
                let (dx, dy) = l.dir(params);
                // signed area of the triangle (start, end, p)
                out[0] = dx * (py - sy) - dy * (px - sx);
            }
            Program::Horizontal { l } => {
                let (sy, ey) = (params[l.start.y], params[l.end.y]);
                out[0] = ey - sy;
            }
            Program::Vertical { l } => {
                let (sx, ex) = (params[l.start.x], params[l.end.x]);
                out[0] = ex - sx;
            }
            Program::Parallel { a, b } => {
                let (ax, ay) = a.dir(params);
                let (bx, by) = b.dir(params);
                out[0] = ax * by - ay * bx;
            }
            Program::Perpendicular { a, b } => {
                let (ax, ay) = a.dir(params);
                let (bx, by) = b.dir(params);
                out[0] = ax * bx + ay * by;
            }
            Program::Angle { a, b, angle } => {
                let (ax, ay) = a.dir(params);
                let (bx, by) = b.dir(params);
                let cross = ax * by - ay * bx;
                let dot = ax * bx + ay * by;
                out[0] = cross.atan2(dot) - angle.value(params);
            }
            Program::EqualLength { a, b } => {
                let (ax, ay) = a.dir(params);
                let (bx, by) = b.dir(params);
                out[0] = (ax * ax + ay * ay).sqrt() - (bx * bx + by * by).sqrt();
            }
            Program::EqualScalars { a, b } => {
                out[0] = a.value(params) - b.value(params);
            }
            Program::TangentLineCircle { l, c } => {
                let (sx, sy) = l.start.pos(params);
                let (dx, dy) = l.dir(params);
                let (cx, cy) = c.center.pos(params);
                let len = (dx * dx + dy * dy).sqrt().max(1e-300);
                let dist = (dx * (cy - sy) - dy * (cx - sx)).abs() / len;
                out[0] = dist - params[c.radius];
            }
            Program::CircularArcRules(arc) => {
                let (cx, cy) = arc.center.pos(params);
                let r = params[arc.radius];
                let sa = params[arc.start_angle];
                let ea = params[arc.end_angle];
                let (sx, sy) = arc.start.pos(params);
                let (ex, ey) = arc.end.pos(params);
                out[0] = sx - (cx + r * sa.cos());
                out[1] = sy - (cy + r * sa.sin());
                out[2] = ex - (cx + r * ea.cos());
                out[3] = ey - (cy + r * ea.sin());
            }
            Program::EllipticalArcRules(arc) => {
                let e = &arc.ellipse;
                let (cx, cy) = e.center.pos(params);
                let (fx, fy) = e.focus1.pos(params);
                let b = params[e.radmin];
                let c = ((fx - cx).powi(2) + (fy - cy).powi(2)).sqrt();
                let a = (b * b + c * c).sqrt();
                // unit major-axis direction; degenerate focus falls back to +x
                let (ux, uy) = if c > 1e-300 {
                    ((fx - cx) / c, (fy - cy) / c)
                } else {
                    (1.0, 0.0)
                };
                let at = |t: f64| {
                    let (ct, st) = (t.cos(), t.sin());
                    (
                        cx + a * ct * ux - b * st * uy,
                        cy + a * ct * uy + b * st * ux,
                    )
                };
                let (sx, sy) = arc.start.pos(params);
                let (ex, ey) = arc.end.pos(params);
                let (psx, psy) = at(params[arc.start_angle]);
                let (pex, pey) = at(params[arc.end_angle]);
                out[0] = sx - psx;
                out[1] = sy - psy;
                out[2] = ex - pex;
                out[3] = ey - pey;
            }
            Program::ParabolicArcRules(arc) => {
                let p = &arc.parabola;
                let (vx, vy) = p.vertex.pos(params);
                let (fx, fy) = p.focus1.pos(params);
                let focal = ((fx - vx).powi(2) + (fy - vy).powi(2)).sqrt();
                let (ux, uy) = if focal > 1e-300 {
                    ((fx - vx) / focal, (fy - vy) / focal)
                } else {
                    (1.0, 0.0)
                };
                // pos(t) = vertex + focal*t^2 * u + 2*focal*t * v
                let at = |t: f64| {
                    let axial = focal * t * t;
                    let lateral = 2.0 * focal * t;
                    (
                        vx + axial * ux - lateral * uy,
                        vy + axial * uy + lateral * ux,
                    )
                };
                let (sx, sy) = arc.start.pos(params);
                let (ex, ey) = arc.end.pos(params);
                let (psx, psy) = at(params[arc.start_angle]);
                let (pex, pey) = at(params[arc.end_angle]);
                out[0] = sx - psx;
                out[1] = sy - psy;
                out[2] = ex - pex;
                out[3] = ey - pey;
            }
            Program::HyperbolicArcRules(arc) => {
                let h = &arc.hyperbola;
                let (cx, cy) = h.center.pos(params);
                let (fx, fy) = h.focus1.pos(params);
                let b = params[h.radmin];
                let c = ((fx - cx).powi(2) + (fy - cy).powi(2)).sqrt();
                let a = (c * c - b * b).max(0.0).sqrt();
                let (ux, uy) = if c > 1e-300 {
                    ((fx - cx) / c, (fy - cy) / c)
                } else {
                    (1.0, 0.0)
                };
                let at = |t: f64| {
                    let (ct, st) = (t.cosh(), t.sinh());
                    (
                        cx + a * ct * ux - b * st * uy,
                        cy + a * ct * uy + b * st * ux,
                    )
                };
                let (sx, sy) = arc.start.pos(params);
                let (ex, ey) = arc.end.pos(params);
                let (psx, psy) = at(params[arc.start_angle]);
                let (pex, pey) = at(params[arc.end_angle]);
                out[0] = sx - psx;
                out[1] = sy - psy;
                out[2] = ex - pex;
                out[3] = ey - pey;
            }
        }
        if self.scale != 1.0 {
            for v in out.iter_mut() {
                *v *= self.scale;
            }
        }
    }
}

/// Registration-ordered list of constraints.
#[derive(Debug, Clone, Default)]
pub struct ConstraintRegistry {
    entries: Vec<Constraint>,
}

impl ConstraintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and register a constraint. Nothing is stored on failure.
    pub fn add(
        &mut self,
        kind: ConstraintKind,
        modifiers: Modifiers,
        tag: Tag,
        geometries: &[Geometry],
        store: &ParameterStore,
    ) -> Result<ConstraintId> {
        if !(modifiers.scale > 0.0) {
            return Err(Error::InvalidScale(modifiers.scale));
        }
        let program = resolve(&kind, geometries, store)?;
        let id = self.entries.len();
        self.entries.push(Constraint {
            kind,
            driving: modifiers.driving,
            temporary: modifiers.temporary,
            scale: modifiers.scale,
            tag,
            program,
        });
        Ok(id)
    }

    /// Drop every constraint carrying `tag`; surviving constraints keep
    /// their relative order. Returns the number removed.
    pub fn remove_by_tag(&mut self, tag: Tag) -> usize {
        let before = self.entries.len();
        self.entries.retain(|c| c.tag != tag);
        before - self.entries.len()
    }

    pub fn get(&self, id: ConstraintId) -> Option<&Constraint> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn geometry<'a>(geometries: &'a [Geometry], id: GeometryId) -> Result<&'a Geometry> {
    geometries
        .get(id)
        .ok_or_else(|| Error::unresolved(format!("no geometry with id {id}")))
}

fn point_view(geometries: &[Geometry], id: GeometryId) -> Result<Point> {
    match geometry(geometries, id)? {
        Geometry::Point(p) => Ok(*p),
        other => Err(Error::unresolved(format!(
            "geometry {id} is a {:?}, expected a point",
            other.kind()
        ))),
    }
}

fn line_view(geometries: &[Geometry], id: GeometryId) -> Result<Line> {
    match geometry(geometries, id)? {
        Geometry::Line(l) => Ok(*l),
        other => Err(Error::unresolved(format!(
            "geometry {id} is a {:?}, expected a line",
            other.kind()
        ))),
    }
}

fn circle_view(geometries: &[Geometry], id: GeometryId) -> Result<Circle> {
    match geometry(geometries, id)? {
        Geometry::Circle(c) => Ok(*c),
        other => Err(Error::unresolved(format!(
            "geometry {id} is a {:?}, expected a circle",
            other.kind()
        ))),
    }
}

fn resolve_scalar(r: &ScalarRef, geometries: &[Geometry], store: &ParameterStore) -> Result<Scalar> {
    match r {
        ScalarRef::Literal { value } => Ok(Scalar::Literal(*value)),
        ScalarRef::Param { index } => {
            if !store.contains(*index) {
                return Err(Error::IndexOutOfRange {
                    index: *index,
                    len: store.len(),
                });
            }
            Ok(Scalar::Param(*index))
        }
        ScalarRef::Property { geometry: id, name } => {
            let geom = geometry(geometries, *id)?;
            let offset = resolve_offset(geom.kind(), &geom.shape(), name)?;
            let block = geom.own_params();
            let index = block.get(offset).copied().ok_or_else(|| {
                Error::unresolved(format!(
                    "property `{name}` of geometry {id} points past its parameter block"
                ))
            })?;
            Ok(Scalar::Param(index))
        }
    }
}

fn resolve(
    kind: &ConstraintKind,
    geometries: &[Geometry],
    store: &ParameterStore,
) -> Result<Program> {
    let program = match kind {
        ConstraintKind::P2PCoincident { a, b } => Program::PointsCoincident {
            a: point_view(geometries, *a)?,
            b: point_view(geometries, *b)?,
        },
        ConstraintKind::P2PDistance { a, b, distance } => Program::PointsDistance {
            a: point_view(geometries, *a)?,
            b: point_view(geometries, *b)?,
            distance: resolve_scalar(distance, geometries, store)?,
        },
        ConstraintKind::PointOnLine { point, line } => Program::PointOnLine {
            p: point_view(geometries, *point)?,
            l: line_view(geometries, *line)?,
        },
        ConstraintKind::Horizontal { line } => Program::Horizontal {
            l: line_view(geometries, *line)?,
        },
        ConstraintKind::Vertical { line } => Program::Vertical {
            l: line_view(geometries, *line)?,
        },
        ConstraintKind::Parallel { a, b } => Program::Parallel {
            a: line_view(geometries, *a)?,
            b: line_view(geometries, *b)?,
        },
        ConstraintKind::Perpendicular { a, b } => Program::Perpendicular {
            a: line_view(geometries, *a)?,
            b: line_view(geometries, *b)?,
        },
        ConstraintKind::L2LAngle { a, b, angle } => Program::Angle {
            a: line_view(geometries, *a)?,
            b: line_view(geometries, *b)?,
            angle: resolve_scalar(angle, geometries, store)?,
        },
        ConstraintKind::EqualLength { a, b } => Program::EqualLength {
            a: line_view(geometries, *a)?,
            b: line_view(geometries, *b)?,
        },
        ConstraintKind::Equal { a, b } => Program::EqualScalars {
            a: resolve_scalar(a, geometries, store)?,
            b: resolve_scalar(b, geometries, store)?,
        },
        ConstraintKind::TangentLineCircle { line, circle } => Program::TangentLineCircle {
            l: line_view(geometries, *line)?,
            c: circle_view(geometries, *circle)?,
        },
        ConstraintKind::ArcRules { arc } => match geometry(geometries, *arc)? {
            Geometry::Arc(a) => Program::CircularArcRules(*a),
            Geometry::ArcOfEllipse(a) => Program::EllipticalArcRules(*a),
            Geometry::ArcOfParabola(a) => Program::ParabolicArcRules(*a),
            Geometry::ArcOfHyperbola(a) => Program::HyperbolicArcRules(*a),
            other => {
                return Err(Error::unresolved(format!(
                    "geometry {arc} is a {:?}, expected an arc kind",
                    other.kind()
                )))
            }
        },
    };
    Ok(program)
}
