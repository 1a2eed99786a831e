//! Geometry as typed views over the parameter store.
//!
//! A geometry never owns coordinate values. It owns *indices* into the
//! [`ParameterStore`](crate::params::ParameterStore); two geometries built
//! from the same indices share those degrees of freedom, which is how
//! connected sketches (a line starting where an arc ends) are expressed.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::params::{ParamIndex, ParameterStore};
use crate::properties::Shape;

/// Index of a geometry within its session, in registration order.
pub type GeometryId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Line,
    Circle,
    Arc,
    Ellipse,
    ArcOfEllipse,
    Parabola,
    ArcOfParabola,
    Hyperbola,
    ArcOfHyperbola,
    BSpline,
}

/// A 2D point: two parameter slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: ParamIndex,
    pub y: ParamIndex,
}

impl Point {
    pub fn new(x: ParamIndex, y: ParamIndex) -> Self {
        Self { x, y }
    }

    pub(crate) fn pos(&self, params: &[f64]) -> (f64, f64) {
        (params[self.x], params[self.y])
    }
}

/// A line segment between two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub start: Point,
    pub end: Point,
}

impl Line {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// Direction vector (not normalized).
    pub(crate) fn dir(&self, params: &[f64]) -> (f64, f64) {
        let (sx, sy) = self.start.pos(params);
        let (ex, ey) = self.end.pos(params);
        (ex - sx, ey - sy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point,
    pub radius: ParamIndex,
}

/// Circular arc. The endpoints are real points (usable by other geometry);
/// the internal rules constraint keeps them consistent with
/// `center`/`radius`/angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arc {
    pub center: Point,
    pub start: Point,
    pub end: Point,
    pub start_angle: ParamIndex,
    pub end_angle: ParamIndex,
    pub radius: ParamIndex,
}

/// Ellipse described by center, first focus and minor radius. The major
/// radius is derived: `sqrt(radmin^2 + |focus1 - center|^2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ellipse {
    pub center: Point,
    pub focus1: Point,
    pub radmin: ParamIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcOfEllipse {
    pub ellipse: Ellipse,
    pub start: Point,
    pub end: Point,
    pub start_angle: ParamIndex,
    pub end_angle: ParamIndex,
}

/// Parabola described by vertex and focus; the focal distance and axis
/// direction are both derived from that pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parabola {
    pub vertex: Point,
    pub focus1: Point,
}

/// Arc of a parabola. The "angles" here are curve parameters of the
/// standard parametrization, not polar angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcOfParabola {
    pub parabola: Parabola,
    pub start: Point,
    pub end: Point,
    pub start_angle: ParamIndex,
    pub end_angle: ParamIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperbola {
    pub center: Point,
    pub focus1: Point,
    pub radmin: ParamIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcOfHyperbola {
    pub hyperbola: Hyperbola,
    pub start: Point,
    pub end: Point,
    pub start_angle: ParamIndex,
    pub end_angle: ParamIndex,
}

/// Non-uniform rational B-spline. Unlike every other kind its parameter
/// block is shape-dependent, which is why property offsets for B-splines
/// are computed rather than table lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BSpline {
    pub start: Point,
    pub end: Point,
    pub control_points: Vec<Point>,
    pub weights: Vec<ParamIndex>,
    pub knots: Vec<ParamIndex>,
    pub multiplicities: Vec<u32>,
    pub degree: usize,
    pub periodic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point(Point),
    Line(Line),
    Circle(Circle),
    Arc(Arc),
    Ellipse(Ellipse),
    ArcOfEllipse(ArcOfEllipse),
    Parabola(Parabola),
    ArcOfParabola(ArcOfParabola),
    Hyperbola(Hyperbola),
    ArcOfHyperbola(ArcOfHyperbola),
    BSpline(BSpline),
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::Line(_) => GeometryKind::Line,
            Geometry::Circle(_) => GeometryKind::Circle,
            Geometry::Arc(_) => GeometryKind::Arc,
            Geometry::Ellipse(_) => GeometryKind::Ellipse,
            Geometry::ArcOfEllipse(_) => GeometryKind::ArcOfEllipse,
            Geometry::Parabola(_) => GeometryKind::Parabola,
            Geometry::ArcOfParabola(_) => GeometryKind::ArcOfParabola,
            Geometry::Hyperbola(_) => GeometryKind::Hyperbola,
            Geometry::ArcOfHyperbola(_) => GeometryKind::ArcOfHyperbola,
            Geometry::BSpline(_) => GeometryKind::BSpline,
        }
    }

    /// Shape descriptor for property offset resolution. Only B-splines
    /// carry a non-trivial shape.
    pub fn shape(&self) -> Shape {
        match self {
            Geometry::BSpline(bsp) => Shape {
                control_points: bsp.control_points.len(),
                weights: bsp.weights.len(),
                knots: bsp.knots.len(),
            },
            _ => Shape::default(),
        }
    }

    /// The canonical parameter block of this geometry, in the fixed order
    /// that property offsets index into.
    ///
    /// Point coordinates referenced through sub-points (line endpoints,
    /// centers, foci) are not part of the block; they are addressed through
    /// the sub-point itself. B-splines are the exception: their block is
    /// `[cp0.x, cp0.y, ..., w..., k..., start.x, start.y, end.x, end.y]`.
    pub fn own_params(&self) -> Vec<ParamIndex> {
        match self {
            Geometry::Point(p) => vec![p.x, p.y],
            Geometry::Line(_) => Vec::new(),
            Geometry::Circle(c) => vec![c.radius],
            Geometry::Arc(a) => vec![a.start_angle, a.end_angle, a.radius],
            Geometry::Ellipse(e) => vec![e.radmin],
            Geometry::ArcOfEllipse(a) => {
                vec![a.start_angle, a.end_angle, a.ellipse.radmin]
            }
            Geometry::Parabola(_) => Vec::new(),
            Geometry::ArcOfParabola(a) => vec![a.start_angle, a.end_angle],
            Geometry::Hyperbola(h) => vec![h.radmin],
            Geometry::ArcOfHyperbola(a) => {
                vec![a.start_angle, a.end_angle, a.hyperbola.radmin]
            }
            Geometry::BSpline(bsp) => {
                let mut block =
                    Vec::with_capacity(2 * bsp.control_points.len() + bsp.weights.len() + bsp.knots.len() + 4);
                for cp in &bsp.control_points {
                    block.push(cp.x);
                    block.push(cp.y);
                }
                block.extend_from_slice(&bsp.weights);
                block.extend_from_slice(&bsp.knots);
                block.extend_from_slice(&[bsp.start.x, bsp.start.y, bsp.end.x, bsp.end.y]);
                block
            }
        }
    }

    /// Every parameter index this view touches, own block or not.
    pub fn referenced_params(&self) -> Vec<ParamIndex> {
        let mut indices = self.own_params();
        let mut point = |p: &Point| {
            indices.push(p.x);
            indices.push(p.y);
        };
        match self {
            Geometry::Point(_) | Geometry::BSpline(_) => {}
            Geometry::Line(l) => {
                point(&l.start);
                point(&l.end);
            }
            Geometry::Circle(c) => point(&c.center),
            Geometry::Arc(a) => {
                point(&a.center);
                point(&a.start);
                point(&a.end);
            }
            Geometry::Ellipse(e) => {
                point(&e.center);
                point(&e.focus1);
            }
            Geometry::ArcOfEllipse(a) => {
                point(&a.ellipse.center);
                point(&a.ellipse.focus1);
                point(&a.start);
                point(&a.end);
            }
            Geometry::Parabola(p) => {
                point(&p.vertex);
                point(&p.focus1);
            }
            Geometry::ArcOfParabola(a) => {
                point(&a.parabola.vertex);
                point(&a.parabola.focus1);
                point(&a.start);
                point(&a.end);
            }
            Geometry::Hyperbola(h) => {
                point(&h.center);
                point(&h.focus1);
            }
            Geometry::ArcOfHyperbola(a) => {
                point(&a.hyperbola.center);
                point(&a.hyperbola.focus1);
                point(&a.start);
                point(&a.end);
            }
        }
        indices
    }

    /// Check that every referenced index is live in `store` and that
    /// shape-dependent arities are coherent.
    pub fn validate(&self, store: &ParameterStore) -> Result<()> {
        if let Geometry::BSpline(bsp) = self {
            let ncp = bsp.control_points.len();
            if ncp < 2 {
                return Err(Error::invalid_shape(format!(
                    "b-spline needs at least 2 control points, got {ncp}"
                )));
            }
            if bsp.weights.len() != ncp {
                return Err(Error::invalid_shape(format!(
                    "b-spline has {ncp} control points but {} weights",
                    bsp.weights.len()
                )));
            }
            if bsp.multiplicities.len() != bsp.knots.len() {
                return Err(Error::invalid_shape(format!(
                    "b-spline has {} knots but {} multiplicities",
                    bsp.knots.len(),
                    bsp.multiplicities.len()
                )));
            }
            if bsp.degree == 0 {
                return Err(Error::invalid_shape("b-spline degree must be at least 1"));
            }
        }
        for index in self.referenced_params() {
            if !store.contains(index) {
                return Err(Error::IndexOutOfRange {
                    index,
                    len: store.len(),
                });
            }
        }
        Ok(())
    }
}
