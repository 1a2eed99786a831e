//! 2D parametric sketch core: a flat parameter store, geometry expressed
//! as typed views over parameter indices, a residual-based constraint
//! registry, and a session facade that drives the `planar-solver`
//! algorithms and diagnoses the constraint system afterwards.

pub mod constraint;
pub mod error;
pub mod geometry;
pub mod params;
pub mod properties;
pub mod session;

pub use constraint::{ConstraintId, ConstraintKind, ConstraintRegistry, Modifiers, ScalarRef};
pub use error::{Error, Result};
pub use geometry::{
    Arc, ArcOfEllipse, ArcOfHyperbola, ArcOfParabola, BSpline, Circle, Ellipse, Geometry,
    GeometryId, GeometryKind, Hyperbola, Line, Parabola, Point,
};
pub use params::{ParamIndex, ParameterStore, Tag, UNTAGGED};
pub use properties::{resolve_offset, Shape};
pub use session::{Session, SolveStatus};

pub use planar_solver::{Algorithm, DebugMode, SolveMethod, SolverConfig};
