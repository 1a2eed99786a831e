//! Named-property resolution: maps `(kind, shape, property name)` to an
//! offset into the geometry's canonical parameter block.
//!
//! Fixed-arity kinds use static tables. B-splines are shape-dependent:
//! their endpoint slots sit after the control point, weight and knot
//! blocks, so the offsets are computed from the shape at resolution time.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::GeometryKind;

/// Arity of the shape-dependent blocks of a geometry. All zero for
/// fixed-arity kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub control_points: usize,
    pub weights: usize,
    pub knots: usize,
}

/// Resolve `property` to an offset into the canonical parameter block of a
/// geometry of `kind` with the given `shape`.
pub fn resolve_offset(kind: GeometryKind, shape: &Shape, property: &str) -> Result<usize> {
    use GeometryKind::*;

    let offset = match (kind, property) {
        (Point, "x") => 0,
        (Point, "y") => 1,

        (Circle, "radius") => 0,

        (Arc, "start_angle") => 0,
        (Arc, "end_angle") => 1,
        (Arc, "radius") => 2,

        (Ellipse | Hyperbola, "radmin") => 0,

        (ArcOfEllipse | ArcOfHyperbola, "start_angle") => 0,
        (ArcOfEllipse | ArcOfHyperbola, "end_angle") => 1,
        (ArcOfEllipse | ArcOfHyperbola, "radmin") => 2,

        (ArcOfParabola, "start_angle") => 0,
        (ArcOfParabola, "end_angle") => 1,

        (BSpline, name) => {
            let base = 2 * shape.control_points + shape.weights + shape.knots;
            match name {
                "start_x" => base,
                "start_y" => base + 1,
                "end_x" => base + 2,
                "end_y" => base + 3,
                _ => {
                    return Err(Error::UnknownProperty {
                        kind,
                        name: property.to_owned(),
                    })
                }
            }
        }

        _ => {
            return Err(Error::UnknownProperty {
                kind,
                name: property.to_owned(),
            })
        }
    };
    Ok(offset)
}
