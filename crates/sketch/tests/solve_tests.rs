//! End-to-end solves through the session facade: geometric scenarios with
//! analytically known answers, diagnosis of degenerate constraint sets,
//! and the temporary-constraint (drag) path.

use planar_sketch::{
    Algorithm, Arc, ConstraintKind, GeometryId, Modifiers, Point, ScalarRef, Session, SolveMethod,
    BSpline, UNTAGGED,
};

fn free_point(session: &mut Session, x: f64, y: f64) -> (GeometryId, Point) {
    make_point(session, x, y, false)
}

fn fixed_point(session: &mut Session, x: f64, y: f64) -> (GeometryId, Point) {
    make_point(session, x, y, true)
}

fn make_point(session: &mut Session, x: f64, y: f64, fixed: bool) -> (GeometryId, Point) {
    let xi = session.push_param(x, fixed);
    let yi = session.push_param(y, fixed);
    let id = session.add_point(xi, yi).expect("valid point");
    (id, Point::new(xi, yi))
}

fn pos(session: &Session, p: Point) -> (f64, f64) {
    (
        session.param(p.x).expect("live x"),
        session.param(p.y).expect("live y"),
    )
}

fn assert_near(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() < tol,
        "expected {expected}, got {actual}"
    );
}

// ── basic solves ──

#[test]
fn coincident_points_meet() {
    for algorithm in [
        Algorithm::DogLeg,
        Algorithm::LevenbergMarquardt,
        Algorithm::Bfgs,
    ] {
        let mut session = Session::new();
        let (a, pa) = free_point(&mut session, 10.0, 10.0);
        let (b, pb) = free_point(&mut session, 20.0, 20.0);
        session
            .add_constraint(
                ConstraintKind::P2PCoincident { a, b },
                Modifiers::default(),
                UNTAGGED,
            )
            .expect("resolves");

        let status = session.solve(algorithm);
        assert!(status.converged, "{algorithm:?}: {}", status.residual);
        assert_eq!(status.dof, 2, "a coincident pair still translates freely");
        assert!(session.apply());

        let (ax, ay) = pos(&session, pa);
        let (bx, by) = pos(&session, pb);
        assert_near(ax, bx, 1e-8);
        assert_near(ay, by, 1e-8);
    }
}

#[test]
fn fixed_point_anchors_the_solve() {
    let mut session = Session::new();
    let (a, pa) = fixed_point(&mut session, 10.0, 10.0);
    let (b, pb) = free_point(&mut session, 20.0, 20.0);
    session
        .add_constraint(
            ConstraintKind::P2PCoincident { a, b },
            Modifiers::default(),
            UNTAGGED,
        )
        .expect("resolves");

    let status = session.solve(Algorithm::DogLeg);
    assert!(status.converged);
    assert_eq!(status.dof, 0);
    session.apply();

    // the fixed point never moved, the free one came to it
    assert_eq!(pos(&session, pa), (10.0, 10.0));
    assert!(session.is_fixed(pa.x).expect("live"));
    let (bx, by) = pos(&session, pb);
    assert_near(bx, 10.0, 1e-8);
    assert_near(by, 10.0, 1e-8);
}

#[test]
fn rectangle_squares_up() {
    let mut session = Session::new();
    let (id0, p0) = fixed_point(&mut session, 0.0, 0.0);
    let (id1, p1) = free_point(&mut session, 9.0, 1.0);
    let (id2, p2) = free_point(&mut session, 11.0, 6.0);
    let (_, p3) = free_point(&mut session, -1.0, 4.0);

    let bottom = session.add_line(p0, p1).expect("valid");
    let right = session.add_line(p1, p2).expect("valid");
    let top = session.add_line(p3, p2).expect("valid");
    let left = session.add_line(p0, p3).expect("valid");

    let m = Modifiers::default();
    for (kind, tag) in [
        (ConstraintKind::Horizontal { line: bottom }, 1),
        (ConstraintKind::Horizontal { line: top }, 2),
        (ConstraintKind::Vertical { line: right }, 3),
        (ConstraintKind::Vertical { line: left }, 4),
    ] {
        session.add_constraint(kind, m, tag).expect("resolves");
    }
    session
        .add_constraint(
            ConstraintKind::P2PDistance {
                a: id0,
                b: id1,
                distance: ScalarRef::Literal { value: 10.0 },
            },
            m,
            5,
        )
        .expect("resolves");
    session
        .add_constraint(
            ConstraintKind::P2PDistance {
                a: id1,
                b: id2,
                distance: ScalarRef::Literal { value: 5.0 },
            },
            m,
            6,
        )
        .expect("resolves");

    let status = session.solve(Algorithm::DogLeg);
    assert!(status.converged, "residual {}", status.residual);
    assert_eq!(status.dof, 0);
    assert!(!status.has_conflicts());
    session.apply();

    let (x1, y1) = pos(&session, p1);
    let (x2, y2) = pos(&session, p2);
    let (x3, y3) = pos(&session, p3);
    assert_near(x1.abs(), 10.0, 1e-6);
    assert_near(y1, 0.0, 1e-6);
    assert_near(x2, x1, 1e-6);
    assert_near(y2.abs(), 5.0, 1e-6);
    assert_near(x3, 0.0, 1e-6);
    assert_near(y3, y2, 1e-6);
}

#[test]
fn angle_constraint_turns_a_line() {
    let mut session = Session::new();
    let (_, origin) = fixed_point(&mut session, 0.0, 0.0);
    let (_, along_x) = fixed_point(&mut session, 1.0, 0.0);
    let (_, tip) = free_point(&mut session, 2.0, 0.5);

    let base = session.add_line(origin, along_x).expect("valid");
    let arm = session.add_line(origin, tip).expect("valid");

    session
        .add_constraint(
            ConstraintKind::L2LAngle {
                a: base,
                b: arm,
                angle: ScalarRef::Literal {
                    value: std::f64::consts::FRAC_PI_4,
                },
            },
            Modifiers::default(),
            UNTAGGED,
        )
        .expect("resolves");

    let status = session.solve(Algorithm::DogLeg);
    assert!(status.converged);
    session.apply();

    let (tx, ty) = pos(&session, tip);
    assert_near(ty.atan2(tx), std::f64::consts::FRAC_PI_4, 1e-6);
}

#[test]
fn line_becomes_tangent_to_circle() {
    let mut session = Session::new();
    let (_, center) = fixed_point(&mut session, 0.0, 0.0);
    let radius = session.push_param(2.0, true);
    let circle = session.add_circle(center, radius).expect("valid");

    let (_, s) = fixed_point(&mut session, -5.0, 1.0);
    let (_, e) = free_point(&mut session, 5.0, 1.0);
    let line = session.add_line(s, e).expect("valid");

    session
        .add_constraint(
            ConstraintKind::TangentLineCircle { line, circle },
            Modifiers::default(),
            UNTAGGED,
        )
        .expect("resolves");

    let status = session.solve(Algorithm::DogLeg);
    assert!(status.converged, "residual {}", status.residual);
    session.apply();

    // only the free endpoint can move: the line tilts around its pinned
    // start until the carrier's distance to the center is the radius
    let (ex, ey) = pos(&session, e);
    let (sx, sy) = (-5.0, 1.0);
    let (dx, dy) = (ex - sx, ey - sy);
    let dist = (dx * (0.0 - sy) - dy * (0.0 - sx)).abs() / (dx * dx + dy * dy).sqrt();
    assert_near(dist, 2.0, 1e-6);
}

#[test]
fn property_reference_drives_a_radius() {
    let mut session = Session::new();
    let (_, center) = fixed_point(&mut session, 0.0, 0.0);
    let radius = session.push_param(2.0, false);
    let circle = session.add_circle(center, radius).expect("valid");

    session
        .add_constraint(
            ConstraintKind::Equal {
                a: ScalarRef::Property {
                    geometry: circle,
                    name: "radius".into(),
                },
                b: ScalarRef::Literal { value: 6.5 },
            },
            Modifiers::default(),
            UNTAGGED,
        )
        .expect("resolves");

    let status = session.solve(Algorithm::LevenbergMarquardt);
    assert!(status.converged);
    session.apply();
    assert_near(session.param(radius).expect("live"), 6.5, 1e-8);
}

// ── arcs ──

#[test]
fn arc_rules_pull_endpoints_onto_the_circle() {
    let mut session = Session::new();
    let (_, center) = fixed_point(&mut session, 0.0, 0.0);
    let radius = session.push_param(5.0, false);
    let start_angle = session.push_param(0.0, false);
    let end_angle = session.push_param(std::f64::consts::FRAC_PI_2, false);
    let (_, start) = free_point(&mut session, 5.2, 0.1);
    let (_, end) = free_point(&mut session, -0.1, 4.8);

    session
        .add_arc(Arc {
            center,
            start,
            end,
            start_angle,
            end_angle,
            radius,
        })
        .expect("valid arc");
    assert_eq!(session.constraint_count(), 1, "rules are auto-registered");

    let status = session.solve(Algorithm::DogLeg);
    assert!(status.converged, "residual {}", status.residual);
    session.apply();

    let r = session.param(radius).expect("live");
    let (sx, sy) = pos(&session, start);
    let (ex, ey) = pos(&session, end);
    assert_near((sx * sx + sy * sy).sqrt(), r, 1e-6);
    assert_near((ex * ex + ey * ey).sqrt(), r, 1e-6);
}

// ── b-splines ──

#[test]
fn bspline_endpoint_property_is_constrainable() {
    let mut session = Session::new();
    let mut p = |x: f64, y: f64| {
        let xi = session.push_param(x, false);
        let yi = session.push_param(y, false);
        Point::new(xi, yi)
    };
    let cps = vec![p(0.0, 0.0), p(1.0, 2.0), p(3.0, 2.0), p(4.0, 0.0)];
    let start = p(0.0, 0.0);
    let end = p(4.0, 0.0);
    let weights: Vec<_> = (0..4).map(|_| session.push_param(1.0, true)).collect();
    let knots: Vec<_> = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]
        .iter()
        .map(|&k| session.push_param(k, true))
        .collect();

    let spline = session
        .add_bspline(BSpline {
            start,
            end,
            control_points: cps,
            weights,
            knots,
            multiplicities: vec![1; 8],
            degree: 3,
            periodic: false,
        })
        .expect("valid spline");

    session
        .add_constraint(
            ConstraintKind::Equal {
                a: ScalarRef::Property {
                    geometry: spline,
                    name: "start_x".into(),
                },
                b: ScalarRef::Literal { value: -2.0 },
            },
            Modifiers::default(),
            UNTAGGED,
        )
        .expect("start_x resolves through the variable blocks");

    let status = session.solve(Algorithm::DogLeg);
    assert!(status.converged);
    session.apply();
    assert_near(session.param(start.x).expect("live"), -2.0, 1e-8);
    // y stayed put, nothing constrained it
    assert_near(session.param(start.y).expect("live"), 0.0, 1e-12);
}

// ── diagnosis ──

#[test]
fn duplicate_constraint_is_reported_redundant() {
    let mut session = Session::new();
    let (_, s) = free_point(&mut session, 0.0, 1.0);
    let (_, e) = free_point(&mut session, 5.0, 2.0);
    let line = session.add_line(s, e).expect("valid");

    session
        .add_constraint(ConstraintKind::Horizontal { line }, Modifiers::default(), 1)
        .expect("resolves");
    session
        .add_constraint(ConstraintKind::Horizontal { line }, Modifiers::default(), 2)
        .expect("resolves");

    let status = session.solve(Algorithm::DogLeg);
    assert!(status.converged);
    assert!(status.redundant.contains(&2));
    assert!(!status.redundant.contains(&1));
    assert_eq!(status.dof, 3);
}

#[test]
fn dependent_row_subset_is_partially_redundant() {
    let mut session = Session::new();
    let (a, s) = free_point(&mut session, 0.0, 0.0);
    let (b, e) = free_point(&mut session, 5.0, 0.0);
    let line = session.add_line(s, e).expect("valid");

    session
        .add_constraint(ConstraintKind::Horizontal { line }, Modifiers::default(), 1)
        .expect("resolves");
    // coincidence implies the horizontality; its y-row adds no rank
    session
        .add_constraint(
            ConstraintKind::P2PCoincident { a, b },
            Modifiers::default(),
            2,
        )
        .expect("resolves");

    let status = session.solve(Algorithm::DogLeg);
    assert!(status.converged, "residual {}", status.residual);
    assert!(status.partially_redundant.contains(&2));
    assert!(status.conflicting.is_empty());
}

#[test]
fn mixed_constraint_scales_keep_diagnosis_stable() {
    let mut session = Session::new();
    let (a, s) = free_point(&mut session, 0.0, 0.0);
    let (b, e) = free_point(&mut session, 5.0, 1.0);
    let line = session.add_line(s, e).expect("valid");

    session
        .add_constraint(
            ConstraintKind::P2PCoincident { a, b },
            Modifiers {
                scale: 1e-4,
                ..Modifiers::default()
            },
            1,
        )
        .expect("resolves");
    // coincidence already implies horizontality; the huge scale gap must
    // not upset the rank bookkeeping of the diagnosis
    session
        .add_constraint(
            ConstraintKind::Horizontal { line },
            Modifiers {
                scale: 1e8,
                ..Modifiers::default()
            },
            2,
        )
        .expect("resolves");

    let status = session.solve(Algorithm::DogLeg);
    assert!(status.conflicting.is_empty());
    assert!(status.redundant.contains(&2));
    assert_eq!(status.dof, 2);
}

#[test]
fn contradictory_dimensions_are_reported_conflicting() {
    let mut session = Session::new();
    let (a, _) = fixed_point(&mut session, 0.0, 0.0);
    let (b, _) = free_point(&mut session, 6.0, 0.0);

    for (value, tag) in [(5.0, 1), (7.0, 2)] {
        session
            .add_constraint(
                ConstraintKind::P2PDistance {
                    a,
                    b,
                    distance: ScalarRef::Literal { value },
                },
                Modifiers::default(),
                tag,
            )
            .expect("resolves");
    }

    let status = session.solve(Algorithm::DogLeg);
    assert!(!status.converged);
    assert!(status.has_conflicts());
    assert!(status.conflicting.contains(&1) || status.conflicting.contains(&2));
}

#[test]
fn removing_the_conflicting_tag_heals_the_system() {
    let mut session = Session::new();
    let (a, _) = fixed_point(&mut session, 0.0, 0.0);
    let (b, pb) = free_point(&mut session, 6.0, 0.0);

    session
        .add_constraint(
            ConstraintKind::P2PDistance {
                a,
                b,
                distance: ScalarRef::Literal { value: 5.0 },
            },
            Modifiers::default(),
            1,
        )
        .expect("resolves");
    session
        .add_constraint(
            ConstraintKind::P2PDistance {
                a,
                b,
                distance: ScalarRef::Literal { value: 7.0 },
            },
            Modifiers::default(),
            2,
        )
        .expect("resolves");

    assert!(!session.solve(Algorithm::DogLeg).converged);

    assert_eq!(session.remove_by_tag(2), 1);
    let status = session.solve(Algorithm::DogLeg);
    assert!(status.converged);
    assert!(status.conflicting.is_empty());
    session.apply();

    let (bx, by) = pos(&session, pb);
    assert_near((bx * bx + by * by).sqrt(), 5.0, 1e-8);
}

// ── temporary constraints / dragging ──

#[test]
fn temporary_constraint_forces_sqp() {
    let mut session = Session::new();
    let (a, _) = fixed_point(&mut session, 0.0, 0.0);
    let (b, _) = free_point(&mut session, 3.0, 4.0);
    session
        .add_constraint(
            ConstraintKind::P2PDistance {
                a,
                b,
                distance: ScalarRef::Literal { value: 5.0 },
            },
            Modifiers::default(),
            UNTAGGED,
        )
        .expect("resolves");

    // no temporaries yet: the requested method runs
    assert_eq!(
        session.solve(Algorithm::LevenbergMarquardt).method,
        SolveMethod::LevenbergMarquardt
    );

    let (drag, _) = fixed_point(&mut session, 0.0, 20.0);
    session
        .add_constraint(
            ConstraintKind::P2PCoincident { a: b, b: drag },
            Modifiers {
                temporary: true,
                ..Modifiers::default()
            },
            9,
        )
        .expect("resolves");

    let status = session.solve(Algorithm::LevenbergMarquardt);
    assert_eq!(status.method, SolveMethod::Sqp);
    assert!(status.converged, "hard residual {}", status.residual);
}

#[test]
fn non_driving_temporary_still_forces_sqp() {
    let mut session = Session::new();
    let (a, _) = fixed_point(&mut session, 0.0, 0.0);
    let (b, pb) = free_point(&mut session, 3.0, 4.0);
    session
        .add_constraint(
            ConstraintKind::P2PDistance {
                a,
                b,
                distance: ScalarRef::Literal { value: 5.0 },
            },
            Modifiers::default(),
            UNTAGGED,
        )
        .expect("resolves");
    let (drag, _) = fixed_point(&mut session, 20.0, 0.0);
    session
        .add_constraint(
            ConstraintKind::P2PCoincident { a: b, b: drag },
            Modifiers {
                temporary: true,
                driving: false,
                ..Modifiers::default()
            },
            9,
        )
        .expect("resolves");

    let status = session.solve(Algorithm::DogLeg);
    assert_eq!(status.method, SolveMethod::Sqp);
    assert!(status.converged);
    session.apply();

    // non-driving: the drag target exerts no pull
    let (bx, by) = pos(&session, pb);
    assert_near(bx, 3.0, 1e-8);
    assert_near(by, 4.0, 1e-8);
}

#[test]
fn drag_respects_driving_constraints() {
    let mut session = Session::new();
    let (a, _) = fixed_point(&mut session, 0.0, 0.0);
    let (b, pb) = free_point(&mut session, 3.0, 4.0);
    session
        .add_constraint(
            ConstraintKind::P2PDistance {
                a,
                b,
                distance: ScalarRef::Literal { value: 5.0 },
            },
            Modifiers::default(),
            UNTAGGED,
        )
        .expect("resolves");

    // drag b toward (0, 20); the best reachable point is (0, 5)
    let (drag, _) = fixed_point(&mut session, 0.0, 20.0);
    session
        .add_constraint(
            ConstraintKind::P2PCoincident { a: b, b: drag },
            Modifiers {
                temporary: true,
                ..Modifiers::default()
            },
            9,
        )
        .expect("resolves");

    let status = session.solve(Algorithm::DogLeg);
    assert!(status.converged);
    // the drag target does not consume dof: it is not part of the
    // driving system's rank analysis
    assert_eq!(status.dof, 1);
    session.apply();

    let (bx, by) = pos(&session, pb);
    assert_near((bx * bx + by * by).sqrt(), 5.0, 1e-6);
    assert_near(bx, 0.0, 1e-3);
    assert_near(by, 5.0, 1e-3);
}
