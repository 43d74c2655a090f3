use glam::DVec2;
use math::{Angle, FRACUNIT, Fixed};
use std::f64::consts::TAU;

/// A closed loop of waypoints walked at a steady pace
pub struct CameraPath {
    points: Vec<DVec2>,
    /// Running distance at the start of each leg
    starts: Vec<f64>,
    length: f64,
}

impl CameraPath {
    pub fn new(points: &[(f64, f64)]) -> Self {
        let points: Vec<DVec2> = points.iter().map(|(x, y)| DVec2::new(*x, *y)).collect();
        let mut starts = Vec::with_capacity(points.len());
        let mut length = 0.0;
        for (i, p) in points.iter().enumerate() {
            starts.push(length);
            length += p.distance(points[(i + 1) % points.len()]);
        }
        Self {
            points,
            starts,
            length,
        }
    }

    /// The loop through the demo hall, clear of the pillar and the pool
    pub fn demo() -> Self {
        Self::new(&[(100.0, 100.0), (500.0, 100.0), (560.0, 500.0), (300.0, 600.0), (120.0, 400.0)])
    }

    /// Position and facing at `t` in `0.0..1.0` of the way round. The view
    /// turns towards the next waypoint over the last part of each leg.
    pub fn at(&self, t: f64) -> (Fixed, Fixed, Angle) {
        let dist = t.rem_euclid(1.0) * self.length;
        let leg = self.starts.iter().rposition(|s| *s <= dist).unwrap_or(0);
        let a = self.points[leg];
        let b = self.points[(leg + 1) % self.points.len()];
        let c = self.points[(leg + 2) % self.points.len()];
        let leg_len = a.distance(b).max(f64::EPSILON);
        let frac = ((dist - self.starts[leg]) / leg_len).clamp(0.0, 1.0);

        let pos = a.lerp(b, frac);
        let here = (b - a).normalize_or_zero();
        let next = (c - b).normalize_or_zero();
        let turn = ((frac - 0.7) / 0.3).clamp(0.0, 1.0);
        let dir = here.lerp(next, turn);

        (to_fixed(pos.x), to_fixed(pos.y), to_angle(dir))
    }
}

fn to_fixed(v: f64) -> Fixed {
    (v * FRACUNIT as f64) as Fixed
}

fn to_angle(dir: DVec2) -> Angle {
    let turns = (dir.y.atan2(dir.x) / TAU).rem_euclid(1.0);
    (turns * 4_294_967_296.0) as u64 as Angle
}
