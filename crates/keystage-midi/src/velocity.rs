//! Piecewise-linear velocity curves.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum number of breakpoints in a [`VelocityMap`].
pub const MAX_VELOCITY_POINTS: usize = 8;

/// Velocity remap curve through up to eight `(in, out)` breakpoints.
///
/// Inputs below the first point map to the first point's output, inputs above
/// the last map to the last point's output. Stored inline so filters stay `Copy`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityMap {
    points: [(u8, u8); MAX_VELOCITY_POINTS],
    len: u8,
}

impl VelocityMap {
    /// Identity curve (0 -> 0, 127 -> 127).
    pub const fn identity() -> Self {
        Self {
            points: [
                (0, 0),
                (127, 127),
                (0, 0),
                (0, 0),
                (0, 0),
                (0, 0),
                (0, 0),
                (0, 0),
            ],
            len: 2,
        }
    }

    /// Build a curve from breakpoints sorted by strictly increasing input.
    pub fn from_points(points: &[(u8, u8)]) -> Result<Self> {
        if points.len() < 2 || points.len() > MAX_VELOCITY_POINTS {
            return Err(Error::InvalidVelocityMap(format!(
                "expected 2-{} points, got {}",
                MAX_VELOCITY_POINTS,
                points.len()
            )));
        }
        if points.iter().any(|&(x, y)| x > 127 || y > 127) {
            return Err(Error::InvalidVelocityMap(
                "point values must be 0-127".into(),
            ));
        }
        if points.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(Error::InvalidVelocityMap(
                "inputs must be strictly increasing".into(),
            ));
        }

        let mut stored = [(0u8, 0u8); MAX_VELOCITY_POINTS];
        stored[..points.len()].copy_from_slice(points);
        Ok(Self {
            points: stored,
            len: points.len() as u8,
        })
    }

    #[inline]
    pub fn points(&self) -> &[(u8, u8)] {
        &self.points[..self.len as usize]
    }

    pub fn is_identity(&self) -> bool {
        self.points().iter().all(|&(x, y)| x == y) && {
            let pts = self.points();
            pts[0].0 == 0 && pts[pts.len() - 1].0 == 127
        }
    }

    /// Map a velocity through the curve.
    pub fn apply(&self, velocity: u8) -> u8 {
        let pts = self.points();
        let v = velocity.min(127);

        let (first, last) = (pts[0], pts[pts.len() - 1]);
        if v <= first.0 {
            return first.1;
        }
        if v >= last.0 {
            return last.1;
        }

        for w in pts.windows(2) {
            let ((x0, y0), (x1, y1)) = (w[0], w[1]);
            if v <= x1 {
                let t = (v - x0) as f32 / (x1 - x0) as f32;
                let y = y0 as f32 + t * (y1 as f32 - y0 as f32);
                return y.round().clamp(0.0, 127.0) as u8;
            }
        }
        last.1
    }
}

impl Default for VelocityMap {
    fn default() -> Self {
        Self::identity()
    }
}
