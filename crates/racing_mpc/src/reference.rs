//! Reference path sampled at the horizon nodes

use std::f64::consts::FRAC_PI_2;

use nlp::Scalar;

use crate::error::MpcError;

/// One sample of the reference line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePoint {
    pub x: f64,
    pub y: f64,
    /// Path heading in rad
    pub yaw: f64,
    /// Signed curvature in 1/m (positive turns left)
    pub curvature: f64,
    /// Admissible lateral distance from the line in m
    pub half_width: f64,
}

impl ReferencePoint {
    /// Lateral (contour) and along-track (lag) error of position `(x, y)`
    /// in this point's path frame.
    pub fn errors<T: Scalar>(&self, x: T, y: T) -> (T, T) {
        let dx = x - self.x;
        let dy = y - self.y;
        let (sin, cos) = self.yaw.sin_cos();
        let contour = dy * cos - dx * sin;
        let lag = dx * cos + dy * sin;
        (contour, lag)
    }
}

/// Reference samples for nodes `0..=N`, node 0 aligned with the current state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferencePath {
    pub points: Vec<ReferencePoint>,
}

impl ReferencePath {
    pub fn new(points: Vec<ReferencePoint>) -> Self {
        ReferencePath { points }
    }

    /// `count` points on a straight line from `(x, y)` along `yaw`.
    pub fn straight(x: f64, y: f64, yaw: f64, spacing: f64, count: usize, half_width: f64) -> Self {
        let (sin, cos) = yaw.sin_cos();
        let points = (0..count)
            .map(|i| {
                let s = i as f64 * spacing;
                ReferencePoint {
                    x: x + s * cos,
                    y: y + s * sin,
                    yaw,
                    curvature: 0.0,
                    half_width,
                }
            })
            .collect();
        ReferencePath { points }
    }

    /// `count` points on a circle of `radius` about `(cx, cy)`, starting at
    /// polar angle `start_angle` and spaced `spacing` metres of arc apart.
    /// Counter-clockwise when `left` is set.
    pub fn arc(
        cx: f64,
        cy: f64,
        radius: f64,
        start_angle: f64,
        spacing: f64,
        count: usize,
        half_width: f64,
        left: bool,
    ) -> Self {
        let direction = if left { 1.0 } else { -1.0 };
        let points = (0..count)
            .map(|i| {
                let theta = start_angle + direction * i as f64 * spacing / radius;
                ReferencePoint {
                    x: cx + radius * theta.cos(),
                    y: cy + radius * theta.sin(),
                    yaw: theta + direction * FRAC_PI_2,
                    curvature: direction / radius,
                    half_width,
                }
            })
            .collect();
        ReferencePath { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Straight-line distance between nodes `k` and `k + 1`.
    pub fn spacing(&self, k: usize) -> f64 {
        let (a, b) = (&self.points[k], &self.points[k + 1]);
        (b.x - a.x).hypot(b.y - a.y)
    }

    pub fn validate(&self, horizon: usize) -> Result<(), MpcError> {
        if self.points.len() != horizon + 1 {
            return Err(MpcError::HorizonMismatch {
                what: "reference",
                expected: horizon + 1,
                got: self.points.len(),
            });
        }
        for (k, p) in self.points.iter().enumerate() {
            let finite = [p.x, p.y, p.yaw, p.curvature, p.half_width]
                .iter()
                .all(|v| v.is_finite());
            if !finite || p.half_width <= 0.0 {
                return Err(MpcError::InvalidInput(format!(
                    "reference point {k} is malformed: {p:?}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_errors_in_path_frame() {
        let point = ReferencePoint {
            x: 1.0,
            y: 1.0,
            yaw: FRAC_PI_2,
            curvature: 0.0,
            half_width: 2.0,
        };
        // facing +y: a point to the -x side is to the left
        let (contour, lag) = point.errors(0.0, 3.0);
        assert!((contour - 1.0).abs() < 1e-12);
        assert!((lag - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_arc_geometry() {
        let path = ReferencePath::arc(0.0, 0.0, 50.0, -FRAC_PI_2, 5.0, 11, 4.0, true);
        assert_eq!(path.len(), 11);
        let first = path.points[0];
        assert!((first.x).abs() < 1e-12 && (first.y + 50.0).abs() < 1e-12);
        assert!(first.yaw.abs() < 1e-12, "heading {}", first.yaw);
        for p in &path.points {
            assert!((p.x.hypot(p.y) - 50.0).abs() < 1e-9);
            assert_eq!(p.curvature, 1.0 / 50.0);
        }
        // chord slightly shorter than the arc
        assert!(path.spacing(0) < 5.0 && path.spacing(0) > 4.99);
    }

    #[test]
    fn test_clockwise_arc_turns_right() {
        let path = ReferencePath::arc(0.0, 0.0, 20.0, PI / 2.0, 2.0, 3, 1.0, false);
        assert!(path.points[0].curvature < 0.0);
        assert!((path.points[0].yaw).abs() < 1e-12);
        assert!(path.points[1].x > 0.0);
    }

    #[test]
    fn test_validate_length_and_width() {
        let path = ReferencePath::straight(0.0, 0.0, 0.0, 1.0, 4, 1.0);
        assert!(path.validate(3).is_ok());
        assert!(matches!(
            path.validate(5),
            Err(MpcError::HorizonMismatch { expected: 6, got: 4, .. })
        ));

        let mut path = path;
        path.points[2].half_width = 0.0;
        assert!(matches!(path.validate(3), Err(MpcError::InvalidInput(_))));
    }
}
