use super::point::Point3;
use nalgebra::{Matrix3, Matrix4, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three rotation axes of a placement.
///
/// Pitch turns about the patient left-right axis (x), yaw about the
/// anterior-posterior axis (y, couch rotation) and roll about the
/// superior-inferior axis (z, gantry rotation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationAxis {
    Pitch,
    Yaw,
    Roll,
}

impl RotationAxis {
    fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pitch" => Some(RotationAxis::Pitch),
            "yaw" => Some(RotationAxis::Yaw),
            "roll" => Some(RotationAxis::Roll),
            _ => None,
        }
    }

    fn unit(&self) -> nalgebra::Unit<Vector3<f64>> {
        match self {
            RotationAxis::Pitch => Vector3::x_axis(),
            RotationAxis::Yaw => Vector3::y_axis(),
            RotationAxis::Roll => Vector3::z_axis(),
        }
    }
}

/// Order in which the per-axis rotations are applied, first to last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationOrder([RotationAxis; 3]);

impl Default for RotationOrder {
    fn default() -> Self {
        RotationOrder([RotationAxis::Pitch, RotationAxis::Yaw, RotationAxis::Roll])
    }
}

impl RotationOrder {
    /// Beam-angle convention: gantry (roll), then couch (yaw), then pitch.
    pub const GANTRY: RotationOrder =
        RotationOrder([RotationAxis::Roll, RotationAxis::Yaw, RotationAxis::Pitch]);

    /// Build from an explicit permutation. Anything that is not a
    /// permutation of the three axes yields the default order.
    pub fn new(axes: [RotationAxis; 3]) -> Self {
        let distinct = axes[0] != axes[1] && axes[1] != axes[2] && axes[0] != axes[2];
        if distinct {
            RotationOrder(axes)
        } else {
            log::debug!("Rotation order {:?} is not a permutation, using default", axes);
            RotationOrder::default()
        }
    }

    /// Parse `"gantry"` or a comma/space separated permutation such as
    /// `"roll, yaw, pitch"`. Unrecognised text falls back to the default
    /// `pitch, yaw, roll` order so matrix construction never fails.
    pub fn parse(text: &str) -> Self {
        if text.trim().eq_ignore_ascii_case("gantry") {
            return RotationOrder::GANTRY;
        }

        let axes: Vec<RotationAxis> = text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .filter_map(RotationAxis::parse)
            .collect();

        match axes.as_slice() {
            [a, b, c] => RotationOrder::new([*a, *b, *c]),
            _ => {
                log::debug!("Unrecognised rotation order '{}', using default", text);
                RotationOrder::default()
            }
        }
    }

    pub fn axes(&self) -> [RotationAxis; 3] {
        self.0
    }
}

/// Rigid placement: rotations in degrees about the three axes plus a
/// translation in centimetres.
///
/// Every field can be changed after construction; [`AffineTransform::matrix`]
/// is rebuilt from the current values on each call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub translation: Point3,
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
    pub order: RotationOrder,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self {
            translation: Point3::origin(),
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
            order: RotationOrder::default(),
        }
    }
}

impl AffineTransform {
    pub fn from_translation(translation: Point3) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    /// Placement of a gantry proxy: gantry angle as roll, couch angle as yaw.
    pub fn gantry(isocenter: Point3, gantry_angle: f64, couch_angle: f64) -> Self {
        Self {
            translation: isocenter,
            roll: gantry_angle,
            yaw: couch_angle,
            order: RotationOrder::GANTRY,
            ..Self::default()
        }
    }

    fn angle(&self, axis: RotationAxis) -> f64 {
        match axis {
            RotationAxis::Pitch => self.pitch,
            RotationAxis::Yaw => self.yaw,
            RotationAxis::Roll => self.roll,
        }
    }

    /// Rotation part. The first axis of the order is applied first, so the
    /// product is composed right to left.
    pub fn rotation(&self) -> Matrix3<f64> {
        self.order.axes().iter().fold(Matrix3::identity(), |acc, axis| {
            let r = Rotation3::from_axis_angle(&axis.unit(), self.angle(*axis).to_radians());
            r.matrix() * acc
        })
    }

    /// 4x4 homogeneous matrix with the translation in the last column.
    pub fn matrix(&self) -> Matrix4<f64> {
        let mut m = self.rotation().to_homogeneous();
        m[(0, 3)] = self.translation.x();
        m[(1, 3)] = self.translation.y();
        m[(2, 3)] = self.translation.z();
        m
    }

    /// Row-major copy of [`AffineTransform::matrix`], the layout host import
    /// calls expect (M11, M12, ... M44).
    pub fn row_major(&self) -> [f64; 16] {
        let m = self.matrix();
        let mut out = [0.0; 16];
        for row in 0..4 {
            for col in 0..4 {
                out[row * 4 + col] = m[(row, col)];
            }
        }
        out
    }

    /// Apply to a raw vertex without rounding.
    pub fn apply(&self, p: &nalgebra::Point3<f64>) -> nalgebra::Point3<f64> {
        self.matrix().transform_point(p)
    }

    pub fn transform_point(&self, p: &Point3) -> Point3 {
        Point3::from(self.apply(&nalgebra::Point3::from(p.coords())))
    }
}

impl fmt::Display for AffineTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T{} pitch={:.1} yaw={:.1} roll={:.1} order={:?}",
            self.translation,
            self.pitch,
            self.yaw,
            self.roll,
            self.order.axes()
        )
    }
}
