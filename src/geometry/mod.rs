// Value types shared by the proxy builder, the engine and the mesh provider

pub mod bounding_box;
pub mod point;
pub mod transform;

pub use bounding_box::{Bound, BoundingBox, BoxGeometry, Extent};
pub use point::{round_to_precision, Point3, PRECISION};
pub use transform::{AffineTransform, RotationAxis, RotationOrder};

/// Raw mesh vertex, not rounded.
pub type Vertex = nalgebra::Point3<f64>;

/// Raw mesh direction.
pub type Vector3D = nalgebra::Vector3<f64>;

/// Wrap an angle in degrees into `[-180, 180)`.
pub fn wrap_degrees(angle: f64) -> f64 {
    (angle + 180.0).rem_euclid(360.0) - 180.0
}

/// Wrap an angle in degrees into `[0, 360)`.
pub fn wrap_degrees_positive(angle: f64) -> f64 {
    angle.rem_euclid(360.0)
}
