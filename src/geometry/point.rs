use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, AddAssign, Div, DivAssign, Index, Mul, MulAssign, Neg, Sub, SubAssign};

/// Decimal places kept after every arithmetic operation.
pub const PRECISION: i32 = 2;

/// Round to [`PRECISION`] decimal places, mapping -0 to 0.
pub fn round_to_precision(value: f64) -> f64 {
    let scale = 10f64.powi(PRECISION);
    let rounded = (value * scale).round() / scale;
    // Avoid "-0.00" in names and keys
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// A point (or direction) in patient coordinates, in centimetres.
///
/// Coordinates are rounded to [`PRECISION`] decimal places whenever the point
/// is built or changed, so two points that print the same also compare and
/// hash the same.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(from = "RawPoint", into = "RawPoint")]
pub struct Point3 {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Serialize, Deserialize)]
struct RawPoint {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    z: f64,
}

impl From<RawPoint> for Point3 {
    fn from(raw: RawPoint) -> Self {
        Point3::new(raw.x, raw.y, raw.z)
    }
}

impl From<Point3> for RawPoint {
    fn from(p: Point3) -> Self {
        RawPoint { x: p.x, y: p.y, z: p.z }
    }
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: round_to_precision(x),
            y: round_to_precision(y),
            z: round_to_precision(z),
        }
    }

    pub fn origin() -> Self {
        Self::default()
    }

    /// Unit mask along X.
    pub fn unit_x() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    /// Unit mask along Y.
    pub fn unit_y() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }

    /// Unit mask along Z.
    pub fn unit_z() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    pub fn set_x(&mut self, value: f64) {
        self.x = round_to_precision(value);
    }

    pub fn set_y(&mut self, value: f64) {
        self.y = round_to_precision(value);
    }

    pub fn set_z(&mut self, value: f64) {
        self.z = round_to_precision(value);
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn coords(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.x), f(self.y), f(self.z))
    }

    fn zip(self, other: Self, f: impl Fn(f64, f64) -> f64) -> Self {
        Self::new(f(self.x, other.x), f(self.y, other.y), f(self.z, other.z))
    }

    pub fn magnitude(&self) -> f64 {
        round_to_precision(self.coords().norm())
    }

    /// Unit vector in the same direction. A zero vector stays zero.
    pub fn normalized(&self) -> Self {
        let norm = self.coords().norm();
        if norm == 0.0 {
            return *self;
        }
        self.map(|c| c / norm)
    }

    pub fn normalize(&mut self) {
        *self = self.normalized();
    }

    /// Component-wise reciprocal.
    ///
    /// If any component is zero the whole point is replaced by its boolean
    /// complement: zero components become 1 and the others 0. Inverting a
    /// unit-axis mask therefore yields the mask of the remaining axes.
    pub fn recip(&self) -> Self {
        if self.to_array().iter().any(|c| *c == 0.0) {
            return self.map(|c| if c == 0.0 { 1.0 } else { 0.0 });
        }
        self.map(|c| 1.0 / c)
    }

    /// Component-wise product.
    pub fn scale_by(&self, other: &Point3) -> Self {
        self.zip(*other, |a, b| a * b)
    }

    /// Component-wise quotient, dividing through [`Point3::recip`].
    pub fn divide_by(&self, other: &Point3) -> Self {
        self.scale_by(&other.recip())
    }

    /// Strictly less in every component.
    pub fn all_lt(&self, other: &Point3) -> bool {
        self.x < other.x && self.y < other.y && self.z < other.z
    }

    /// Less than or equal in every component.
    pub fn all_le(&self, other: &Point3) -> bool {
        self.x <= other.x && self.y <= other.y && self.z <= other.z
    }

    pub fn component_min(&self, other: &Point3) -> Self {
        self.zip(*other, f64::min)
    }

    pub fn component_max(&self, other: &Point3) -> Self {
        self.zip(*other, f64::max)
    }

    pub fn floor(&self) -> Self {
        self.map(f64::floor)
    }

    fn key(&self) -> [i64; 3] {
        let scale = 10f64.powi(PRECISION);
        [
            (self.x * scale).round() as i64,
            (self.y * scale).round() as i64,
            (self.z * scale).round() as i64,
        ]
    }
}

impl PartialEq for Point3 {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Point3 {}

impl Hash for Point3 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl Index<usize> for Point3 {
    type Output = f64;

    fn index(&self, axis: usize) -> &f64 {
        match axis {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Point3 axis out of range: {}", axis),
        }
    }
}

impl From<Vector3<f64>> for Point3 {
    fn from(v: Vector3<f64>) -> Self {
        Point3::new(v.x, v.y, v.z)
    }
}

impl From<nalgebra::Point3<f64>> for Point3 {
    fn from(p: nalgebra::Point3<f64>) -> Self {
        Point3::new(p.x, p.y, p.z)
    }
}

impl From<[f64; 3]> for Point3 {
    fn from(a: [f64; 3]) -> Self {
        Point3::new(a[0], a[1], a[2])
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

impl Add for Point3 {
    type Output = Point3;

    fn add(self, rhs: Point3) -> Point3 {
        self.zip(rhs, |a, b| a + b)
    }
}

impl Add<f64> for Point3 {
    type Output = Point3;

    fn add(self, rhs: f64) -> Point3 {
        self.map(|c| c + rhs)
    }
}

impl Sub for Point3 {
    type Output = Point3;

    fn sub(self, rhs: Point3) -> Point3 {
        self + (-rhs)
    }
}

impl Sub<f64> for Point3 {
    type Output = Point3;

    fn sub(self, rhs: f64) -> Point3 {
        self + (-rhs)
    }
}

impl Neg for Point3 {
    type Output = Point3;

    fn neg(self) -> Point3 {
        self.map(|c| -c)
    }
}

impl Mul<f64> for Point3 {
    type Output = Point3;

    fn mul(self, rhs: f64) -> Point3 {
        self.map(|c| c * rhs)
    }
}

impl Mul for Point3 {
    type Output = Point3;

    fn mul(self, rhs: Point3) -> Point3 {
        self.scale_by(&rhs)
    }
}

impl Div<f64> for Point3 {
    type Output = Point3;

    fn div(self, rhs: f64) -> Point3 {
        self.map(|c| c / rhs)
    }
}

impl Div for Point3 {
    type Output = Point3;

    fn div(self, rhs: Point3) -> Point3 {
        self.divide_by(&rhs)
    }
}

impl AddAssign for Point3 {
    fn add_assign(&mut self, rhs: Point3) {
        *self = *self + rhs;
    }
}

impl SubAssign for Point3 {
    fn sub_assign(&mut self, rhs: Point3) {
        *self = *self - rhs;
    }
}

impl MulAssign<f64> for Point3 {
    fn mul_assign(&mut self, rhs: f64) {
        *self = *self * rhs;
    }
}

impl MulAssign for Point3 {
    fn mul_assign(&mut self, rhs: Point3) {
        *self = *self * rhs;
    }
}

impl DivAssign<f64> for Point3 {
    fn div_assign(&mut self, rhs: f64) {
        *self = *self / rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rounding_on_construction() {
        let p = Point3::new(1.004, -2.006, 0.1 + 0.2);
        assert_eq!(p.x(), 1.0);
        assert_eq!(p.y(), -2.01);
        assert_eq!(p.z(), 0.3);
    }

    #[test]
    fn test_arithmetic_rounds_noise() {
        let a = Point3::new(0.1, 0.2, 0.3);
        let b = a * 3.0 - Point3::new(0.3, 0.6, 0.9);
        assert_eq!(b, Point3::origin());
        assert_eq!(format!("{}", b), "(0.00, 0.00, 0.00)");
    }

    #[test]
    fn test_equality_and_hash_are_structural() {
        let mut set = HashSet::new();
        set.insert(Point3::new(1.0, 2.0, 3.0));
        set.insert(Point3::new(1.001, 2.0, 3.0));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_recip_of_mask_is_complement() {
        let mask = Point3::unit_y();
        assert_eq!(mask.recip(), Point3::new(1.0, 0.0, 1.0));

        let p = Point3::new(2.0, 4.0, -5.0);
        assert_eq!(p.recip(), Point3::new(0.5, 0.25, -0.2));
    }

    #[test]
    fn test_mask_recombination() {
        let corner = Point3::new(-25.0, 10.0, 3.0);
        let search = Point3::new(1.0, 2.0, 7.5);
        let mask = Point3::unit_y();
        let combined = corner * mask + search * mask.recip();
        assert_eq!(combined, Point3::new(1.0, 10.0, 7.5));
    }

    #[test]
    fn test_magnitude_and_normalize() {
        let p = Point3::new(3.0, 0.0, 4.0);
        assert_eq!(p.magnitude(), 5.0);
        assert_eq!(p.normalized(), Point3::new(0.6, 0.0, 0.8));
        assert_eq!(Point3::origin().normalized(), Point3::origin());
    }

    #[test]
    fn test_elementwise_comparison() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 1.0, 0.0);
        assert!(!a.all_lt(&b));
        assert!(a.all_le(&b));
        assert!(a.all_lt(&Point3::new(1.0, 1.0, 1.0)));
    }

    #[test]
    fn test_deserialize_missing_axes_default_to_zero() {
        let p: Point3 = serde_json::from_str(r#"{"x": 1.234, "z": 2}"#).unwrap();
        assert_eq!(p, Point3::new(1.23, 0.0, 2.0));
    }
}
