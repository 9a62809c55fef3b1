use super::point::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Axis-aligned bounding box in patient coordinates.
///
/// A box always holds real extents (`min <= max` on every axis). An unset box
/// is `None`; [`BoundingBox::from_extents`] returns `None` when there was
/// nothing to enclose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    min: Point3,
    max: Point3,
}

/// Anything a bounding box can be grown to enclose.
#[derive(Debug, Clone, PartialEq)]
pub enum Extent {
    Point(Point3),
    Box(BoundingBox),
    Many(Vec<Extent>),
}

impl From<Point3> for Extent {
    fn from(p: Point3) -> Self {
        Extent::Point(p)
    }
}

impl From<BoundingBox> for Extent {
    fn from(b: BoundingBox) -> Self {
        Extent::Box(b)
    }
}

impl<T: Into<Extent>> From<Vec<T>> for Extent {
    fn from(items: Vec<T>) -> Self {
        Extent::Many(items.into_iter().map(Into::into).collect())
    }
}

/// Which end of an axis to operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Lower,
    Upper,
}

impl BoundingBox {
    /// Box spanning two corners given in any order.
    pub fn new(a: Point3, b: Point3) -> Self {
        Self {
            min: a.component_min(&b),
            max: a.component_max(&b),
        }
    }

    pub fn from_point(p: Point3) -> Self {
        Self { min: p, max: p }
    }

    /// Smallest box enclosing every point and box in `extents`, flattening
    /// nested collections.
    pub fn from_extents<I, T>(extents: I) -> Option<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<Extent>,
    {
        extents.into_iter().fold(None, |acc: Option<BoundingBox>, item| {
            let extent = item.into();
            match acc {
                Some(mut b) => {
                    b.include(&extent);
                    Some(b)
                }
                None => Self::from_extent(&extent),
            }
        })
    }

    fn from_extent(extent: &Extent) -> Option<Self> {
        match extent {
            Extent::Point(p) => Some(Self::from_point(*p)),
            Extent::Box(b) => Some(*b),
            Extent::Many(items) => Self::from_extents(items.iter().cloned()),
        }
    }

    /// Grow this box to enclose `extent`.
    pub fn include(&mut self, extent: &Extent) {
        match extent {
            Extent::Point(p) => {
                self.min = self.min.component_min(p);
                self.max = self.max.component_max(p);
            }
            Extent::Box(b) => {
                self.min = self.min.component_min(&b.min);
                self.max = self.max.component_max(&b.max);
            }
            Extent::Many(items) => {
                for item in items {
                    self.include(item);
                }
            }
        }
    }

    pub fn min(&self) -> Point3 {
        self.min
    }

    pub fn max(&self) -> Point3 {
        self.max
    }

    /// Alias of [`BoundingBox::min`].
    pub fn lower(&self) -> Point3 {
        self.min
    }

    /// Alias of [`BoundingBox::max`].
    pub fn upper(&self) -> Point3 {
        self.max
    }

    pub fn size(&self) -> Point3 {
        self.max - self.min
    }

    pub fn center(&self) -> Point3 {
        (self.min + self.max) / 2.0
    }

    pub fn contains(&self, p: &Point3) -> bool {
        self.min.all_le(p) && p.all_le(&self.max)
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.all_le(&other.max) && other.min.all_le(&self.max)
    }

    /// Copy one bound of one axis from `other`.
    ///
    /// Used after a union to stop the result bleeding past `other` along
    /// that axis.
    pub fn limit(&mut self, axis: usize, bound: Bound, other: &BoundingBox) {
        let (target, source) = match bound {
            Bound::Lower => (&mut self.min, other.min),
            Bound::Upper => (&mut self.max, other.max),
        };
        match axis {
            0 => target.set_x(source.x()),
            1 => target.set_y(source.y()),
            2 => target.set_z(source.z()),
            _ => {
                log::warn!("Ignoring limit on unknown axis {}", axis);
                return;
            }
        }
        // Keep min <= max if the limit crossed the opposite bound
        let (min, max) = (self.min, self.max);
        self.min = min.component_min(&max);
        self.max = min.component_max(&max);
    }

    /// Clamp the superior/inferior extent to `other`. The lower z bound is
    /// always limited; the upper one only when `keep_upper` is false.
    pub fn limit_z(&mut self, other: &BoundingBox, keep_upper: bool) {
        self.limit(2, Bound::Lower, other);
        if !keep_upper {
            self.limit(2, Bound::Upper, other);
        }
    }

    /// Size and centre for creating a box solid, grown by `margin` on every
    /// side.
    pub fn box_geometry_params(&self, margin: f64) -> BoxGeometry {
        BoxGeometry {
            size: self.size() + 2.0 * margin,
            center: self.center(),
        }
    }
}

/// Parameters of an axis-aligned box solid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxGeometry {
    pub size: Point3,
    pub center: Point3,
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} - {}]", self.min, self.max)
    }
}

impl<T: Into<Extent>> Add<T> for BoundingBox {
    type Output = BoundingBox;

    fn add(mut self, rhs: T) -> BoundingBox {
        self += rhs;
        self
    }
}

impl<T: Into<Extent>> AddAssign<T> for BoundingBox {
    fn add_assign(&mut self, rhs: T) {
        self.include(&rhs.into());
    }
}
