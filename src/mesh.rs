use crate::geometry::{AffineTransform, BoundingBox, Point3, Vector3D, Vertex};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("Failed to load mesh: {0}")]
    LoadError(String),

    #[error("Invalid mesh format")]
    InvalidFormat,

    #[error("Empty mesh")]
    EmptyMesh,
}

/// Triangle defined by three vertices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub v0: Vertex,
    pub v1: Vertex,
    pub v2: Vertex,
}

impl Triangle {
    pub fn new(v0: Vertex, v1: Vertex, v2: Vertex) -> Self {
        Self { v0, v1, v2 }
    }

    pub fn vertices(&self) -> [Vertex; 3] {
        [self.v0, self.v1, self.v2]
    }

    /// Unit normal, or (0, 0, 1) for degenerate triangles
    pub fn normal(&self) -> Vector3D {
        let cross = (self.v1 - self.v0).cross(&(self.v2 - self.v0));
        let norm = cross.norm();

        if norm < 1e-10 || !norm.is_finite() {
            return Vector3D::new(0.0, 0.0, 1.0);
        }

        cross / norm
    }

    pub fn area(&self) -> f64 {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0)).norm() / 2.0
    }

    fn bounds(&self) -> (Vertex, Vertex) {
        let mut min = self.v0;
        let mut max = self.v0;
        for v in [self.v1, self.v2] {
            min = min.inf(&v);
            max = max.sup(&v);
        }
        (min, max)
    }

    fn to_parry(self) -> parry3d::shape::Triangle {
        let p = |v: Vertex| parry3d::math::Point::new(v.x as f32, v.y as f32, v.z as f32);
        parry3d::shape::Triangle::new(p(self.v0), p(self.v1), p(self.v2))
    }
}

/// Unit of the coordinates stored in a mesh file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MeshUnit {
    Millimeter,
    #[default]
    Centimeter,
    Meter,
}

impl MeshUnit {
    /// Factor taking file coordinates to centimetres.
    pub fn to_centimeters(&self) -> f64 {
        match self {
            MeshUnit::Millimeter => 0.1,
            MeshUnit::Centimeter => 1.0,
            MeshUnit::Meter => 100.0,
        }
    }
}

/// 3D triangular mesh
#[derive(Debug, Clone)]
pub struct Mesh {
    pub triangles: Vec<Triangle>,
    pub bounds_min: Vertex,
    pub bounds_max: Vertex,
}

impl Mesh {
    /// Create a new mesh from triangles
    pub fn new(triangles: Vec<Triangle>) -> Result<Self, MeshError> {
        if triangles.is_empty() {
            return Err(MeshError::EmptyMesh);
        }

        let (bounds_min, bounds_max) = Self::compute_bounds(&triangles);

        Ok(Self {
            triangles,
            bounds_min,
            bounds_max,
        })
    }

    /// Load mesh from STL file, scaling file coordinates into centimetres
    pub fn from_stl<P: AsRef<Path>>(path: P, unit: MeshUnit) -> Result<Self, MeshError> {
        let mut file = std::fs::File::open(path.as_ref())
            .map_err(|e| MeshError::LoadError(format!("{}: {}", path.as_ref().display(), e)))?;

        let stl = stl_io::read_stl(&mut file)
            .map_err(|e| MeshError::LoadError(e.to_string()))?;

        let scale = unit.to_centimeters();
        let vertex = |index: usize| -> Result<Vertex, MeshError> {
            let v = stl.vertices.get(index).ok_or(MeshError::InvalidFormat)?;
            Ok(Vertex::new(
                v[0] as f64 * scale,
                v[1] as f64 * scale,
                v[2] as f64 * scale,
            ))
        };

        let triangles = stl
            .faces
            .iter()
            .map(|face| {
                Ok(Triangle::new(
                    vertex(face.vertices[0])?,
                    vertex(face.vertices[1])?,
                    vertex(face.vertices[2])?,
                ))
            })
            .collect::<Result<Vec<_>, MeshError>>()?;

        Self::new(triangles)
    }

    /// Axis-aligned box between two corners, as twelve outward-facing triangles
    pub fn cuboid(min: Vertex, max: Vertex) -> Result<Self, MeshError> {
        let c = |x: bool, y: bool, z: bool| {
            Vertex::new(
                if x { max.x } else { min.x },
                if y { max.y } else { min.y },
                if z { max.z } else { min.z },
            )
        };
        let quads = [
            [c(false, false, false), c(false, true, false), c(true, true, false), c(true, false, false)],
            [c(false, false, true), c(true, false, true), c(true, true, true), c(false, true, true)],
            [c(false, false, false), c(true, false, false), c(true, false, true), c(false, false, true)],
            [c(false, true, false), c(false, true, true), c(true, true, true), c(true, true, false)],
            [c(false, false, false), c(false, false, true), c(false, true, true), c(false, true, false)],
            [c(true, false, false), c(true, true, false), c(true, true, true), c(true, false, true)],
        ];
        let triangles = quads
            .iter()
            .flat_map(|q| [Triangle::new(q[0], q[1], q[2]), Triangle::new(q[0], q[2], q[3])])
            .collect();
        Self::new(triangles)
    }

    /// Write as binary STL, in centimetres
    pub fn write_stl<P: AsRef<Path>>(&self, path: P) -> Result<(), MeshError> {
        let mut file = std::fs::File::create(path.as_ref())
            .map_err(|e| MeshError::LoadError(e.to_string()))?;
        let to_f32 = |v: Vertex| stl_io::Vertex::new([v.x as f32, v.y as f32, v.z as f32]);
        let triangles = self.triangles.iter().map(|tri| {
            let n = tri.normal();
            stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [to_f32(tri.v0), to_f32(tri.v1), to_f32(tri.v2)],
            }
        });
        stl_io::write_stl(&mut file, triangles).map_err(|e| MeshError::LoadError(e.to_string()))
    }

    /// Compute bounding box of triangles
    fn compute_bounds(triangles: &[Triangle]) -> (Vertex, Vertex) {
        let mut min = Vertex::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Vertex::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);

        for tri in triangles {
            let (lo, hi) = tri.bounds();
            min = min.inf(&lo);
            max = max.sup(&hi);
        }

        (min, max)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(Point3::from(self.bounds_min), Point3::from(self.bounds_max))
    }

    /// Copy of the mesh placed by `transform`
    pub fn transformed(&self, transform: &AffineTransform) -> Self {
        let matrix = transform.matrix();
        let triangles: Vec<Triangle> = self
            .triangles
            .iter()
            .map(|tri| {
                Triangle::new(
                    matrix.transform_point(&tri.v0),
                    matrix.transform_point(&tri.v1),
                    matrix.transform_point(&tri.v2),
                )
            })
            .collect();
        let (bounds_min, bounds_max) = Self::compute_bounds(&triangles);
        Self {
            triangles,
            bounds_min,
            bounds_max,
        }
    }

    /// Grow the surface outward by `margin` centimetres.
    ///
    /// Each vertex moves along the mean of the distinct face normals around
    /// it, far enough that every adjacent face plane moves by `margin`.
    /// Coincident vertices of neighbouring triangles move together so the
    /// surface stays closed.
    pub fn expanded(&self, margin: f64) -> Self {
        if margin == 0.0 {
            return self.clone();
        }

        let mut face_normals: HashMap<Point3, Vec<Vector3D>> = HashMap::new();
        for tri in &self.triangles {
            let n = tri.normal();
            for v in tri.vertices() {
                let around = face_normals.entry(Point3::from(v)).or_default();
                if !around.iter().any(|m| (m - n).norm() < 1e-6) {
                    around.push(n);
                }
            }
        }

        let offset = |v: Vertex| -> Vertex {
            let Some(around) = face_normals.get(&Point3::from(v)) else {
                return v;
            };
            let sum: Vector3D = around.iter().sum();
            if sum.norm() < 1e-12 {
                return v;
            }
            let direction = sum.normalize();
            // Limit the stretch at very sharp vertices
            let min_dot = around
                .iter()
                .map(|n| n.dot(&direction))
                .fold(1.0, f64::min)
                .max(0.25);
            v + direction * (margin / min_dot)
        };

        let triangles: Vec<Triangle> = self
            .triangles
            .iter()
            .map(|tri| Triangle::new(offset(tri.v0), offset(tri.v1), offset(tri.v2)))
            .collect();
        let (bounds_min, bounds_max) = Self::compute_bounds(&triangles);
        Self {
            triangles,
            bounds_min,
            bounds_max,
        }
    }

    fn aabb_overlaps(&self, min: &Vertex, max: &Vertex) -> bool {
        self.bounds_max.x >= min.x
            && self.bounds_min.x <= max.x
            && self.bounds_max.y >= min.y
            && self.bounds_min.y <= max.y
            && self.bounds_max.z >= min.z
            && self.bounds_min.z <= max.z
    }

    /// Whether `point` lies inside this (closed) mesh, by ray parity.
    pub fn contains_point(&self, point: &Vertex) -> bool {
        use parry3d::query::{Ray, RayCast};

        if point.x < self.bounds_min.x
            || point.x > self.bounds_max.x
            || point.y < self.bounds_min.y
            || point.y > self.bounds_max.y
            || point.z < self.bounds_min.z
            || point.z > self.bounds_max.z
        {
            return false;
        }

        // Slightly skewed direction keeps the ray off shared edges of
        // axis-aligned faces
        let ray = Ray::new(
            parry3d::math::Point::new(point.x as f32, point.y as f32, point.z as f32),
            parry3d::math::Vector::new(1.0, 0.000_731, 0.000_419),
        );

        let crossings = self
            .triangles
            .iter()
            .filter(|tri| tri.to_parry().cast_local_ray(&ray, f32::MAX, false).is_some())
            .count();

        crossings % 2 == 1
    }

    /// Triangles of `self` touching any triangle of `other`.
    ///
    /// Uses parry3d triangle-triangle tests with a per-triangle AABB
    /// pre-filter, in parallel over `self`.
    pub fn contact_triangles(&self, other: &Mesh) -> Vec<Triangle> {
        use parry3d::math::Isometry;
        use parry3d::query::intersection_test;

        if !self.aabb_overlaps(&other.bounds_min, &other.bounds_max) {
            return Vec::new();
        }

        let iso = Isometry::identity();
        let others: Vec<(Vertex, Vertex, parry3d::shape::Triangle)> = other
            .triangles
            .iter()
            .map(|t| {
                let (lo, hi) = t.bounds();
                (lo, hi, t.to_parry())
            })
            .collect();

        self.triangles
            .par_iter()
            .filter(|tri| {
                let (lo, hi) = tri.bounds();
                if !other.aabb_overlaps(&lo, &hi) {
                    return false;
                }
                let ours = tri.to_parry();
                others.iter().any(|(olo, ohi, theirs)| {
                    let disjoint = hi.x < olo.x
                        || lo.x > ohi.x
                        || hi.y < olo.y
                        || lo.y > ohi.y
                        || hi.z < olo.z
                        || lo.z > ohi.z;
                    !disjoint && intersection_test(&iso, &ours, &iso, theirs).unwrap_or(false)
                })
            })
            .copied()
            .collect()
    }

    /// Approximate common region of two closed meshes: the touching
    /// surface patches of both, or the whole of one if it lies entirely
    /// within the other. Empty when the solids are disjoint.
    pub fn common_surface(&self, other: &Mesh) -> Vec<Triangle> {
        let mut out = self.contact_triangles(other);
        if !out.is_empty() {
            out.extend(other.contact_triangles(self));
            return out;
        }

        if other.contains_point(&self.triangles[0].v0) {
            return self.triangles.clone();
        }
        if self.contains_point(&other.triangles[0].v0) {
            return other.triangles.clone();
        }
        Vec::new()
    }

    /// Concatenate meshes without merging.
    pub fn union_of(meshes: &[&Mesh]) -> Result<Self, MeshError> {
        let triangles: Vec<Triangle> = meshes
            .iter()
            .flat_map(|m| m.triangles.iter().copied())
            .collect();
        Self::new(triangles)
    }

    /// Number of triangles in mesh
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }
}
