//! Geometry kernel (component A): boundary containment, intersection,
//! adjacency, surrounding, ray-vs-surface hits, reflection, and uniform
//! point sampling over the four supported primitives.
//!
//! Only axis-aligned boxes/rectangles, spheres, and axis-aligned cylinders
//! are supported; there is no triangle-mesh fallback (see spec Non-goals).
//! Every predicate that participates in adjacency resolution takes an
//! explicit `clearance`/`dist_error` tolerance: this is the sole defense
//! against double-counting molecules on coincident faces.

use rand::Rng;
use rand_distr::{Distribution, Uniform};
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Default numerical tolerance, expressed as a fraction of the subvolume
/// base size by callers; geometry itself just takes whatever is passed in.
pub const DEFAULT_DIST_ERROR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    fn others(self) -> (Axis, Axis) {
        match self {
            Axis::X => (Axis::Y, Axis::Z),
            Axis::Y => (Axis::X, Axis::Z),
            Axis::Z => (Axis::X, Axis::Y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const ZERO: Point3 = Point3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Point3 { x, y, z }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn with(&self, axis: Axis, value: f64) -> Point3 {
        let mut p = *self;
        match axis {
            Axis::X => p.x = value,
            Axis::Y => p.y = value,
            Axis::Z => p.z = value,
        }
        p
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn dot(&self, other: Point3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn normalized(&self) -> Point3 {
        let n = self.norm();
        if n == 0.0 {
            *self
        } else {
            *self * (1.0 / n)
        }
    }
}

impl Add for Point3 {
    type Output = Point3;
    fn add(self, rhs: Point3) -> Point3 {
        Point3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Point3;
    fn sub(self, rhs: Point3) -> Point3 {
        Point3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Point3 {
    type Output = Point3;
    fn mul(self, s: f64) -> Point3 {
        Point3::new(self.x * s, self.y * s, self.z * s)
    }
}

/// The six faces of an axis-aligned shape, used both as `adjacent`'s return
/// value and to tag the `face_id` returned by [`line_hits_boundary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Down,
    Up,
    In,
    Out,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
            Direction::Up => Direction::Down,
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
        }
    }

    fn for_axis(axis: Axis, positive: bool) -> Direction {
        match (axis, positive) {
            (Axis::X, false) => Direction::Left,
            (Axis::X, true) => Direction::Right,
            (Axis::Y, false) => Direction::Down,
            (Axis::Y, true) => Direction::Up,
            (Axis::Z, false) => Direction::In,
            (Axis::Z, true) => Direction::Out,
        }
    }
}

/// An axis-aligned box, used internally as the common representation for
/// both `Rectangle` (zero thickness along its plane normal) and
/// `RectangularBox`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    pub fn size(&self) -> Point3 {
        self.max - self.min
    }

    pub fn volume(&self) -> f64 {
        let s = self.size();
        s.x.max(0.0) * s.y.max(0.0) * s.z.max(0.0)
    }

    /// Area of the box's cross section, for the one axis whose extent is (at
    /// most) a single point — used for rectangles, which are boxes that are
    /// flat along one axis.
    pub fn flat_axis(&self) -> Option<Axis> {
        let s = self.size();
        Axis::ALL.into_iter().find(|&a| s.get(a).abs() < 1e-15)
    }

    pub fn area(&self) -> f64 {
        match self.flat_axis() {
            Some(axis) => {
                let (a, b) = axis.others();
                self.size().get(a) * self.size().get(b)
            }
            None => {
                // surface area of a full box, used for 3D surface regions.
                let s = self.size();
                2.0 * (s.x * s.y + s.y * s.z + s.x * s.z)
            }
        }
    }

    fn shrink(&self, clearance: f64) -> Aabb {
        Aabb {
            min: self.min + Point3::new(clearance, clearance, clearance),
            max: self.max - Point3::new(clearance, clearance, clearance),
        }
    }
}

/// Tagged shape variant. `Rectangle` and `RectangularBox` share an
/// [`Aabb`]-based representation because geometrically a rectangle is simply
/// a box with zero thickness along its plane's normal axis -- this merges
/// what would otherwise be a combinatorial explosion of box/box,
/// box/rectangle, rectangle/rectangle cases into one.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Rectangle { plane: Axis, aabb: Aabb },
    RectangularBox { aabb: Aabb },
    Sphere { center: Point3, radius: f64 },
    Cylinder { axis: Axis, anchor: Point3, radius: f64, length: f64 },
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Rectangle { .. } => "Rectangle",
            Shape::RectangularBox { .. } => "RectangularBox",
            Shape::Sphere { .. } => "Sphere",
            Shape::Cylinder { .. } => "Cylinder",
        }
    }

    pub fn aabb(&self) -> Option<Aabb> {
        match self {
            Shape::Rectangle { aabb, .. } | Shape::RectangularBox { aabb } => Some(*aabb),
            _ => None,
        }
    }

    /// Volume (3D), area (2D surface), or length (1D), as used by the
    /// chem-rxn compiler to scale order-0/order-2 rates.
    pub fn measure(&self) -> f64 {
        match self {
            Shape::Rectangle { aabb, .. } => aabb.area(),
            Shape::RectangularBox { aabb } => aabb.volume(),
            Shape::Sphere { radius, .. } => 4.0 / 3.0 * std::f64::consts::PI * radius.powi(3),
            Shape::Cylinder { radius, length, .. } => std::f64::consts::PI * radius * radius * length,
        }
    }

    fn cylinder_disk_center_at(axis: Axis, anchor: Point3, t: f64) -> Point3 {
        anchor.with(axis, anchor.get(axis) + t)
    }

    /// Axis-aligned bounding box, defined for every shape (unlike [`Shape::aabb`],
    /// which only holds for box/rectangle shapes).
    pub fn bounding_aabb(&self) -> Aabb {
        match self {
            Shape::Rectangle { aabb, .. } | Shape::RectangularBox { aabb } => *aabb,
            Shape::Sphere { center, radius } => Aabb { min: *center - Point3::new(*radius, *radius, *radius), max: *center + Point3::new(*radius, *radius, *radius) },
            Shape::Cylinder { axis, anchor, radius, length } => {
                let r = Point3::new(*radius, *radius, *radius);
                let min = (*anchor - r).with(*axis, anchor.get(*axis));
                let max = (*anchor + r).with(*axis, anchor.get(*axis) + length);
                Aabb { min, max }
            }
        }
    }
}

const OVERLAP_GRID: usize = 6;

/// Estimates the volume of `shape` that lies inside `aabb`. Exact for
/// box/rectangle shapes (direct box-box intersection); for spheres and
/// cylinders, a deterministic grid quadrature over the bounding-box overlap,
/// used by passive actors to weight partially-covered subvolumes (spec.md
/// §4.F).
pub fn shape_aabb_overlap_volume(shape: &Shape, aabb: &Aabb, dist_error: f64) -> f64 {
    let bounds = shape.bounding_aabb();
    let lo = Point3::new(bounds.min.x.max(aabb.min.x), bounds.min.y.max(aabb.min.y), bounds.min.z.max(aabb.min.z));
    let hi = Point3::new(bounds.max.x.min(aabb.max.x), bounds.max.y.min(aabb.max.y), bounds.max.z.min(aabb.max.z));
    let size = hi - lo;
    if size.x <= 0.0 || size.y <= 0.0 || size.z <= 0.0 {
        return 0.0;
    }
    let box_volume = size.x * size.y * size.z;
    if shape.aabb().is_some() {
        return box_volume;
    }
    let n = OVERLAP_GRID as f64;
    let cell = Point3::new(size.x / n, size.y / n, size.z / n);
    let mut inside = 0usize;
    for i in 0..OVERLAP_GRID {
        for j in 0..OVERLAP_GRID {
            for k in 0..OVERLAP_GRID {
                let p = Point3::new(lo.x + cell.x * (i as f64 + 0.5), lo.y + cell.y * (j as f64 + 0.5), lo.z + cell.z * (k as f64 + 0.5));
                if contains(p, shape, dist_error) {
                    inside += 1;
                }
            }
        }
    }
    (inside as f64 / (OVERLAP_GRID * OVERLAP_GRID * OVERLAP_GRID) as f64) * box_volume
}

/// `contains(point, shape)` — closed-set membership.
pub fn contains(p: Point3, shape: &Shape, dist_error: f64) -> bool {
    match shape {
        Shape::Rectangle { aabb, .. } | Shape::RectangularBox { aabb } => {
            p.x >= aabb.min.x - dist_error
                && p.x <= aabb.max.x + dist_error
                && p.y >= aabb.min.y - dist_error
                && p.y <= aabb.max.y + dist_error
                && p.z >= aabb.min.z - dist_error
                && p.z <= aabb.max.z + dist_error
        }
        Shape::Sphere { center, radius } => (p - *center).norm() <= radius + dist_error,
        Shape::Cylinder { axis, anchor, radius, length } => {
            let axial = p.get(*axis) - anchor.get(*axis);
            if axial < -dist_error || axial > length + dist_error {
                return false;
            }
            let (a1, a2) = axis.others();
            let dr = ((p.get(a1) - anchor.get(a1)).powi(2) + (p.get(a2) - anchor.get(a2)).powi(2)).sqrt();
            dr <= radius + dist_error
        }
    }
}

/// `intersects(a, b, clearance)` — true iff `a` and `b` share any point after
/// shrinking by `clearance`, and neither surrounds the other.
pub fn intersects(a: &Shape, b: &Shape, clearance: f64) -> Result<bool, GeometryError> {
    if surrounds(a, b, clearance)? || surrounds(b, a, clearance)? {
        return Ok(false);
    }
    Ok(match (a, b) {
        (Shape::Rectangle { aabb: x, .. } | Shape::RectangularBox { aabb: x }, Shape::Rectangle { aabb: y, .. } | Shape::RectangularBox { aabb: y }) => {
            aabb_overlap(x, y, clearance)
        }
        (Shape::Sphere { center, radius }, Shape::Rectangle { aabb, .. } | Shape::RectangularBox { aabb })
        | (Shape::Rectangle { aabb, .. } | Shape::RectangularBox { aabb }, Shape::Sphere { center, radius }) => {
            sphere_box_sq_dist(*center, aabb) <= (radius - clearance).max(0.0).powi(2)
        }
        (Shape::Sphere { center: c1, radius: r1 }, Shape::Sphere { center: c2, radius: r2 }) => {
            (*c1 - *c2).norm() <= r1 + r2 - clearance
        }
        (Shape::Cylinder { axis, anchor, radius, length }, Shape::Rectangle { aabb, .. } | Shape::RectangularBox { aabb })
        | (Shape::Rectangle { aabb, .. } | Shape::RectangularBox { aabb }, Shape::Cylinder { axis, anchor, radius, length }) => {
            cylinder_box_intersect(*axis, *anchor, *radius, *length, aabb, clearance)
        }
        (
            Shape::Cylinder { axis: ax1, anchor: a1, radius: r1, length: l1 },
            Shape::Cylinder { axis: ax2, anchor: a2, radius: r2, length: l2 },
        ) => {
            if ax1 != ax2 {
                return Err(GeometryError::MismatchedAxis(*ax1, *ax2));
            }
            let axis = *ax1;
            let lo1 = a1.get(axis);
            let hi1 = lo1 + l1;
            let lo2 = a2.get(axis);
            let hi2 = lo2 + l2;
            let axial_overlap = lo1.max(lo2) < hi1.min(hi2) - clearance;
            let (c1, c2) = axis.others();
            let center_dist = ((a1.get(c1) - a2.get(c1)).powi(2) + (a1.get(c2) - a2.get(c2)).powi(2)).sqrt();
            axial_overlap && center_dist <= r1 + r2 - clearance
        }
    })
}

fn aabb_overlap(a: &Aabb, b: &Aabb, clearance: f64) -> bool {
    a.min.x < b.max.x - clearance
        && b.min.x < a.max.x - clearance
        && a.min.y < b.max.y - clearance
        && b.min.y < a.max.y - clearance
        && a.min.z < b.max.z - clearance
        && b.min.z < a.max.z - clearance
}

fn sphere_box_sq_dist(center: Point3, aabb: &Aabb) -> f64 {
    let cx = center.x.clamp(aabb.min.x, aabb.max.x);
    let cy = center.y.clamp(aabb.min.y, aabb.max.y);
    let cz = center.z.clamp(aabb.min.z, aabb.max.z);
    (center - Point3::new(cx, cy, cz)).norm().powi(2)
}

fn cylinder_box_intersect(axis: Axis, anchor: Point3, radius: f64, length: f64, aabb: &Aabb, clearance: f64) -> bool {
    let axial_overlap = anchor.get(axis) < aabb.max.get(axis) - clearance
        && aabb.min.get(axis) < anchor.get(axis) + length - clearance;
    if !axial_overlap {
        return false;
    }
    let (a1, a2) = axis.others();
    // Cross-section test: circle (center, radius) vs rectangle [min,max] in
    // the (a1, a2) plane. Covers all three overlap modes: a corner of the
    // rectangle inside the circle, the circle center inside the rectangle,
    // or an edge of the rectangle crossing the circle.
    let cx = anchor.get(a1);
    let cy = anchor.get(a2);
    let nx = cx.clamp(aabb.min.get(a1), aabb.max.get(a1));
    let ny = cy.clamp(aabb.min.get(a2), aabb.max.get(a2));
    let d = ((cx - nx).powi(2) + (cy - ny).powi(2)).sqrt();
    d <= radius - clearance
}

/// `surrounds(a, b, clearance)` — "b is strictly inside a minus clearance".
pub fn surrounds(a: &Shape, b: &Shape, clearance: f64) -> Result<bool, GeometryError> {
    Ok(match (a, b) {
        (Shape::Rectangle { aabb: x, .. } | Shape::RectangularBox { aabb: x }, Shape::Rectangle { aabb: y, .. } | Shape::RectangularBox { aabb: y }) => {
            let x = x.shrink(clearance);
            x.min.x <= y.min.x && y.max.x <= x.max.x && x.min.y <= y.min.y && y.max.y <= x.max.y && x.min.z <= y.min.z && y.max.z <= x.max.z
        }
        (Shape::Sphere { center: c1, radius: r1 }, Shape::Sphere { center: c2, radius: r2 }) => {
            (*c1 - *c2).norm() + r2 <= r1 - clearance
        }
        (Shape::Sphere { center, radius }, Shape::Rectangle { aabb, .. } | Shape::RectangularBox { aabb }) => {
            box_corners(aabb).iter().all(|&corner| (corner - *center).norm() <= radius - clearance)
        }
        (Shape::Rectangle { aabb, .. } | Shape::RectangularBox { aabb }, Shape::Sphere { center, radius }) => {
            let a = aabb.shrink(clearance);
            a.min.x <= center.x - radius
                && center.x + radius <= a.max.x
                && a.min.y <= center.y - radius
                && center.y + radius <= a.max.y
                && a.min.z <= center.z - radius
                && center.z + radius <= a.max.z
        }
        (Shape::Cylinder { axis, anchor, radius, length }, Shape::Rectangle { aabb, .. } | Shape::RectangularBox { aabb }) => {
            let axial_ok = anchor.get(*axis) <= aabb.min.get(*axis) + clearance
                && aabb.max.get(*axis) <= anchor.get(*axis) + length - clearance;
            let (a1, a2) = axis.others();
            let cx = anchor.get(a1);
            let cy = anchor.get(a2);
            axial_ok
                && box_corner_coords(aabb, *axis).iter().all(|&(x, y)| ((x - cx).powi(2) + (y - cy).powi(2)).sqrt() <= radius - clearance)
        }
        (Shape::Rectangle { aabb, .. } | Shape::RectangularBox { aabb }, Shape::Cylinder { axis, anchor, radius, length }) => {
            let a = aabb.shrink(clearance);
            let axial_ok = a.min.get(*axis) <= anchor.get(*axis) && anchor.get(*axis) + length <= a.max.get(*axis);
            let (a1, a2) = axis.others();
            axial_ok
                && anchor.get(a1) - radius >= a.min.get(a1)
                && anchor.get(a1) + radius <= a.max.get(a1)
                && anchor.get(a2) - radius >= a.min.get(a2)
                && anchor.get(a2) + radius <= a.max.get(a2)
        }
        (
            Shape::Cylinder { axis: ax1, anchor: a1, radius: r1, length: l1 },
            Shape::Cylinder { axis: ax2, anchor: a2, radius: r2, length: l2 },
        ) => {
            if ax1 != ax2 {
                return Err(GeometryError::MismatchedAxis(*ax1, *ax2));
            }
            let axis = *ax1;
            let axial_ok = a1.get(axis) <= a2.get(axis) && a2.get(axis) + l2 <= a1.get(axis) + l1;
            let (c1, c2) = axis.others();
            let center_dist = ((a1.get(c1) - a2.get(c1)).powi(2) + (a1.get(c2) - a2.get(c2)).powi(2)).sqrt();
            axial_ok && center_dist <= r1 - r2 - clearance
        }
    })
}

fn box_corners(aabb: &Aabb) -> [Point3; 8] {
    let (min, max) = (aabb.min, aabb.max);
    [
        Point3::new(min.x, min.y, min.z),
        Point3::new(max.x, min.y, min.z),
        Point3::new(min.x, max.y, min.z),
        Point3::new(min.x, min.y, max.z),
        Point3::new(max.x, max.y, min.z),
        Point3::new(max.x, min.y, max.z),
        Point3::new(min.x, max.y, max.z),
        Point3::new(max.x, max.y, max.z),
    ]
}

fn box_corner_coords(aabb: &Aabb, axis: Axis) -> [(f64, f64); 4] {
    let (a1, a2) = axis.others();
    [
        (aabb.min.get(a1), aabb.min.get(a2)),
        (aabb.max.get(a1), aabb.min.get(a2)),
        (aabb.min.get(a1), aabb.max.get(a2)),
        (aabb.max.get(a1), aabb.max.get(a2)),
    ]
}

/// `adjacent(a, b, dist_error)` — only defined for box/box, rectangle/rectangle
/// sharing a principal plane, and cylinder/cylinder with the same
/// orientation. Intersections are explicitly not reported as adjacency.
pub fn adjacent(a: &Shape, b: &Shape, dist_error: f64) -> Result<Option<Direction>, GeometryError> {
    if intersects(a, b, -dist_error)? {
        return Ok(None);
    }
    Ok(match (a, b) {
        (Shape::Rectangle { aabb: x, .. } | Shape::RectangularBox { aabb: x }, Shape::Rectangle { aabb: y, .. } | Shape::RectangularBox { aabb: y }) => {
            shared_face(x, y, dist_error)
        }
        (Shape::Rectangle { aabb: x, .. } | Shape::RectangularBox { aabb: x }, curved @ (Shape::Sphere { .. } | Shape::Cylinder { .. })) => {
            shared_face(x, &curved.bounding_aabb(), dist_error)
        }
        (curved @ (Shape::Sphere { .. } | Shape::Cylinder { .. }), Shape::Rectangle { aabb: y, .. } | Shape::RectangularBox { aabb: y }) => {
            shared_face(&curved.bounding_aabb(), y, dist_error)
        }
        (
            Shape::Cylinder { axis: ax1, anchor: a1, radius: r1, length: l1 },
            Shape::Cylinder { axis: ax2, anchor: a2, radius: r2, length: l2 },
        ) => {
            if ax1 != ax2 {
                return Err(GeometryError::MismatchedAxis(*ax1, *ax2));
            }
            let axis = *ax1;
            let (c1, c2) = axis.others();
            let centered = (a1.get(c1) - a2.get(c1)).abs() < dist_error && (a1.get(c2) - a2.get(c2)).abs() < dist_error;
            let same_radius = (r1 - r2).abs() < dist_error;
            if !centered || !same_radius {
                return Ok(None);
            }
            let hi1 = a1.get(axis) + l1;
            let lo2 = a2.get(axis);
            if (hi1 - lo2).abs() < dist_error {
                Ok(Some(Direction::for_axis(axis, true)))
            } else if (a2.get(axis) + l2 - a1.get(axis)).abs() < dist_error {
                Ok(Some(Direction::for_axis(axis, false)))
            } else {
                Ok(None)
            }?
        }
        (a, b) => return Err(GeometryError::UnsupportedAdjacency(a.name(), b.name())),
    })
}

fn shared_face(a: &Aabb, b: &Aabb, dist_error: f64) -> Option<Direction> {
    for axis in Axis::ALL {
        let (o1, o2) = axis.others();
        let overlap = a.min.get(o1) < b.max.get(o1) - dist_error
            && b.min.get(o1) < a.max.get(o1) - dist_error
            && a.min.get(o2) < b.max.get(o2) - dist_error
            && b.min.get(o2) < a.max.get(o2) - dist_error;
        if !overlap {
            continue;
        }
        if (a.max.get(axis) - b.min.get(axis)).abs() < dist_error {
            return Some(Direction::for_axis(axis, true));
        }
        if (b.max.get(axis) - a.min.get(axis)).abs() < dist_error {
            return Some(Direction::for_axis(axis, false));
        }
    }
    None
}

/// Result of [`line_hits_boundary`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub d: f64,
    pub face_id: FaceId,
    pub point: Point3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceId {
    Face(Direction),
    Sphere,
    CylinderMantle,
    CylinderCapNear,
    CylinderCapFar,
}

/// `line_hits_boundary(p, L, length, shape, inside)` — nearest positive hit
/// at distance `d <= length` along the unit direction `l_dir`.
pub fn line_hits_boundary(p: Point3, l_dir: Point3, length: f64, shape: &Shape, inside: bool, dist_error: f64) -> Option<Hit> {
    match shape {
        Shape::Rectangle { aabb, .. } | Shape::RectangularBox { aabb } => box_hit(p, l_dir, length, aabb, dist_error),
        Shape::Sphere { center, radius } => sphere_hit(p, l_dir, length, *center, *radius, inside),
        Shape::Cylinder { axis, anchor, radius, length: clen } => cylinder_hit(p, l_dir, length, *axis, *anchor, *radius, *clen, inside, dist_error),
    }
}

fn box_hit(p: Point3, l: Point3, length: f64, aabb: &Aabb, dist_error: f64) -> Option<Hit> {
    let mut best: Option<Hit> = None;
    for axis in Axis::ALL {
        let dir = l.get(axis);
        if dir.abs() < dist_error {
            continue; // guarded against division by zero, per spec numerical policy
        }
        for (bound, positive) in [(aabb.min.get(axis), false), (aabb.max.get(axis), true)] {
            let d = (bound - p.get(axis)) / dir;
            if d < -dist_error || d > length + dist_error {
                continue;
            }
            let point = p + l * d;
            let (o1, o2) = axis.others();
            if point.get(o1) < aabb.min.get(o1) - dist_error
                || point.get(o1) > aabb.max.get(o1) + dist_error
                || point.get(o2) < aabb.min.get(o2) - dist_error
                || point.get(o2) > aabb.max.get(o2) + dist_error
            {
                continue;
            }
            if best.map_or(true, |h| d < h.d) {
                best = Some(Hit { d: d.max(0.0), face_id: FaceId::Face(Direction::for_axis(axis, positive)), point });
            }
        }
    }
    best
}

fn sphere_hit(p: Point3, l: Point3, length: f64, center: Point3, radius: f64, inside: bool) -> Option<Hit> {
    let op = p - center;
    let b = 2.0 * op.dot(l);
    let c = op.dot(op) - radius * radius;
    let disc = b * b - 4.0 * c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let (t1, t2) = ((-b - sq) / 2.0, (-b + sq) / 2.0);
    let d = if inside { t2 } else { t1 };
    if d < -1e-12 || d > length + 1e-12 {
        return None;
    }
    let d = d.max(0.0);
    Some(Hit { d, face_id: FaceId::Sphere, point: p + l * d })
}

#[allow(clippy::too_many_arguments)]
fn cylinder_hit(
    p: Point3,
    l: Point3,
    length_seg: f64,
    axis: Axis,
    anchor: Point3,
    radius: f64,
    clen: f64,
    inside: bool,
    dist_error: f64,
) -> Option<Hit> {
    let mut best: Option<Hit> = None;
    let mut consider = |d: f64, point: Point3, face: FaceId| {
        if d < -dist_error || d > length_seg + dist_error {
            return;
        }
        let d = d.max(0.0);
        if best.map_or(true, |h: Hit| d < h.d) {
            best = Some(Hit { d, face_id: face, point });
        }
    };

    // end caps: zero-length cylinder degenerates to just the near disk.
    for (t, face) in [(0.0, FaceId::CylinderCapNear), (clen, FaceId::CylinderCapFar)] {
        if clen == 0.0 && matches!(face, FaceId::CylinderCapFar) {
            continue;
        }
        let dir = l.get(axis);
        if dir.abs() < dist_error {
            continue;
        }
        let plane_coord = anchor.get(axis) + t;
        let d = (plane_coord - p.get(axis)) / dir;
        let point = p + l * d;
        let (a1, a2) = axis.others();
        let r = ((point.get(a1) - anchor.get(a1)).powi(2) + (point.get(a2) - anchor.get(a2)).powi(2)).sqrt();
        if r <= radius + dist_error {
            consider(d, point, face);
        }
    }

    if clen > 0.0 {
        // curved mantle: quadratic in the cross-section plane.
        let (a1, a2) = axis.others();
        let ox = p.get(a1) - anchor.get(a1);
        let oy = p.get(a2) - anchor.get(a2);
        let lx = l.get(a1);
        let ly = l.get(a2);
        let a = lx * lx + ly * ly;
        if a > dist_error {
            let b = 2.0 * (ox * lx + oy * ly);
            let c = ox * ox + oy * oy - radius * radius;
            let disc = b * b - 4.0 * a * c;
            if disc >= 0.0 {
                let sq = disc.sqrt();
                let (t1, t2) = ((-b - sq) / (2.0 * a), (-b + sq) / (2.0 * a));
                let d = if inside { t2 } else { t1 };
                let point = p + l * d;
                let axial = point.get(axis) - anchor.get(axis);
                if axial >= -dist_error && axial <= clen + dist_error {
                    consider(d, point, FaceId::CylinderMantle);
                }
            }
        }
    }
    best
}

/// `reflect(old, step_vec, length, current, shape, face_id, reflect_inside)`.
pub fn reflect(current: Point3, shape: &Shape, hit: &Hit, _reflect_inside: bool) -> Point3 {
    match (shape, hit.face_id) {
        (Shape::Rectangle { .. } | Shape::RectangularBox { .. }, FaceId::Face(dir)) => {
            let axis = face_axis(dir);
            let mirror = hit.point.get(axis);
            current.with(axis, 2.0 * mirror - current.get(axis))
        }
        (Shape::Sphere { center, radius }, FaceId::Sphere) => {
            let n = (hit.point - *center) * (1.0 / radius);
            current - n * (2.0 * (current - hit.point).dot(n))
        }
        (Shape::Cylinder { axis, anchor, radius, .. }, FaceId::CylinderMantle) => {
            let (a1, a2) = axis.others();
            let nx = (hit.point.get(a1) - anchor.get(a1)) / radius;
            let ny = (hit.point.get(a2) - anchor.get(a2)) / radius;
            let dx = current.get(a1) - hit.point.get(a1);
            let dy = current.get(a2) - hit.point.get(a2);
            let dot = dx * nx + dy * ny;
            let rx = current.get(a1) - 2.0 * dot * nx;
            let ry = current.get(a2) - 2.0 * dot * ny;
            current.with(a1, rx).with(a2, ry)
        }
        (Shape::Cylinder { axis, .. }, FaceId::CylinderCapNear | FaceId::CylinderCapFar) => {
            let mirror = hit.point.get(*axis);
            current.with(*axis, 2.0 * mirror - current.get(*axis))
        }
        _ => current,
    }
}

fn face_axis(dir: Direction) -> Axis {
    match dir {
        Direction::Left | Direction::Right => Axis::X,
        Direction::Down | Direction::Up => Axis::Y,
        Direction::In | Direction::Out => Axis::Z,
    }
}

/// `intersect_boundary(a, b)` — resulting shape and its parameters.
pub fn intersect_boundary(a: &Shape, b: &Shape) -> Result<Shape, GeometryError> {
    match (a, b) {
        (Shape::RectangularBox { aabb: x }, Shape::RectangularBox { aabb: y }) => {
            let min = Point3::new(x.min.x.max(y.min.x), x.min.y.max(y.min.y), x.min.z.max(y.min.z));
            let max = Point3::new(x.max.x.min(y.max.x), x.max.y.min(y.max.y), x.max.z.min(y.max.z));
            let max = Point3::new(max.x.max(min.x), max.y.max(min.y), max.z.max(min.z));
            Ok(Shape::RectangularBox { aabb: Aabb { min, max } })
        }
        (
            Shape::Cylinder { axis: ax1, anchor: a1, radius: r1, length: l1 },
            Shape::Cylinder { axis: ax2, anchor: a2, radius: r2, length: l2 },
        ) => {
            if ax1 != ax2 {
                return Err(GeometryError::MismatchedAxis(*ax1, *ax2));
            }
            let axis = *ax1;
            if surrounds(a, b, 0.0)? {
                return Ok(b.clone());
            }
            if surrounds(b, a, 0.0)? {
                return Ok(a.clone());
            }
            let lo = a1.get(axis).max(a2.get(axis));
            let hi = (a1.get(axis) + l1).min(a2.get(axis) + l2);
            Ok(Shape::Cylinder { axis, anchor: a1.with(axis, lo), radius: r1.min(*r2), length: (hi - lo).max(0.0) })
        }
        (Shape::Cylinder { .. }, Shape::RectangularBox { aabb }) | (Shape::RectangularBox { aabb }, Shape::Cylinder { .. }) => {
            let cyl = if matches!(a, Shape::Cylinder { .. }) { a } else { b };
            if surrounds(cyl, &Shape::RectangularBox { aabb: *aabb }, 0.0)? {
                Ok(Shape::RectangularBox { aabb: *aabb })
            } else if surrounds(&Shape::RectangularBox { aabb: *aabb }, cyl, 0.0)? {
                Ok(cyl.clone())
            } else {
                Err(GeometryError::UnsupportedIntersection(a.name(), b.name()))
            }
        }
        (a, b) => Err(GeometryError::UnsupportedIntersection(a.name(), b.name())),
    }
}

/// `uniform_point(shape, on_surface, plane_id)` — uniform sample interior or
/// on a specified face.
pub fn uniform_point(shape: &Shape, rng: &mut impl Rng, on_surface: bool) -> Point3 {
    match shape {
        Shape::Rectangle { aabb, .. } | Shape::RectangularBox { aabb } => {
            let ux = Uniform::new_inclusive(aabb.min.x, aabb.max.x);
            let uy = Uniform::new_inclusive(aabb.min.y, aabb.max.y);
            let uz = Uniform::new_inclusive(aabb.min.z, aabb.max.z);
            Point3::new(ux.sample(rng), uy.sample(rng), uz.sample(rng))
        }
        Shape::Sphere { center, radius } => {
            // classical rejection sampling in the unit cube, then optional
            // normalization onto the surface.
            let u = Uniform::new_inclusive(-1.0, 1.0);
            loop {
                let v = Point3::new(u.sample(rng), u.sample(rng), u.sample(rng));
                let n = v.norm();
                if n <= 1.0 && n > 0.0 {
                    return if on_surface { *center + (v * (1.0 / n)) * *radius } else { *center + v * *radius };
                }
            }
        }
        Shape::Cylinder { axis, anchor, radius, length } => {
            let ut = Uniform::new_inclusive(0.0, *length);
            let t = ut.sample(rng);
            let r = if on_surface { *radius } else { radius * rng.gen::<f64>().sqrt() };
            let theta = rng.gen::<f64>() * std::f64::consts::TAU;
            let (a1, a2) = axis.others();
            let mut p = anchor.with(*axis, anchor.get(*axis) + t);
            p = p.with(a1, anchor.get(a1) + r * theta.cos());
            p = p.with(a2, anchor.get(a2) + r * theta.sin());
            p
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Shape {
        Shape::RectangularBox { aabb: Aabb { min: Point3::ZERO, max: Point3::new(1.0, 1.0, 1.0) } }
    }

    #[test]
    fn contains_box() {
        let b = unit_box();
        assert!(contains(Point3::new(0.5, 0.5, 0.5), &b, DEFAULT_DIST_ERROR));
        assert!(!contains(Point3::new(1.5, 0.5, 0.5), &b, DEFAULT_DIST_ERROR));
    }

    #[test]
    fn contains_sphere() {
        let s = Shape::Sphere { center: Point3::ZERO, radius: 1.0 };
        assert!(contains(Point3::new(1.0, 0.0, 0.0), &s, DEFAULT_DIST_ERROR));
        assert!(!contains(Point3::new(1.1, 0.0, 0.0), &s, DEFAULT_DIST_ERROR));
    }

    #[test]
    fn contains_cylinder() {
        let c = Shape::Cylinder { axis: Axis::Z, anchor: Point3::ZERO, radius: 1.0, length: 2.0 };
        assert!(contains(Point3::new(0.0, 0.0, 1.0), &c, DEFAULT_DIST_ERROR));
        assert!(!contains(Point3::new(0.0, 0.0, 3.0), &c, DEFAULT_DIST_ERROR));
        assert!(!contains(Point3::new(2.0, 0.0, 1.0), &c, DEFAULT_DIST_ERROR));
    }

    #[test]
    fn disjoint_boxes_do_not_intersect() {
        let a = unit_box();
        let b = Shape::RectangularBox { aabb: Aabb { min: Point3::new(5.0, 5.0, 5.0), max: Point3::new(6.0, 6.0, 6.0) } };
        assert!(!intersects(&a, &b, 0.0).unwrap());
        assert!(matches!(intersect_boundary(&a, &b).unwrap(), Shape::RectangularBox { aabb } if aabb.volume() == 0.0));
    }

    #[test]
    fn adjacent_boxes_share_a_face() {
        let a = unit_box();
        let b = Shape::RectangularBox { aabb: Aabb { min: Point3::new(1.0, 0.0, 0.0), max: Point3::new(2.0, 1.0, 1.0) } };
        assert_eq!(adjacent(&a, &b, 1e-9).unwrap(), Some(Direction::Right));
    }

    #[test]
    fn reflect_is_involutive_on_box_face() {
        let b = unit_box();
        let p0 = Point3::new(0.5, 0.5, 0.9);
        let p1 = Point3::new(0.5, 0.5, 1.1);
        let l = (p1 - p0).normalized();
        let hit = line_hits_boundary(p0, l, 0.2 * 2.0_f64.sqrt(), &b, true, 1e-9).unwrap();
        let reflected = reflect(p1, &b, &hit, true);
        let back = reflect(reflected, &b, &hit, true);
        assert!((back - p1).norm() < 1e-9);
    }

    #[test]
    fn surrounds_sphere_in_box() {
        let outer = Shape::RectangularBox { aabb: Aabb { min: Point3::new(-5.0, -5.0, -5.0), max: Point3::new(5.0, 5.0, 5.0) } };
        let inner = Shape::Sphere { center: Point3::ZERO, radius: 1.0 };
        assert!(surrounds(&outer, &inner, 0.0).unwrap());
    }
}
