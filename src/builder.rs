//! Region/subvolume graph builder (component B).
//!
//! Consumes the validated [`crate::config::EnvironmentConfig`] and the
//! global subvolume base size, and emits the static graph: a flat
//! subvolume array, per-region metadata, adjacency lists (including
//! cross-region neighbors), and the global mesoscopic subvolume count.
//! The graph is built once per realization and is immutable for its
//! duration (spec.md §3 "Lifecycle").

use std::collections::HashMap;

use log::debug;

use crate::config::{EnvironmentConfig, FlowConfig, RegionConfig, RegionKind, ShapeKind, SurfaceKind};
use crate::error::GeometryInvalid;
use crate::geometry::{self, Aabb, Axis, Direction, Point3, Shape};

#[derive(Debug, Clone)]
pub struct Region {
    pub label: String,
    pub parent_label: Option<String>,
    pub shape: Shape,
    pub kind: RegionKind,
    pub surface_kind: Option<SurfaceKind>,
    pub is_microscopic: bool,
    pub nx: i64,
    pub ny: i64,
    pub nz: i64,
    pub sub_size: f64,
    pub flow: Option<FlowConfig>,
    pub dt: f64,
    /// Half-open range of global subvolume ids owned by this region.
    pub sub_range: std::ops::Range<usize>,
    /// Resolved index of the region named by `parent_label`, if any.
    pub parent: Option<usize>,
    /// Regions nested inside this one (the reverse of `parent`), tested by
    /// path validation in addition to this region's own boundary (spec.md
    /// §4.D.2).
    pub children: Vec<usize>,
}

impl Region {
    pub fn is_surface(&self) -> bool {
        !matches!(self.kind, RegionKind::Normal)
    }

    pub fn num_subvolumes(&self) -> usize {
        if matches!(self.shape, Shape::Sphere { .. } | Shape::Cylinder { .. }) {
            1
        } else {
            (self.nx.max(1) * self.ny.max(1) * self.nz.max(1)) as usize
        }
    }
}

#[derive(Debug, Clone)]
pub struct NeighborLink {
    pub neighbor_sub_id: usize,
    pub direction: Option<Direction>,
    pub shared_area: f64,
    /// Per-molecule-type diffusion rate D/h^2 toward this neighbor; only
    /// populated for mesoscopic boundary subvolumes.
    pub diffusion_rate: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Subvolume {
    pub region_id: usize,
    pub meso_id: Option<usize>,
    pub neighbors: Vec<NeighborLink>,
    pub is_boundary: bool,
    /// Molecule counts, meso only; empty for microscopic subvolumes.
    pub counts: Vec<u64>,
    pub grid_coord: Option<(i64, i64, i64)>,
    pub aabb: Aabb,
}

impl Subvolume {
    pub fn aabb_as_shape(&self) -> Shape {
        Shape::RectangularBox { aabb: self.aabb }
    }
}

#[derive(Debug, Clone)]
pub struct RegionGraph {
    pub regions: Vec<Region>,
    pub subvolumes: Vec<Subvolume>,
    pub num_meso: usize,
    pub base_size: f64,
}

impl RegionGraph {
    pub fn region_index(&self, label: &str) -> Option<usize> {
        self.regions.iter().position(|r| r.label == label)
    }

    pub fn subvolume_of_region(&self, region_id: usize, coord: (i64, i64, i64)) -> Option<usize> {
        let region = &self.regions[region_id];
        if coord.0 < 0 || coord.1 < 0 || coord.2 < 0 || coord.0 >= region.nx.max(1) || coord.1 >= region.ny.max(1) || coord.2 >= region.nz.max(1) {
            return None;
        }
        let idx = (coord.2 * region.ny.max(1) * region.nx.max(1) + coord.1 * region.nx.max(1) + coord.0) as usize;
        Some(region.sub_range.start + idx)
    }
}

fn compile_region(cfg: &RegionConfig, dt: f64) -> Result<Region, GeometryInvalid> {
    let shape = crate::config::shape_from_parts(cfg.shape, cfg.params, cfg.axis);
    let (nx, ny, nz) = (cfg.nx, cfg.ny, cfg.nz);
    if matches!(shape, Shape::RectangularBox { .. }) && nx.max(1) * ny.max(1) * nz.max(1) < 1 {
        return Err(GeometryInvalid::InvalidExtents(cfg.label.clone(), nx, ny, nz));
    }
    if let Shape::Rectangle { .. } = &shape {
        let zero_axes = [nx == 0, ny == 0, nz == 0].iter().filter(|&&b| b).count();
        if zero_axes != 1 {
            return Err(GeometryInvalid::InvalidExtents(cfg.label.clone(), nx, ny, nz));
        }
    }
    let is_microscopic = cfg.is_microscopic || matches!(shape, Shape::Sphere { .. } | Shape::Cylinder { .. });
    Ok(Region {
        label: cfg.label.clone(),
        parent_label: cfg.parent_label.clone(),
        shape,
        kind: cfg.kind,
        surface_kind: cfg.surface_kind,
        is_microscopic,
        nx,
        ny,
        nz,
        sub_size: cfg.sub_size,
        flow: cfg.flow,
        dt,
        sub_range: 0..0,
        parent: None,
        children: Vec::new(),
    })
}

/// Builds the static region/subvolume graph. Fails with a `GeometryInvalid`
/// naming the offending region(s) on parent/child violations, overlapping
/// normal regions, or incompatible meso/surface boundaries -- no heuristic
/// repair (spec.md §4.B).
pub fn build_graph(env: &EnvironmentConfig, num_types: usize, diffusion_coeffs: &[f64], dt: f64, dist_error_fraction: f64) -> Result<RegionGraph, GeometryInvalid> {
    let base_size = env.subvolume_base_size;
    let dist_error = dist_error_fraction * base_size;

    let mut labels = HashMap::new();
    let mut regions = Vec::with_capacity(env.regions.len());
    for cfg in &env.regions {
        if labels.insert(cfg.label.clone(), regions.len()).is_some() {
            return Err(GeometryInvalid::DuplicateLabel(cfg.label.clone()));
        }
        regions.push(compile_region(cfg, dt)?);
    }

    // 1. resolve parent/child nesting.
    let mut parent_links = Vec::new();
    for (idx, region) in regions.iter().enumerate() {
        if let Some(parent_label) = &region.parent_label {
            let parent_idx = *labels.get(parent_label).ok_or_else(|| GeometryInvalid::UnknownParent(region.label.clone(), parent_label.clone()))?;
            let parent = &regions[parent_idx];
            if !geometry::surrounds(&parent.shape, &region.shape, dist_error)? {
                return Err(GeometryInvalid::ParentDoesNotSurround(parent.label.clone(), region.label.clone()));
            }
            parent_links.push((idx, parent_idx));
        }
    }
    for (child_idx, parent_idx) in parent_links {
        regions[child_idx].parent = Some(parent_idx);
        regions[parent_idx].children.push(child_idx);
    }

    // no two unrelated Normal regions may overlap in volume.
    for i in 0..regions.len() {
        for j in (i + 1)..regions.len() {
            let (a, b) = (&regions[i], &regions[j]);
            let related = a.parent_label.as_deref() == Some(b.label.as_str()) || b.parent_label.as_deref() == Some(a.label.as_str());
            if related {
                continue;
            }
            if matches!(a.kind, RegionKind::Normal) && matches!(b.kind, RegionKind::Normal) && geometry::intersects(&a.shape, &b.shape, dist_error)? {
                return Err(GeometryInvalid::OverlappingRegions(a.label.clone(), b.label.clone()));
            }
        }
    }

    // 2. grid realization: assign subvolume ranges.
    let mut subvolumes = Vec::new();
    for region in &mut regions {
        let start = subvolumes.len();
        let n = region.num_subvolumes();
        region.sub_range = start..start + n;
        match &region.shape {
            Shape::Sphere { .. } | Shape::Cylinder { .. } => {
                let region_idx = labels[&region.label];
                subvolumes.push(Subvolume {
                    region_id: region_idx,
                    meso_id: None,
                    neighbors: Vec::new(),
                    is_boundary: true,
                    counts: Vec::new(),
                    grid_coord: None,
                    aabb: region.shape.bounding_aabb(),
                });
            }
            Shape::RectangularBox { aabb } | Shape::Rectangle { aabb, .. } => {
                let region_idx = labels[&region.label];
                let h = region.sub_size * base_size;
                let (nx, ny, nz) = (region.nx.max(1), region.ny.max(1), region.nz.max(1));
                for iz in 0..nz {
                    for iy in 0..ny {
                        for ix in 0..nx {
                            let min = Point3::new(aabb.min.x + ix as f64 * h, aabb.min.y + iy as f64 * h, aabb.min.z + iz as f64 * h);
                            let max = min + Point3::new(if nx > 1 || matches!(region.shape, Shape::RectangularBox{..}) { h } else { aabb.size().x },
                                                          if ny > 1 || matches!(region.shape, Shape::RectangularBox{..}) { h } else { aabb.size().y },
                                                          if nz > 1 || matches!(region.shape, Shape::RectangularBox{..}) { h } else { aabb.size().z });
                            let is_boundary = ix == 0 || iy == 0 || iz == 0 || ix == nx - 1 || iy == ny - 1 || iz == nz - 1;
                            subvolumes.push(Subvolume {
                                region_id: region_idx,
                                meso_id: None,
                                neighbors: Vec::new(),
                                is_boundary,
                                counts: Vec::new(),
                                grid_coord: Some((ix, iy, iz)),
                                aabb: Aabb { min, max },
                            });
                        }
                    }
                }
            }
        }
    }

    // 3. internal (same-region) face neighbors.
    for region_idx in 0..regions.len() {
        let region = regions[region_idx].clone();
        if matches!(region.shape, Shape::Sphere { .. } | Shape::Cylinder { .. }) {
            continue;
        }
        let (nx, ny, nz) = (region.nx.max(1), region.ny.max(1), region.nz.max(1));
        for iz in 0..nz {
            for iy in 0..ny {
                for ix in 0..nx {
                    let here = region.sub_range.start + (iz * ny * nx + iy * nx + ix) as usize;
                    let deltas = [
                        (-1, 0, 0, Direction::Left),
                        (1, 0, 0, Direction::Right),
                        (0, -1, 0, Direction::Down),
                        (0, 1, 0, Direction::Up),
                        (0, 0, -1, Direction::In),
                        (0, 0, 1, Direction::Out),
                    ];
                    for (dx, dy, dz, dir) in deltas {
                        let (jx, jy, jz) = (ix + dx, iy + dy, iz + dz);
                        if jx < 0 || jy < 0 || jz < 0 || jx >= nx || jy >= ny || jz >= nz {
                            continue;
                        }
                        let there = region.sub_range.start + (jz * ny * nx + jy * nx + jx) as usize;
                        subvolumes[here].neighbors.push(NeighborLink {
                            neighbor_sub_id: there,
                            direction: Some(dir),
                            shared_area: region.sub_size.powi(2) * base_size * base_size,
                            diffusion_rate: Vec::new(),
                        });
                    }
                }
            }
        }
    }

    // 4. cross-region neighbors, for regions geometry marks adjacent.
    for i in 0..regions.len() {
        for j in 0..regions.len() {
            if i == j {
                continue;
            }
            let (a, b) = (regions[i].clone(), regions[j].clone());
            let Ok(Some(dir)) = geometry::adjacent(&a.shape, &b.shape, dist_error) else { continue };
            link_cross_region(&mut subvolumes, &a, &b, dir, base_size);
        }
    }

    // mesoscopic boundary subvolumes incompatible with adjacent surface regions.
    for sub_idx in 0..subvolumes.len() {
        let region = &regions[subvolumes[sub_idx].region_id];
        if region.is_microscopic || !subvolumes[sub_idx].is_boundary {
            continue;
        }
        for link in subvolumes[sub_idx].neighbors.clone() {
            let neighbor_region = &regions[subvolumes[link.neighbor_sub_id].region_id];
            if neighbor_region.is_surface() && neighbor_region.surface_kind.is_none() {
                return Err(GeometryInvalid::IncompatibleSurfaceBoundary(region.label.clone(), neighbor_region.label.clone()));
            }
        }
    }

    // 5. mesoscopic diffusion rates and meso id assignment.
    let mut num_meso = 0;
    for sub in &mut subvolumes {
        let region = &regions[sub.region_id];
        if !region.is_microscopic {
            sub.meso_id = Some(num_meso);
            num_meso += 1;
            sub.counts = vec![0; num_types];
        }
    }
    for idx in 0..subvolumes.len() {
        let region = regions[subvolumes[idx].region_id].clone();
        if region.is_microscopic {
            continue;
        }
        let h = region.sub_size * base_size;
        for link_idx in 0..subvolumes[idx].neighbors.len() {
            let area = subvolumes[idx].neighbors[link_idx].shared_area;
            // D/h^2 for a uniform internal face (area == h^2); scaled down
            // by the shared-face-area ratio at reduced cross-region faces.
            let rates: Vec<f64> = diffusion_coeffs.iter().take(num_types).map(|&d| d / (h * h) * (area / (h * h)).min(1.0)).collect();
            subvolumes[idx].neighbors[link_idx].diffusion_rate = rates;
        }
    }

    debug!("built region graph: {} regions, {} subvolumes, {} mesoscopic", regions.len(), subvolumes.len(), num_meso);

    Ok(RegionGraph { regions, subvolumes, num_meso, base_size })
}

/// Cross-region neighbor resolution. For rectangular-rectangular pairs,
/// matches boundary subvolumes that share a face. For a curved region
/// (sphere/cylinder), which has a single implicit subvolume, the shared
/// area is the overlap between the curved region's cross section and the
/// rectangular face, per spec.md §4.B.4.
fn link_cross_region(subvolumes: &mut [Subvolume], a: &Region, b: &Region, dir: Direction, base_size: f64) {
    let axis = match dir {
        Direction::Left | Direction::Right => Axis::X,
        Direction::Down | Direction::Up => Axis::Y,
        Direction::In | Direction::Out => Axis::Z,
    };
    let positive = matches!(dir, Direction::Right | Direction::Up | Direction::Out);

    match (&a.shape, &b.shape) {
        (Shape::RectangularBox { .. } | Shape::Rectangle { .. }, Shape::RectangularBox { .. } | Shape::Rectangle { .. }) => {
            for ai in a.sub_range.clone() {
                for bi in b.sub_range.clone() {
                    let sa = subvolumes[ai].aabb;
                    let sb = subvolumes[bi].aabb;
                    let touching = if positive {
                        (sa.max.get(axis) - sb.min.get(axis)).abs() < 1e-9 * base_size
                    } else {
                        (sb.max.get(axis) - sa.min.get(axis)).abs() < 1e-9 * base_size
                    };
                    if !touching {
                        continue;
                    }
                    let (o1, o2) = other_axes(axis);
                    let overlap1 = sa.min.get(o1).max(sb.min.get(o1)) < sa.max.get(o1).min(sb.max.get(o1));
                    let overlap2 = sa.min.get(o2).max(sb.min.get(o2)) < sa.max.get(o2).min(sb.max.get(o2));
                    if overlap1 && overlap2 {
                        let area = (sa.max.get(o1).min(sb.max.get(o1)) - sa.min.get(o1).max(sb.min.get(o1)))
                            * (sa.max.get(o2).min(sb.max.get(o2)) - sa.min.get(o2).max(sb.min.get(o2)));
                        subvolumes[ai].neighbors.push(NeighborLink { neighbor_sub_id: bi, direction: Some(dir), shared_area: area, diffusion_rate: Vec::new() });
                        subvolumes[bi].neighbors.push(NeighborLink { neighbor_sub_id: ai, direction: Some(dir.opposite()), shared_area: area, diffusion_rate: Vec::new() });
                    }
                }
            }
        }
        _ => {
            // one or both sides are curved (sphere/cylinder, single
            // subvolume): approximate the shared cross-section as the
            // overlap of each side's bounding box in the face's plane,
            // capped by the curved shape's own circular cross-sectional
            // area (spec.md §4.B.4).
            let curved_radius = match (&a.shape, &b.shape) {
                (Shape::Sphere { radius, .. }, _) | (_, Shape::Sphere { radius, .. }) => Some(*radius),
                (Shape::Cylinder { radius, .. }, _) | (_, Shape::Cylinder { radius, .. }) => Some(*radius),
                _ => None,
            };
            let curved_area = curved_radius.map_or(f64::INFINITY, |r| std::f64::consts::PI * r * r);
            let (o1, o2) = other_axes(axis);
            for ai in a.sub_range.clone() {
                for bi in b.sub_range.clone() {
                    let sa = subvolumes[ai].aabb;
                    let sb = subvolumes[bi].aabb;
                    let overlap1 = sa.max.get(o1).min(sb.max.get(o1)) - sa.min.get(o1).max(sb.min.get(o1));
                    let overlap2 = sa.max.get(o2).min(sb.max.get(o2)) - sa.min.get(o2).max(sb.min.get(o2));
                    if overlap1 <= 0.0 || overlap2 <= 0.0 {
                        continue;
                    }
                    let area = (overlap1 * overlap2).min(curved_area);
                    subvolumes[ai].neighbors.push(NeighborLink { neighbor_sub_id: bi, direction: Some(dir), shared_area: area, diffusion_rate: Vec::new() });
                    subvolumes[bi].neighbors.push(NeighborLink { neighbor_sub_id: ai, direction: Some(dir.opposite()), shared_area: area, diffusion_rate: Vec::new() });
                }
            }
        }
    }
}

fn other_axes(axis: Axis) -> (Axis, Axis) {
    match axis {
        Axis::X => (Axis::Y, Axis::Z),
        Axis::Y => (Axis::X, Axis::Z),
        Axis::Z => (Axis::X, Axis::Y),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RegionConfig, ShapeKind};

    fn box_region(label: &str, min: [f64; 3], size: [f64; 3], nx: i64, ny: i64, nz: i64, micro: bool) -> RegionConfig {
        RegionConfig {
            label: label.into(),
            parent_label: None,
            shape: ShapeKind::RectangularBox,
            params: [min[0], min[1], min[2], size[0], size[1], size[2]],
            axis: None,
            kind: RegionKind::Normal,
            surface_kind: None,
            is_microscopic: micro,
            nx,
            ny,
            nz,
            sub_size: 1.0,
            flow: None,
        }
    }

    #[test]
    fn two_abutting_boxes_link_across() {
        let env = EnvironmentConfig {
            num_dimensions: 3,
            subvolume_base_size: 1.0,
            regions: vec![box_region("left", [0.0, 0.0, 0.0], [2.0, 2.0, 2.0], 2, 2, 2, true), box_region("right", [2.0, 0.0, 0.0], [2.0, 2.0, 2.0], 2, 2, 2, false)],
            actors: vec![],
        };
        let graph = build_graph(&env, 1, &[1e-9], 1e-3, 1e-12).unwrap();
        assert_eq!(graph.subvolumes.len(), 16);
        assert!(graph.num_meso > 0);
        let left_boundary_with_cross_neighbor = graph.subvolumes[0..8].iter().any(|s| s.neighbors.iter().any(|n| graph.subvolumes[n.neighbor_sub_id].region_id == 1));
        assert!(left_boundary_with_cross_neighbor);
    }

    #[test]
    fn overlapping_normal_regions_fail() {
        let env = EnvironmentConfig {
            num_dimensions: 3,
            subvolume_base_size: 1.0,
            regions: vec![box_region("a", [0.0, 0.0, 0.0], [2.0, 2.0, 2.0], 1, 1, 1, true), box_region("b", [1.0, 1.0, 1.0], [2.0, 2.0, 2.0], 1, 1, 1, true)],
            actors: vec![],
        };
        assert!(build_graph(&env, 1, &[1e-9], 1e-3, 1e-12).is_err());
    }
}
