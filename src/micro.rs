//! Microscopic molecule engine (component D): one micro tick of one region.
//!
//! Implements spec.md §4.D: zero/first-order reactions for steady
//! molecules, Brownian diffusion (+ optional cylinder flow), path
//! validation against region boundaries, and the recursive handling of
//! "recent" (just-created or just-arrived) molecules with partial `dt`.

use log::warn;

use crate::builder::RegionGraph;
use crate::config::SurfaceReactionKind;
use crate::flow;
use crate::geometry::{self, Axis, Direction, FaceId, Point3};
use crate::ledger::ConservationLedger;
use crate::molecule::MoleculeStore;
use crate::reaction::RegionReactionTable;
use crate::rng::Stream;

/// Bound on path-validation recursion depth (spec.md §9): 16 reflections
/// per step is sufficient in practice. Exceeding it is a diagnostic, not a
/// crash: the molecule is placed at its last valid intersection point and
/// marked degenerate.
pub const MAX_REFLECT_DEPTH: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathOutcome {
    Accepted { region: usize, pos: Point3 },
    Absorbed,
    TransferredToMeso { sub_id: usize },
    Degenerate { region: usize, pos: Point3 },
}

fn face_direction(face_id: FaceId) -> Option<Direction> {
    match face_id {
        FaceId::Face(d) => Some(d),
        _ => None,
    }
}

/// Looks up the region that the given region's face (in `direction`)
/// connects to, by scanning the precomputed subvolume adjacency links.
/// Region-level, not subvolume-level, because the micro engine moves
/// molecules in continuous space within a region's bulk and only needs to
/// know which neighboring region a boundary crossing lands in.
fn region_neighbor(graph: &RegionGraph, region_id: usize, direction: Option<Direction>) -> Option<usize> {
    let region = &graph.regions[region_id];
    for sub_id in region.sub_range.clone() {
        for link in &graph.subvolumes[sub_id].neighbors {
            let neighbor_region = graph.subvolumes[link.neighbor_sub_id].region_id;
            if neighbor_region == region_id {
                continue;
            }
            if direction.is_none() || link.direction == direction {
                return Some(neighbor_region);
            }
        }
    }
    None
}

fn find_destination_subvolume(graph: &RegionGraph, region_id: usize, pos: Point3) -> Option<usize> {
    let region = &graph.regions[region_id];
    region.sub_range.clone().find(|&id| geometry::contains(pos, &graph.subvolumes[id].aabb_as_shape(), 1e-9))
}

/// One micro tick of one region, `t -> t + dt`.
#[allow(clippy::too_many_arguments)]
pub fn micro_tick(
    region_id: usize,
    t: f64,
    dt: f64,
    graph: &mut RegionGraph,
    tables: &[RegionReactionTable],
    store: &mut MoleculeStore,
    rng: &mut Stream,
    diffusion_coeffs: &[f64],
    dist_error: f64,
    ledger: &mut ConservationLedger,
) {
    let num_types = store.num_types();
    let table = &tables[region_id];

    // 1 & 2: zero/first-order reactions for steady molecules.
    for ty in 0..num_types {
        let min_rxn = table.min_rxn_time_rv.get(ty).copied().unwrap_or(1.0);
        let fires_prob = 1.0 - min_rxn;
        if fires_prob <= 0.0 {
            continue;
        }
        let cumulative = table.cumulative.get(ty).cloned().unwrap_or_default();
        let molecules = store.steady(region_id, ty).to_vec();
        let mut survivors = Vec::with_capacity(molecules.len());
        for m in molecules {
            let u = rng.uniform();
            if u < fires_prob && !cumulative.is_empty() {
                let target = u / fires_prob;
                let chosen = cumulative.iter().find(|&&(_, cum)| cum >= target).map(|&(idx, _)| idx).unwrap_or(cumulative.last().unwrap().0);
                let reaction = &table.reactions.iter().find(|r| r.source_index == chosen).unwrap();
                if matches!(reaction.surface_kind, Some(SurfaceReactionKind::Absorbing)) {
                    ledger.record_absorption(ty, 1);
                    continue; // deleted without diffusion.
                }
                ledger.record_consumption(ty, 1);
                for (product_ty, &mult) in reaction.products.iter().enumerate() {
                    if mult == 0 {
                        continue;
                    }
                    ledger.record_production(product_ty, mult as u64);
                    for _ in 0..mult {
                        let dt_partial = rng.uniform() * dt;
                        store.push_recent(region_id, product_ty, m.pos, dt_partial);
                    }
                }
                continue;
            }
            survivors.push(m);
        }
        *store.steady_mut(region_id, ty) = survivors;
    }

    // Order-0 production: spawns directly as recent molecules.
    for reaction in &table.reactions {
        if !matches!(reaction.order, crate::reaction::Order::Zero) {
            continue;
        }
        let expected = reaction.micro_rate * dt;
        let n = rng.poisson(expected);
        for (product_ty, &mult) in reaction.products.iter().enumerate() {
            if mult == 0 || n == 0 {
                continue;
            }
            ledger.record_production(product_ty, n * mult as u64);
            for _ in 0..(n * mult as u64) {
                let pos = geometry::uniform_point(&graph.regions[region_id].shape, rng.underlying(), false);
                let dt_partial = rng.uniform() * dt;
                store.push_recent(region_id, product_ty, pos, dt_partial);
            }
        }
    }

    // 3 & 4: diffuse and validate each remaining steady molecule.
    for ty in 0..num_types {
        let d = diffusion_coeffs.get(ty).copied().unwrap_or(0.0);
        let sigma = (2.0 * d * dt).max(0.0).sqrt();
        let molecules = std::mem::take(store.steady_mut(region_id, ty));
        let mut kept = Vec::with_capacity(molecules.len());
        for m in molecules {
            let mut p1 = m.pos + Point3::new(rng.normal(0.0, sigma), rng.normal(0.0, sigma), rng.normal(0.0, sigma));
            if let Some(flow_cfg) = &graph.regions[region_id].flow {
                if let crate::geometry::Shape::Cylinder { axis, anchor, radius, .. } = &graph.regions[region_id].shape {
                    let (a1, a2) = other_axes(*axis);
                    let r = ((m.pos.get(a1) - anchor.get(a1)).powi(2) + (m.pos.get(a2) - anchor.get(a2)).powi(2)).sqrt();
                    let disp = flow::axial_displacement(flow_cfg, t, r, *radius, dt);
                    p1 = p1.with(*axis, p1.get(*axis) + disp);
                }
            }
            match validate_path(region_id, m.pos, p1, 0, graph, tables, rng, ty, dist_error) {
                PathOutcome::Accepted { region, pos } | PathOutcome::Degenerate { region, pos } => {
                    if region == region_id {
                        kept.push(crate::molecule::SteadyMolecule { pos });
                    } else {
                        store.push_steady(region, ty, pos);
                    }
                }
                PathOutcome::Absorbed => ledger.record_absorption(ty, 1),
                PathOutcome::TransferredToMeso { .. } => {}
            }
        }
        store.steady_mut(region_id, ty).extend(kept);
    }

    // 5: recent list, integrated over the partial remainder of the step,
    // then promoted to steady. Repeated because validation may enqueue
    // further recent entries (a reaction firing mid partial-step).
    for ty in 0..num_types {
        let mut round = store.take_recent(region_id, ty);
        let mut guard = 0;
        while !round.is_empty() {
            guard += 1;
            if guard > MAX_REFLECT_DEPTH {
                warn!("recent-list promotion exceeded {} rounds in region {}, stopping", MAX_REFLECT_DEPTH, region_id);
                break;
            }
            let d = diffusion_coeffs.get(ty).copied().unwrap_or(0.0);
            for rm in round.drain(..) {
                let sigma = (2.0 * d * rm.dt_partial).max(0.0).sqrt();
                let p1 = rm.pos + Point3::new(rng.normal(0.0, sigma), rng.normal(0.0, sigma), rng.normal(0.0, sigma));
                match validate_path(region_id, rm.pos, p1, 0, graph, tables, rng, ty, dist_error) {
                    PathOutcome::Accepted { region, pos } | PathOutcome::Degenerate { region, pos } => {
                        store.push_steady(region, ty, pos);
                    }
                    PathOutcome::Absorbed => ledger.record_absorption(ty, 1),
                    PathOutcome::TransferredToMeso { .. } => {}
                }
            }
            round = store.take_recent(region_id, ty);
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

/// The shape whose boundary produced the nearest hit in one step of
/// [`validate_path`]: either `region_id`'s own outer boundary, or one of
/// its nested child regions (spec.md §4.D.2: "test `line_hits_boundary`
/// against R's own shape *and* against every child/sibling region face
/// that R shares").
enum BoundaryTarget {
    Own,
    Child(usize),
}

/// Validates the segment `p0 -> p1` against `region`'s own boundary, its
/// adjacency-graph neighbors, and any nested child regions, reflecting,
/// absorbing, or transferring across a region boundary as needed (spec.md
/// §4.D.2). Bounded to [`MAX_REFLECT_DEPTH`]; exceeding it places the
/// molecule at its last valid point and marks it degenerate rather than
/// failing the whole tick (spec.md §7).
#[allow(clippy::too_many_arguments)]
fn validate_path(
    mut region_id: usize,
    mut p0: Point3,
    mut p1: Point3,
    mut depth: u32,
    graph: &mut RegionGraph,
    tables: &[RegionReactionTable],
    rng: &mut Stream,
    ty: usize,
    dist_error: f64,
) -> PathOutcome {
    loop {
        if depth > MAX_REFLECT_DEPTH {
            warn!("path validation exceeded depth {} in region '{}'; placing molecule at last valid point", MAX_REFLECT_DEPTH, graph.regions[region_id].label);
            return PathOutcome::Degenerate { region: region_id, pos: p0 };
        }
        let seg = p1 - p0;
        let length = seg.norm();
        if length < 1e-15 {
            return PathOutcome::Accepted { region: region_id, pos: p1 };
        }
        let dir = seg * (1.0 / length);
        let region = graph.regions[region_id].clone();
        let shape = region.shape.clone();
        let own_hit = geometry::line_hits_boundary(p0, dir, length, &shape, true, dist_error);
        let mut best = own_hit.map(|h| (h, BoundaryTarget::Own));
        for &child_id in &region.children {
            let child_shape = graph.regions[child_id].shape.clone();
            if let Some(h) = geometry::line_hits_boundary(p0, dir, length, &child_shape, false, dist_error) {
                if best.as_ref().map_or(true, |(b, _)| h.d < b.d) {
                    best = Some((h, BoundaryTarget::Child(child_id)));
                }
            }
        }
        let Some((hit, target)) = best else {
            return PathOutcome::Accepted { region: region_id, pos: p1 };
        };

        match target {
            BoundaryTarget::Own => {
                let direction = face_direction(hit.face_id);
                let neighbor = region_neighbor(graph, region_id, direction).or(region.parent);
                match neighbor {
                    None => {
                        let reflected = geometry::reflect(p1, &shape, &hit, true);
                        p0 = hit.point;
                        p1 = reflected;
                        depth += 1;
                    }
                    Some(neighbor_id) => {
                        let neighbor_region = graph.regions[neighbor_id].clone();
                        if let Some(SurfaceReactionKind::Membrane) = membrane_kind(tables, region_id, neighbor_id) {
                            let pass_prob = membrane_pass_probability(tables, region_id, ty);
                            if rng.uniform() >= pass_prob {
                                let reflected = geometry::reflect(p1, &shape, &hit, true);
                                p0 = hit.point;
                                p1 = reflected;
                                depth += 1;
                                continue;
                            }
                        }
                        if is_absorbing(tables, region_id, ty) {
                            return PathOutcome::Absorbed;
                        }
                        let residual = p1 - hit.point;
                        if neighbor_region.is_microscopic {
                            region_id = neighbor_id;
                            p0 = hit.point;
                            p1 = hit.point + residual;
                            depth += 1;
                        } else {
                            let dest = find_destination_subvolume(graph, neighbor_id, hit.point).unwrap_or(neighbor_region.sub_range.start);
                            graph.subvolumes[dest].counts[ty] += 1;
                            return PathOutcome::TransferredToMeso { sub_id: dest };
                        }
                    }
                }
            }
            BoundaryTarget::Child(child_id) => {
                let child_shape = graph.regions[child_id].shape.clone();
                if let Some(SurfaceReactionKind::Membrane) = membrane_kind(tables, child_id, region_id) {
                    let pass_prob = membrane_pass_probability(tables, child_id, ty);
                    if rng.uniform() >= pass_prob {
                        let reflected = geometry::reflect(p1, &child_shape, &hit, false);
                        p0 = hit.point;
                        p1 = reflected;
                        depth += 1;
                        continue;
                    }
                }
                if is_absorbing(tables, child_id, ty) {
                    return PathOutcome::Absorbed;
                }
                let child_region = graph.regions[child_id].clone();
                let residual = p1 - hit.point;
                if child_region.is_microscopic {
                    region_id = child_id;
                    p0 = hit.point;
                    p1 = hit.point + residual;
                    depth += 1;
                } else {
                    let dest = find_destination_subvolume(graph, child_id, hit.point).unwrap_or(child_region.sub_range.start);
                    graph.subvolumes[dest].counts[ty] += 1;
                    return PathOutcome::TransferredToMeso { sub_id: dest };
                }
            }
        }
    }
}

fn membrane_kind(tables: &[RegionReactionTable], region_id: usize, _neighbor_id: usize) -> Option<SurfaceReactionKind> {
    tables[region_id].reactions.iter().find_map(|r| if matches!(r.surface_kind, Some(SurfaceReactionKind::Membrane)) { r.surface_kind } else { None })
}

fn membrane_pass_probability(tables: &[RegionReactionTable], region_id: usize, ty: usize) -> f64 {
    tables[region_id]
        .reactions
        .iter()
        .find(|r| matches!(r.surface_kind, Some(SurfaceReactionKind::Membrane)) && r.reactants.get(ty).copied().unwrap_or(0) > 0)
        .map(|r| r.micro_rate)
        .unwrap_or(1.0)
}

fn is_absorbing(tables: &[RegionReactionTable], region_id: usize, ty: usize) -> bool {
    tables[region_id]
        .reactions
        .iter()
        .any(|r| matches!(r.surface_kind, Some(SurfaceReactionKind::Absorbing)) && r.reactants.get(ty).copied().unwrap_or(0) > 0)
}
