//! Actor engine (component F): active (release) and passive (observe)
//! actors, including CSK (concentration-shift keying) modulation.

use crate::builder::RegionGraph;
use crate::config::{ActorConfig, ActorFootprintConfig, ModulationConfig, ShapeKind};
use crate::geometry::{self, Point3, Shape};
use crate::ledger::ConservationLedger;
use crate::molecule::MoleculeStore;
use crate::rng::Stream;

#[derive(Debug, Clone)]
pub enum Footprint {
    Shape(Shape),
    Regions(Vec<usize>),
}

#[derive(Debug, Clone)]
pub struct Observation {
    pub time: Option<f64>,
    pub counts: Vec<u64>,
    pub positions: Option<Vec<Vec<Point3>>>,
}

#[derive(Debug, Clone)]
pub struct Actor {
    pub label: String,
    pub footprint: Footprint,
    pub is_active: bool,
    pub start_time: f64,
    pub action_interval: f64,
    pub max_actions: Option<u64>,
    pub modulation: Option<ModulationConfig>,
    pub release_mask: Vec<bool>,
    pub observe_mask: Vec<bool>,
    pub record_positions_mask: Vec<bool>,
    pub record_time: bool,
    pub actions_taken: u64,
    pub emitted_symbols: Vec<u32>,
    pub observations: Vec<Observation>,
}

impl Actor {
    pub fn next_action_time(&self) -> f64 {
        self.start_time + self.actions_taken as f64 * self.action_interval
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_actions.is_some_and(|m| self.actions_taken >= m)
    }
}

pub fn compile_actor(cfg: &ActorConfig, graph: &RegionGraph) -> Actor {
    let footprint = match &cfg.footprint {
        ActorFootprintConfig::Shape { kind, params, axis } => Footprint::Shape(crate::config::shape_from_parts(*kind, *params, *axis)),
        ActorFootprintConfig::RegionLabels(labels) => Footprint::Regions(labels.iter().filter_map(|l| graph.region_index(l)).collect()),
    };
    Actor {
        label: cfg.label.clone(),
        footprint,
        is_active: cfg.is_active,
        start_time: cfg.start_time,
        action_interval: cfg.action_interval,
        max_actions: cfg.max_actions,
        modulation: cfg.modulation.clone(),
        release_mask: cfg.release_mask.clone(),
        observe_mask: cfg.observe_mask.clone(),
        record_positions_mask: cfg.record_positions_mask.clone(),
        record_time: cfg.record_time,
        actions_taken: 0,
        emitted_symbols: Vec::new(),
        observations: Vec::new(),
    }
}

/// Samples one uniform point within the actor's footprint, for active
/// release. A region-label footprint is rejection-sampled across the union
/// of its regions weighted by volume.
fn sample_footprint_point(footprint: &Footprint, graph: &RegionGraph, rng: &mut Stream) -> (Point3, usize) {
    match footprint {
        Footprint::Shape(shape) => {
            let p = geometry::uniform_point(shape, rng.underlying(), false);
            let region = graph.regions.iter().position(|r| geometry::contains(p, &r.shape, 1e-9)).unwrap_or(0);
            (p, region)
        }
        Footprint::Regions(regions) => {
            let weights: Vec<f64> = regions.iter().map(|&r| graph.regions[r].shape.measure()).collect();
            let total: f64 = weights.iter().sum();
            let mut target = rng.uniform() * total.max(1e-300);
            let mut chosen = regions[0];
            for (&r, &w) in regions.iter().zip(&weights) {
                if target <= w {
                    chosen = r;
                    break;
                }
                target -= w;
            }
            (geometry::uniform_point(&graph.regions[chosen].shape, rng.underlying(), false), chosen)
        }
    }
}

/// Runs one active-actor action at `t`: chooses the CSK symbol, releases
/// molecules spread over `[t, t + release_interval)`, and records the
/// emitted symbol in the actor's bit sequence.
pub fn active_action(actor: &mut Actor, t: f64, dt: f64, graph: &RegionGraph, store: &mut MoleculeStore, rng: &mut Stream, ledger: &mut ConservationLedger) {
    let Some(modulation) = actor.modulation.clone() else { return };
    let max_symbol = (1u32 << modulation.bits_per_symbol) - 1;
    let symbol: u32 = (0..modulation.bits_per_symbol).fold(0, |acc, _| (acc << 1) | if rng.uniform() < modulation.probability_of_one { 1 } else { 0 }).min(max_symbol);
    actor.emitted_symbols.push(symbol);
    let n_per_type = (modulation.strength * symbol as f64).round().max(0.0) as u64;

    for (ty, &enabled) in actor.release_mask.iter().enumerate() {
        if !enabled {
            continue;
        }
        if n_per_type > 0 {
            ledger.record_actor_release(ty, n_per_type);
        }
        for i in 0..n_per_type {
            let release_t = if modulation.random_release_times {
                t + rng.uniform() * modulation.release_interval
            } else if n_per_type > 1 {
                t + modulation.slot_interval * (i as f64) / (n_per_type as f64 - 1.0).max(1.0)
            } else {
                t
            };
            let (pos, region) = sample_footprint_point(&actor.footprint, graph, rng);
            let next_boundary = ((release_t / dt).floor() + 1.0) * dt;
            store.push_recent(region, ty, pos, (next_boundary - release_t).max(0.0));
        }
    }
    actor.actions_taken += 1;
}

/// Runs one passive-actor action at `t`: counts molecules/subvolume counts
/// contained in the footprint and appends an observation snapshot.
pub fn passive_action(actor: &mut Actor, t: f64, graph: &RegionGraph, store: &MoleculeStore) {
    let num_types = store.num_types();
    let mut counts = vec![0u64; num_types];
    let mut positions: Vec<Vec<Point3>> = vec![Vec::new(); num_types];

    let contained = |p: Point3| -> bool {
        match &actor.footprint {
            Footprint::Shape(shape) => geometry::contains(p, shape, 1e-9),
            Footprint::Regions(regions) => regions.iter().any(|&r| geometry::contains(p, &graph.regions[r].shape, 1e-9)),
        }
    };

    for (region_idx, region) in graph.regions.iter().enumerate() {
        for ty in 0..num_types {
            if !actor.observe_mask.get(ty).copied().unwrap_or(false) {
                continue;
            }
            if region.is_microscopic {
                for m in store.steady(region_idx, ty) {
                    if contained(m.pos) {
                        counts[ty] += 1;
                        if actor.record_positions_mask.get(ty).copied().unwrap_or(false) {
                            positions[ty].push(m.pos);
                        }
                    }
                }
            } else {
                for sub_id in region.sub_range.clone() {
                    let sub = &graph.subvolumes[sub_id];
                    let full = match &actor.footprint {
                        Footprint::Shape(shape) => shape.aabb().is_some_and(|a| {
                            a.min.x <= sub.aabb.min.x && a.min.y <= sub.aabb.min.y && a.min.z <= sub.aabb.min.z && a.max.x >= sub.aabb.max.x && a.max.y >= sub.aabb.max.y && a.max.z >= sub.aabb.max.z
                        }),
                        Footprint::Regions(regions) => regions.contains(&region_idx),
                    };
                    if full {
                        counts[ty] += sub.counts.get(ty).copied().unwrap_or(0);
                    } else if contained(sub.aabb.min) || contained(sub.aabb.max) {
                        // boundary subvolume: weight by the fraction of its
                        // volume that overlaps the footprint.
                        let overlap_volume = match &actor.footprint {
                            Footprint::Shape(shape) => geometry::shape_aabb_overlap_volume(shape, &sub.aabb, 1e-9),
                            Footprint::Regions(regions) => regions.iter().map(|&r| geometry::shape_aabb_overlap_volume(&graph.regions[r].shape, &sub.aabb, 1e-9)).sum::<f64>().min(sub.aabb.volume()),
                        };
                        let overlap_fraction = (overlap_volume / sub.aabb.volume().max(1e-300)).clamp(0.0, 1.0);
                        counts[ty] += ((sub.counts.get(ty).copied().unwrap_or(0) as f64) * overlap_fraction) as u64;
                    }
                }
            }
        }
    }

    let positions = if actor.record_positions_mask.iter().any(|&b| b) { Some(positions) } else { None };
    actor.observations.push(Observation { time: if actor.record_time { Some(t) } else { None }, counts, positions });
    actor.actions_taken += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_graph;
    use crate::config::{EnvironmentConfig, RegionConfig, RegionKind};

    fn base_env() -> EnvironmentConfig {
        EnvironmentConfig {
            num_dimensions: 3,
            subvolume_base_size: 1.0,
            regions: vec![RegionConfig {
                label: "box".into(),
                parent_label: None,
                shape: ShapeKind::RectangularBox,
                params: [0.0, 0.0, 0.0, 2.0, 2.0, 2.0],
                axis: None,
                kind: RegionKind::Normal,
                surface_kind: None,
                is_microscopic: true,
                nx: 1,
                ny: 1,
                nz: 1,
                sub_size: 1.0,
                flow: None,
            }],
            actors: vec![],
        }
    }

    #[test]
    fn passive_actor_counts_steady_molecules() {
        let env = base_env();
        let graph = build_graph(&env, 1, &[1e-9], 1e-3, 1e-12).unwrap();
        let mut store = MoleculeStore::new(graph.regions.len(), 1);
        store.push_steady(0, 0, Point3::new(1.0, 1.0, 1.0));
        let mut actor = Actor {
            label: "obs".into(),
            footprint: Footprint::Shape(graph.regions[0].shape.clone()),
            is_active: false,
            start_time: 0.0,
            action_interval: 1.0,
            max_actions: None,
            modulation: None,
            release_mask: vec![],
            observe_mask: vec![true],
            record_positions_mask: vec![false],
            record_time: true,
            actions_taken: 0,
            emitted_symbols: vec![],
            observations: vec![],
        };
        passive_action(&mut actor, 0.0, &graph, &store);
        assert_eq!(actor.observations[0].counts[0], 1);
    }
}
