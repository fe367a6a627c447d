//! Mesoscopic engine (component E): next-subvolume-method (NSM) simulation.
//!
//! Each mesoscopic subvolume carries a propensity for every chemical
//! reaction compiled for its region plus one diffusion propensity per
//! (neighbor, molecule type). The global next event is the minimum
//! putative time over all subvolume-reaction pairs (spec.md §4.E).

use crate::builder::RegionGraph;
use crate::ledger::ConservationLedger;
use crate::molecule::MoleculeStore;
use crate::reaction::RegionReactionTable;
use crate::rng::Stream;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MesoEventKind {
    Reaction { reaction_source_index: usize },
    Diffusion { neighbor_index: usize, molecule_type: usize },
}

/// Per-subvolume NSM state: the flattened propensity vector and the next
/// putative event time `tau`. Indexed by `meso_id`, not by the global
/// subvolume id.
#[derive(Debug, Clone)]
pub struct MesoState {
    pub propensities: Vec<Vec<f64>>,
    pub kinds: Vec<Vec<MesoEventKind>>,
    pub tau: Vec<f64>,
}

impl MesoState {
    pub fn new(graph: &RegionGraph, tables: &[RegionReactionTable]) -> Self {
        let mut propensities = Vec::with_capacity(graph.num_meso);
        let mut kinds = Vec::with_capacity(graph.num_meso);
        for sub in &graph.subvolumes {
            if sub.meso_id.is_none() {
                continue;
            }
            let (props, ks) = build_layout(sub, graph, tables);
            propensities.push(props);
            kinds.push(ks);
        }
        let tau = vec![f64::INFINITY; propensities.len()];
        MesoState { propensities, kinds, tau }
    }

    pub fn total_propensity(&self, meso_id: usize) -> f64 {
        self.propensities[meso_id].iter().sum()
    }

    /// Recomputes one subvolume's propensities from scratch (not by delta
    /// accounting): the design decision spec.md §4.E calls out as trading
    /// CPU for numerical robustness against slow drift/underflow.
    pub fn refresh(&mut self, sub_id: usize, graph: &RegionGraph, tables: &[RegionReactionTable]) {
        let sub = &graph.subvolumes[sub_id];
        let Some(meso_id) = sub.meso_id else { return };
        let (props, kinds) = build_layout(sub, graph, tables);
        self.propensities[meso_id] = props;
        self.kinds[meso_id] = kinds;
    }

    /// Redraws `tau` for one subvolume using the direct NSM formula
    /// `tau_new = t_now - log(u) / a0_new`.
    pub fn redraw_tau(&mut self, meso_id: usize, t_now: f64, rng: &mut Stream) {
        let a0 = self.total_propensity(meso_id);
        self.tau[meso_id] = if a0 > 0.0 {
            t_now - rng.uniform().max(1e-300).ln() / a0
        } else {
            f64::INFINITY
        };
    }

    pub fn next_meso_id(&self) -> Option<(usize, f64)> {
        self.tau
            .iter()
            .enumerate()
            .filter(|(_, &t)| t.is_finite())
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, &t)| (i, t))
    }

    /// Chooses which reaction/diffusion propensity fired within a
    /// subvolume, proportional to propensity mass.
    pub fn pick_event(&self, meso_id: usize, rng: &mut Stream) -> Option<MesoEventKind> {
        let total = self.total_propensity(meso_id);
        if total <= 0.0 {
            return None;
        }
        let target = rng.uniform() * total;
        let mut acc = 0.0;
        for (i, &p) in self.propensities[meso_id].iter().enumerate() {
            acc += p;
            if acc >= target {
                return Some(self.kinds[meso_id][i]);
            }
        }
        self.kinds[meso_id].last().copied()
    }
}

fn build_layout(sub: &crate::builder::Subvolume, graph: &RegionGraph, tables: &[RegionReactionTable]) -> (Vec<f64>, Vec<MesoEventKind>) {
    let mut props = Vec::new();
    let mut kinds = Vec::new();
    let table = &tables[sub.region_id];
    for reaction in &table.reactions {
        let p = reaction_propensity(&reaction.reactants, &sub.counts, reaction.meso_rate);
        props.push(p);
        kinds.push(MesoEventKind::Reaction { reaction_source_index: reaction.source_index });
    }
    for (neighbor_index, link) in sub.neighbors.iter().enumerate() {
        if link.diffusion_rate.is_empty() {
            continue;
        }
        for (ty, &rate) in link.diffusion_rate.iter().enumerate() {
            let count = sub.counts.get(ty).copied().unwrap_or(0) as f64;
            props.push(rate * count);
            kinds.push(MesoEventKind::Diffusion { neighbor_index, molecule_type: ty });
        }
    }
    (props, kinds)
}

fn reaction_propensity(reactants: &[u32], counts: &[u64], rate: f64) -> f64 {
    let mut combinatorial = 1.0;
    for (ty, &mult) in reactants.iter().enumerate() {
        let n = counts.get(ty).copied().unwrap_or(0) as i64;
        for k in 0..mult as i64 {
            combinatorial *= (n - k).max(0) as f64;
        }
        combinatorial /= factorial(mult);
    }
    rate * combinatorial
}

fn factorial(n: u32) -> f64 {
    (1..=n as u64).product::<u64>() as f64
}

/// Executes one meso event in `sub_id`: updates molecule counts and returns
/// the set of subvolumes whose propensities must be refreshed (the source,
/// and the destination for a diffusion event).
#[allow(clippy::too_many_arguments)]
pub fn execute_event(
    sub_id: usize,
    event: MesoEventKind,
    graph: &mut RegionGraph,
    tables: &[RegionReactionTable],
    store: &mut MoleculeStore,
    rng: &mut Stream,
    ledger: &mut ConservationLedger,
    t: f64,
    dt: f64,
) -> Vec<usize> {
    match event {
        MesoEventKind::Reaction { reaction_source_index } => {
            let region_id = graph.subvolumes[sub_id].region_id;
            let reaction = tables[region_id].reactions.iter().find(|r| r.source_index == reaction_source_index).unwrap().clone();
            for (ty, &mult) in reaction.reactants.iter().enumerate() {
                if mult == 0 {
                    continue;
                }
                let c = &mut graph.subvolumes[sub_id].counts[ty];
                *c = c.saturating_sub(mult as u64);
                ledger.record_consumption(ty, mult as u64);
            }
            for (ty, &mult) in reaction.products.iter().enumerate() {
                if mult == 0 {
                    continue;
                }
                graph.subvolumes[sub_id].counts[ty] += mult as u64;
                ledger.record_production(ty, mult as u64);
            }
            vec![sub_id]
        }
        MesoEventKind::Diffusion { neighbor_index, molecule_type } => {
            let neighbor_sub = graph.subvolumes[sub_id].neighbors[neighbor_index].neighbor_sub_id;
            let c = &mut graph.subvolumes[sub_id].counts[molecule_type];
            *c = c.saturating_sub(1);
            let neighbor_region_id = graph.subvolumes[neighbor_sub].region_id;
            if graph.regions[neighbor_region_id].is_microscopic {
                let pos = crate::geometry::uniform_point(&graph.subvolumes[neighbor_sub].aabb_as_shape(), rng.underlying(), false);
                let next_boundary = ((t / dt).floor() + 1.0) * dt;
                store.push_recent(neighbor_region_id, molecule_type, pos, (next_boundary - t).max(0.0));
                vec![sub_id]
            } else {
                graph.subvolumes[neighbor_sub].counts[molecule_type] += 1;
                vec![sub_id, neighbor_sub]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factorial_matches_expectation() {
        assert_eq!(factorial(0), 1.0);
        assert_eq!(factorial(3), 6.0);
    }

    #[test]
    fn reaction_propensity_second_order_same_type() {
        let reactants = vec![2];
        let counts = vec![5];
        let p = reaction_propensity(&reactants, &counts, 1.0);
        assert!((p - 10.0).abs() < 1e-12); // C(5,2) = 10
    }
}
