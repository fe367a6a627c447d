//! Scheduler (component G): a heterogeneous priority queue over per-actor
//! actions, per-region micro time steps, and mesoscopic reaction events,
//! advancing simulated time monotonically (spec.md §4.G).
//!
//! Single-threaded cooperative within one realization (spec.md §5): every
//! component call runs to completion before the next event is popped, so
//! there is no re-entrant state mutation to guard against.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::{debug, info};

use crate::actor::{self, Actor};
use crate::builder::RegionGraph;
use crate::error::EngineError;
use crate::ledger::ConservationLedger;
use crate::meso::{self, MesoState};
use crate::molecule::MoleculeStore;
use crate::reaction::RegionReactionTable;
use crate::rng::Stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Actor(usize),
    Micro(usize),
    Meso(usize),
    Progress,
}

/// Tie-break priority for events with (numerically) equal time, matching
/// spec.md §4.G: actor < micro < meso.
fn priority(kind: &EventKind) -> u8 {
    match kind {
        EventKind::Actor(_) => 0,
        EventKind::Micro(_) => 1,
        EventKind::Meso(_) => 2,
        EventKind::Progress => 3,
    }
}

#[derive(Debug, Clone, Copy)]
struct ScheduledEvent {
    time: f64,
    kind: EventKind,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && priority(&self.kind) == priority(&other.kind)
    }
}
impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest time pops first.
        other
            .time
            .partial_cmp(&self.time)
            .unwrap_or(Ordering::Equal)
            .then_with(|| priority(&other.kind).cmp(&priority(&self.kind)))
    }
}

/// Owns all per-realization mutable state: the region/subvolume graph,
/// compiled reaction tables, molecule store, meso NSM state, actors, and
/// the PRNG stream. Lifetime is init-then-run-then-drop (spec.md §9).
pub struct Realization {
    pub graph: RegionGraph,
    pub tables: Vec<RegionReactionTable>,
    pub store: MoleculeStore,
    pub meso: MesoState,
    pub actors: Vec<Actor>,
    pub diffusion_coeffs: Vec<f64>,
    pub dt: f64,
    pub t: f64,
    pub final_time: f64,
    pub dist_error: f64,
    pub progress_interval: f64,
    pub ledger: ConservationLedger,
    rng: Stream,
    queue: BinaryHeap<ScheduledEvent>,
}

impl Realization {
    pub fn new(
        graph: RegionGraph,
        tables: Vec<RegionReactionTable>,
        actors: Vec<Actor>,
        diffusion_coeffs: Vec<f64>,
        dt: f64,
        final_time: f64,
        dist_error: f64,
        progress_interval: f64,
        seed: u64,
    ) -> Self {
        let num_types = diffusion_coeffs.len();
        let store = MoleculeStore::new(graph.regions.len(), num_types);
        let meso = MesoState::new(&graph, &tables);
        Realization {
            graph,
            tables,
            store,
            meso,
            actors,
            diffusion_coeffs,
            dt,
            t: 0.0,
            final_time,
            dist_error,
            progress_interval,
            ledger: ConservationLedger::new(num_types),
            rng: Stream::from_seed(seed),
            queue: BinaryHeap::new(),
        }
    }

    pub fn total_population(&self) -> u64 {
        let micro: u64 = self.store.total_molecules() as u64;
        let meso: u64 = self.graph.subvolumes.iter().map(|s| s.counts.iter().sum::<u64>()).sum();
        micro + meso
    }

    fn seed_queue(&mut self) {
        for region_id in 0..self.graph.regions.len() {
            if self.graph.regions[region_id].is_microscopic {
                self.queue.push(ScheduledEvent { time: self.dt, kind: EventKind::Micro(region_id) });
            }
        }
        for meso_id in 0..self.meso.tau.len() {
            self.meso.redraw_tau(meso_id, 0.0, &mut self.rng);
            self.queue.push(ScheduledEvent { time: self.meso.tau[meso_id], kind: EventKind::Meso(meso_id) });
        }
        for (actor_id, a) in self.actors.iter().enumerate() {
            self.queue.push(ScheduledEvent { time: a.start_time, kind: EventKind::Actor(actor_id) });
        }
        if self.progress_interval > 0.0 {
            self.queue.push(ScheduledEvent { time: self.progress_interval, kind: EventKind::Progress });
        }
    }

    /// Drives the realization to completion: `t > final_time` or every
    /// actor has consumed its `max_actions`.
    pub fn run(&mut self) -> Result<(), EngineError> {
        self.seed_queue();
        let mut last_t = 0.0;
        while let Some(event) = self.queue.pop() {
            if event.time > self.final_time {
                break;
            }
            debug_assert!(event.time + 1e-9 >= last_t, "scheduler popped a non-monotonic event time");
            last_t = event.time;
            self.t = event.time;
            match event.kind {
                EventKind::Actor(actor_id) => {
                    if self.actors[actor_id].is_exhausted() {
                        continue;
                    }
                    self.run_actor(actor_id);
                    if !self.actors[actor_id].is_exhausted() {
                        let next = self.actors[actor_id].next_action_time();
                        self.queue.push(ScheduledEvent { time: next, kind: EventKind::Actor(actor_id) });
                    }
                }
                EventKind::Micro(region_id) => {
                    crate::micro::micro_tick(
                        region_id,
                        self.t,
                        self.dt,
                        &mut self.graph,
                        &self.tables,
                        &mut self.store,
                        &mut self.rng,
                        &self.diffusion_coeffs,
                        self.dist_error,
                        &mut self.ledger,
                    );
                    self.queue.push(ScheduledEvent { time: self.t + self.dt, kind: EventKind::Micro(region_id) });
                }
                EventKind::Meso(meso_id) => {
                    self.run_meso_event(meso_id);
                }
                EventKind::Progress => {
                    info!("t = {:.6} / {:.6}, population = {}", self.t, self.final_time, self.total_population());
                    self.queue.push(ScheduledEvent { time: self.t + self.progress_interval, kind: EventKind::Progress });
                }
            }
            if self.actors.iter().all(|a| a.is_exhausted()) && !self.actors.is_empty() {
                break;
            }
        }
        Ok(())
    }

    fn run_actor(&mut self, actor_id: usize) {
        let t = self.t;
        if self.actors[actor_id].is_active {
            let mut actor = self.actors[actor_id].clone();
            actor::active_action(&mut actor, t, self.dt, &self.graph, &mut self.store, &mut self.rng, &mut self.ledger);
            self.actors[actor_id] = actor;
        } else {
            let mut actor = self.actors[actor_id].clone();
            actor::passive_action(&mut actor, t, &self.graph, &self.store);
            self.actors[actor_id] = actor;
        }
    }

    fn run_meso_event(&mut self, meso_id: usize) {
        let sub_id = match self.graph.subvolumes.iter().position(|s| s.meso_id == Some(meso_id)) {
            Some(id) => id,
            None => return,
        };
        let Some(event) = self.meso.pick_event(meso_id, &mut self.rng) else {
            self.meso.tau[meso_id] = f64::INFINITY;
            return;
        };
        let affected = meso::execute_event(sub_id, event, &mut self.graph, &self.tables, &mut self.store, &mut self.rng, &mut self.ledger, self.t, self.dt);
        for sub in affected {
            self.meso.refresh(sub, &self.graph, &self.tables);
            if let Some(mid) = self.graph.subvolumes[sub].meso_id {
                self.meso.redraw_tau(mid, self.t, &mut self.rng);
                self.queue.push(ScheduledEvent { time: self.meso.tau[mid], kind: EventKind::Meso(mid) });
            }
        }
        debug!("meso event in subvolume {} at t={:.6}", sub_id, self.t);
    }
}
