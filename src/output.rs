//! Per-realization and per-run output records (spec.md §6).
//!
//! JSON formatting, output directories, and file handles are external
//! collaborators; this module only owns the serde-serializable records the
//! core hands back, stopping exactly at the record.

use serde::Serialize;

use crate::actor::{Actor, Observation};
use crate::geometry::Point3;

#[derive(Debug, Clone, Serialize)]
pub struct PointRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Point3> for PointRecord {
    fn from(p: Point3) -> Self {
        PointRecord { x: p.x, y: p.y, z: p.z }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ObservationRecord {
    pub time: Option<f64>,
    pub counts: Vec<u64>,
    pub positions: Option<Vec<Vec<PointRecord>>>,
}

impl From<&Observation> for ObservationRecord {
    fn from(o: &Observation) -> Self {
        ObservationRecord {
            time: o.time,
            counts: o.counts.clone(),
            positions: o.positions.as_ref().map(|lists| lists.iter().map(|l| l.iter().map(|&p| p.into()).collect()).collect()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActorOutput {
    pub label: String,
    pub emitted_symbols: Option<Vec<u32>>,
    pub observations: Option<Vec<ObservationRecord>>,
}

impl From<&Actor> for ActorOutput {
    fn from(a: &Actor) -> Self {
        ActorOutput {
            label: a.label.clone(),
            emitted_symbols: a.is_active.then(|| a.emitted_symbols.clone()),
            observations: (!a.is_active).then(|| a.observations.iter().map(ObservationRecord::from).collect()),
        }
    }
}

/// One realization's output stream: the realization index followed by
/// every actor's record, in declaration order (spec.md §6).
#[derive(Debug, Clone, Serialize)]
pub struct RealizationOutput {
    pub realization_index: u32,
    pub actors: Vec<ActorOutput>,
}

/// The summary stream emitted once per run, across all repeats.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input_filename: String,
    pub seed: u64,
    pub repeats: u32,
    pub wall_clock_start_secs: f64,
    pub wall_clock_end_secs: f64,
    /// Per-actor maximum bit or observation count reached in any
    /// realization, used by downstream tooling to size rectangular arrays.
    pub max_counts_per_actor: Vec<(String, usize)>,
}

impl RunSummary {
    pub fn from_outputs(outputs: &[RealizationOutput], input_filename: &str, seed: u64, wall_clock_start_secs: f64, wall_clock_end_secs: f64) -> Self {
        let mut max_counts: Vec<(String, usize)> = Vec::new();
        for out in outputs {
            for actor in &out.actors {
                let count = actor.emitted_symbols.as_ref().map_or(0, Vec::len).max(actor.observations.as_ref().map_or(0, Vec::len));
                match max_counts.iter_mut().find(|(label, _)| label == &actor.label) {
                    Some((_, n)) => *n = (*n).max(count),
                    None => max_counts.push((actor.label.clone(), count)),
                }
            }
        }
        RunSummary {
            input_filename: input_filename.to_string(),
            seed,
            repeats: outputs.len() as u32,
            wall_clock_start_secs,
            wall_clock_end_secs,
            max_counts_per_actor: max_counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_tracks_max_observation_count_per_actor() {
        let outputs = vec![
            RealizationOutput { realization_index: 0, actors: vec![ActorOutput { label: "obs".into(), emitted_symbols: None, observations: Some(vec![ObservationRecord { time: Some(0.0), counts: vec![1], positions: None }]) }] },
            RealizationOutput {
                realization_index: 1,
                actors: vec![ActorOutput {
                    label: "obs".into(),
                    emitted_symbols: None,
                    observations: Some(vec![ObservationRecord { time: Some(0.0), counts: vec![1], positions: None }, ObservationRecord { time: Some(1.0), counts: vec![2], positions: None }]),
                }],
            },
        ];
        let summary = RunSummary::from_outputs(&outputs, "scenario.json", 7, 0.0, 1.0);
        assert_eq!(summary.repeats, 2);
        assert_eq!(summary.max_counts_per_actor, vec![("obs".to_string(), 2)]);
    }
}
