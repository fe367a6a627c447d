//! Per-(region, molecule-type) molecule lists (spec.md §3, §9).
//!
//! The source used intrusive singly-linked lists; this spec mandates only
//! the semantics -- ordered insertion, cheap append, whole-list drain into
//! another list -- leaving the concrete structure free. We use a plain
//! `Vec` per (region, type) for both the steady and recent lists, with
//! `swap_remove` for O(1) removal since molecule order within a list carries
//! no semantic meaning.

use crate::geometry::Point3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteadyMolecule {
    pub pos: Point3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecentMolecule {
    pub pos: Point3,
    /// Time remaining between this molecule's creation instant and the next
    /// global micro boundary.
    pub dt_partial: f64,
}

/// Owns the steady and recent molecule lists for every (region, type) pair
/// across all microscopic regions.
#[derive(Debug, Clone)]
pub struct MoleculeStore {
    num_types: usize,
    steady: Vec<Vec<Vec<SteadyMolecule>>>,
    recent: Vec<Vec<Vec<RecentMolecule>>>,
}

impl MoleculeStore {
    pub fn new(num_regions: usize, num_types: usize) -> Self {
        MoleculeStore {
            num_types,
            steady: vec![vec![Vec::new(); num_types]; num_regions],
            recent: vec![vec![Vec::new(); num_types]; num_regions],
        }
    }

    pub fn steady(&self, region: usize, ty: usize) -> &[SteadyMolecule] {
        &self.steady[region][ty]
    }

    pub fn steady_mut(&mut self, region: usize, ty: usize) -> &mut Vec<SteadyMolecule> {
        &mut self.steady[region][ty]
    }

    pub fn recent_mut(&mut self, region: usize, ty: usize) -> &mut Vec<RecentMolecule> {
        &mut self.recent[region][ty]
    }

    pub fn push_recent(&mut self, region: usize, ty: usize, pos: Point3, dt_partial: f64) {
        self.recent[region][ty].push(RecentMolecule { pos, dt_partial });
    }

    pub fn push_steady(&mut self, region: usize, ty: usize, pos: Point3) {
        self.steady[region][ty].push(SteadyMolecule { pos });
    }

    /// Drains every recent molecule of `region`/`ty` into its steady list,
    /// as required at the end of a micro tick once all partial steps have
    /// been integrated (spec.md §4.D.5).
    pub fn promote_recent(&mut self, region: usize, ty: usize) {
        let mut drained: Vec<SteadyMolecule> = self.recent[region][ty].drain(..).map(|m| SteadyMolecule { pos: m.pos }).collect();
        self.steady[region][ty].append(&mut drained);
    }

    pub fn take_recent(&mut self, region: usize, ty: usize) -> Vec<RecentMolecule> {
        std::mem::take(&mut self.recent[region][ty])
    }

    pub fn total_count(&self, region: usize, ty: usize) -> usize {
        self.steady[region][ty].len() + self.recent[region][ty].len()
    }

    pub fn num_types(&self) -> usize {
        self.num_types
    }

    pub fn total_molecules(&self) -> usize {
        self.steady.iter().flatten().map(|v| v.len()).sum::<usize>() + self.recent.iter().flatten().map(|v| v.len()).sum::<usize>()
    }
}
