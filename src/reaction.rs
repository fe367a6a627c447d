//! Chem-rxn compiler (component C).
//!
//! Classifies each configured reaction by order, decides which regions
//! admit it (default-everywhere minus exceptions, filtered by surface
//! kind), and precomputes the region-local rates and first-order
//! cumulative probability tables consumed by the micro and meso engines.

use crate::builder::Region;
use crate::config::{ReactionConfig, RegionKind, SurfaceKind, SurfaceReactionKind};
use crate::error::ReactionIncompatible;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Zero,
    One,
    Two,
}

fn classify_order(reactants: &[u32]) -> Order {
    let total: u32 = reactants.iter().sum();
    match total {
        0 => Order::Zero,
        1 => Order::One,
        _ => Order::Two,
    }
}

/// A reaction as compiled for one particular region: its effective rate in
/// that region's geometry, plus the bookkeeping the micro and meso engines
/// need to apply it.
#[derive(Debug, Clone)]
pub struct CompiledReaction {
    pub source_index: usize,
    pub order: Order,
    pub reactants: Vec<u32>,
    pub products: Vec<u32>,
    pub is_surface: bool,
    pub surface_kind: Option<SurfaceReactionKind>,
    /// Meso propensity rate (already volume/area/length scaled for order 0
    /// and 2; bare `k` for order 1).
    pub meso_rate: f64,
    /// Micro probability per step (order 1) or per-step expected count
    /// (order 0); unused (0.0) for order 2, which the micro engine does not
    /// evaluate directly -- it falls out of the meso side only in this
    /// design, per spec.md §4.D's description of micro reactions as
    /// first-order only.
    pub micro_rate: f64,
}

/// Per-region compiled reaction tables: the effective rates plus, for each
/// molecule type, the cumulative probability table over first-order
/// reactions for which that type is the sole reactant.
#[derive(Debug, Clone)]
pub struct RegionReactionTable {
    pub reactions: Vec<CompiledReaction>,
    /// `cumulative[type][k]` = cumulative probability of having picked one
    /// of the first `k+1` first-order reactions available to `type`.
    pub cumulative: Vec<Vec<(usize, f64)>>,
    /// `min_rxn_time_rv[type]` = probability that no first-order reaction
    /// of `type` fires in one micro step, `exp(-dt * sum(rates))`.
    pub min_rxn_time_rv: Vec<f64>,
}

fn admitted_in_region(cfg: &ReactionConfig, region: &Region) -> bool {
    let excepted = cfg.exception_regions.iter().any(|l| l == &region.label);
    if cfg.default_everywhere {
        !excepted
    } else {
        excepted
    }
}

/// Compiles every admitted reaction for one region. `measure` is the
/// region's volume (3D), area (2D surface) or length (1D); `dt` is the
/// global micro step; `diffusion_coeffs` supplies `D` for the absorbing
/// first-order correction.
pub fn compile_region_reactions(
    reactions: &[ReactionConfig],
    region: &Region,
    measure: f64,
    dt: f64,
    diffusion_coeffs: &[f64],
    num_types: usize,
) -> Result<RegionReactionTable, ReactionIncompatible> {
    let mut compiled = Vec::new();
    for (idx, cfg) in reactions.iter().enumerate() {
        if !admitted_in_region(cfg, region) {
            continue;
        }
        let order = classify_order(&cfg.reactants);
        let surface_kind = cfg.surface_kind;
        if region.is_surface() {
            if matches!(order, Order::Zero) && !matches!(surface_kind, Some(SurfaceReactionKind::Normal) | None) {
                return Err(ReactionIncompatible::NonNormalOrderZeroOnSurface(idx, region.label.clone()));
            }
            if matches!(order, Order::Two) && !matches!(surface_kind, Some(SurfaceReactionKind::Normal) | None) {
                return Err(ReactionIncompatible::NonNormalOrderTwoOnSurface(idx, region.label.clone()));
            }
            // a Membrane-composition region only makes sense for reactions
            // that pass molecules through (Normal, Membrane); Inner/Outer
            // surfaces face a single side and cannot carry a Membrane
            // reaction, which requires two sides to pass between.
            match (region.surface_kind, surface_kind) {
                (Some(SurfaceKind::Membrane), Some(SurfaceReactionKind::Absorbing | SurfaceReactionKind::Receptor)) => {
                    return Err(ReactionIncompatible::SurfaceKindMismatch(idx, region.label.clone()));
                }
                (Some(SurfaceKind::Inner | SurfaceKind::Outer), Some(SurfaceReactionKind::Membrane)) => {
                    return Err(ReactionIncompatible::SurfaceKindMismatch(idx, region.label.clone()));
                }
                _ => {}
            }
        }
        let (meso_rate, micro_rate) = match order {
            Order::Zero => (cfg.k * measure, cfg.k * measure),
            Order::One => {
                let reactant_type = cfg.reactants.iter().position(|&n| n > 0);
                let effective_micro = match surface_kind {
                    Some(SurfaceReactionKind::Absorbing) => {
                        let d = reactant_type.and_then(|t| diffusion_coeffs.get(t).copied()).unwrap_or(1.0).max(1e-300);
                        1.0 - (-cfg.k * (std::f64::consts::PI * dt / d).sqrt()).exp()
                    }
                    _ => 1.0 - (-cfg.k * dt).exp(),
                };
                (cfg.k, effective_micro)
            }
            Order::Two => (cfg.k / measure.max(1e-300), 0.0),
        };
        compiled.push(CompiledReaction {
            source_index: idx,
            order,
            reactants: cfg.reactants.clone(),
            products: cfg.products.clone(),
            is_surface: cfg.is_surface,
            surface_kind,
            meso_rate,
            micro_rate,
        });
    }

    // Build per-type cumulative probability tables over first-order
    // reactions for which that type is the sole reactant.
    let mut cumulative = vec![Vec::new(); num_types];
    let mut min_rxn_time_rv = vec![1.0; num_types];
    for t in 0..num_types {
        let applicable: Vec<&CompiledReaction> = compiled
            .iter()
            .filter(|r| matches!(r.order, Order::One) && r.reactants.get(t).copied().unwrap_or(0) == 1 && r.reactants.iter().filter(|&&n| n > 0).count() == 1)
            .collect();
        if applicable.is_empty() {
            continue;
        }
        let exclusive_count = applicable.iter().filter(|r| !matches!(r.surface_kind, Some(SurfaceReactionKind::Normal) | None)).count();
        if exclusive_count > 0 && applicable.len() > 1 {
            return Err(ReactionIncompatible::ExclusivityViolation(t, region.label.clone()));
        }
        let source_rates: Vec<f64> = applicable.iter().map(|r| reactions[r.source_index].k).collect();
        let total: f64 = source_rates.iter().sum();
        min_rxn_time_rv[t] = (-dt * total).exp();
        let mut acc = 0.0;
        let one_minus = 1.0 - min_rxn_time_rv[t];
        if total.is_infinite() || total == 0.0 {
            // infinite-rate reactions share the unit mass equally.
            let n = applicable.len() as f64;
            for r in &applicable {
                acc += 1.0 / n;
                cumulative[t].push((r.source_index, acc));
            }
        } else {
            for (r, &rate) in applicable.iter().zip(&source_rates) {
                acc += (rate / total) * one_minus;
                cumulative[t].push((r.source_index, acc));
            }
        }
    }

    Ok(RegionReactionTable { reactions: compiled, cumulative, min_rxn_time_rv })
}
