//! rdme-hybrid is a stochastic simulator for hybrid micro/mesoscopic
//! reaction-diffusion systems, built for studying molecular communication:
//! one or more active agents release molecules into a shared 3D volume;
//! one or more passive agents observe molecular populations at their
//! locations over time.
//!
//! The environment is partitioned into geometric regions, each further
//! partitioned into subvolumes that are either microscopic (molecules
//! tracked as individual 3D coordinates, diffusing by Brownian jumps each
//! global time step) or mesoscopic (molecules tracked as integer counts
//! per subvolume, evolved by a continuous-time Markov chain). The two
//! regimes run concurrently and exchange molecules consistently across
//! shared faces.
//!
//! # Example
//!
//! ```no_run
//! use rdme_hybrid::config::SimulationConfig;
//! use rdme_hybrid::run_from_config;
//!
//! let text = std::fs::read_to_string("scenario.json").unwrap();
//! let config: SimulationConfig = serde_json::from_str(&text).unwrap();
//! let summaries = run_from_config(config, "scenario.json").unwrap();
//! for realization in &summaries {
//!     println!("{:?}", realization.actors);
//! }
//! ```
//!
//! # Modules
//!
//! * [`geometry`] -- the geometry kernel (component A).
//! * [`builder`] -- the region/subvolume graph builder (component B).
//! * [`reaction`] -- the chem-rxn compiler (component C).
//! * [`micro`] -- the microscopic molecule engine (component D).
//! * [`meso`] -- the mesoscopic NSM engine (component E).
//! * [`actor`] -- active and passive actors (component F).
//! * [`scheduler`] -- the heterogeneous priority queue driving the run (component G).
//!
//! # Non-goals
//!
//! No GPU off-load, no arbitrary triangle meshes, no adaptive time
//! stepping within one run, no distributed execution across hosts, no
//! checkpointing.

pub mod actor;
pub mod builder;
pub mod config;
pub mod error;
pub mod flow;
pub mod geometry;
pub mod ledger;
pub mod meso;
pub mod micro;
pub mod molecule;
pub mod output;
pub mod reaction;
pub mod rng;
pub mod scheduler;

use config::SimulationConfig;
use error::EngineError;
use output::RealizationOutput;

/// Runs every repeat declared in `simulation_control.repeats`, building a
/// fresh [`builder::RegionGraph`] and reseeding the PRNG independently for
/// each realization (spec.md §5), and returns one [`RealizationOutput`] per
/// repeat. `input_filename` is only used for diagnostics; parsing the
/// config from disk is the caller's job (spec.md §1).
pub fn run_from_config(config: SimulationConfig, input_filename: &str) -> Result<Vec<RealizationOutput>, EngineError> {
    let (config, warnings) = config::validate_and_fill_defaults(config);
    for w in &warnings {
        log::warn!("{input_filename}: {w}");
    }

    let num_types = config.chemical_properties.num_types;
    let diffusion_coeffs = config.chemical_properties.diffusion_coeffs.clone();
    let mut outputs = Vec::with_capacity(config.simulation_control.repeats as usize);
    let base_seed = config.simulation_control.seed.unwrap_or(0);
    let progress_interval = if config.simulation_control.max_progress_updates > 0 {
        config.simulation_control.final_time / config.simulation_control.max_progress_updates as f64
    } else {
        0.0
    };

    for repeat in 0..config.simulation_control.repeats {
        let graph = builder::build_graph(
            &config.environment,
            num_types,
            &diffusion_coeffs,
            config.simulation_control.dt,
            geometry::DEFAULT_DIST_ERROR,
        )?;
        let dist_error = geometry::DEFAULT_DIST_ERROR * graph.base_size;

        let mut tables = Vec::with_capacity(graph.regions.len());
        for region in &graph.regions {
            let measure = region.shape.measure();
            tables.push(reaction::compile_region_reactions(&config.chemical_properties.reactions, region, measure, config.simulation_control.dt, &diffusion_coeffs, num_types)?);
        }

        let actors: Vec<actor::Actor> = config.environment.actors.iter().map(|cfg| actor::compile_actor(cfg, &graph)).collect();

        let mut realization = scheduler::Realization::new(
            graph,
            tables,
            actors,
            diffusion_coeffs.clone(),
            config.simulation_control.dt,
            config.simulation_control.final_time,
            dist_error,
            progress_interval,
            base_seed.wrapping_add(repeat as u64),
        );
        realization.run()?;

        outputs.push(RealizationOutput { realization_index: repeat, actors: realization.actors.iter().map(output::ActorOutput::from).collect() });
    }

    Ok(outputs)
}
