use criterion::{criterion_group, criterion_main, Criterion};

use rdme_hybrid::config::{ChemicalProperties, EnvironmentConfig, ReactionConfig, RegionConfig, RegionKind, ShapeKind, SimulationControl};
use rdme_hybrid::{builder, config::SimulationConfig, reaction, scheduler};

fn well_mixed_box() -> SimulationConfig {
    SimulationConfig {
        simulation_control: SimulationControl { repeats: 1, final_time: 1.0, dt: 1e-3, seed: Some(1), max_progress_updates: 0 },
        chemical_properties: ChemicalProperties {
            num_types: 2,
            diffusion_coeffs: vec![1e-9, 1e-9],
            reactions: vec![ReactionConfig { reactants: vec![1, 1], products: vec![0, 0], k: 1e-3, is_surface: false, surface_kind: None, default_everywhere: true, exception_regions: vec![] }],
        },
        environment: EnvironmentConfig {
            num_dimensions: 3,
            subvolume_base_size: 1e-6,
            regions: vec![RegionConfig {
                label: "box".into(),
                parent_label: None,
                shape: ShapeKind::RectangularBox,
                params: [0.0, 0.0, 0.0, 1e-5, 1e-5, 1e-5],
                axis: None,
                kind: RegionKind::Normal,
                surface_kind: None,
                is_microscopic: true,
                nx: 1,
                ny: 1,
                nz: 1,
                sub_size: 10.0,
                flow: None,
            }],
            actors: vec![],
        },
        notes: String::new(),
    }
}

fn bench_realization(c: &mut Criterion) {
    c.bench_function("micro tick, well mixed box", |b| {
        b.iter(|| {
            let config = well_mixed_box();
            let graph = builder::build_graph(&config.environment, 2, &config.chemical_properties.diffusion_coeffs, config.simulation_control.dt, 1e-12).unwrap();
            let tables: Vec<_> = graph
                .regions
                .iter()
                .map(|r| reaction::compile_region_reactions(&config.chemical_properties.reactions, r, r.shape.measure(), config.simulation_control.dt, &config.chemical_properties.diffusion_coeffs, 2).unwrap())
                .collect();
            let mut realization = scheduler::Realization::new(
                graph,
                tables,
                vec![],
                config.chemical_properties.diffusion_coeffs.clone(),
                config.simulation_control.dt,
                config.simulation_control.final_time,
                1e-12,
                0.0,
                1,
            );
            realization.run().unwrap();
        });
    });
}

criterion_group!(benches, bench_realization);
criterion_main!(benches);
