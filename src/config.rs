//! Parsed, validated configuration records (spec.md §6).
//!
//! Text-format parsing, the CLI wrapper, output-directory creation, and JSON
//! result formatting are external collaborators (spec.md §1); this module
//! only owns the *validated record* that the core consumes, plus the
//! documented-default / warning pass spec.md §6 requires ("every missing
//! field has a documented default and produces a warning; an invalid
//! geometry is fatal").

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationWarning;
use crate::geometry::{Aabb, Axis, Point3, Shape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ShapeKind {
    Rectangle,
    RectangularBox,
    Sphere,
    Cylinder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum RegionKind {
    Normal,
    Surface2D,
    Surface3D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum SurfaceKind {
    Membrane,
    Inner,
    Outer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FlowFunctionKind {
    Linear,
    Sinus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FlowProfile {
    Uniform,
    Laminar,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct FlowConfig {
    pub velocity: f64,
    pub acceleration: f64,
    pub function_kind: FlowFunctionKind,
    pub frequency: f64,
    pub amplitude: f64,
    pub profile: FlowProfile,
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            velocity: 0.0,
            acceleration: 0.0,
            function_kind: FlowFunctionKind::Linear,
            frequency: 0.0,
            amplitude: 0.0,
            profile: FlowProfile::Uniform,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegionConfig {
    pub label: String,
    #[serde(default)]
    pub parent_label: Option<String>,
    pub shape: ShapeKind,
    /// 6-slot parameter vector, interpreted per `shape` exactly as spec.md
    /// §3 describes: Rectangle/RectangularBox = [min.x,min.y,min.z,
    /// size.x,size.y,size.z]; Sphere = [cx,cy,cz,radius,_,_]; Cylinder =
    /// [anchor.x,anchor.y,anchor.z,radius,length,_] with `axis` selecting
    /// the orientation.
    pub params: [f64; 6],
    #[serde(default)]
    pub axis: Option<Axis>,
    #[serde(default = "default_region_kind")]
    pub kind: RegionKind,
    #[serde(default)]
    pub surface_kind: Option<SurfaceKind>,
    #[serde(default)]
    pub is_microscopic: bool,
    #[serde(default = "default_one")]
    pub nx: i64,
    #[serde(default = "default_one")]
    pub ny: i64,
    #[serde(default = "default_one")]
    pub nz: i64,
    #[serde(default = "default_sub_size")]
    pub sub_size: f64,
    #[serde(default)]
    pub flow: Option<FlowConfig>,
}

fn default_region_kind() -> RegionKind {
    RegionKind::Normal
}
fn default_one() -> i64 {
    1
}
fn default_sub_size() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum SurfaceReactionKind {
    Normal,
    Absorbing,
    Receptor,
    Membrane,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReactionConfig {
    pub reactants: Vec<u32>,
    pub products: Vec<u32>,
    pub k: f64,
    #[serde(default)]
    pub is_surface: bool,
    #[serde(default)]
    pub surface_kind: Option<SurfaceReactionKind>,
    #[serde(default = "default_true")]
    pub default_everywhere: bool,
    #[serde(default)]
    pub exception_regions: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ModulationScheme {
    Csk,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModulationConfig {
    pub scheme: ModulationScheme,
    pub bits_per_symbol: u32,
    pub strength: f64,
    pub probability_of_one: f64,
    pub slot_interval: f64,
    pub release_interval: f64,
    #[serde(default)]
    pub random_release_times: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum ActorFootprintConfig {
    Shape { kind: ShapeKind, params: [f64; 6], axis: Option<Axis> },
    RegionLabels(Vec<String>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActorConfig {
    pub label: String,
    pub footprint: ActorFootprintConfig,
    pub is_active: bool,
    pub start_time: f64,
    pub action_interval: f64,
    #[serde(default)]
    pub max_actions: Option<u64>,
    #[serde(default)]
    pub modulation: Option<ModulationConfig>,
    #[serde(default)]
    pub release_mask: Vec<bool>,
    #[serde(default)]
    pub observe_mask: Vec<bool>,
    #[serde(default)]
    pub record_positions_mask: Vec<bool>,
    #[serde(default)]
    pub record_time: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChemicalProperties {
    pub num_types: usize,
    pub diffusion_coeffs: Vec<f64>,
    #[serde(default)]
    pub reactions: Vec<ReactionConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_dims")]
    pub num_dimensions: u8,
    pub subvolume_base_size: f64,
    pub regions: Vec<RegionConfig>,
    #[serde(default)]
    pub actors: Vec<ActorConfig>,
}

fn default_dims() -> u8 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationControl {
    #[serde(default = "default_repeats")]
    pub repeats: u32,
    pub final_time: f64,
    pub dt: f64,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_progress")]
    pub max_progress_updates: u32,
}

fn default_repeats() -> u32 {
    1
}
fn default_progress() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    pub simulation_control: SimulationControl,
    pub chemical_properties: ChemicalProperties,
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub notes: String,
}

/// Builds a [`Shape`] from a shape kind, its 6-slot parameter vector, and
/// (for cylinders) an orientation axis. Shared by the region graph builder
/// and the actor footprint compiler so the two stay in lockstep.
pub fn shape_from_parts(kind: ShapeKind, params: [f64; 6], axis: Option<Axis>) -> Shape {
    match kind {
        ShapeKind::Rectangle => {
            let min = Point3::new(params[0], params[1], params[2]);
            let size = Point3::new(params[3], params[4], params[5]);
            let plane = if size.x.abs() < 1e-15 {
                Axis::X
            } else if size.y.abs() < 1e-15 {
                Axis::Y
            } else {
                Axis::Z
            };
            Shape::Rectangle { plane, aabb: Aabb { min, max: min + size } }
        }
        ShapeKind::RectangularBox => {
            let min = Point3::new(params[0], params[1], params[2]);
            let size = Point3::new(params[3], params[4], params[5]);
            Shape::RectangularBox { aabb: Aabb { min, max: min + size } }
        }
        ShapeKind::Sphere => Shape::Sphere { center: Point3::new(params[0], params[1], params[2]), radius: params[3] },
        ShapeKind::Cylinder => Shape::Cylinder { axis: axis.unwrap_or(Axis::X), anchor: Point3::new(params[0], params[1], params[2]), radius: params[3], length: params[4] },
    }
}

/// Fills every documented default and collects warnings, rather than
/// silently accepting an under-specified record. Returns the (possibly
/// defaulted) config and the warnings accumulated; geometry invalidity is
/// not checked here (that is the builder's job and is fatal, per spec.md
/// §6/§7).
pub fn validate_and_fill_defaults(mut config: SimulationConfig) -> (SimulationConfig, Vec<ConfigurationWarning>) {
    let mut warnings = Vec::new();
    if config.simulation_control.repeats == 0 {
        warnings.push(ConfigurationWarning::MissingField(
            "repeats".into(),
            "Simulation Control".into(),
            "1".into(),
        ));
        config.simulation_control.repeats = 1;
    }
    if config.simulation_control.max_progress_updates == 0 {
        warnings.push(ConfigurationWarning::MissingField(
            "max_progress_updates".into(),
            "Simulation Control".into(),
            "100".into(),
        ));
        config.simulation_control.max_progress_updates = 100;
    }
    for region in &mut config.environment.regions {
        if region.sub_size <= 0.0 {
            warnings.push(ConfigurationWarning::MissingField(
                "sub_size".into(),
                format!("Environment.regions[{}]", region.label),
                "1.0".into(),
            ));
            region.sub_size = 1.0;
        }
        if matches!(region.shape, ShapeKind::Sphere | ShapeKind::Cylinder) {
            // round regions force microscopic per spec.md §3.
            region.is_microscopic = true;
        }
    }
    (config, warnings)
}
