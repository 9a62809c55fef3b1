// Command-line collision check over STL structures

use clap::Parser;
use gantry_clearance::candidates::StructureCatalog;
use gantry_clearance::mesh::MeshUnit;
use gantry_clearance::provider::{SolidOptions, SolidType};
use gantry_clearance::{run_check, AutoReviewer, BeamSet, Callbacks, CollisionConfig, MeshStructureProvider};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "collision_check")]
#[command(about = "Check treatment beams for gantry collisions with patient and couch structures", long_about = None)]
struct Cli {
    /// Plan description (JSON): beam set and structure STL files
    plan: PathBuf,

    /// Collision config (JSON); defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the gantry reference meshes
    #[arg(long)]
    mesh_dir: Option<PathBuf>,

    /// Uniform margin added to every structure, in cm
    #[arg(long)]
    margin: Option<f64>,

    /// Also check a full 360° arc at couch 0
    #[arg(long)]
    full_arc: bool,

    /// Test every structure, not only External and Support
    #[arg(long)]
    all_structures: bool,

    /// Keep generated gantry proxies (written next to the plan as STL)
    #[arg(long)]
    retain: bool,

    /// Write the validation record (JSON) here
    #[arg(long)]
    record: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    beam_set: BeamSet,
    structures: Vec<StructureEntry>,
}

#[derive(Debug, Deserialize)]
struct StructureEntry {
    name: String,
    #[serde(rename = "type")]
    structure_type: String,
    file: PathBuf,
    #[serde(default = "default_structure_unit")]
    unit: MeshUnit,
}

fn default_structure_unit() -> MeshUnit {
    MeshUnit::Millimeter
}

fn resolve(base: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        base.join(file)
    }
}

fn main() -> gantry_clearance::Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let mut config = match &cli.config {
        Some(path) => CollisionConfig::from_file(path)?,
        None => CollisionConfig::default(),
    };
    if let Some(dir) = &cli.mesh_dir {
        config.mesh_library.directory = dir.clone();
    }
    if let Some(margin) = cli.margin {
        config.margin_cm = margin.max(0.0);
    }
    config.full_arc_check |= cli.full_arc;
    config.filter.others |= cli.all_structures;
    config.retain |= cli.retain;

    let plan_json = std::fs::read_to_string(&cli.plan)?;
    let plan: PlanFile = serde_json::from_str(&plan_json)?;
    let base = cli.plan.parent().unwrap_or(Path::new(".")).to_path_buf();

    let mut provider = MeshStructureProvider::new();
    let mut catalog = StructureCatalog::new();
    for entry in &plan.structures {
        provider.load_structure_stl(
            &entry.name,
            resolve(&base, &entry.file),
            entry.unit,
            SolidOptions::new("Blue", SolidType::Undefined),
        )?;
        catalog.insert(&entry.name, &entry.structure_type);
    }

    let callbacks = Callbacks::new()
        .on_gantry_progress(|p, beam| log::info!("[{:3.0}%] Gantry for beam {}", p * 100.0, beam))
        .on_invalidation(|| log::info!("Results invalidated"));
    let mut reviewer = AutoReviewer::from_config(&config);

    let outcome = run_check(
        &mut provider,
        &plan.beam_set,
        &catalog,
        &config,
        callbacks,
        &mut reviewer,
    )?;

    print!("{}", outcome.report);

    for name in &outcome.cleanup.kept {
        if let Some(mesh) = provider.geometry(name) {
            let file = base.join(format!("{}.stl", name.replace([':', ' '], "_")));
            mesh.write_stl(&file)?;
            log::info!("Kept gantry '{}' as {}", name, file.display());
        }
    }

    if let Some(path) = &cli.record {
        std::fs::write(path, serde_json::to_string_pretty(&outcome.record)?)?;
        log::info!("Validation record written to {}", path.display());
    }

    Ok(if outcome.record.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}
