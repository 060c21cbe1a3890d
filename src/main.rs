//! Island template tool
//!
//! Main entry point: inspect exported template documents, or run a full
//! demo export against an in-memory world.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;

use island_architect::session::{OperatorSession, RegionPayload, SessionState};
use island_architect::store::{DirStore, TemplateStore};
use island_architect::template::{RandomRegion, TemplateIsland, document};
use island_architect::utils::ArchitectSettings;
use island_architect::world::MemoryWorld;
use island_architect::{BlockId, BlockPos, EncodePool};

#[derive(Parser)]
#[command(name = "island-architect", about = "Voxel region template tool")]
struct Cli {
    /// Settings file (JSON). Defaults are used when absent.
    #[arg(long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a template document and print a summary
    Inspect { file: PathBuf },
    /// Export a small in-memory island through the full session flow
    Demo {
        #[arg(long, default_value = "demo-island")]
        name: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => ArchitectSettings::load_or_default(path),
        None => ArchitectSettings::default(),
    };

    let result = match cli.command {
        Command::Inspect { file } => inspect(&file),
        Command::Demo { name } => demo(&settings, &name),
    };
    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn inspect(file: &PathBuf) -> Result<(), Box<dyn Error>> {
    let bytes = std::fs::read(file)?;
    let island = document::decode(&bytes)?;

    println!("Template \"{}\"", island.name());
    println!("  world: {}", island.world().unwrap_or("(unset)"));
    match island.bounds() {
        Some(bounds) => println!(
            "  box: ({}, {}, {}) .. ({}, {}, {})",
            bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
        ),
        None => println!("  box: (unset)"),
    }
    println!("  structure cells: {}", island.structure().len());
    println!("  random regions: {}", island.randoms().count());
    for (id, random) in island.randoms() {
        println!(
            "    #{}: {} outcomes, total weight {}",
            id,
            random.entries().len(),
            random.total_weight()
        );
    }
    Ok(())
}

fn demo(settings: &ArchitectSettings, name: &str) -> Result<(), Box<dyn Error>> {
    let store = Arc::new(DirStore::new(&settings.template_dir)?);
    let pool = EncodePool::with_worker_count(settings.worker_count(), store.clone());
    let mut rng = StdRng::seed_from_u64(2147);

    // A small platform world with a couple of pillars.
    let mut world = MemoryWorld::new();
    world.add_world("overworld");
    for x in 0..12 {
        for z in 0..12 {
            world.set_block("overworld", BlockPos::new(x, 60, z), BlockId::new(1, 0));
        }
    }
    for y in 61..64 {
        world.set_block("overworld", BlockPos::new(2, y, 2), BlockId::new(2, 0));
        world.set_block("overworld", BlockPos::new(9, y, 9), BlockId::new(2, 1));
    }

    let mut island = TemplateIsland::new(name);
    island.set_world("overworld");
    island.set_start(BlockPos::new(0, 60, 0));
    island.set_end(BlockPos::new(11, 70, 11));

    let mut session = OperatorSession::new("demo", pool);
    session.check_out(island)?;

    // Tag the pillar tops as randomized ore pockets.
    let mut ores = RandomRegion::new();
    ores.increase_weight(BlockId::new(3, 0), 3)?;
    ores.increase_weight(BlockId::new(4, 0), 1)?;
    let payload = RegionPayload {
        region: ores,
        id: None,
    };
    for pos in [BlockPos::new(2, 63, 2), BlockPos::new(9, 63, 9)] {
        let placed = session.place_random_item(pos, &payload, &mut rng)?;
        world.set_block("overworld", pos, placed.token);
    }

    session.export(&mut world)?;
    while session.state() != SessionState::Idle {
        session.pump();
        thread::sleep(Duration::from_millis(5));
    }
    for event in session.take_events() {
        tracing::info!("{:?}", event);
    }

    let decoded = document::decode(&store.get(name)?)?;
    println!(
        "Exported \"{}\": {} cells, {} random regions -> {:?}",
        name,
        decoded.structure().len(),
        decoded.randoms().count(),
        settings.template_dir.join(format!("{}.json", name))
    );
    Ok(())
}
