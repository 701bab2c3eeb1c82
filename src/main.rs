use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

use worldmap_generator::ascii;
use worldmap_generator::catalog::TileCatalog;
use worldmap_generator::config::{GenerationConfig, MapScale};
use worldmap_generator::export;
use worldmap_generator::generator::MapGenerator;
use worldmap_generator::zones;

#[derive(Parser, Debug)]
#[command(name = "worldmap_generator")]
#[command(about = "Generate seeded tile maps with constraint-solved terrain and zones")]
struct Args {
    /// Width of the map in tiles
    #[arg(short = 'W', long, default_value = "64")]
    width: usize,

    /// Height of the map in tiles
    #[arg(short = 'H', long, default_value = "64")]
    height: usize,

    /// Random seed (uses a random seed if not specified)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Tile catalog JSON file (uses the built-in catalog if not specified)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Ordered zone request JSON file
    #[arg(long)]
    zones: Option<PathBuf>,

    /// Write the encoded map to this file
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Load and verify an encoded map instead of generating
    #[arg(long)]
    load: Option<PathBuf>,

    /// Export a PNG overview to this file
    #[arg(long)]
    export_png: Option<PathBuf>,

    /// Pixels per tile in the PNG overview
    #[arg(long, default_value = "4")]
    pixels_per_tile: u32,

    /// Print an ASCII preview to stdout
    #[arg(long)]
    ascii: bool,

    /// Whole-attempt retries before giving up
    #[arg(long, default_value = "24")]
    max_attempts: u32,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let catalog = match &args.catalog {
        Some(path) => TileCatalog::load(path)?,
        None => TileCatalog::default_catalog(),
    };
    println!(
        "Tile catalog: {} kinds (checksum {:08x})",
        catalog.len(),
        catalog.checksum()
    );

    let mut config = GenerationConfig::with_size(args.width, args.height);
    config.max_attempts = args.max_attempts;
    let generator = MapGenerator::new(catalog, config);
    let scale = MapScale {
        pixels_per_tile: args.pixels_per_tile,
        ..MapScale::default()
    };

    let model = if let Some(path) = &args.load {
        println!("Loading map from {}...", path.display());
        let bytes = std::fs::read(path)?;
        let model = generator.load(&bytes)?;
        let (width, height) = model.dimensions();
        println!(
            "Loaded {}x{} map (seed {}, {} zones)",
            width,
            height,
            model.seed(),
            model.zones().len()
        );
        model
    } else {
        let requests = match &args.zones {
            Some(path) => zones::load_zone_requests(path)?,
            None => Vec::new(),
        };

        println!("Generating {}x{} map...", args.width, args.height);
        let outcome = generator.generate(args.seed, &requests)?;
        println!("Seed: {}", outcome.seed);
        println!("Solved in {} attempt(s)", outcome.attempts);
        for zone in outcome.model.zones() {
            println!(
                "Placed zone \"{}\" at ({}, {}) radius {}",
                zone.name, zone.center.0, zone.center.1, zone.radius
            );
        }
        for name in &outcome.skipped_zones {
            println!("Skipped optional zone \"{}\"", name);
        }
        outcome.model
    };

    if let Some(path) = &args.out {
        let bytes = generator.encode(&model)?;
        let (width, height) = model.dimensions();
        println!(
            "Encoded {} cells into {} bytes ({:.2} bits/cell)",
            width * height,
            bytes.len(),
            bytes.len() as f64 * 8.0 / (width * height) as f64
        );
        std::fs::write(path, &bytes)?;
        println!("Wrote {}", path.display());
    }

    if args.ascii {
        print!("{}", ascii::render_map(&model, generator.catalog()));
        print!("{}", ascii::render_legend(generator.catalog()));
    }

    if let Some(path) = &args.export_png {
        export::export_map_png(&model, generator.catalog(), &scale, path)?;
        println!("Exported PNG to {}", path.display());
    }

    Ok(())
}
