use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use clap::{Parser, Subcommand};

use skymoc::catalog;
use skymoc::moc::Moc;
use skymoc::skymap::ProbabilityMap;

#[derive(Parser)]
#[command(name = "skymoc", about = "Credible sky regions from probability sky maps")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract credible-region coverage maps from a probability sky map.
    Extract {
        /// Path to the sky map (text: one value per line; or binary).
        map: PathBuf,

        /// Confidence level(s) in (0, 1]. Can be repeated.
        #[arg(short, long, required = true)]
        confidence: Vec<f64>,

        /// Output path. With several confidence levels an index suffix is
        /// appended (e.g. "region" -> "region_00.moc", "region_01.moc", ...).
        #[arg(short, long)]
        output: PathBuf,

        /// Write the text format instead of binary.
        #[arg(long)]
        ascii: bool,
    },

    /// Extract coverage maps for every sky map in a directory.
    BatchExtract {
        /// Directory containing sky map files.
        dir: PathBuf,

        /// Glob pattern for files within the directory.
        #[arg(long, default_value = "*.txt")]
        pattern: String,

        /// Confidence level in (0, 1].
        #[arg(short, long, default_value = "0.9")]
        confidence: f64,

        /// Write the text format instead of binary.
        #[arg(long)]
        ascii: bool,
    },

    /// Print summary statistics for a coverage map.
    Info {
        /// Path to a coverage file (binary or text).
        moc: PathBuf,

        /// Read the text format instead of binary.
        #[arg(long)]
        ascii: bool,
    },

    /// Print catalog rows whose positions fall inside a coverage map.
    Filter {
        /// Path to a coverage file (binary or text).
        moc: PathBuf,

        /// Catalog file: "lon_deg lat_deg [label]" per line.
        catalog: PathBuf,

        /// Read the coverage in the text format instead of binary.
        #[arg(long)]
        ascii: bool,
    },
}

fn load_map(path: &Path) -> ProbabilityMap {
    ProbabilityMap::load_auto(path).unwrap_or_else(|e| {
        eprintln!("Failed to load sky map {}: {e}", path.display());
        process::exit(1);
    })
}

fn load_moc(path: &Path, ascii: bool) -> Moc {
    let result = if ascii {
        Moc::load_ascii(path)
    } else {
        Moc::load(path)
    };
    result.unwrap_or_else(|e| {
        eprintln!("Failed to load coverage {}: {e}", path.display());
        process::exit(1);
    })
}

fn save_moc(moc: &Moc, path: &Path, ascii: bool) {
    let result = if ascii {
        moc.save_ascii(path)
    } else {
        moc.save(path)
    };
    result.unwrap_or_else(|e| {
        eprintln!("Failed to save coverage {}: {e}", path.display());
        process::exit(1);
    });
}

fn extract_one(map: &ProbabilityMap, confidence: f64) -> Moc {
    let region = map.credible_region(confidence).unwrap_or_else(|e| {
        eprintln!("Extraction failed: {e}");
        process::exit(1);
    });
    let moc = Moc::from_pixels(region.depth, &region.pixels).unwrap();
    eprintln!(
        "  c={:.3}: {} pixels at order {}, {} cells after merge, {:.2}% of sky, enclosed mass {:.6}",
        confidence,
        region.pixels.len(),
        region.depth,
        moc.n_cells(),
        100.0 * moc.sky_fraction(),
        region.probability,
    );
    moc
}

fn cmd_extract(map_path: &Path, confidences: &[f64], output: &Path, ascii: bool) {
    let map = load_map(map_path);
    eprintln!(
        "Loaded sky map: order {}, {} pixels, total mass {:.6}",
        map.depth,
        map.probs.len(),
        map.total_mass()
    );

    for (i, &c) in confidences.iter().enumerate() {
        let moc = extract_one(&map, c);
        let path = if confidences.len() == 1 {
            output.to_path_buf()
        } else {
            PathBuf::from(format!("{}_{:02}.moc", output.display(), i))
        };
        save_moc(&moc, &path, ascii);
        eprintln!("  Saved to {}", path.display());
    }
}

fn cmd_batch_extract(dir: &Path, pattern: &str, confidence: f64, ascii: bool) {
    let glob_pattern = dir.join(pattern);
    let mut files: Vec<PathBuf> = glob::glob(glob_pattern.to_str().unwrap_or_else(|| {
        eprintln!("Non-UTF-8 path: {}", glob_pattern.display());
        process::exit(1);
    }))
    .unwrap_or_else(|e| {
        eprintln!("Invalid glob pattern: {e}");
        process::exit(1);
    })
    .filter_map(|r| r.ok())
    .collect();
    files.sort();

    if files.is_empty() {
        eprintln!("No files matched pattern '{}'", glob_pattern.display());
        process::exit(1);
    }
    eprintln!("Found {} sky maps\n", files.len());

    let mut n_ok = 0;
    let mut n_failed = 0;
    let mut fractions: Vec<f64> = Vec::new();

    for (i, file) in files.iter().enumerate() {
        let name = file.file_name().unwrap_or_default().to_string_lossy();
        eprint!("[{:3}/{}] {}: ", i + 1, files.len(), name);

        let map = match ProbabilityMap::load_auto(file) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("FAILED to load: {e}");
                n_failed += 1;
                continue;
            }
        };

        let t0 = Instant::now();
        let region = match map.credible_region(confidence) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("FAILED: {e}");
                n_failed += 1;
                continue;
            }
        };
        let moc = Moc::from_pixels(region.depth, &region.pixels).unwrap();
        let elapsed = t0.elapsed().as_secs_f64();

        let out = file.with_extension("moc");
        save_moc(&moc, &out, ascii);
        eprintln!(
            "{} cells, {:.2}% of sky, {:.2}s -> {}",
            moc.n_cells(),
            100.0 * moc.sky_fraction(),
            elapsed,
            out.display()
        );
        fractions.push(moc.sky_fraction());
        n_ok += 1;
    }

    eprintln!("\n========== RESULTS ==========");
    eprintln!("Extracted: {}/{}", n_ok, n_ok + n_failed);
    if !fractions.is_empty() {
        fractions.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = fractions[fractions.len() / 2];
        eprintln!(
            "Sky fraction at c={confidence}: min {:.2}%, median {:.2}%, max {:.2}%",
            100.0 * fractions[0],
            100.0 * median,
            100.0 * fractions[fractions.len() - 1]
        );
    }
    if n_failed > 0 {
        process::exit(1);
    }
}

fn cmd_info(moc_path: &Path, ascii: bool) {
    let moc = load_moc(moc_path, ascii);

    println!("Coverage: {}", moc_path.display());
    println!("  Cells: {}", moc.n_cells());
    match moc.max_depth() {
        Some(d) => println!("  Max order: {d}"),
        None => println!("  Max order: (empty)"),
    }
    println!(
        "  Solid angle: {:.6} sr ({:.3}% of sky)",
        moc.solid_angle(),
        100.0 * moc.sky_fraction()
    );
    for (depth, count) in moc.order_counts() {
        println!("  Order {depth:2}: {count} cells");
    }
}

fn cmd_filter(moc_path: &Path, catalog_path: &Path, ascii: bool) {
    let moc = load_moc(moc_path, ascii);
    let sources = catalog::load_sources(catalog_path).unwrap_or_else(|e| {
        eprintln!("Failed to load catalog {}: {e}", catalog_path.display());
        process::exit(1);
    });
    eprintln!("Loaded {} sources", sources.len());

    let kept = catalog::filter_sources(&moc, &sources);
    eprintln!("{} inside coverage", kept.len());
    for s in kept {
        println!(
            "{:10.5} {:+10.5} {}",
            s.lon.to_degrees(),
            s.lat.to_degrees(),
            s.label
        );
    }
}

fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Extract {
            map,
            confidence,
            output,
            ascii,
        } => {
            cmd_extract(map, confidence, output, *ascii);
        }
        Commands::BatchExtract {
            dir,
            pattern,
            confidence,
            ascii,
        } => {
            cmd_batch_extract(dir, pattern, *confidence, *ascii);
        }
        Commands::Info { moc, ascii } => {
            cmd_info(moc, *ascii);
        }
        Commands::Filter {
            moc,
            catalog,
            ascii,
        } => {
            cmd_filter(moc, catalog, *ascii);
        }
    }
}
