//! PERSONA MIND - Index Builder
//!
//! documents/<persona>/*.txt → indexes/<persona>/ for every persona folder
//! (or just `--persona`). Exits non-zero if any build failed.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use persona_mind::initiation::{self, SystemConfig, DEFAULT_CONFIG_PATH};
use persona_mind::totems::{BuildReport, Chunker, IndexBuildJob, IndexStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "Build persona vector indexes from text corpora", long_about = None)]
struct Args {
    /// Path to system.toml (created with defaults if missing)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Only build this persona
    #[arg(long)]
    persona: Option<String>,

    /// Override the documents directory
    #[arg(long)]
    documents: Option<PathBuf>,

    /// Override the indexes directory
    #[arg(long)]
    indexes: Option<PathBuf>,

    /// Run the embedding model on CPU rather than on GPU.
    #[arg(long)]
    cpu: bool,

    /// Debug logging
    #[arg(long, short)]
    verbose: bool,
}

fn print_report(report: &BuildReport) {
    println!("\n📊 Summary");
    for built in &report.built {
        println!(
            "  📦 {}: {} documents, {} chunks → {}",
            built.persona,
            built.documents,
            built.chunks,
            built.path.display()
        );
    }
    for persona in &report.skipped {
        println!("  ⏭️ {persona}: no documents");
    }
    for (persona, error) in &report.failed {
        println!("  ❌ {persona}: {error}");
    }
    println!(
        "  built {}, skipped {}, failed {}",
        report.built.len(),
        report.skipped.len(),
        report.failed.len()
    );
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = initiation::init_logging(args.verbose, false);

    let mut config = SystemConfig::load(&args.config)?;
    if let Some(documents) = args.documents {
        config.paths.documents_root = documents;
    }
    if let Some(indexes) = args.indexes {
        config.paths.indexes_root = indexes;
    }
    if args.cpu {
        config.embedding.force_cpu = true;
    }

    println!("🏗️ PERSONA MIND - Indexing {}", config.paths.documents_root.display());

    let embedder = initiation::build_embedder(&config)?;
    let chunker = Chunker::from_settings(config.chunking.batch)?;
    let job = IndexBuildJob::new(
        &config.paths.documents_root,
        IndexStore::new(&config.paths.indexes_root),
        chunker,
        embedder.as_ref(),
    );

    let report = match args.persona {
        Some(persona) => job.run_for(&[persona]),
        None => {
            let personas = job.discover_persona_folders()?;
            if personas.is_empty() {
                println!("No persona folders found in {}", config.paths.documents_root.display());
            } else {
                println!("🔍 Persona folders to process: {}", personas.join(", "));
            }
            job.run_for(&personas)
        }
    };

    print_report(&report);

    if !report.is_success() {
        std::process::exit(1);
    }
    println!("\n✅ All personas processed");
    Ok(())
}
