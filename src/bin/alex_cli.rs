use std::fs;
use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use alex_rs::mrca::ConsensusMode;
use alex_rs::resolve_queries;

/// Resolve BLAST-style hit tables against a reference taxonomy and report
/// the MRCA consensus per query.
#[derive(Parser)]
#[command(name = "alex-rs", version, about)]
struct Args {
    /// nodes.dmp of the reference taxonomy
    #[arg(long)]
    nodes: PathBuf,

    /// names.dmp of the reference taxonomy
    #[arg(long)]
    names: PathBuf,

    /// BLAST hit table (plain or .gz)
    #[arg(long)]
    hits: PathBuf,

    /// OTU/ASV table giving the full query universe; queries without hits
    /// still receive an all-NA row
    #[arg(long)]
    table: Option<PathBuf>,

    /// Output path for the consensus table
    #[arg(long, short)]
    output: PathBuf,

    /// Use strict taxon-id LCA instead of rank-name consensus
    #[arg(long)]
    taxon_lca: bool,
}

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template(&format!("{{spinner:.{color}}} {{msg}}"))
            .expect("Invalid spinner template"),
    );
    bar.set_message(msg.to_string());
    bar
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mode = if args.taxon_lca {
        ConsensusMode::TaxonLca
    } else {
        ConsensusMode::RankNames
    };

    let bar = spinner("green", "Resolving MRCA consensus...");
    let results = resolve_queries(
        &args.nodes,
        &args.names,
        &args.hits,
        args.table.as_deref(),
        mode,
    )
    .expect("MRCA resolution failed");
    bar.finish_with_message(format!("Resolved {} queries.", results.records.len()));

    if !results.unresolved_species.is_empty() {
        eprintln!(
            "{} species not found in the taxonomy: {}",
            results.unresolved_species.len(),
            results.unresolved_species.join(", ")
        );
    }

    let bar = spinner("yellow", "Writing output table...");
    fs::write(&args.output, results.get_output()).expect("Could not write output table");
    bar.finish_with_message(format!("Wrote {}.", args.output.display()));
}
