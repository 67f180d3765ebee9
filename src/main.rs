//! rust_edaseq command-line interface

use clap::Parser;
use log::{info, warn, LevelFilter};

use rust_edaseq::cli::{Cli, Commands, NormalizationArgs};
use rust_edaseq::diagnostics::{BiasCurve, LaneSummary, MeanVariance};
use rust_edaseq::io::{write_report, RunReport};
use rust_edaseq::prelude::*;
use serde::Serialize;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Find the first non-flag argument (potential subcommand)
    let first_positional = args.iter().skip(1).find(|a| !a.starts_with('-'));
    let subcommands = ["within", "between", "normalize", "strata", "diagnose", "help"];
    let has_subcommand = first_positional.is_some_and(|a| subcommands.contains(&a.as_str()));

    if !has_subcommand {
        if args.len() == 1 {
            print_no_args();
            return;
        }
        if args.iter().any(|a| a == "--help" || a == "-h") {
            print_help();
            return;
        }
        if args.iter().any(|a| a == "-V" || a == "--version") {
            println!("rust_edaseq {}", VERSION);
            return;
        }
        print_no_args();
        return;
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    if cli.threads > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
        {
            warn!("Could not configure {} threads: {}", cli.threads, e);
        }
    }

    let result = match cli.command {
        Some(Commands::Within {
            counts,
            features,
            covariate,
            method,
            lane,
            output,
            options,
        }) => run_within(
            &counts,
            &features,
            &covariate,
            method,
            lane.as_deref(),
            &output,
            &options,
        ),
        Some(Commands::Between {
            counts,
            method,
            output,
            options,
        }) => run_between(&counts, method, &output, &options),
        Some(Commands::Normalize {
            counts,
            features,
            covariate,
            within_method,
            between_method,
            output,
            options,
        }) => run_normalize(
            &counts,
            &features,
            &covariate,
            within_method,
            between_method,
            &output,
            &options,
        ),
        Some(Commands::Strata {
            features,
            covariate,
            bins,
            output,
        }) => run_strata(&features, &covariate, bins, &output),
        Some(Commands::Diagnose {
            counts,
            features,
            covariate,
            bins,
            pseudo_count,
            output,
        }) => run_diagnose(&counts, features.as_deref(), &covariate, bins, pseudo_count, &output),
        None => {
            print_no_args();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Custom help output
// ---------------------------------------------------------------------------

fn print_no_args() {
    println!("rust_edaseq v{}", VERSION);
    println!(
        "Run `rust_edaseq --help` for usage or `rust_edaseq <COMMAND> --help` for command options."
    );
}

fn print_help() {
    println!("rust_edaseq v{}", VERSION);
    println!("Within-lane and between-lane normalization of RNA-seq counts");
    println!();
    println!("Usage: rust_edaseq <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  within     Remove GC-content or length bias within each lane");
    println!("               - loess, median, upper, full");
    println!("  between    Remove depth differences between lanes");
    println!("               - median, upper, full");
    println!("  normalize  Within-lane followed by between-lane normalization");
    println!("  strata     Assign features to covariate strata");
    println!("  diagnose   Lane summaries, mean-variance and bias curves as JSON");
    println!();
    println!("Global Options:");
    println!("  -v, --verbose    Enable verbose output");
    println!("  -t, --threads    Number of threads (0 = auto)");
    println!("  -h, --help       Print help");
    println!("  -V, --version    Print version");
    println!();
    println!("Examples:");
    println!("  rust_edaseq normalize -c counts.tsv -f features.tsv --covariate gc \\");
    println!("    --within-method full --between-method full -o normalized.tsv");
    println!();
    println!("  rust_edaseq between -c counts.tsv -m upper -o between.tsv \\");
    println!("    --offset-output offset.tsv");
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn load_set(counts_path: &str, features_path: Option<&str>) -> Result<SeqExpressionSet> {
    info!("Loading count matrix from: {}", counts_path);
    let counts = read_count_matrix(counts_path)?;
    info!("  {} features, {} lanes", counts.n_features(), counts.n_samples());

    let set = SeqExpressionSet::new(counts);
    match features_path {
        Some(path) => {
            info!("Loading feature covariates from: {}", path);
            let features = read_feature_covariates(path)?;
            info!("  covariates: {}", features.covariate_names().join(", "));
            Ok(set.with_feature_metadata(features))
        }
        None => Ok(set),
    }
}

/// Lane given by ID or 1-based position
fn resolve_lane(set: &SeqExpressionSet, lane: &str) -> Result<usize> {
    if let Some(idx) = set.counts().sample_index(lane) {
        return Ok(idx);
    }
    match lane.parse::<usize>() {
        Ok(pos) if pos >= 1 && pos <= set.n_samples() => Ok(pos - 1),
        _ => Err(EdaseqError::InvalidInput {
            reason: format!("Unknown lane '{}'", lane),
        }),
    }
}

fn write_outputs(
    set: &SeqExpressionSet,
    command: &str,
    output_path: &str,
    options: &NormalizationArgs,
) -> Result<()> {
    let counts = set.counts();
    info!("Writing normalized counts to: {}", output_path);
    write_matrix(
        output_path,
        counts.feature_ids(),
        counts.sample_ids(),
        set.normalized_counts()?.view(),
    )?;

    if let (Some(path), Some(offset)) = (&options.offset_output, set.offset()) {
        info!("Writing offsets to: {}", path);
        write_matrix(path, counts.feature_ids(), counts.sample_ids(), offset.view())?;
    }

    if let Some(path) = &options.report {
        info!("Writing report to: {}", path);
        let report = RunReport::new(
            command,
            set.n_features(),
            set.n_samples(),
            &options.params(),
            set.reports(),
        );
        write_report(path, &report)?;
    }

    info!("Done!");
    Ok(())
}

fn run_within(
    counts_path: &str,
    features_path: &str,
    covariate: &str,
    method: WithinLaneMethod,
    lane: Option<&str>,
    output_path: &str,
    options: &NormalizationArgs,
) -> Result<()> {
    let mut set = load_set(counts_path, Some(features_path))?;
    let lane = lane.map(|l| resolve_lane(&set, l)).transpose()?;
    let params = options.params();

    info!("Within-lane {} normalization against '{}'...", method, covariate);
    set.within_lane_normalization(covariate, method, lane, &params)?;
    write_outputs(&set, "within", output_path, options)
}

fn run_between(
    counts_path: &str,
    method: BetweenLaneMethod,
    output_path: &str,
    options: &NormalizationArgs,
) -> Result<()> {
    let mut set = load_set(counts_path, None)?;
    let params = options.params();

    info!("Between-lane {} normalization...", method);
    set.between_lane_normalization(method, &params)?;
    write_outputs(&set, "between", output_path, options)
}

fn run_normalize(
    counts_path: &str,
    features_path: &str,
    covariate: &str,
    within_method: WithinLaneMethod,
    between_method: BetweenLaneMethod,
    output_path: &str,
    options: &NormalizationArgs,
) -> Result<()> {
    let mut set = load_set(counts_path, Some(features_path))?;
    let params = options.params();

    run_normalization(
        &mut set,
        Some(covariate),
        Some(within_method),
        Some(between_method),
        &params,
    )?;
    write_outputs(&set, "normalize", output_path, options)
}

fn run_strata(features_path: &str, covariate: &str, bins: usize, output_path: &str) -> Result<()> {
    info!("Loading feature covariates from: {}", features_path);
    let features = read_feature_covariates(features_path)?;
    let values = features.require_covariate(covariate)?;

    // Strata are computed on annotated features only
    let annotated: Vec<usize> = (0..values.len()).filter(|&i| values[i].is_finite()).collect();
    if annotated.len() < values.len() {
        warn!(
            "{} features without '{}' are left out",
            values.len() - annotated.len(),
            covariate
        );
    }
    let subset = features.subset(&annotated)?;
    let strata = compute_strata(subset.require_covariate(covariate)?, bins)?;
    info!("{} strata over {} features", strata.n_bins(), strata.len());

    info!("Writing strata to: {}", output_path);
    write_strata(output_path, subset.feature_ids(), &strata)?;
    info!("Done!");
    Ok(())
}

#[derive(Serialize)]
struct Diagnostics {
    lanes: Vec<LaneSummary>,
    mean_variance: Option<MeanVariance>,
    bias: Option<BiasCurve>,
}

fn run_diagnose(
    counts_path: &str,
    features_path: Option<&str>,
    covariate: &str,
    bins: usize,
    pseudo_count: f64,
    output_path: &str,
) -> Result<()> {
    let set = load_set(counts_path, features_path)?;
    let counts = set.raw_counts();

    let lanes = lane_summaries(counts, pseudo_count)?;
    for lane in &lanes {
        info!(
            "  {}: {} reads, {:.1}% zeros",
            set.counts().sample_ids()[lane.lane],
            lane.total_reads,
            100.0 * lane.zero_fraction
        );
    }

    let mean_variance = if set.n_samples() > 1 {
        let mv = mean_variance(counts)?;
        info!("  {:.1}% of features overdispersed", 100.0 * mv.overdispersed_fraction);
        Some(mv)
    } else {
        None
    };

    let bias = match features_path {
        Some(_) => {
            let values = set.feature_metadata().require_covariate(covariate)?;
            Some(bias_curve(counts, values, bins, pseudo_count)?)
        }
        None => None,
    };

    info!("Writing diagnostics to: {}", output_path);
    write_report(
        output_path,
        &Diagnostics {
            lanes,
            mean_variance,
            bias,
        },
    )?;
    info!("Done!");
    Ok(())
}
