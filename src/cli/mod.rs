//! Command-line interface for rust_edaseq

use clap::{Args, Parser, Subcommand};

use crate::normalization::{
    BetweenLaneMethod, LoessParams, NormalizationParams, WithinLaneMethod, DEFAULT_PSEUDO_COUNT,
};

#[derive(Parser)]
#[command(name = "rust_edaseq")]
#[command(version)]
#[command(about = "Within-lane and between-lane normalization of RNA-seq counts")]
#[command(disable_help_flag = true)]
#[command(disable_version_flag = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Number of threads (0 = auto) [default: 0]
    #[arg(short = 't', long, default_value = "0", global = true)]
    pub threads: usize,
}

/// Options shared by every normalizing subcommand
#[derive(Args, Debug, Clone)]
pub struct NormalizationArgs {
    /// Pseudo-count added before taking logs [default: 0.1]
    #[arg(long, default_value_t = DEFAULT_PSEUDO_COUNT)]
    pub pseudo_count: f64,

    /// Keep fractional normalized counts
    #[arg(long)]
    pub no_round: bool,

    /// Number of covariate strata [default: 10]
    #[arg(short, long, default_value = "10")]
    pub bins: usize,

    /// Loess span, fraction of features per neighbourhood [default: 0.3]
    #[arg(long, default_value = "0.3")]
    pub span: f64,

    /// Loess robustness iterations [default: 3]
    #[arg(long, default_value = "3")]
    pub iterations: usize,

    /// Write log(normalized + c) - log(raw + c) to this file
    #[arg(long, value_name = "FILE",
        long_help = "Write the offset matrix log(normalized + c) - log(raw + c) to FILE.\n\
            For chained steps the offset is relative to the raw counts.")]
    pub offset_output: Option<String>,

    /// Write a JSON report of parameters and warnings to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<String>,
}

impl NormalizationArgs {
    pub fn params(&self) -> NormalizationParams {
        NormalizationParams {
            pseudo_count: self.pseudo_count,
            round: !self.no_round,
            offset: self.offset_output.is_some(),
            num_bins: self.bins,
            loess: LoessParams {
                span: self.span,
                iterations: self.iterations,
                ..LoessParams::default()
            },
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Remove covariate bias (GC-content, length) within each lane
    #[command(
        long_about = "Remove the dependence of counts on a feature covariate within each lane.\n\n\
            Features lacking a covariate value are passed through unchanged.",
        after_long_help = "\
Examples:
  rust_edaseq within -c counts.tsv -f features.tsv --covariate gc -o within.tsv
  rust_edaseq within -c counts.tsv -f features.tsv --covariate length -m full --lane lane2"
    )]
    Within {
        /// Path to count matrix file
        #[arg(short, long,
            long_help = "Path to count matrix file.\n\
                Format: first column = feature IDs, remaining columns = counts per lane.\n\
                Supports both CSV (comma) and TSV (tab) delimiters (auto-detected).")]
        counts: String,

        /// Path to feature covariate file
        #[arg(short, long,
            long_help = "Path to feature covariate file.\n\
                Format: first column = feature IDs, remaining columns = numeric covariates.\n\
                NA, NaN and empty cells mark missing values.")]
        features: String,

        /// Covariate column to normalize against
        #[arg(long, default_value = "gc")]
        covariate: String,

        /// Within-lane method [default: loess]
        #[arg(short, long, default_value = "loess",
            long_help = "Within-lane method.\n\
                loess:  Robust local regression on the covariate\n\
                median: Per-stratum median scaling\n\
                upper:  Per-stratum upper-quartile scaling\n\
                full:   Full-quantile normalization of the strata")]
        method: WithinLaneMethod,

        /// Normalize only this lane (ID or 1-based position)
        #[arg(long)]
        lane: Option<String>,

        /// Output file path
        #[arg(short, long)]
        output: String,

        #[command(flatten)]
        options: NormalizationArgs,
    },

    /// Make lanes comparable across the whole feature set
    #[command(
        long_about = "Remove sequencing depth and distributional differences between lanes.",
        after_long_help = "\
Examples:
  rust_edaseq between -c counts.tsv -o between.tsv
  rust_edaseq between -c counts.tsv -m upper -o between.tsv --offset-output offset.tsv"
    )]
    Between {
        /// Path to count matrix file
        #[arg(short, long)]
        counts: String,

        /// Between-lane method [default: full]
        #[arg(short, long, default_value = "full",
            long_help = "Between-lane method.\n\
                median: Global median scaling\n\
                upper:  Global upper-quartile scaling\n\
                full:   Full-quantile normalization across lanes")]
        method: BetweenLaneMethod,

        /// Output file path
        #[arg(short, long)]
        output: String,

        #[command(flatten)]
        options: NormalizationArgs,
    },

    /// Within-lane followed by between-lane normalization
    #[command(
        after_long_help = "\
Examples:
  rust_edaseq normalize -c counts.tsv -f features.tsv --covariate gc -o normalized.tsv
  rust_edaseq normalize -c counts.tsv -f features.tsv --within-method full \\
    --between-method full --offset-output offset.tsv --report report.json"
    )]
    Normalize {
        /// Path to count matrix file
        #[arg(short, long)]
        counts: String,

        /// Path to feature covariate file
        #[arg(short, long)]
        features: String,

        /// Covariate column to normalize against
        #[arg(long, default_value = "gc")]
        covariate: String,

        /// Within-lane method [default: loess]
        #[arg(long, default_value = "loess")]
        within_method: WithinLaneMethod,

        /// Between-lane method [default: full]
        #[arg(long, default_value = "full")]
        between_method: BetweenLaneMethod,

        /// Output file path
        #[arg(short, long)]
        output: String,

        #[command(flatten)]
        options: NormalizationArgs,
    },

    /// Assign features to covariate strata
    Strata {
        /// Path to feature covariate file
        #[arg(short, long)]
        features: String,

        /// Covariate column to stratify
        #[arg(long, default_value = "gc")]
        covariate: String,

        /// Number of strata [default: 10]
        #[arg(short, long, default_value = "10")]
        bins: usize,

        /// Output file path
        #[arg(short, long)]
        output: String,
    },

    /// Lane summaries, mean-variance relation and covariate bias as JSON
    Diagnose {
        /// Path to count matrix file
        #[arg(short, long)]
        counts: String,

        /// Path to feature covariate file, enables the bias curve
        #[arg(short, long)]
        features: Option<String>,

        /// Covariate column for the bias curve
        #[arg(long, default_value = "gc")]
        covariate: String,

        /// Number of strata for the bias curve [default: 10]
        #[arg(short, long, default_value = "10")]
        bins: usize,

        /// Pseudo-count added before taking logs [default: 0.1]
        #[arg(long, default_value_t = DEFAULT_PSEUDO_COUNT)]
        pseudo_count: f64,

        /// Output JSON path
        #[arg(short, long)]
        output: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_within() {
        let cli = Cli::try_parse_from([
            "rust_edaseq", "within", "-c", "counts.tsv", "-f", "features.tsv", "-m", "upper", "-o",
            "out.tsv", "--no-round", "--bins", "5",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Within { method, options, .. }) => {
                assert_eq!(method, WithinLaneMethod::Upper);
                let params = options.params();
                assert!(!params.round);
                assert!(!params.offset);
                assert_eq!(params.num_bins, 5);
                assert_eq!(params.pseudo_count, 0.1);
            }
            _ => panic!("expected within"),
        }
    }

    #[test]
    fn test_unknown_method_rejected() {
        let parsed = Cli::try_parse_from([
            "rust_edaseq", "between", "-c", "c.tsv", "-m", "tmm", "-o", "o.tsv",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_global_threads_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rust_edaseq", "between", "-c", "c.tsv", "-o", "o.tsv", "--offset-output", "off.tsv",
            "-t", "2",
        ])
        .unwrap();
        assert_eq!(cli.threads, 2);
        match cli.command {
            Some(Commands::Between { method, options, .. }) => {
                assert_eq!(method, BetweenLaneMethod::Full);
                assert!(options.params().offset);
            }
            _ => panic!("expected between"),
        }
    }
}
