pub mod align;
pub mod annotate;
pub mod dedup;
pub mod msa;
pub mod output;
pub mod pairing;

use crate::{
    align::{BioAligner, GlobalAligner, Scoring},
    annotate::{annotate, filter_low_coverage, rank, report_rows},
    dedup::{chain_inputs, dedupe, ChainInput},
    msa::{group, read_msa, Msa, TagExtractor, DEFAULT_TAG_PATTERN},
    output::{
        rewrite_multiplicities, unpaired_block, write_homooligomer, write_msa,
        write_report,
    },
    pairing::{check_widths, pair, sort_by_similarity},
};
use anyhow::{anyhow, bail, Result};
use clap::{builder::PossibleValue, Args, Parser, Subcommand, ValueEnum};
use log::{debug, info};
use serde::Deserialize;
use std::{
    fs::{self, File},
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Instant,
};

/// Pair per-chain a3m alignments by organism for complex prediction
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level
    #[arg(short, long, global = true)]
    pub log: Option<LogLevel>,

    /// Log file, default STDERR
    #[arg(long, value_name = "LOGFILE", global = true)]
    pub logfile: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build a paired + unpaired a3m from two or more chains
    Pair(PairArgs),

    /// Build an a3m for a homo-oligomer of a single chain
    Homooligomer(HomooligomerArgs),
}

#[derive(Debug, Args, Clone)]
pub struct PairArgs {
    /// Input a3m files, one per chain; repeat a file for repeated chains
    #[arg(value_name = "A3M", required = true, num_args = 2..)]
    pub inputs: Vec<PathBuf>,

    /// Output a3m file
    #[arg(short, long, value_name = "OUTFILE")]
    pub outfile: PathBuf,

    /// TOML config file
    #[arg(short, long, value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Minimum coverage of the query (percent) to keep a homolog
    #[arg(long, value_name = "PCT")]
    pub min_coverage: Option<f64>,

    /// Regular expression extracting the organism from a header
    #[arg(long, value_name = "REGEX")]
    pub tag_pattern: Option<String>,

    /// Number of threads
    #[arg(short, long, value_name = "THREADS")]
    pub threads: Option<usize>,

    /// Write per-record similarity/coverage to this TSV file
    #[arg(long, value_name = "REPORT")]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct HomooligomerArgs {
    /// Input a3m file
    #[arg(value_name = "A3M")]
    pub input: PathBuf,

    /// Output a3m file
    #[arg(short, long, value_name = "OUTFILE")]
    pub outfile: PathBuf,

    /// Number of subunits
    #[arg(short = 'n', long, value_name = "SUBUNITS", default_value = "2")]
    pub subunits: usize,

    /// Repeat every row once per subunit instead of declaring the
    /// multiplicity in the cardinality line
    #[arg(long)]
    pub split: bool,
}

#[derive(Debug, Clone)]
pub enum LogLevel {
    Info,
    Debug,
}

impl ValueEnum for LogLevel {
    fn value_variants<'a>() -> &'a [Self] {
        &[LogLevel::Info, LogLevel::Debug]
    }

    fn to_possible_value<'a>(&self) -> Option<PossibleValue> {
        Some(match self {
            LogLevel::Info => PossibleValue::new("info"),
            LogLevel::Debug => PossibleValue::new("debug"),
        })
    }
}

/// Settings read from the TOML config file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub threads: Option<usize>,
    pub pairing: PairingConfig,
    pub scoring: Scoring,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PairingConfig {
    pub min_coverage: f64,
    pub tag_pattern: String,
}

impl Default for PairingConfig {
    fn default() -> Self {
        PairingConfig {
            min_coverage: 10.,
            tag_pattern: DEFAULT_TAG_PATTERN.to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read {}: {e}", path.display()))?;
        toml::from_str(&contents)
            .map_err(|e| anyhow!("Invalid config {}: {e}", path.display()))
    }

    /// Command-line values win over the config file
    pub fn merge_args(self, args: &PairArgs) -> Self {
        Config {
            threads: args.threads.or(self.threads),
            pairing: PairingConfig {
                min_coverage: args
                    .min_coverage
                    .unwrap_or(self.pairing.min_coverage),
                tag_pattern: args
                    .tag_pattern
                    .clone()
                    .unwrap_or(self.pairing.tag_pattern),
            },
            scoring: self.scoring,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let min_coverage = self.pairing.min_coverage;
        if !(0. ..=100.).contains(&min_coverage) {
            bail!("--min-coverage \"{min_coverage}\" must be between 0 and 100");
        }
        if self.threads == Some(0) {
            bail!("--threads must be greater than 0");
        }
        Ok(())
    }
}

// --------------------------------------------------
pub fn run_pair(args: &PairArgs) -> Result<()> {
    let start = Instant::now();
    info!("args = {args:#?}");

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        _ => Config::default(),
    }
    .merge_args(args);
    config.validate()?;
    debug!("config = {config:#?}");

    let chains = check_inputs(&args.inputs, 2)?;
    let extractor = TagExtractor::new(&config.pairing.tag_pattern)?;
    let aligner = BioAligner::new(config.scoring)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads.unwrap_or_else(num_cpus::get))
        .build()?;
    pool.install(|| {
        pair_chains(
            &chains,
            &extractor,
            &aligner,
            config.pairing.min_coverage,
            &args.outfile,
            args.report.as_deref(),
        )
    })?;

    info!(
        r#"Finished in {} seconds, see output in "{}""#,
        start.elapsed().as_secs(),
        args.outfile.display()
    );
    Ok(())
}

// --------------------------------------------------
pub fn run_homooligomer(args: &HomooligomerArgs) -> Result<()> {
    info!("args = {args:#?}");
    check_inputs(&[args.input.clone()], 1)?;
    let msa = read_msa(&args.input)?;
    write_homooligomer(&args.outfile, &msa, args.subunits, args.split)
}

// --------------------------------------------------
/// Every input must be an existing ".a3m" file
fn check_inputs(paths: &[PathBuf], min_inputs: usize) -> Result<Vec<ChainInput>> {
    if paths.len() < min_inputs {
        bail!(
            "At least {min_inputs} a3m file(s) required, got {}",
            paths.len()
        );
    }

    for path in paths {
        if path.extension().map_or(true, |ext| ext != "a3m") {
            bail!(r#"Input "{}" must be in .a3m format"#, path.display());
        }
        if !path.is_file() {
            bail!(r#"Input "{}" does not exist"#, path.display());
        }
    }

    Ok(chain_inputs(paths))
}

// --------------------------------------------------
/// Read, group, annotate, filter, rank and pair the declared chains and
/// write the paired + unpaired alignment to `outfile`
pub fn pair_chains<A: GlobalAligner>(
    chains: &[ChainInput],
    extractor: &TagExtractor,
    aligner: &A,
    min_coverage: f64,
    outfile: &Path,
    report: Option<&Path>,
) -> Result<()> {
    let dedup = dedupe(chains);
    debug!("dedup = {dedup:#?}");

    let msas: Vec<Msa> = dedup
        .inputs
        .iter()
        .map(|chain| read_msa(&chain.path))
        .collect::<Result<_>>()?;

    let mut inputs = Vec::with_capacity(msas.len());
    let mut annotations = vec![];
    for (chain, msa) in dedup.inputs.iter().zip(&msas) {
        let mut input = group(&chain.name, msa, extractor)?;
        annotate(&mut input, aligner)?;
        let removed = filter_low_coverage(&mut input, min_coverage);
        rank(&mut input);
        annotations.extend(report_rows(&input, &removed));
        inputs.push(input);
    }

    let mut pairing = pair(&inputs)?;
    sort_by_similarity(&mut pairing, aligner)?;
    check_widths(&pairing)?;

    let unpaired =
        unpaired_block(&msas, &dedup.positions, &pairing.cardinality.lengths)?;
    write_msa(outfile, &pairing, &unpaired)?;

    if dedup.is_repeated() {
        rewrite_multiplicities(outfile, &dedup.repeat_counts)?;
    }

    if let Some(report) = report {
        write_report(report, &annotations)?;
        info!(r#"Annotation report in "{}""#, report.display());
    }

    Ok(())
}

// --------------------------------------------------
pub(crate) fn open(filename: &Path) -> Result<Box<dyn BufRead>> {
    Ok(Box::new(BufReader::new(File::open(filename).map_err(
        |e| anyhow!("Cannot read {}: {e}", filename.display()),
    )?)))
}
