use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use mlst_seeker::app::{App, CacheOptions, Query};
use mlst_seeker::cache::CacheReconciler;
use mlst_seeker::config::{ConfigLoader, ResolvedConfig};
use mlst_seeker::error::SeekerError;
use mlst_seeker::filters::FilterOptions;
use mlst_seeker::ncbi::NcbiHttpClient;
use mlst_seeker::output::{JsonOutput, TsvOutput};
use mlst_seeker::store::LocalTableStore;
use mlst_seeker::typing::SystemMlst;

#[derive(Parser)]
#[command(name = "mlst-seeker")]
#[command(about = "Find bacterial genomes on NCBI for a given multi-locus sequence type (MLST)")]
#[command(version, author)]
struct Cli {
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[arg(long, short, global = true)]
    verbose: bool,

    #[arg(long, global = true, help = "path to an mlst-seeker.json config file")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Count typed and untyped genomes without typing anything")]
    Preview(QueryArgs),
    #[command(about = "Type uncached genomes, then download the matching genomes")]
    Fetch(FetchArgs),
    #[command(about = "Type uncached genomes and print the matching cached rows")]
    Cache(CacheArgs),
}

#[derive(Args, Clone)]
struct QueryArgs {
    #[arg(short, long, help = "organism or NCBI taxonomy ID")]
    organism: String,

    #[arg(short = 't', long = "type", help = "multi-locus sequence type (MLST)")]
    sequence_type: Option<String>,

    #[arg(short, long, help = "MLST scheme name, as listed by `mlst --list`")]
    scheme: String,

    #[arg(long, help = "earliest collection year")]
    collect_start: Option<String>,

    #[arg(long, help = "latest collection year")]
    collect_end: Option<String>,

    #[arg(long, help = "geographic location where the sample was collected (INSDC prefix)")]
    location: Option<String>,
}

#[derive(Args, Clone)]
struct CacheArgs {
    #[command(flatten)]
    query: QueryArgs,

    #[arg(long, help = "only report genomes that are already typed")]
    cached_only: bool,

    #[arg(long, help = "update cached rows with current NCBI metadata")]
    refresh: bool,
}

#[derive(Args, Clone)]
struct FetchArgs {
    #[command(flatten)]
    query: QueryArgs,

    #[arg(long, help = "only fetch genomes that are already typed")]
    cached_only: bool,

    #[arg(
        long,
        default_value = "mlst-seeker-genomes",
        help = "directory for downloaded genomes; must be empty, new, or a previous output"
    )]
    output_dir: PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SeekerError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SeekerError) -> u8 {
    match error {
        SeekerError::InvalidYear { .. }
        | SeekerError::InvalidReportArguments
        | SeekerError::InvalidAccession(_)
        | SeekerError::ConfigRead(_)
        | SeekerError::ConfigParse(_)
        | SeekerError::SchemeNotFound(_)
        | SeekerError::OutputDirNotEmpty(_) => 2,
        SeekerError::NcbiHttp(_)
        | SeekerError::NcbiStatus { .. }
        | SeekerError::NcbiDecode(_)
        | SeekerError::MissingTool(_)
        | SeekerError::TypingFailed(_)
        | SeekerError::TypingOutput(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Preview(args) => {
            let query = build_query(&args)?;
            let app = build_app(&config)?;
            let counts = app.preview(&query)?;
            JsonOutput::print_preview(&counts).into_diagnostic()
        }
        Commands::Cache(args) => {
            let query = build_query(&args.query)?;
            let app = build_app(&config)?;
            let options = CacheOptions {
                cached_only: args.cached_only,
                refresh: args.refresh,
            };
            let result = app.cache(&query, &options)?;
            TsvOutput::print_rows(&result.columns, &result.rows).into_diagnostic()
        }
        Commands::Fetch(args) => {
            let query = build_query(&args.query)?;
            let app = build_app(&config)?;
            let options = CacheOptions {
                cached_only: args.cached_only,
                refresh: false,
            };
            let result = app.fetch(&query, &options, args.output_dir)?;
            TsvOutput::print_rows(&result.cache.columns, &result.cache.rows).into_diagnostic()
        }
    }
}

fn init_tracing(quiet: bool, verbose: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_query(args: &QueryArgs) -> Result<Query, SeekerError> {
    let filters = FilterOptions::from_flags(
        args.collect_start.as_deref(),
        args.collect_end.as_deref(),
        args.location.as_deref(),
        args.sequence_type.as_deref(),
    )?;
    Ok(Query {
        organism: args.organism.clone(),
        scheme: args.scheme.clone(),
        filters,
    })
}

fn build_app(
    config: &ResolvedConfig,
) -> Result<App<NcbiHttpClient, SystemMlst, LocalTableStore>, SeekerError> {
    let ncbi = NcbiHttpClient::new(&config.api_base_url, config.timeout)?;
    let typing = match &config.mlst_path {
        Some(path) => SystemMlst::with_path(path.clone()),
        None => SystemMlst::new(),
    };
    let store = LocalTableStore::new_with_root(config.cache_dir.clone());
    let reconciler = CacheReconciler::new(store, ncbi, typing, config.genome_dir())
        .with_batch_size(config.batch_size);
    Ok(App::new(reconciler))
}
