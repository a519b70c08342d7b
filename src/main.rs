use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use so_analyzer::classify::{classify_sentiment, ClassifyOptions};
use so_analyzer::db::{
    configure_connection, establish_pool, setup_database, teardown_database, DbPool, Model,
    PostType, SqliteStore,
};
use so_analyzer::migrate::{fill_database, parse_creation_date, FillSources};
use so_analyzer::sampling::{
    generate_sample, write_sample_and_index_files, RandomSampler, SampleRequest, TagVocabulary,
};
use so_analyzer::settings::settings;
use so_analyzer::stats::{aggregate_with_population, chi_squared_test, render, PlotOptions, PopulationWeights};
use so_analyzer::utils::{
    log_comparison, log_db_ready, log_fill_done, log_init, log_plot_written,
    log_population_stats, log_sample_written, log_teardown_done,
};
use std::path::{Path, PathBuf};
use tracing::subscriber::set_global_default;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "so-analyzer", version, about = "Sentiment sampling and analysis of Stack Overflow dumps")]
struct Cli {
    /// SQLite database location
    #[arg(long, env = "DATABASE_URL", global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill the database from XML dump files
    Fill(FillArgs),
    /// Tear down the database
    Teardown,
    /// Sample documents into a text file and a sibling index file
    GenerateCsv(GenerateCsvArgs),
    /// Classify a sample with a pool of external classifiers
    Analyze(AnalyzeArgs),
    /// Plot sentiment probabilities of prediction files
    Plot(PlotArgs),
    /// Test whether prediction files share one sentiment distribution
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("dumps")
        .required(true)
        .multiple(true)
        .args(["questions_xml", "answers_xml", "comments_xml"])
))]
struct FillArgs {
    /// Only keep documents created on or after this date (yyyy-mm-dd)
    #[arg(short = 'd', long)]
    creation_date: Option<String>,
    /// XML file with questions; other rows are ignored
    #[arg(short, long)]
    questions_xml: Option<PathBuf>,
    /// XML file with answers; other rows are ignored
    #[arg(short, long)]
    answers_xml: Option<PathBuf>,
    /// XML file with comments; only comments on stored posts are kept
    #[arg(short, long)]
    comments_xml: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("kind")
        .required(true)
        .args(["questions", "answers", "comments"])
))]
struct GenerateCsvArgs {
    #[arg(short, long)]
    outpath: PathBuf,
    /// Number of documents; estimated from the population when omitted
    #[arg(short, long)]
    num: Option<usize>,
    #[arg(short, long)]
    questions: bool,
    #[arg(short, long)]
    answers: bool,
    #[arg(short, long)]
    comments: bool,
    /// Single tag to sample from, e.g. python
    #[arg(short, long)]
    tag: Option<String>,
    /// Seed for a reproducible sample
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Maximum rows in each subfile given to a classifier
    #[arg(short, long)]
    rows_per_file: Option<usize>,
    /// Directory holding one or more classifier copies
    #[arg(short, long)]
    senti4sd_pool_root: PathBuf,
    #[arg(short, long)]
    input: PathBuf,
    #[arg(short, long, default_value = "out.csv")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct PlotArgs {
    /// Prediction files to plot
    #[arg(short, long, required = true)]
    input: Vec<PathBuf>,
    /// JSON file mapping file name prefixes to subpopulation sizes
    #[arg(long)]
    population: Option<PathBuf>,
    #[arg(short, long)]
    alpha_level: Option<f64>,
    /// Output SVG file, written at exactly this path
    #[arg(short, long, default_value = "predictions_plot.svg")]
    output: PathBuf,
    /// Width of each sentiment class in the plot
    #[arg(short, long)]
    width: Option<f64>,
    /// Fill the bars with colors
    #[arg(short, long)]
    fill: bool,
    /// Draw hatch patterns in the bars
    #[arg(short, long)]
    patterns: bool,
}

#[derive(Args, Debug)]
struct CompareArgs {
    #[arg(short, long, required = true, num_args = 1..)]
    input: Vec<PathBuf>,
    #[arg(short, long, default_value_t = 0.95)]
    confidence: f64,
    #[arg(long)]
    population: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("so_analyzer=info".parse()?))
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        );
    set_global_default(subscriber).context("failed to set tracing subscriber")?;

    let cli = Cli::parse();
    let database_url = cli
        .database
        .unwrap_or_else(|| settings().database.url.clone());

    match cli.command {
        Command::Fill(args) => {
            let pool = open_database(&database_url)?;
            let mut conn = pool.get()?;
            let created_after = args
                .creation_date
                .as_deref()
                .map(parse_creation_date)
                .transpose()?;
            let sources = FillSources {
                questions: args.questions_xml.as_deref(),
                answers: args.answers_xml.as_deref(),
                comments: args.comments_xml.as_deref(),
            };
            let report = fill_database(&mut conn, sources, created_after, settings().ingest.batch_size)?;
            log_fill_done(&report);
        }
        Command::Teardown => {
            let pool = open_database(&database_url)?;
            let mut conn = pool.get()?;
            teardown_database(&mut conn)?;
            log_teardown_done();
        }
        Command::GenerateCsv(args) => {
            let pool = open_database(&database_url)?;
            let mut conn = pool.get()?;
            generate_csv(&mut SqliteStore::new(&mut conn), &args)?;
        }
        Command::Analyze(args) => {
            let mut options = ClassifyOptions::from_settings();
            if let Some(rows) = args.rows_per_file {
                options.rows_per_file = rows;
            }
            classify_sentiment(&args.input, &args.output, &args.senti4sd_pool_root, &options).await?;
        }
        Command::Plot(args) => plot(&args)?,
        Command::Compare(args) => {
            let weights = load_weights(args.population.as_deref())?;
            let outcome = chi_squared_test(&args.input, args.confidence, weights.as_ref())?;
            log_comparison(&outcome, args.confidence);
        }
    }

    Ok(())
}

fn open_database(database_url: &str) -> Result<DbPool> {
    log_init(database_url);
    let pool = establish_pool(database_url, settings().database.pool_size)?;
    {
        let mut conn = pool.get()?;
        configure_connection(&mut conn).context("failed to configure SQLite connection")?;
        setup_database(&mut conn)?;
    }
    log_db_ready();
    Ok(pool)
}

fn generate_csv(store: &mut SqliteStore<'_>, args: &GenerateCsvArgs) -> Result<()> {
    let (model, post_type) = if args.comments {
        (Model::Comment, None)
    } else if args.questions {
        (Model::Post, Some(PostType::Question))
    } else {
        (Model::Post, Some(PostType::Answer))
    };
    let request = SampleRequest {
        model,
        post_type,
        tag: args.tag.as_deref(),
        size: args.num,
    };

    let accuracy = &settings().sampling;
    let mut sampler = match args.seed {
        Some(seed) => RandomSampler::seeded(seed),
        None => RandomSampler::from_entropy(),
    }
    .with_accuracy(accuracy.alpha_level, accuracy.margin_of_error);
    let documents = generate_sample(store, &TagVocabulary::from_settings(), &request, &mut sampler)?;
    let index_path = write_sample_and_index_files(&args.outpath, &documents)?;
    log_sample_written(&args.outpath, &index_path, documents.len());
    Ok(())
}

fn plot(args: &PlotArgs) -> Result<()> {
    for path in &args.input {
        if !path.is_file() {
            bail!("file {} does not exist", path.display());
        }
    }
    let weights = load_weights(args.population.as_deref())?;

    let defaults = &settings().plot;
    let options = PlotOptions {
        alpha_level: args.alpha_level.unwrap_or(defaults.alpha_level),
        bar_width: args.width.unwrap_or(defaults.bar_width),
        filled: args.fill,
        hatched: args.patterns,
        width: defaults.width,
        height: defaults.height,
    };

    for path in &args.input {
        let population = match &weights {
            Some(weights) => weights.for_file(path)?,
            None => f64::INFINITY,
        };
        log_population_stats(&aggregate_with_population(path, options.alpha_level, population)?);
    }

    render(&args.input, &args.output, &options, weights.as_ref())?;
    log_plot_written(&args.output);
    Ok(())
}

fn load_weights(path: Option<&Path>) -> Result<Option<PopulationWeights>> {
    path.map(|p| {
        PopulationWeights::load(p).with_context(|| format!("failed to read population file {}", p.display()))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fill_requires_a_dump() {
        assert!(Cli::try_parse_from(["so-analyzer", "fill"]).is_err());
        let cli = Cli::try_parse_from(["so-analyzer", "fill", "-q", "Posts.xml", "-c", "Comments.xml"]).unwrap();
        match cli.command {
            Command::Fill(args) => {
                assert_eq!(args.questions_xml, Some(PathBuf::from("Posts.xml")));
                assert!(args.answers_xml.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_generate_csv_needs_exactly_one_kind() {
        assert!(Cli::try_parse_from(["so-analyzer", "generate-csv", "-o", "out.csv"]).is_err());
        assert!(Cli::try_parse_from(["so-analyzer", "generate-csv", "-o", "out.csv", "-q", "-a"]).is_err());
        let cli =
            Cli::try_parse_from(["so-analyzer", "generate-csv", "-o", "out.csv", "-c", "-t", "python", "-n", "10"])
                .unwrap();
        match cli.command {
            Command::GenerateCsv(args) => {
                assert!(args.comments);
                assert_eq!(args.tag.as_deref(), Some("python"));
                assert_eq!(args.num, Some(10));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_plot_collects_inputs() {
        let cli = Cli::try_parse_from([
            "so-analyzer", "plot", "-i", "a_predictions.csv", "-i", "b_predictions.csv", "-f", "-w", "0.8",
        ])
        .unwrap();
        match cli.command {
            Command::Plot(args) => {
                assert_eq!(args.input.len(), 2);
                assert!(args.fill && !args.patterns);
                assert_eq!(args.width, Some(0.8));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
