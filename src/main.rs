//! CLI entry point for zooniverse_stats.
//!
//! Loads a Zooniverse classifications export (or a saved snapshot), prints a
//! summary of who did the work, and renders charts of activity over time.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use zooniverse_stats::{
    event::parse_date_bound,
    loader::{InputSource, LoadOptions, load},
    plot::{
        CLASSIFICATIONS_COLOUR, DISTRIBUTION_COLOUR, USERS_COLOUR, parse_colour, plot_time_bar,
        plot_user_distribution,
    },
    report::Summary,
    resample::{Sampling, classifications_by_time, users_by_time},
    snapshot::{save_snapshot, write_csv},
    users::UsersTable,
};

#[derive(Parser)]
#[command(name = "zooniverse_stats")]
#[command(about = "Summarise and chart a Zooniverse classifications export", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Classifications export to read: CSV path (optionally gzipped) or URL
    #[arg(long, value_name = "FILE_OR_URL")]
    input_file: Option<String>,

    /// Snapshot previously written with `export --save-snapshot`
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,
}

#[derive(Args)]
struct FilterArgs {
    /// Only keep classifications made on or after this date (e.g. 2018-02-20)
    #[arg(long)]
    from_date: Option<String>,

    /// Only keep classifications made before this date (e.g. 2018-02-26)
    #[arg(long)]
    to_date: Option<String>,

    /// Keep classifications made while the project was not live
    #[arg(long, default_value_t = false)]
    include_test: bool,
}

impl FilterArgs {
    fn to_options(&self) -> Result<LoadOptions> {
        Ok(LoadOptions::from_args(
            self.from_date.as_deref(),
            self.to_date.as_deref(),
            !self.include_test,
        )?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the users summary and render activity charts
    Report {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filters: FilterArgs,

        /// Directory the SVG charts are written to
        #[arg(short, long, default_value = "charts")]
        output_dir: PathBuf,

        /// File name prefix for every chart
        #[arg(short, long, default_value = "zooniverse")]
        prefix: String,

        /// Only count new users first seen on or after this date
        #[arg(long)]
        users_from_date: Option<String>,

        /// Only count new users first seen before this date
        #[arg(long)]
        users_to_date: Option<String>,

        /// Bucket sizes to chart; all of them when omitted
        #[arg(long, value_enum, num_args = 1..)]
        sampling: Vec<Sampling>,

        /// Leave the running total off the time charts
        #[arg(long, default_value_t = false)]
        no_cumulative: bool,

        /// Log how long each step took
        #[arg(long, default_value_t = false)]
        timings: bool,
    },
    /// Write the filtered classifications to CSV and/or a snapshot
    Export {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filters: FilterArgs,

        /// CSV file to write, with derived metadata columns (.gz to compress)
        #[arg(long, required_unless_present = "save_snapshot")]
        csv: Option<PathBuf>,

        /// Snapshot file to write (.gz to compress)
        #[arg(long)]
        save_snapshot: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/zooniverse_stats.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("zooniverse_stats.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Report {
            source,
            filters,
            output_dir,
            prefix,
            users_from_date,
            users_to_date,
            sampling,
            no_cumulative,
            timings,
        } => {
            let input = InputSource::resolve(source.input_file, source.snapshot)?;
            let options = filters.to_options()?;

            let start = Instant::now();
            let table = load(&input, &options)?;
            step_done("Loaded classifications", start, timings);

            let start = Instant::now();
            let users = UsersTable::from_table(&table)?;
            step_done("Built users table", start, timings);

            let users_from = parse_optional_date(users_from_date.as_deref())?;
            let users_to = parse_optional_date(users_to_date.as_deref())?;

            let start = Instant::now();
            std::fs::create_dir_all(&output_dir)?;
            let classifications_colour = parse_colour(CLASSIFICATIONS_COLOUR)?;
            let users_colour = parse_colour(USERS_COLOUR)?;

            let samplings = if sampling.is_empty() {
                Sampling::ALL.to_vec()
            } else {
                sampling
            };

            for sampling in samplings {
                let series = classifications_by_time(&table, sampling);
                let path = output_dir.join(format!("{prefix}-classifications-{sampling}.svg"));
                plot_time_bar(
                    &series,
                    "Classifications",
                    classifications_colour,
                    &path,
                    !no_cumulative,
                )?;

                let series = users_by_time(&table, sampling, users_from, users_to);
                if series.is_empty() {
                    warn!(%sampling, "No new users in window, skipping users chart");
                    continue;
                }
                let path = output_dir.join(format!("{prefix}-users-{sampling}.svg"));
                plot_time_bar(&series, "Users", users_colour, &path, !no_cumulative)?;
            }

            plot_user_distribution(
                &users,
                parse_colour(DISTRIBUTION_COLOUR)?,
                &output_dir.join(format!("{prefix}-user-distribution.svg")),
            )?;
            step_done("Plotted charts", start, timings);

            print!("{}", Summary::from_users(&users));
        }
        Commands::Export {
            source,
            filters,
            csv,
            save_snapshot: snapshot_path,
        } => {
            let input = InputSource::resolve(source.input_file, source.snapshot)?;
            let table = load(&input, &filters.to_options()?)?;

            if let Some(path) = csv {
                write_csv(&table, &path)?;
                info!(path = %path.display(), rows = table.len(), "CSV export written");
            }
            if let Some(path) = snapshot_path {
                save_snapshot(&table, &path)?;
            }
        }
    }

    Ok(())
}

fn parse_optional_date(raw: Option<&str>) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    raw.map(|r| parse_date_bound(r).ok_or_else(|| anyhow::anyhow!("Invalid date: {}", r)))
        .transpose()
}

fn step_done(step: &str, start: Instant, timings: bool) {
    let elapsed_secs = start.elapsed().as_secs_f64();
    if timings {
        info!(elapsed_secs, "{}", step);
    } else {
        debug!(elapsed_secs, "{}", step);
    }
}
