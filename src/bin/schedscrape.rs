use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use sched_scraper::{
    common::{to_json, to_records},
    rmp::RatingTable,
    scraper::{
        extract_bytes, fetch::DEFAULT_SCHEDULE_URL, DecodePolicy, Diagnostics, Encoding, Fetcher, ScheduleQuery,
        Term,
    },
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

#[derive(Parser)]
/// Fetches a course schedule page and prints its sections as a JSON array.
///
/// Without a subject the schedule page itself is fetched and parsed. With a
/// subject, that subject's sections for one term are searched instead.
struct Args {
    /// Schedule page to fetch
    #[arg(long, env = "SCHEDULE_URL", default_value = DEFAULT_SCHEDULE_URL)]
    url: Url,

    /// Term to search. Defaults to the term currently in session
    ///
    /// Format: YYYYSS (202510) or a season and year (fall2024)
    #[arg(long, short, requires = "subject")]
    term: Option<Term>,

    /// Subject code to search, e.g. CS
    #[arg(long, short)]
    subject: Option<String>,

    /// Parse a saved page instead of fetching one
    #[arg(long, short, value_name = "FILE", conflicts_with_all = ["term", "subject"])]
    input: Option<PathBuf>,

    /// Character encoding of the page, overriding whatever the server sends
    /// or the page declares
    #[arg(long, value_name = "LABEL")]
    encoding: Option<Encoding>,

    /// Fail on bytes that don't fit the encoding instead of repairing them
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// Print the JSON on one line instead of indented
    #[arg(long, short, default_value_t = false)]
    compact: bool,

    /// JSON file of instructor ratings to attach to each course's data
    #[arg(long, value_name = "FILE")]
    ratings: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the JSON, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| ["schedscrape=info", "sched_scraper=info"].join(",").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let (body, served_encoding) = match &args.input {
        Some(path) => {
            let body = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            (body, None)
        }
        None => {
            let query = match &args.subject {
                Some(subject) => Some(ScheduleQuery {
                    term: match args.term {
                        Some(term) => term,
                        None => Term::current()?,
                    },
                    subject: subject.clone(),
                }),
                None => None,
            };
            let fetcher = Fetcher::new(Duration::from_secs(args.timeout))?;
            let page = fetcher.fetch(args.url.as_str(), query.as_ref()).await?;
            (page.body, page.encoding)
        }
    };

    let encoding = args
        .encoding
        .or(served_encoding)
        .or_else(|| Encoding::sniff_meta(&body))
        .unwrap_or_default();
    let policy = if args.strict {
        DecodePolicy::Strict
    } else {
        DecodePolicy::Lenient
    };
    let extraction = extract_bytes(&body, encoding, policy).context("failed to decode schedule page")?;

    let Diagnostics {
        total_rows_seen,
        rows_accepted,
        rows_rejected,
    } = extraction.diagnostics;
    info!(total_rows_seen, rows_accepted, rows_rejected, "extracted sections");

    let ratings = match &args.ratings {
        Some(path) => Some(RatingTable::load(path).await?),
        None => None,
    };

    let records = to_records(&extraction.courses, ratings.as_ref());
    println!("{}", to_json(&records, !args.compact)?);

    Ok(())
}
