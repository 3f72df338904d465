use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wwdc_dl::config::TransferConfig;
use wwdc_dl::download::SilentObserver;
use wwdc_dl::{
    AssetSelection, BatchSummary, Config, DownloadObserver, Event, Pipeline, Resolution,
    Selection, StatusLineObserver, cancel_on_signal,
};

#[derive(Parser)]
#[command(name = "wwdc-dl")]
#[command(about = "Download WWDC session videos and slides")]
#[command(version)]
struct Cli {
    /// Conference year
    #[arg(short, long, default_value_t = 2016)]
    year: u16,

    /// Directory to save downloads into
    #[arg(short, long, default_value = "./downloads")]
    directory: PathBuf,

    /// Video resolution (HD or SD)
    #[arg(short, long, default_value = "SD")]
    format: Resolution,

    /// Comma separated session ids, e.g. 101,402
    #[arg(short, long, value_delimiter = ',', conflicts_with = "all")]
    sessions: Vec<String>,

    /// Download every session of the year (default when no sessions are given)
    #[arg(short, long)]
    all: bool,

    /// Skip the slides
    #[arg(long, conflicts_with = "pdf_only")]
    no_pdf: bool,

    /// Download only the slides
    #[arg(long)]
    pdf_only: bool,

    /// Maximum number of simultaneous downloads
    #[arg(long, default_value_t = 2)]
    concurrency: usize,

    /// Print status events as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> Config {
        let selection = if self.sessions.is_empty() {
            Selection::All
        } else {
            Selection::explicit(self.sessions.iter().map(|s| s.trim().to_string()))
        };

        let assets = if self.pdf_only {
            AssetSelection::pdf_only()
        } else if self.no_pdf {
            AssetSelection::video_only()
        } else {
            AssetSelection::default()
        };

        Config {
            year: self.year,
            resolution: self.format,
            selection,
            download_dir: self.directory,
            assets,
            transfer: TransferConfig {
                max_concurrent_downloads: self.concurrency,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "wwdc_dl=info,info",
        _ => "wwdc_dl=debug,info",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Print events that matter to the user when not in JSON mode
fn print_event(event: &Event) {
    match event {
        Event::SelectionResolved { sessions, discovered } => {
            let ids: Vec<&str> = sessions.iter().map(|s| s.as_str()).collect();
            let source = if *discovered { "found" } else { "requested" };
            println!("{} sessions {}: {}", sessions.len(), source, ids.join(", "));
        }
        Event::SessionComplete { session } => println!("{}: done", session),
        Event::SessionFailed {
            session,
            reason,
            error,
        } => println!("{}: failed ({}) {}", session, reason, error),
        _ => {}
    }
}

fn print_summary(summary: &BatchSummary) {
    println!(
        "{} succeeded, {} failed",
        summary.succeeded(),
        summary.failed()
    );
    for outcome in summary.failures() {
        let failed: Vec<String> = outcome
            .assets
            .iter()
            .filter(|a| !a.succeeded())
            .map(|a| format!("{} {}", a.kind, a.error.as_deref().unwrap_or("failed")))
            .collect();
        let detail = outcome
            .error
            .clone()
            .unwrap_or_else(|| failed.join(", "));
        println!("  {}: {}", outcome.session, detail);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let json = cli.json;
    let config = cli.into_config();
    let concurrency = config.transfer.max_concurrent_downloads;

    let observer: Arc<dyn DownloadObserver> = if json {
        Arc::new(SilentObserver)
    } else {
        Arc::new(StatusLineObserver::for_concurrency(concurrency))
    };

    let pipeline = match Pipeline::new(config) {
        Ok(pipeline) => pipeline.with_observer(observer),
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    cancel_on_signal(pipeline.cancellation_token());

    let mut events = pipeline.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if json => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "Could not serialize event"),
                },
                Ok(event) => print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let result = pipeline.run().await;
    drop(pipeline);
    let _ = printer.await;

    match result {
        Ok(summary) => {
            if !json {
                print_summary(&summary);
            }
            match summary.ensure_success() {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "Batch failed");
                    if !json {
                        eprintln!("error: {}", e);
                    }
                    ExitCode::from(1)
                }
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}
