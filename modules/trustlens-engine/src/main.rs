use std::process::ExitCode;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use trustlens_common::{
    Config, DateRange, HealthCategory, Journal, ResearchRequest, VerificationOptions,
};
use trustlens_engine::discovery::DiscoveryStage;
use trustlens_engine::service::ResearchService;

#[derive(Parser)]
#[command(name = "trustlens", about = "Health influencer claim research")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Research one influencer and print the resulting snapshot.
    Research {
        /// Influencer name, e.g. "Andrew Huberman".
        name: String,
        /// Restrict content to the last N months (max 24).
        #[arg(long)]
        months: Option<u32>,
        /// Comma-separated journal filter, e.g. "nature,science,nejm".
        /// Empty means all supported journals.
        #[arg(long, value_delimiter = ',')]
        journals: Vec<String>,
        /// How many claims to analyze (clamped to 10..=100).
        #[arg(long, default_value_t = 50)]
        claims: u32,
    },
    /// Discover and research top influencers per health category.
    Discover {
        /// Comma-separated categories, e.g. "nutrition,fitness".
        #[arg(long, value_delimiter = ',', required = true)]
        categories: Vec<String>,
        /// Total number of influencers to research.
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let service = ResearchService::new(config);

    match cli.command {
        Command::Research {
            name,
            months,
            journals,
            claims,
        } => run_research(&service, name, months, journals, claims).await,
        Command::Discover { categories, count } => run_discover(&service, categories, count).await,
    }
}

async fn run_research(
    service: &ResearchService,
    name: String,
    months: Option<u32>,
    journals: Vec<String>,
    claims: u32,
) -> ExitCode {
    let mut parsed_journals = Vec::new();
    for raw in &journals {
        match Journal::from_str_loose(raw) {
            Some(journal) => parsed_journals.push(journal),
            None => {
                eprintln!("Unknown journal: {raw}");
                return ExitCode::FAILURE;
            }
        }
    }

    let date_range = months.map(|m| {
        let end = Utc::now();
        DateRange {
            start: end - ChronoDuration::days(i64::from(m) * 30),
            end,
        }
    });

    let request = ResearchRequest::builder()
        .influencer_name(name)
        .date_range(date_range)
        .options(VerificationOptions {
            journals: parsed_journals,
            claims_to_analyze: claims,
            keywords: vec![],
        })
        .build();

    let outcome = match service.submit_research(request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Submission rejected: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(job_id = %outcome.job_id, subject_key = %outcome.subject_key, "Research submitted");

    // Tail the progress log until the job settles.
    let mut printed = 0;
    loop {
        let Some(status) = service.research_status(&outcome.subject_key).await else {
            eprintln!("Job vanished from the registry");
            return ExitCode::FAILURE;
        };
        for entry in &status.progress[printed..] {
            println!("[{}] {}: {}", entry.at.format("%H:%M:%S"), entry.stage, entry.message);
        }
        printed = status.progress.len();

        if status.stage.is_terminal() {
            return match status.result {
                Some(snapshot) => {
                    match serde_json::to_string_pretty(&snapshot) {
                        Ok(json) => println!("{json}"),
                        Err(e) => eprintln!("Snapshot serialization failed: {e}"),
                    }
                    ExitCode::SUCCESS
                }
                None => {
                    eprintln!(
                        "Research failed: {}",
                        status.error_detail.as_deref().unwrap_or("unknown error")
                    );
                    ExitCode::FAILURE
                }
            };
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn run_discover(
    service: &ResearchService,
    categories: Vec<String>,
    count: usize,
) -> ExitCode {
    let categories: Vec<HealthCategory> = categories
        .iter()
        .map(|s| HealthCategory::from_str_loose(s))
        .collect();

    let id = service
        .submit_discovery(categories, count, VerificationOptions::default())
        .await;
    info!(%id, "Discovery batch submitted");

    let mut printed = 0;
    loop {
        let Some(job) = service.discovery_status(id).await else {
            eprintln!("Discovery batch vanished");
            return ExitCode::FAILURE;
        };
        for entry in &job.progress[printed..] {
            println!("[{}] {:?}: {}", entry.at.format("%H:%M:%S"), entry.stage, entry.message);
        }
        printed = job.progress.len();

        if job.stage == DiscoveryStage::Complete {
            println!("Researched {} influencers ({} excluded):", job.results.len(), job.excluded);
            for snapshot in &job.results {
                println!(
                    "  {:>5.1}  {} ({} claims)",
                    snapshot.current_trust_score,
                    snapshot.name,
                    snapshot.claims.len()
                );
            }
            return ExitCode::SUCCESS;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}
