use clap::{Parser, Subcommand};
use hra_core::store::DraftStore;
use hra_core::{trend, AnswerMap, Catalog, CoreConfig};
use hra_store::FileDraftStore;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "hra")]
#[command(about = "Health risk assessment engine CLI")]
struct Cli {
    /// Base directory for stored assessment data
    #[arg(long, default_value = "/assessment_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the domain catalog
    Catalog,
    /// Score an answers file (JSON answer map) and print the assessment
    Score {
        /// Path to a JSON file: domain id -> question id -> value (0..2)
        answers: PathBuf,
    },
    /// Show the trend between a subject's two most recent assessments
    Trend {
        /// Subject UUID
        subject: Uuid,
        /// How many completed assessments to consider
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("hra=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = CoreConfig::new(
        cli.data_dir.clone(),
        hra_core::config::resolve_catalog_file(&cli.data_dir),
    )?;
    let catalog = config.load_catalog()?;

    match cli.command {
        Some(Commands::Catalog) => print_catalog(&catalog),
        Some(Commands::Score { answers }) => {
            let contents = std::fs::read_to_string(&answers)?;
            let answer_map: AnswerMap = serde_json::from_str(&contents)?;
            let assessment = hra_core::scoring::compute_assessment(
                &catalog,
                &answer_map,
                &Default::default(),
                chrono_today(),
            );
            print_assessment(&catalog, &assessment);
        }
        Some(Commands::Trend { subject, count }) => {
            let store = FileDraftStore::new(config.assessment_data_dir());
            let history = store.fetch_latest_completed(subject, count)?;
            if history.is_empty() {
                println!("No completed assessments for subject {subject}.");
            } else {
                print_trend(&history);
            }
        }
        None => {
            println!("No command specified. Use --help for usage information.");
        }
    }

    Ok(())
}

fn chrono_today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

fn print_catalog(catalog: &Catalog) {
    println!(
        "{} domains, {} questions",
        catalog.domains().len(),
        catalog.question_count()
    );
    for (index, step) in catalog.steps().iter().enumerate() {
        println!("Step {}: {}", index + 1, step.title);
        for domain_id in &step.domain_ids {
            let Some(domain) = catalog.domain(domain_id) else {
                continue;
            };
            println!("  {} (max score {})", domain.name, domain.max_score());
            for question in &domain.questions {
                println!("    [{}] {}", question.id, question.prompt);
            }
        }
    }
}

fn print_assessment(catalog: &Catalog, assessment: &hra_core::Assessment) {
    println!(
        "Overall risk: {} ({}/{})",
        assessment.overall_risk, assessment.total_score, assessment.max_total_score
    );
    for result in &assessment.domain_results {
        let name = catalog
            .domain(&result.domain_id)
            .map_or(result.domain_id.as_str(), |domain| domain.name.as_str());
        let flag = if result.flagged { " [FLAGGED]" } else { "" };
        println!(
            "  {}: {}/{} {}{}",
            name, result.score, result.max_score, result.risk_level, flag
        );
        if let Some(action) = &result.trigger_action {
            println!("    Action: {action}");
        }
    }
    if !assessment.recommendations.is_empty() {
        println!("Recommendations:");
        for recommendation in &assessment.recommendations {
            let due = recommendation
                .due_date
                .map(|date| format!(", due {date}"))
                .unwrap_or_default();
            println!(
                "  [{:?}] {}{}",
                recommendation.priority, recommendation.title, due
            );
        }
    }
}

fn print_trend(history: &[hra_core::CompletedAssessment]) {
    println!(
        "Latest assessment: {} (overall {})",
        history[0].completed_at.format("%Y-%m-%d"),
        history[0].assessment.overall_risk
    );
    match trend::latest_comparison(history) {
        Some(deltas) => {
            for delta in deltas {
                println!(
                    "  {}: {} -> {} ({:?})",
                    delta.domain_id, delta.previous_score, delta.current_score, delta.trend
                );
            }
        }
        None => println!("Only one completed assessment; nothing to compare."),
    }
}
