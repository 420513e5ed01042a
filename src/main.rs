use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod contract;
mod data;
mod dna;
mod orchestrator;
mod provider;
mod quality;
mod repository;
mod similarity;

use config::{ProviderConfig, SimilarityConfig};
use data::{GeneratedIdea, ProjectConstraints};
use orchestrator::{CancellationToken, Orchestrator, SessionOutcome};
use provider::ProviderManager;
use repository::{FileRepository, IdeaRepository};

#[derive(Parser)]
#[command(name = "ideaforge")]
#[command(about = "Ideaforge CLI - constraint-driven project idea generation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a project idea from constraints
    Generate {
        /// Application type, e.g. backend-api, web-app, cli-tool
        #[arg(long)]
        app_type: String,

        /// Software category; inferred from the tech stack when omitted
        #[arg(long)]
        project_kind: Option<String>,

        /// beginner, intermediate or advanced
        #[arg(long, default_value = "intermediate")]
        complexity: String,

        /// Required technology (repeatable)
        #[arg(long = "tech")]
        tech: Vec<String>,

        /// Database preference; the literal "none" is meaningful
        #[arg(long)]
        database: Option<String>,

        /// What the project is for
        #[arg(long, default_value = "portfolio project")]
        goal: String,

        /// Expected duration range, echoed verbatim by the idea
        #[arg(long, default_value = "2-4 weeks")]
        timeframe: String,

        /// Free-text seed for the idea
        #[arg(long)]
        idea: Option<String>,

        /// Treat the previous idea as rejected and pivot away from it
        #[arg(long)]
        reject_previous: bool,

        /// Directory holding stored ideas
        #[arg(long, default_value = "ideas")]
        data_dir: String,
    },

    /// Generate the next development phase for a stored idea
    Evolve {
        /// Idea ID to evolve
        #[arg(long)]
        id: String,

        /// Directory holding stored ideas
        #[arg(long, default_value = "ideas")]
        data_dir: String,
    },

    /// List stored ideas, newest first
    List {
        /// Directory holding stored ideas
        #[arg(long, default_value = "ideas")]
        data_dir: String,

        /// Maximum number of ideas to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show one stored idea
    Show {
        /// Idea ID to show
        #[arg(long)]
        id: String,

        /// Directory holding stored ideas
        #[arg(long, default_value = "ideas")]
        data_dir: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            app_type,
            project_kind,
            complexity,
            tech,
            database,
            goal,
            timeframe,
            idea,
            reject_previous,
            data_dir,
        } => {
            let constraints = ProjectConstraints {
                app_type,
                project_kind,
                complexity,
                tech_stack: tech,
                database,
                goal,
                timeframe,
                idea_description: idea,
            };
            generate(&constraints, reject_previous, &data_dir)?;
        }
        Commands::Evolve { id, data_dir } => {
            evolve(&id, &data_dir)?;
        }
        Commands::List { data_dir, limit } => {
            list_ideas(&data_dir, limit)?;
        }
        Commands::Show { id, data_dir } => {
            show_idea(&id, &data_dir)?;
        }
    }

    Ok(())
}

fn generate(constraints: &ProjectConstraints, reject_previous: bool, data_dir: &str) -> Result<()> {
    if !constraints.valid_complexity() {
        bail!(
            "invalid complexity {:?}: expected beginner, intermediate or advanced",
            constraints.complexity
        );
    }

    let providers = ProviderManager::from_config(&ProviderConfig::from_env());
    let repository = FileRepository::new(data_dir);
    let orchestrator = Orchestrator::new(&providers, &repository, SimilarityConfig::from_env());
    let cancel = CancellationToken::new();

    tracing::info!(
        app_type = %constraints.app_type,
        complexity = %constraints.complexity,
        "Generating idea"
    );
    let outcome = if reject_previous {
        orchestrator.run_rejected(constraints, &cancel)?
    } else {
        orchestrator.run(constraints, &cancel)?
    };

    match outcome {
        SessionOutcome::Accepted {
            id,
            idea,
            provenance,
        } => {
            print_idea(&idea);
            println!("Stored as:  {id}");
            print!("Provider:   {}", provenance.provider_used);
            if provenance.fallback_used {
                print!(" (fallback)");
            }
            println!(" in {} ms", provenance.latency_ms);
        }
        SessionOutcome::Blocked { score } => {
            println!("Blocked: too close to a stored idea (similarity {score:.3}).");
            println!("Loosen the constraints or clear old ideas, then try again.");
        }
        SessionOutcome::Failed { reasons } => {
            println!("No acceptable idea after {} attempts:", orchestrator::MAX_ATTEMPTS);
            for reason in reasons {
                println!("  - {reason}");
            }
        }
        SessionOutcome::Cancelled => {
            println!("Cancelled; nothing was saved.");
        }
    }
    Ok(())
}

fn evolve(id: &str, data_dir: &str) -> Result<()> {
    let id: Uuid = id.parse().context("invalid idea ID")?;
    let providers = ProviderManager::from_config(&ProviderConfig::from_env());
    let repository = FileRepository::new(data_dir);
    let orchestrator = Orchestrator::new(&providers, &repository, SimilarityConfig::from_env());

    tracing::info!(%id, "Generating next evolution");
    match orchestrator.evolve(&id, &CancellationToken::new())? {
        orchestrator::EvolutionOutcome::Accepted {
            id: evolution_id,
            evolution,
            provenance,
        } => {
            print_evolution(&evolution);
            println!("Stored as:  {evolution_id}");
            print!("Provider:   {}", provenance.provider_used);
            if provenance.fallback_used {
                print!(" (fallback)");
            }
            println!(" in {} ms", provenance.latency_ms);
        }
        orchestrator::EvolutionOutcome::Cancelled => {
            println!("Cancelled; nothing was saved.");
        }
    }
    Ok(())
}

fn print_evolution(evolution: &data::ProjectEvolution) {
    println!("\n== Evolution overview ==");
    println!("{}", evolution.evolution_overview);
    println!("\n== Product rationale ==");
    println!("{}", evolution.product_rationale);
    println!("\n== Technical rationale ==");
    println!("{}", evolution.technical_rationale);
    println!();
    print_list("Proposed enhancements", &evolution.proposed_enhancements);
    print_list("Risk considerations", &evolution.risk_considerations);
    println!();
}

fn print_idea(idea: &GeneratedIdea) {
    let p = &idea.project;
    println!("\n{}", p.name);
    println!("{}", p.tagline);
    println!("\n== Description ==");
    println!("{}", p.description.summary);
    println!("\n{}", p.description.detailed_explanation);
    println!("\n== Problem ==");
    println!("{}", p.problem_statement.problem);
    println!("Why it matters: {}", p.problem_statement.why_it_matters);
    println!(
        "Current solutions and gaps: {}",
        p.problem_statement.current_solutions_and_gaps
    );
    println!("\n== Target users ==");
    print_list("Primary", &p.target_users.primary);
    print_list("Secondary", &p.target_users.secondary);
    print_list("Use cases", &p.target_users.use_cases);
    println!("\n== Value ==");
    print_list("Key benefits", &p.value_proposition.key_benefits);
    println!(
        "Why interesting: {}",
        p.value_proposition.why_this_project_is_interesting
    );
    println!("Portfolio value: {}", p.value_proposition.portfolio_value);
    println!("\n== MVP ==");
    println!("Goal: {}", p.mvp.goal);
    print_list("Must have", &p.mvp.must_have_features);
    print_list("Nice to have", &p.mvp.nice_to_have_features);
    print_list("Out of scope", &p.mvp.out_of_scope);
    println!("\n== Tech stack ==");
    println!("Backend:  {}", p.recommended_tech_stack.backend);
    println!("Frontend: {}", p.recommended_tech_stack.frontend);
    println!("Database: {}", p.recommended_tech_stack.database);
    println!("Infra:    {}", p.recommended_tech_stack.infra);
    println!("Why: {}", p.recommended_tech_stack.justification);
    println!("\n== Plan ==");
    println!(
        "Complexity: {}   Duration: {} ({})",
        p.complexity, p.estimated_duration.range, p.estimated_duration.assumptions
    );
    print_list("Future extensions", &p.future_extensions);
    print_list("Learning outcomes", &p.learning_outcomes);
    println!();
}

fn print_list(label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{label}:");
    for item in items {
        println!("  - {item}");
    }
}

fn list_ideas(data_dir: &str, limit: usize) -> Result<()> {
    let repository = FileRepository::new(data_dir);
    let ideas = repository.list_recent(limit)?;
    if ideas.is_empty() {
        println!("No stored ideas in {data_dir}/");
        return Ok(());
    }
    for idea in ideas {
        println!(
            "{}  {}  {}",
            idea.id,
            idea.created_at.format("%Y-%m-%d %H:%M"),
            idea.overview
        );
    }
    Ok(())
}

fn show_idea(id: &str, data_dir: &str) -> Result<()> {
    let id: Uuid = id.parse().context("invalid idea ID")?;
    let repository = FileRepository::new(data_dir);
    let stored = repository.load(&id)?;

    // Stored records hold canonicalized JSON; decode it for display.
    if let Ok(idea) = serde_json::from_str::<GeneratedIdea>(&stored.raw_json) {
        print_idea(&idea);
    } else {
        println!("{}", stored.overview);
        print_list("MVP scope", &stored.mvp_scope);
        print_list("Tech stack", &stored.tech_stack);
        println!("Complexity: {}   Duration: {}", stored.complexity, stored.duration);
    }

    println!("Created:    {}", stored.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    print!("Provider:   {}", stored.provider_used);
    if stored.fallback_used {
        print!(" (fallback)");
    }
    println!(" in {} ms", stored.latency_ms);
    if let Some(reason) = stored.retry_reason {
        println!("Accepted after pivot: {}", reason.wire_name());
    }
    println!("Fingerprint: {}", stored.fingerprint);

    let evolutions = repository.list_evolutions(&id)?;
    for (i, row) in evolutions.iter().enumerate() {
        println!("\n-- Evolution #{} ({}) --", i + 1, row.created_at.format("%Y-%m-%d"));
        match serde_json::from_str::<data::ProjectEvolution>(&row.raw_json) {
            Ok(evolution) => print_evolution(&evolution),
            Err(_) => println!("{}", row.raw_json),
        }
    }
    Ok(())
}
