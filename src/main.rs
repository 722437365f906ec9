//! Operator entry point: a thin clap CLI over the gateway/sweeper pair,
//! following the teacher's `tracing_subscriber::fmt()` + `EnvFilter`
//! startup sequence (`main.rs`) rather than anything more elaborate.

use anyhow::Result;
use clap::{Parser, Subcommand};
use duelcode::config::Config;
use duelcode::duel_engine::DuelEngine;
use duelcode::fabric::EventFabric;
use duelcode::gateway::{self, AppState};
use duelcode::judge::create_execution_backend;
use duelcode::problem::ProblemGenerator;
use duelcode::rating::RatingService;
use duelcode::repository::Repository;
use duelcode::sweeper::Sweeper;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "duelcoded", about = "Real-time competitive-coding duel runtime")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the gateway and background sweeper. Default when no
    /// subcommand is given.
    Serve,
    /// Runs a single sweep pass (stale-waiting cancellation, in-progress
    /// timeout) and exits. Useful for an external cron instead of the
    /// in-process loop.
    SweepOnce,
    /// Pre-populates the problem catalog with the curated fallback
    /// library and exits, instead of letting it seed lazily on first use.
    SeedProblems,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("duelcode=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let repo = Arc::new(Repository::open(&config.db_path)?);
    let problems = Arc::new(ProblemGenerator::new(
        repo.clone(),
        create_execution_backend(),
        config.problem_ttl_days,
        config.problem_max_reuse,
    ));
    let rating = Arc::new(RatingService::new(repo.clone(), config.elo_k_factor));
    let fabric = EventFabric::new(config.code_update_debounce);
    let engine = Arc::new(DuelEngine::new(
        repo.clone(),
        create_execution_backend(),
        problems.clone(),
        fabric.clone(),
        rating.clone(),
        config.clone(),
    ));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, repo, engine, rating, fabric).await,
        Commands::SweepOnce => {
            let sweeper = Sweeper::new(
                repo,
                engine,
                config.waiting_timeout_random,
                config.waiting_timeout_ai,
                config.waiting_timeout_private,
                config.duel_in_progress_timeout,
            );
            sweeper.sweep_once().await?;
            Ok(())
        }
        Commands::SeedProblems => {
            let seeded = problems.seed_fallback_library()?;
            tracing::info!(seeded, "seeded fallback problem library");
            Ok(())
        }
    }
}

async fn serve(
    config: Config,
    repo: Arc<Repository>,
    engine: Arc<DuelEngine>,
    rating: Arc<RatingService>,
    fabric: EventFabric,
) -> Result<()> {
    let sweeper = Sweeper::new(
        repo.clone(),
        engine.clone(),
        config.waiting_timeout_random,
        config.waiting_timeout_ai,
        config.waiting_timeout_private,
        config.duel_in_progress_timeout,
    );
    tokio::spawn(sweeper.run());

    let state = AppState { engine, repo, rating, fabric };
    let app = gateway::router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "duelcode gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
