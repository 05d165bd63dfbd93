mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{CollectdConfig, DEFAULT_CONFIG_FILE, TEMPLATE};
use orchestrator::{CollectorSet, Dispatcher};
use server::{create_router, state::AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "collectd")]
#[command(about = "Multi-platform collection orchestration engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration and create the database
    Init,
    /// Run the HTTP API and the dispatcher
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite URL, overrides [database] url
        #[arg(long)]
        database_url: Option<String>,
    },
    /// List the configured arenas
    Arenas,
    /// Show stored runs and their task states
    Status {
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Init) => init(&cli.config).await,
        Some(Commands::Serve { port, database_url }) => serve(&cli.config, port, database_url).await,
        Some(Commands::Arenas) => arenas(&cli.config).await,
        Some(Commands::Status { database_url }) => status(&cli.config, database_url).await,
        None => serve(&cli.config, None, None).await,
    }
}

async fn init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(config_path, TEMPLATE)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Wrote {}", config_path.display());
    }

    let config = CollectdConfig::load(config_path).await?;
    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    println!("Database ready at {}", config.database.url);
    println!();
    println!("Next steps:");
    println!("  1. Edit [[arenas]] and [[specifications]] in {}", config_path.display());
    println!("  2. Run 'collectd serve'");

    Ok(())
}

async fn serve(config_path: &Path, port: Option<u16>, database_url: Option<String>) -> Result<()> {
    let mut config = CollectdConfig::load(config_path).await?;
    if let Some(url) = database_url {
        config.database.url = url;
    }
    let port = port.unwrap_or(config.server.port);

    let registry = Arc::new(config.registry()?);
    let specifications = config.specifications(&registry)?;

    // Platform collectors are linked in by embedding crates through
    // `DispatcherBuilder::with_collectors`; the stock binary ships none.
    let collectors = CollectorSet::new();
    if collectors.is_empty() {
        tracing::warn!(
            arenas = registry.len(),
            "No collectors registered, launches will be rejected"
        );
    }

    tracing::info!(url = %config.database.url, "Opening database");
    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let dispatcher = Dispatcher::builder(pool, registry)
        .with_config(config.dispatcher.clone())
        .with_dedup_config(config.dedup.clone())
        .with_collectors(collectors)
        .with_specifications(Arc::new(specifications))
        .with_credentials(config.credential_pool())
        .build();
    dispatcher.start();

    let app = create_router(AppState::new(dispatcher.clone()));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;

    tracing::info!(addr = %listener.local_addr()?, "collectd listening");
    println!();
    println!("  API:      http://localhost:{}/api", port);
    println!("  OpenAPI:  http://localhost:{}/api/openapi.json", port);
    println!();
    println!("Press Ctrl+C to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    dispatcher.shutdown().await;
    tracing::info!("collectd stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

async fn arenas(config_path: &Path) -> Result<()> {
    let config = CollectdConfig::load(config_path).await?;
    let registry = config.registry()?;

    if registry.is_empty() {
        println!("No arenas configured.");
        return Ok(());
    }

    println!("Arenas ({}):", registry.len());
    for arena in registry.iter() {
        let tiers: Vec<_> = arena.tiers.iter().map(|t| t.as_str()).collect();
        let capabilities: Vec<_> = arena.capabilities.iter().map(|c| c.as_str()).collect();
        println!(
            "  {:<16} group={:<14} tiers=[{}] capabilities=[{}]{}",
            arena.platform,
            arena.group,
            tiers.join(", "),
            capabilities.join(", "),
            if arena.requires_credential {
                " (credential)"
            } else {
                ""
            }
        );
    }

    Ok(())
}

async fn status(config_path: &Path, database_url: Option<String>) -> Result<()> {
    let mut config = CollectdConfig::load(config_path).await?;
    if let Some(url) = database_url {
        config.database.url = url;
    }

    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to open database")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let runs = db::RunRepository::new(pool.clone())
        .find_all()
        .await
        .context("Failed to load runs")?;
    let task_repo = db::TaskRepository::new(pool);

    println!();
    if runs.is_empty() {
        println!("No runs yet.");
        return Ok(());
    }

    println!("Runs ({}):", runs.len());
    for run in &runs {
        let status_icon = match run.status.as_str() {
            "running" => "◐",
            "completed" => "●",
            "cancelled" => "○",
            _ => "✗",
        };
        println!(
            "  {} {} [{}] spec={} started={}",
            status_icon,
            run.id,
            run.status.as_str(),
            run.specification_id,
            run.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        for task in task_repo.find_by_run(run.id).await? {
            println!(
                "      {:<16} {:<10} admitted={}",
                task.platform,
                task.status.as_str(),
                task.counters.records_admitted
            );
        }
    }
    println!();

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}
