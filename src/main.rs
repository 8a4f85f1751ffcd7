use anyhow::{Context, Result};
use hello_pipeline::cli::commands::{DeployCommand, HistoryCommand, RunCommand, ValidateCommand};
use hello_pipeline::cli::output::*;
use hello_pipeline::cli::{Cli, Command};
use hello_pipeline::core::config::PipelineConfig;
use hello_pipeline::deployment::{DeploymentServer, DeploymentState};
use hello_pipeline::execution::{ArtifactCache, ExecutionEngine};
use hello_pipeline::persistence::{create_summary, ExecutionSummary, PersistenceBackend};
use hello_pipeline::pipelines::{deploy_settings, hello_world_pipeline};
use hello_pipeline::steps::OutputSink;
use std::sync::Arc;
use tracing::{debug, error, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Logs go to stderr; stdout carries only pipeline output
    let default_level = if cli.verbose { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await?,
        Command::Deploy(cmd) => deploy_pipeline(cmd, &cli).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

fn load_config(path: Option<&str>, default: PipelineConfig) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path).context("Failed to load pipeline config"),
        None => Ok(default),
    }
}

/// History and cache backends
struct Stores {
    history: Arc<dyn PersistenceBackend>,
    cache: Arc<dyn ArtifactCache>,
}

async fn open_stores() -> Result<Stores> {
    #[cfg(feature = "sqlite")]
    let stores = {
        let store = Arc::new(hello_pipeline::persistence::SqliteExecutionStore::with_default_path().await?);
        Stores {
            history: store.clone(),
            cache: store,
        }
    };

    #[cfg(not(feature = "sqlite"))]
    let stores = {
        warn!("Built without sqlite; history and cache last only for this process");
        Stores {
            history: Arc::new(hello_pipeline::persistence::InMemoryPersistence::new()),
            cache: Arc::new(hello_pipeline::execution::InMemoryCache::new()),
        }
    };

    Ok(stores)
}

async fn open_history() -> Result<Arc<dyn PersistenceBackend>> {
    Ok(open_stores().await?.history)
}

async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref(), PipelineConfig::local())?;
    if cmd.no_cache {
        config.enable_cache = false;
    }

    let mut pipeline = hello_world_pipeline(&config, OutputSink::stdout())
        .context("Failed to build pipeline")?;

    eprintln!(
        "{} Loaded pipeline: {} (cache {})",
        INFO,
        style(&pipeline.name).bold(),
        if pipeline.enable_cache { "enabled" } else { "disabled" }
    );

    let stores = if config.enable_cache || !cmd.no_history {
        Some(open_stores().await?)
    } else {
        None
    };

    let engine = match &stores {
        Some(stores) if config.enable_cache => ExecutionEngine::with_cache(stores.cache.clone()),
        _ => ExecutionEngine::new(),
    };
    engine
        .add_event_handler(|event| eprintln!("{}", format_execution_event(&event)))
        .await;

    let result = engine.execute(&mut pipeline).await;

    for step in pipeline.ordered_steps() {
        debug!("{}: {}", step.id, format_step_state(&step.state));
    }

    if let (Some(stores), false) = (&stores, cmd.no_history) {
        let summary = create_summary(&pipeline);
        match stores.history.save_execution(&summary).await {
            Ok(()) => eprintln!(
                "{} Execution saved to history (ID: {})",
                INFO,
                style(&summary.execution_id.to_string()[..8]).dim()
            ),
            Err(e) => warn!("Failed to save execution history: {:#}", e),
        }
    }

    match result {
        Ok(()) => {
            eprintln!(
                "{} {} completed {}",
                CHECK,
                style(&pipeline.name).bold(),
                style("successfully").green()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {} {}", CROSS, style(&pipeline.name).bold(), style("failed").red());
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn deploy_pipeline(cmd: &DeployCommand, cli: &Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref(), PipelineConfig::deployed())?;
    if config.enable_cache {
        debug!("Caching is always disabled for deployments");
        config.enable_cache = false;
    }

    let mut settings = config.settings.deployment.clone().unwrap_or_else(deploy_settings);
    if let Some(host) = &cmd.host {
        settings.host = host.clone();
    }
    if let Some(port) = cmd.port {
        settings.port = port;
    }
    if let Some(timeout) = cmd.keep_alive_timeout {
        settings.keep_alive_timeout_seconds = timeout;
    }
    config.settings.deployment = Some(settings.clone());

    let pipeline = hello_world_pipeline(&config, OutputSink::stdout())
        .context("Failed to build pipeline")?;
    let state = Arc::new(DeploymentState::new(pipeline, settings));
    let server = DeploymentServer::bind(state).await?;

    eprintln!(
        "{} Deployed {} at http://{}",
        ROCKET,
        style(&config.name).bold(),
        style(server.local_addr()?).cyan()
    );

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    let config = match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => config,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    };

    // Building also checks step bindings under the configured name
    let (sink, _) = OutputSink::memory();
    if let Err(e) = hello_world_pipeline(&config, sink) {
        println!("{} Validation failed:", CROSS);
        println!("  {}", style(e).red());
        std::process::exit(1);
    }

    println!("{} Pipeline configuration is valid!", CHECK);
    println!("  Name: {}", style(&config.name).bold());
    println!("  Cache: {}", style(config.enable_cache).cyan());
    match &config.settings.deployment {
        Some(d) => println!(
            "  Deployment: {} (keep-alive {}s)",
            style(d.bind_address()).cyan(),
            d.keep_alive_timeout_seconds
        ),
        None => println!("  Deployment: {}", style("not configured").dim()),
    }

    if cmd.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("\n{}", json);
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_history().await?;

    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;
        match store.load_execution(exec_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.details)?,
            None => println!("{} Execution not found", WARN),
        }
        return Ok(());
    }

    let executions = match &cmd.pipeline {
        Some(pipeline_name) => {
            let mut executions = store.list_executions(pipeline_name).await?;
            executions.truncate(cmd.limit);
            executions
        }
        None => store.recent_executions(cmd.limit).await?,
    };

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(());
    }

    println!("{} Execution history (showing latest {}):", INFO, cmd.limit);
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
    }

    Ok(())
}

fn print_execution_details(summary: &ExecutionSummary, details: bool) -> Result<()> {
    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format!("{}ms", duration.as_millis())).dim());
        }
    }
    println!(
        "  Steps: {}/{} completed, {} cached",
        summary.completed_steps, summary.total_steps, summary.cached_steps
    );

    if details {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
