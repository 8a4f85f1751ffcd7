//! CLI command definitions

use clap::Args;

/// Run the pipeline in-process
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Disable step caching for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,
}

/// Serve the pipeline over HTTP
#[derive(Debug, Args, Clone)]
pub struct DeployCommand {
    /// Address to bind (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Keep-alive idle timeout in seconds (overrides config)
    #[arg(long)]
    pub keep_alive_timeout: Option<u64>,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific execution
    #[arg(long)]
    pub execution_id: Option<String>,
}
