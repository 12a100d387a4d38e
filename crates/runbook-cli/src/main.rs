mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use runbook_config::{ConfigLoadError, RunbookConfig};
use runbook_host::handlers::{BundleRequest, ExecRequest, ListRequest};
use runbook_host::{
    change_source, BundlingPipeline, Dispatcher, ManifestLoader, PipelineConfig, ProcessCompiler,
    ReloadController, ScriptHandlers, ScriptLoader, ScriptRegistry,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enables debug mode (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write logs to the data directory
    #[arg(long)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write an example config file
    Init,
    /// Load scripts and list them
    List {
        /// Case-insensitive text in label, name or description
        #[arg(short, long)]
        query: Option<String>,
        #[arg(short, long)]
        resource_type: Option<String>,
        /// May be repeated
        #[arg(short, long = "event-type")]
        event_types: Vec<String>,
        #[arg(short, long)]
        bundle: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Load scripts and run one
    Exec {
        name: String,
        /// Arguments as JSON
        #[arg(short, long, default_value = "null")]
        args: String,
    },
    /// Print a packed bundle from the output directory
    Bundle { name: String },
    /// Load scripts and reload them on change until interrupted
    Watch,
}

struct Host {
    config: RunbookConfig,
    registry: Arc<ScriptRegistry>,
    pipeline: Arc<BundlingPipeline>,
    handlers: ScriptHandlers,
}

impl Host {
    fn new(config: RunbookConfig) -> Self {
        let registry = Arc::new(ScriptRegistry::new());
        let pipeline_config = PipelineConfig::from_config(&config);
        let handlers = ScriptHandlers::new(
            Dispatcher::new(registry.clone(), config.exec.clone()),
            pipeline_config.output_dir.clone(),
        );
        let pipeline = Arc::new(BundlingPipeline::new(
            Arc::new(ManifestLoader::from_config(&config.scripts)),
            Arc::new(ProcessCompiler::new()),
            registry.clone(),
            pipeline_config,
        ));

        Self {
            config,
            registry,
            pipeline,
            handlers,
        }
    }

    async fn load(&self) -> Result<()> {
        self.pipeline
            .run()
            .await
            .context("failed to load scripts")?;
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<RunbookConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(RunbookConfig::config_path);
    match RunbookConfig::load_from(&path) {
        Ok(config) => Ok(config),
        Err(ConfigLoadError::NotFound) => {
            info!("No config found at {}, using defaults", path.display());
            Ok(RunbookConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("invalid config {}", path.display())),
    }
}

fn create_example_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("config already exists at {}", path.display());
    }

    let example_config = format!(
        r#"# runbook configuration

[scripts]
# root = "{scripts}"
# base_paths = []
extensions = ["toml"]
profile = "server"

[bundler]
# output_path = "{output}"
# packing = "single"

[reload]
enabled = true
mode = "notify"
debounce_ms = 500

[exec.env]
# API_URL = "http://localhost:8080"
"#,
        scripts = runbook_config::paths::default_scripts_dir().display(),
        output = runbook_config::paths::default_output_dir().display(),
    );

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, example_config)?;
    eprintln!("Config file created at: {}", path.display());

    Ok(())
}

async fn run_list(host: &Host, request: ListRequest, json: bool) -> Result<()> {
    host.load().await?;
    let response = host.handlers.list(&request);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    for script in &response.scripts {
        let state = if script.executable {
            "ready".to_string()
        } else if !script.errors.is_empty() {
            format!("error: {}", script.errors.join("; "))
        } else {
            "not compiled".to_string()
        };
        println!(
            "{:<24} {:<12} {:<32} {}",
            script.name,
            script.bundle.as_deref().unwrap_or("-"),
            script.label.as_deref().unwrap_or(""),
            state
        );
    }
    eprintln!(
        "{} script(s), last updated {}",
        response.scripts.len(),
        response.last_updated
    );
    Ok(())
}

async fn run_exec(host: &Host, name: String, args: &str) -> Result<()> {
    let args = serde_json::from_str(args).context("--args must be valid JSON")?;
    host.load().await?;

    let response = host.handlers.exec(ExecRequest { name, args }).await?;
    for line in &response.log {
        eprintln!("[{}] {}", line.level, line.message);
    }
    println!("{}", serde_json::to_string_pretty(&response.result)?);
    Ok(())
}

async fn run_watch(host: Host) -> Result<()> {
    if let Err(e) = host.pipeline.run().await {
        warn!("Initial load failed, waiting for changes: {}", e);
    }
    info!("{} script(s) loaded", host.registry.len());

    if !host.config.reload.enabled {
        info!("Reload disabled, serving the current set until interrupted");
        tokio::signal::ctrl_c().await?;
        return Ok(());
    }

    let source = change_source(
        &host.config.reload,
        &host.pipeline.loader().base_paths(),
        &host.config.scripts.extensions,
    )
    .context("failed to watch script directories")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let controller = ReloadController::new(host.pipeline.clone(), host.config.reload.debounce())
        .spawn(source, shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    // Receiver may already be gone if the controller stopped on its own
    let _ = shutdown_tx.send(true);

    let stats = controller.await?;
    info!(runs = stats.runs, failed = stats.failed_runs, "Stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init_logging(cli.debug, cli.log_file)?;

    if let Command::Init = cli.command {
        let path = cli.config.unwrap_or_else(RunbookConfig::config_path);
        return create_example_config(&path);
    }

    let config = load_config(cli.config.as_deref())?;
    let host = Host::new(config);

    match cli.command {
        Command::Init => Ok(()),
        Command::List {
            query,
            resource_type,
            event_types,
            bundle,
            json,
        } => {
            let request = ListRequest {
                query,
                resource_type,
                event_types: (!event_types.is_empty()).then_some(event_types),
                bundle,
            };
            run_list(&host, request, json).await
        }
        Command::Exec { name, args } => run_exec(&host, name, &args).await,
        Command::Bundle { name } => {
            let response = host.handlers.bundle(&BundleRequest { name }).await?;
            println!("{}", response.content);
            Ok(())
        }
        Command::Watch => run_watch(host).await,
    }
}
