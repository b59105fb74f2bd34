use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use toolbridge::{collect_tools, ConfigLoader, Registry};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Drive MCP and LSP helper servers over stdio JSON-RPC
#[derive(Parser, Debug)]
#[command(name = "toolbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace root directory
    ///
    /// If not specified, the nearest git root above the current directory,
    /// or the current directory itself.
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Extra config file, loaded after the discovered ones (repeatable)
    #[arg(short, long = "config", global = true)]
    configs: Vec<PathBuf>,

    /// Skip the built-in language server entries
    #[arg(long, global = true)]
    no_defaults: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Log to file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured servers without starting them
    Servers,
    /// Auto-start servers and report their state
    Status,
    /// Auto-start servers and list the tools they offer
    Tools,
    /// Call a tool and print its output
    Call {
        /// Remote tool name
        tool: String,

        /// Server to route to; by default the first running server offering the tool
        #[arg(short, long)]
        server: Option<String>,

        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
}

fn setup_logging(log_level: &str, log_file: Option<PathBuf>) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true);

    if let Some(log_path) = log_file {
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("cannot create log file {}", log_path.display()))?;
        subscriber.with_ansi(false).with_writer(file).init();
    } else {
        subscriber.with_writer(std::io::stderr).init();
    }

    Ok(())
}

fn detect_workspace_root(provided: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = provided {
        return path
            .canonicalize()
            .with_context(|| format!("workspace {} does not exist", path.display()));
    }

    let current_dir = std::env::current_dir()?;
    for dir in current_dir.ancestors() {
        if dir.join(".git").exists() {
            info!("Detected git root: {}", dir.display());
            return Ok(dir.to_path_buf());
        }
    }

    info!("Using current directory as workspace root");
    Ok(current_dir)
}

fn build_loader(args: &Args, workspace_root: &std::path::Path) -> Result<ConfigLoader> {
    let mut loader = if args.no_defaults {
        ConfigLoader::new()
    } else {
        ConfigLoader::with_builtin_defaults()
    };
    loader.load_paths(&ConfigLoader::discover(workspace_root))?;

    for path in &args.configs {
        if !loader.load_file(path)? {
            bail!("config file {} does not exist", path.display());
        }
    }
    Ok(loader)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level, args.log_file.clone())?;

    let workspace_root = detect_workspace_root(args.workspace.clone())?;
    info!("Workspace root: {}", workspace_root.display());

    let loader = build_loader(&args, &workspace_root)?;
    let registry = Arc::new(Registry::new(workspace_root));

    let auto_start = !matches!(args.command, Command::Servers);
    let report = registry.initialize_with(loader, auto_start).await?;
    for (name, error) in &report.failed {
        eprintln!("warning: server '{}' failed to start: {}", name, error);
    }

    let outcome = run(&args.command, Arc::clone(&registry)).await;
    registry.shutdown().await;
    outcome
}

async fn run(command: &Command, registry: Arc<Registry>) -> Result<()> {
    match command {
        Command::Servers => {
            let configs = registry.configs().await;
            if configs.is_empty() {
                println!("No servers configured");
            }
            for config in configs {
                let mut flags = vec![config.kind.as_str()];
                if !config.enabled {
                    flags.push("disabled");
                }
                if config.auto_start {
                    flags.push("auto-start");
                }
                println!(
                    "{}\t{}\t{} {}",
                    config.name,
                    flags.join(","),
                    config.command,
                    config.args.join(" ")
                );
            }
        }
        Command::Status => {
            for report in registry.status().await {
                let pid = report.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
                let since = report
                    .started_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".into());
                print!("{}\t{}\tpid={}\tsince={}", report.name, report.status, pid, since);
                match report.error {
                    Some(error) => println!("\t{}", error),
                    None => println!(),
                }
            }
        }
        Command::Tools => {
            for tool in collect_tools(registry).await {
                println!("{}\t{}", tool.name(), tool.description());
            }
        }
        Command::Call { tool, server, args } => {
            let arguments: Value =
                serde_json::from_str(args).context("--args must be a JSON object")?;
            if !arguments.is_object() {
                bail!("--args must be a JSON object");
            }

            if let Some(server) = server {
                registry.start(server).await?;
            }

            let result = registry
                .call_tool(tool, arguments, server.as_deref())
                .await?;
            let output = result.output();
            if output.is_error {
                bail!("{} on '{}' failed: {}", tool, result.server, output.content);
            }
            println!("{}", output.content);
        }
    }
    Ok(())
}
