/*!
 * Elevate CLI
 *
 * `serve` answers JSON-lines method calls on stdin/stdout through a bridge
 * bound to the in-process broker. `write-config` emits the effective
 * configuration as TOML.
 */

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use elevate::{
    config::{BridgeConfig, LogLevel},
    logging, server, BridgeRegistration, MethodChannel,
};
use elevate_connect::{InProcessBroker, PromptPolicy};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;

#[derive(Parser)]
#[command(name = "elevate")]
#[command(version, about = "Privileged file bridge over a capability broker", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Log file path (JSON); defaults to stderr
    #[arg(long = "log", value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Verbose logging (debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve method calls as JSON lines on stdin/stdout
    Serve {
        /// Start with permission already granted
        #[arg(long)]
        granted: bool,

        /// How the broker answers permission prompts
        #[arg(long, value_enum, default_value = "grant")]
        prompt: PromptArg,

        /// Leave the broker stopped (state reports not_running)
        #[arg(long)]
        broker_down: bool,

        /// Override the channel name
        #[arg(long)]
        channel: Option<String>,
    },

    /// Write the effective configuration to a TOML file
    WriteConfig {
        /// Output path
        output: PathBuf,
    },
}

#[derive(Copy, Clone, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum PromptArg {
    Grant,
    Deny,
}

impl From<PromptArg> for PromptPolicy {
    fn from(arg: PromptArg) -> Self {
        match arg {
            PromptArg::Grant => PromptPolicy::AutoGrant,
            PromptArg::Deny => PromptPolicy::AutoDeny,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => BridgeConfig::from_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;

    match cli.command {
        Commands::Serve {
            granted,
            prompt,
            broker_down,
            channel,
        } => {
            if let Some(channel) = channel {
                config.channel_name = channel;
            }
            logging::init_logging(&config).context("Failed to initialize logging")?;
            serve(config, granted, prompt.into(), broker_down).await
        }
        Commands::WriteConfig { output } => {
            config
                .to_file(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote {}", output.display());
            Ok(())
        }
    }
}

async fn serve(
    config: BridgeConfig,
    granted: bool,
    prompt: PromptPolicy,
    broker_down: bool,
) -> Result<()> {
    info!("Elevate v{}", env!("CARGO_PKG_VERSION"));

    let broker = InProcessBroker::new();
    broker.set_granted(granted);
    broker.set_prompt_policy(prompt);
    if !broker_down {
        broker.start();
    }

    let channel = Arc::new(MethodChannel::new(config.channel_name.clone()));
    let registration = BridgeRegistration::attach(channel.clone(), broker, &config)
        .context("Failed to attach bridge")?;
    info!(channel = channel.name(), state = ?registration.controller().state(), "Serving");

    let requests = server::serve(
        channel,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
    .context("JSON-lines server failed")?;

    registration.detach();
    info!(requests, "Bridge session ended");
    Ok(())
}
