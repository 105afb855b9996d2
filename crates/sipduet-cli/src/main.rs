//! `sipduet` - run the two-user calling demo from a terminal

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sipduet_core::identity::TokenSettings;
use sipduet_core::logging::{LoggingConfig, parse_log_level, setup_logging};
use sipduet_core::prelude::*;
use tokio::time::timeout;
use tracing::info;

const STATE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "sipduet")]
#[command(about = "Two-user SIP video calling demo", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "SIPDUET_CONFIG")]
    config: Option<PathBuf>,

    /// Cookie file holding the identity token
    #[arg(long, env = "SIPDUET_TOKEN_STORE")]
    token_store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the identity token, creating one if needed
    Token,
    /// Register both users and place one call from Alice to Bob
    Run {
        /// How long the call stays up
        #[arg(long, default_value_t = 3)]
        call_secs: u64,

        /// Refuse registrations beyond this many
        #[arg(long)]
        max_registrations: Option<usize>,
    },
    /// Render a chat message
    Message {
        #[arg(long)]
        from: String,

        #[arg(long)]
        body: String,

        /// Print HTML instead of plain text
        #[arg(long)]
        html: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => DemoConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DemoConfig::default(),
    };

    let logging = LoggingConfig::new(parse_log_level(&cli.log_level)?)
        .json(cli.json_logs)
        .sip_trace(config.trace_sip);
    setup_logging(&logging)?;
    info!("Starting sipduet v{}", sipduet_core::VERSION);

    match cli.command {
        Commands::Token => show_token(&config, token_store_path(cli.token_store)?),
        Commands::Run {
            call_secs,
            max_registrations,
        } => {
            run_demo(
                &config,
                token_store_path(cli.token_store)?,
                Duration::from_secs(call_secs),
                max_registrations,
            )
            .await
        }
        Commands::Message { from, body, html } => {
            let fragment = render_message(&from, &body);
            if html {
                println!("{}", fragment.to_html());
            } else {
                println!("{}", fragment);
            }
            Ok(())
        }
    }
}

fn token_store_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let base = dirs::data_dir().context("no data directory; pass --token-store")?;
    Ok(base.join("sipduet").join("cookies.txt"))
}

fn provisioner(
    config: &DemoConfig,
    path: PathBuf,
) -> IdentityProvisioner<FileTokenStore, SystemClock> {
    IdentityProvisioner::with_settings(
        FileTokenStore::new(path),
        SystemClock,
        TokenSettings::from(config),
    )
}

fn show_token(config: &DemoConfig, path: PathBuf) -> Result<()> {
    config.validate()?;
    let token = provisioner(config, path).get_or_create_token();
    println!("{}", serde_json::to_string_pretty(&token)?);
    Ok(())
}

async fn run_demo(
    config: &DemoConfig,
    path: PathBuf,
    call_for: Duration,
    max_registrations: Option<usize>,
) -> Result<()> {
    let network = match max_registrations {
        Some(max) => LoopbackNetwork::with_max_registrations(max),
        None => LoopbackNetwork::new(),
    };
    let ui = HeadlessUi::new(config);
    let provisioner = provisioner(config, path);

    let demo = Demo::start(config, network, &provisioner, ui.handles()).await?;

    info!("{} calling {}", config.alice.display_name, config.bob.display_name);
    demo.alice_controller().click()?;
    timeout(STATE_TIMEOUT, demo.bob_controller().wait_for(ControllerState::OnCall))
        .await
        .context("call was not answered")??;
    println!("{}", serde_json::to_string_pretty(&demo.status())?);

    tokio::time::sleep(call_for).await;

    info!("{} hanging up", config.alice.display_name);
    demo.alice_controller().click()?;
    timeout(STATE_TIMEOUT, demo.bob_controller().wait_for(ControllerState::Idle))
        .await
        .context("hang-up did not reach the other side")??;
    println!("{}", serde_json::to_string_pretty(&demo.status())?);

    demo.shutdown().await;
    Ok(())
}
