//! Main Entrypoint for the Robot Agent
//!
//! Loads configuration, installs logging, connects to the robot and runs the
//! selected front-end until it finishes or Ctrl+C is pressed.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use clap::{Parser, Subcommand};
use rmcp::{ServiceExt, transport::stdio};
use robot_agent::{
    chat::run_chat,
    config::Config,
    voice::{VoiceOptions, run_voice},
};
use robot_agent_core::{
    actuator::Actuator,
    conversation::{ChatSession, ChatSettings},
    dispatch::Dispatcher,
    llm_client::OpenAICompatibleClient,
    mcp::RobotMcpService,
    robot_tools,
};
use robot_client::RobotClient;
use secrecy::ExposeSecret;
use std::{path::PathBuf, sync::Arc};
use tokio::io::BufReader;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "robot-agent", version, about = "Drive a lego robot with a language model")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Type instructions; the model answers and drives the robot.
    Chat,
    /// Talk to the robot through the realtime API.
    Voice {
        /// Raw PCM16 mono 24 kHz file streamed as microphone input.
        #[arg(long)]
        audio_in: Option<PathBuf>,
        /// File the agent's speech is written to, same format.
        #[arg(long)]
        audio_out: Option<PathBuf>,
    },
    /// Serve the robot tools over MCP on stdio.
    Mcp,
    /// Print the devices connected to the robot.
    Devices,
}

/// Resolves on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

async fn run(command: Command, config: &Config, robot: Arc<RobotClient>) -> anyhow::Result<()> {
    let actuator: Arc<dyn Actuator> = robot;
    match command {
        Command::Chat => {
            let api_key = config.chat_api_key()?;
            let openai_config = OpenAIConfig::new()
                .with_api_key(api_key.expose_secret())
                .with_api_base(config.provider.api_base());
            info!(provider = ?config.provider, model = %config.chat_model, "Starting chat");
            let mut session = ChatSession::new(
                Arc::new(OpenAICompatibleClient::new(openai_config)),
                Dispatcher::new(robot_tools::registry(), actuator),
                ChatSettings {
                    model: config.chat_model.clone(),
                    instructions: config.system_prompt.clone(),
                    store: config.chat_store,
                },
            );
            run_chat(
                &mut session,
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
            )
            .await
        }
        Command::Voice {
            audio_in,
            audio_out,
        } => {
            info!(model = %config.realtime_model, voice = %config.realtime_voice, "Starting voice session");
            run_voice(
                config,
                Dispatcher::new(robot_tools::registry(), actuator),
                VoiceOptions {
                    audio_in,
                    audio_out,
                },
                shutdown_signal(),
                tokio::io::stdout(),
            )
            .await
        }
        Command::Mcp => {
            info!("Serving robot tools over MCP stdio");
            let server = RobotMcpService::new(actuator)
                .serve(stdio())
                .await
                .context("Failed to start MCP server")?;
            server.waiting().await?;
            Ok(())
        }
        Command::Devices => {
            let devices = actuator
                .get_devices()
                .await
                .context("Failed to reach the robot")?;
            println!("Connected to robot! Devices: {}", devices.join(", "));
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    // stdout carries the REPL and the MCP protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!("Configuration loaded.");

    // --- 3. Connect to the Robot ---
    let robot = Arc::new(RobotClient::new(config.robot_url())?);

    // --- 4. Run the Selected Front-End ---
    let result = run(cli.command, &config, robot.clone()).await;
    robot.shutdown();
    if let Err(e) = &result {
        error!(error = ?e, "robot-agent failed");
    }
    result
}
