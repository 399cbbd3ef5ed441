mod cli;
mod tutor_client;

use std::io;
use std::process::ExitCode;

use clap::Parser;
use dotenv::dotenv;
use eyre::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::cli::chat::conversation_state::TutorConfig;
use crate::cli::chat::ChatContext;
use crate::tutor_client::DEFAULT_MODEL;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input to send to the tutor (one-shot mode)
    #[arg(short, long)]
    input: Option<String>,

    /// Model identifier to request
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Thinking budget forwarded to the model, opaque to this client
    #[arg(short, long, default_value_t = 32768)]
    thinking_budget: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("Starting Socratica CLI");

    let interactive = cli.input.is_none();
    let mut chat_context = ChatContext::new(
        Box::new(io::stdout()),
        cli.input,
        interactive,
        cli.model,
        TutorConfig {
            thinking_budget: cli.thinking_budget,
        },
    );
    chat_context.run().await
}
