use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley::core::config::{Config, Settings};
use parley::ui::chat_loop::run_chat;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "A terminal-based chat interface for model-serving endpoints")]
#[command(long_about = "Parley is a full-screen terminal chat interface that connects to a remote \
model-serving endpoint for real-time conversations. It streams responses as they are \
generated, falls back to a non-streaming request when streaming fails, and keeps a \
browsable record of past exchanges.\n\n\
Environment Variables:\n\
  SERVING_ENDPOINT       Name of the serving endpoint to chat with\n\
  SERVING_BASE_URL       Base URL of the serving workspace\n\
  SERVING_API_KEY        Bearer token for the workspace (optional)\n\
  TELEMETRY_INGEST_URL   Where to post usage telemetry (optional)\n\n\
Controls:\n\
  Type              Enter your message in the input field\n\
  Enter             Send the message\n\
  Up/Down           Scroll through the transcript\n\
  Ctrl+H            Browse saved conversations\n\
  Ctrl+N            Start a new conversation\n\
  Ctrl+C            Quit the application")]
struct Args {
    /// Serving endpoint to chat with (overrides environment and config file)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Base URL of the serving workspace (overrides environment and config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Disable usage telemetry for this session
    #[arg(long)]
    no_telemetry: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let settings = match Settings::resolve(config, args.endpoint, args.base_url, args.no_telemetry)
    {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_chat(settings).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
