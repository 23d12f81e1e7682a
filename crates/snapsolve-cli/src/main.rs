//! SnapSolve CLI
//!
//! Serves the tutoring API, or analyzes a single homework image and prints
//! the walkthrough.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use snapsolve_tutor::{
    create_router, AnalysisResult, AppState, Config, GeminiClient, ImageSource, Phase,
    SessionController,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// SnapSolve - Homework Tutor
///
/// Photograph a homework problem and get a step-by-step solution, a short
/// explanation of the concept, and practice questions.
#[derive(Parser, Debug)]
#[command(name = "snapsolve")]
#[command(version, about, long_about = None)]
struct Args {
    /// Image to analyze once; without it the HTTP API is served
    #[arg(value_name = "IMAGE")]
    image: Option<PathBuf>,

    /// Path to configuration file (default: snapsolve.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Interface for the HTTP API server
    #[arg(long)]
    host: Option<String>,

    /// Port for the HTTP API server
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the result as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, image = ?args.image, "Arguments parsed");

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(ref host) = args.host {
        config.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;

    let analyzer = Arc::new(GeminiClient::from_config(&config)?);

    match args.image {
        Some(path) => analyze_once(&config, analyzer, path, args.json).await,
        None => {
            serve(config, analyzer).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Runs the HTTP API until Ctrl+C.
async fn serve(config: Config, analyzer: Arc<GeminiClient>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| {
            anyhow::anyhow!(
                "Invalid listen address '{}:{}': {e}\n\nSuggestion: Use an IP address for --host",
                config.host,
                config.port
            )
        })?;

    print_config(&config);

    let router = create_router(AppState::new(config, analyzer));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    tracing::info!("Received Ctrl+C, shutting down");
}

/// Submits one image through a fresh session and prints the outcome.
async fn analyze_once(
    config: &Config,
    analyzer: Arc<GeminiClient>,
    path: PathBuf,
    json: bool,
) -> anyhow::Result<ExitCode> {
    tracing::info!(image = %path.display(), model = analyzer.model(), "Analyzing image");

    let controller = SessionController::new(analyzer, config.max_image_bytes);
    let submission = controller.submit(ImageSource::File(path)).await?;
    submission.handle.await?;

    let session = controller.snapshot().await;
    match session.phase() {
        Phase::Success(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(result)?);
            } else {
                print!("{}", render_result(result));
            }
            Ok(ExitCode::SUCCESS)
        }
        Phase::Error { message } => {
            eprintln!("{message}");
            Ok(ExitCode::from(1))
        }
        Phase::Home | Phase::Analyzing => {
            anyhow::bail!("Analysis ended in unexpected phase '{}'", session.kind())
        }
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Model: {}", config.model);
    println!("  API base URL: {}", config.api_base_url);
    println!("  API key variable: {}", config.api_key_env);
    println!("  Request timeout: {}s", config.request_timeout);
    println!("  Max image size: {} bytes", config.max_image_bytes);
}

/// Formats a tutoring result for the terminal.
fn render_result(result: &AnalysisResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{} {} - {}", result.emoji, result.subject, result.topic);
    let _ = writeln!(out);
    let _ = writeln!(out, "Solution:");
    for (i, step) in result.steps.iter().enumerate() {
        let _ = writeln!(out, "  {}. {step}", i + 1);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Concept:");
    let _ = writeln!(out, "  {}", result.explanation);

    if !result.practice_questions.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Practice:");
        for (i, question) in result.practice_questions.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, question.question);
            if let Some(ref hint) = question.hint {
                let _ = writeln!(out, "     Hint: {hint}");
            }
            let _ = writeln!(out, "     Answer: {}", question.answer);
        }
    }

    out
}
