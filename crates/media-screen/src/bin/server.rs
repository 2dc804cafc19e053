//! Screening server binary
//!
//! Run with: cargo run -p media-screen --bin media-screen-server -- --config screen.toml

use clap::Parser;
use media_screen::{config::ScreenConfig, server::ScreenServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "media-screen-server")]
#[command(about = "Transcribe uploaded audio and flag disallowed terms", long_about = None)]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "MEDIA_SCREEN_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_screen=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                      Media Screen                         ║
║        Transcription with Disallowed-Term Timings         ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    // Load configuration
    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            ScreenConfig::from_file(path)?
        }
        None => ScreenConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Engine: {} (model {}, device {})", config.engine.command, config.engine.model, config.engine.device);
    tracing::info!("  - Converter: {}", config.converter.ffmpeg_path);
    tracing::info!("  - Deadline: {}s", config.processing.deadline_secs);
    tracing::info!("  - Retention: {}s", config.processing.retention_secs);
    tracing::info!("  - Max upload: {} bytes", config.server.max_upload_size);
    tracing::info!("  - Allowed origins: {:?}", config.server.allowed_origins);

    // Create and start server
    let server = ScreenServer::new(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/analyze     - Upload media for screening");
    println!("  GET  /api/status/:id  - Poll job status");
    println!("  GET  /api/stats       - Job statistics");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
