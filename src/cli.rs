//! Lazarillo CLI.
//!
//! `serve` runs the relay; `describe` and `warmup` are one-shot commands for
//! exercising the pipeline from a terminal without the mobile client.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use lazarillo::config::Config;
use lazarillo::describe::DescribeRequest;
use lazarillo::gateway::AppState;
use lazarillo::logging::init_logging;
use lazarillo::prompt::PolicyMode;

#[derive(Parser)]
#[command(name = "lazarillo", version, about = "Assistive-vision description relay")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP relay server.
    Serve {
        /// Override the configured port.
        #[arg(long)]
        port: Option<u16>,
        /// Override the configured bind host.
        #[arg(long)]
        host: Option<String>,
    },
    /// Describe a single image file and print the record as JSON.
    Describe {
        /// Path to the image file (jpeg/png/webp/gif).
        image: PathBuf,
        /// Speed/accuracy policy.
        #[arg(long, value_enum, default_value = "balanced")]
        mode: PolicyMode,
        /// Additional instruction for the model.
        #[arg(long)]
        prompt: Option<String>,
        /// Model name hint.
        #[arg(long)]
        model: Option<String>,
        /// Provider to use (gemini or groq); defaults to the configured one.
        #[arg(long)]
        provider: Option<String>,
    },
    /// Issue a warm-up probe against a provider.
    Warmup {
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_logging(&config.logging.level);

    let cli = Cli::parse();
    let state = Arc::new(AppState::from_config(&config));

    match cli.command {
        Command::Serve { port, host } => {
            let host = host.unwrap_or(config.gateway.host);
            let port = port.unwrap_or(config.gateway.port);
            lazarillo::gateway::serve(state, &host, port).await?;
        }
        Command::Describe {
            image,
            mode,
            prompt,
            model,
            provider,
        } => {
            let bytes = std::fs::read(&image)?;
            let mime_type = mime_for(&image);
            let pipeline = state.pipeline(provider.as_deref())?;
            let record = pipeline
                .describe(DescribeRequest {
                    image: Some(bytes),
                    image_mime_type: Some(mime_type.to_string()),
                    mode,
                    user_instruction: prompt,
                    model,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Warmup { provider, model } => {
            let pipeline = state.pipeline(provider.as_deref())?;
            let report = pipeline.warm_up(model.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_detection() {
        assert_eq!(mime_for(Path::new("scene.png")), "image/png");
        assert_eq!(mime_for(Path::new("scene.WEBP")), "image/webp");
        assert_eq!(mime_for(Path::new("scene.gif")), "image/gif");
        assert_eq!(mime_for(Path::new("scene.jpg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("scene")), "image/jpeg");
    }

    #[test]
    fn test_cli_parses_describe() {
        let cli = Cli::parse_from(["lazarillo", "describe", "scene.jpg", "--mode", "accurate"]);
        match cli.command {
            Command::Describe { image, mode, .. } => {
                assert_eq!(image, PathBuf::from("scene.jpg"));
                assert_eq!(mode, PolicyMode::Accurate);
            }
            _ => panic!("expected describe command"),
        }
    }

    #[test]
    fn test_cli_parses_serve_with_port() {
        let cli = Cli::parse_from(["lazarillo", "serve", "--port", "8080"]);
        match cli.command {
            Command::Serve { port, .. } => assert_eq!(port, Some(8080)),
            _ => panic!("expected serve command"),
        }
    }
}
