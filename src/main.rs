use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use http::Request;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use pixelgate::config::Config;
use pixelgate::{imagesize, pipeline, security};

/// Pixelgate - request interpreter for an image processing gateway
#[derive(Parser, Debug)]
#[command(name = "pixelgate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a request path and query, print the result as JSON
    Resolve {
        /// Path with optional query, e.g. /unsafe/w:300/plain/http://host/a.jpg?q=80
        request: String,

        /// Request header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// Sign a path with the first configured key/salt pair
    Sign {
        /// Path after the access token, e.g. /w:300/plain/http://host/a.jpg
        path: String,
    },

    /// Detect the format and dimensions of an image file
    Probe {
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .map_err(|e| anyhow!("Failed to load configuration: {}", e))?,
        None => Config::default(),
    };
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    pixelgate::logging::init_subscriber(&config.logging)
        .map_err(|e| anyhow!("Failed to initialize logging subsystem: {}", e))?;

    tracing::debug!(
        config_file = ?args.config,
        presets = config.presets.definitions.len(),
        signing_enforced = config.signing.is_enforced(),
        "Configuration loaded"
    );

    match args.command {
        Command::Resolve { request, headers } => resolve(&config, &request, &headers),
        Command::Sign { path } => {
            let signed = security::sign_path(&path, &config.signing)
                .ok_or_else(|| anyhow!("No signing keys configured"))?;
            println!("{}", signed);
            Ok(())
        }
        Command::Probe { file } => {
            let reader = File::open(&file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let meta = imagesize::decode_meta(BufReader::new(reader))
                .with_context(|| format!("Failed to probe {}", file.display()))?;
            let output = serde_json::json!({
                "format": meta.format,
                "width": meta.width,
                "height": meta.height,
                "content_type": meta.image_type().map(|t| t.content_type()),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

fn resolve(config: &Config, request: &str, headers: &[String]) -> anyhow::Result<()> {
    let mut builder = Request::builder().uri(request);
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| anyhow!("Header '{}' is not in 'Name: value' form", header))?;
        builder = builder.header(name.trim(), value.trim());
    }
    let request = builder.body(()).context("Invalid request")?;

    let resolved = match pipeline::resolve(&request, config) {
        Ok(resolved) => resolved,
        Err(e) => bail!("{} (HTTP {})", e, e.to_http_status()),
    };

    let output = serde_json::json!({
        "cache_key": resolved.cache_key(),
        "image_url": &resolved.image_url,
        "content_type": resolved.options.format.map(|f| f.content_type()),
        "options": &resolved.options,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
