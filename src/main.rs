use anyhow::{Context, Result};
use clap::Parser;
use drive_update_source::{Config, ReleaseEntry, UpdateSource, UpdateSourceError};
use std::path::PathBuf;

/// Get the config file path (~/.config/drive-update-source/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("drive-update-source")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "drive-feed",
    about = "Inspect the release feed published in a cloud-drive folder"
)]
struct Args {
    /// Config file (defaults to ~/.config/drive-update-source/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Remote folder ID (overrides config)
    #[arg(long)]
    folder: Option<String>,

    /// Package ID (overrides config)
    #[arg(long)]
    package: Option<String>,

    /// Release channel (defaults to the configured channel)
    #[arg(long)]
    channel: Option<String>,

    /// Only report the newest release above this version
    #[arg(long, value_name = "VERSION")]
    current: Option<semver::Version>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(folder) = args.folder {
        config.folder_path = folder;
    }
    if let Some(package) = args.package {
        config.package_id = package;
    }
    let channel = args.channel.unwrap_or_else(|| config.channel.clone());

    let source = match UpdateSource::from_config(&config) {
        Ok(source) => source,
        Err(UpdateSourceError::InvalidArgument { param }) => {
            eprintln!("Error: `{}` is not configured.", param);
            eprintln!();
            eprintln!("Set it in {} or pass it on the command line.", config_path.display());
            if param == "api_key" {
                eprintln!("The API key can also be supplied via DRIVE_API_KEY.");
            }
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let span = tracing::info_span!("feed", package = %config.package_id, channel = %channel);
    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let result = match &args.current {
        Some(current) => source
            .check_for_update_with_cancel(&span, &channel, current, cancel)
            .await
            .map(|update| update.into_iter().collect::<Vec<_>>()),
        None => {
            source
                .get_release_feed_with_cancel(&span, &channel, cancel)
                .await
        }
    };
    source.dispose();

    let feed = match result {
        Ok(feed) => feed,
        Err(UpdateSourceError::Canceled) => {
            eprintln!("Canceled.");
            std::process::exit(130);
        }
        Err(e @ UpdateSourceError::SourceUnavailable(_)) => {
            tracing::warn!(error = %e, "Release feed unavailable");
            eprintln!("{}", e);
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&feed)?);
    } else if feed.is_empty() {
        match &args.current {
            Some(current) => println!("No release newer than {} on '{}'.", current, channel),
            None => println!("No releases on '{}'.", channel),
        }
    } else {
        print_table(&feed);
    }

    Ok(())
}

fn print_table(feed: &[ReleaseEntry]) {
    println!("{:<20} {:<10} {:>12}  FILE", "VERSION", "CHANNEL", "SIZE");
    for entry in feed {
        println!(
            "{:<20} {:<10} {:>12}  {}",
            entry.version.to_string(),
            entry.channel,
            entry.size_bytes,
            entry.file_name
        );
    }
}
