use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelforge::cli::{Cli, Commands};
use reelforge::providers::GenerationOptions;
use reelforge::{
    output, placeholder, utils, Config, FallbackExecutor, FallbackRequest, GenerationRequest,
    ProviderRegistry, StatusReporter,
};

#[tokio::main]
async fn main() -> Result<()> {
    // API keys may live in a .env file next to the working directory
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);
    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Failed to load .env file: {}", e),
    }

    match cli.command {
        Commands::Generate {
            category,
            prompt,
            output: output_path,
            max_attempts,
            timeout,
            verbatim,
            voice,
            aspect_ratio,
            max_tokens,
            placeholder: use_placeholder,
        } => {
            let config = Config::load(cli.config.as_deref())?;
            let registry = build_registry(&config)?;
            let executor = FallbackExecutor::new(registry);

            if use_placeholder {
                // Check for ffmpeg early (non-fatal, only placeholder images and audio need it)
                let missing_deps = utils::check_dependencies().await;
                for dep in missing_deps {
                    tracing::warn!("Missing dependency: {}", dep);
                }
            }

            let payload = GenerationRequest::new(prompt.clone()).with_options(GenerationOptions {
                max_tokens,
                voice,
                aspect_ratio,
                verbatim,
                ..Default::default()
            });
            let mut request = FallbackRequest::new(category, payload);
            if let Some(limit) = max_attempts.and_then(|n| NonZeroUsize::new(n as usize)) {
                request = request.with_max_attempts(limit);
            }
            if let Some(secs) = timeout {
                request = request.with_timeout(Duration::from_secs(secs));
            }

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let progress = spinner(cli.quiet, format!("Generating {}...", category));
            let outcome = executor.execute_with_cancellation(request, &cancel).await;
            progress.finish_and_clear();

            let (artifact, source) = match outcome {
                Ok(result) => {
                    for attempt in &result.failed_attempts {
                        eprintln!("⚠️  {} failed: {}", attempt.provider, attempt.error);
                    }
                    (result.data, result.provider_name)
                }
                Err(e) if use_placeholder && e.is_exhausted() => {
                    tracing::warn!("{}", e);
                    eprintln!("⚠️  {}", e);
                    eprintln!("   Using placeholder {} instead", category);
                    (placeholder::create(category, &prompt).await?, "placeholder".to_string())
                }
                Err(e) => return Err(e.into()),
            };

            let written = output::deliver(
                &artifact,
                output_path.as_deref(),
                &config.output.dir,
                category,
                &prompt,
            )?;
            if let Some(path) = written {
                println!(
                    "{} saved to: {} ({}, via {})",
                    category,
                    path.display(),
                    utils::format_file_size(artifact.len() as u64),
                    source
                );
            } else {
                eprintln!("Generated with {}", source);
            }
        }
        Commands::Status { format } => {
            let config = Config::load(cli.config.as_deref())?;
            let reporter = StatusReporter::new(build_registry(&config)?);

            let progress = spinner(cli.quiet, "Probing providers...".to_string());
            let report = reporter.get_status().await;
            progress.finish_and_clear();

            output::print_status(&report, &format)?;
        }
        Commands::Providers => {
            let config = Config::load(cli.config.as_deref())?;
            let registry = build_registry(&config)?;

            for category in reelforge::Category::ALL {
                println!("{} providers (tried in this order):", category);
                let providers = registry.list_providers(category);
                if providers.is_empty() {
                    println!("  (none registered)");
                }
                for provider in providers {
                    let state = if provider.is_configured() {
                        "configured"
                    } else {
                        "missing credentials"
                    };
                    println!("  {}. {} [{}]", provider.priority(), provider.name(), state);
                }
            }
        }
        Commands::Config { show, init } => {
            if init {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::config_path()?,
                };
                write_default_config(&path)?;
                println!("Default configuration written to: {}", path.display());
            } else {
                let config = Config::load(cli.config.as_deref())?;
                if show {
                    config.display();
                } else {
                    println!("Configuration file:");
                    match cli.config {
                        Some(path) => println!("  {}", path.display()),
                        None => println!("  {}", Config::config_path()?.display()),
                    }
                    println!("Use --show to print it or --init to reset it to defaults.");
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose { "reelforge=debug" } else { "reelforge=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn build_registry(config: &Config) -> Result<Arc<ProviderRegistry>> {
    let client = config.http.build_client()?;
    let registry =
        ProviderRegistry::from_config(config, &client).context("Invalid provider configuration")?;
    Ok(Arc::new(registry))
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        tracing::info!("Overwriting existing configuration at {}", path.display());
    }
    Config::default().save(path)
}

fn spinner(quiet: bool, message: String) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let progress = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        progress.set_style(style);
    }
    progress.set_message(message);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}
