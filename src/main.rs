//! md2article - watch a markdown tree and turn drafts into publishable articles.

mod classify;
mod cli;
mod config;
mod front_matter;
mod logger;
mod markdown;
mod pipeline;
mod publish;
mod scan;
mod upload;
mod utils;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use classify::UrlClassifier;
use cli::{Cli, Commands};
use config::ArticleConfig;
use front_matter::{
    FrontMatterGenerator,
    clock::SequenceClock,
    tagger::{DifyTagger, Tagger},
};
use markdown::MarkdownTransformer;
use pipeline::{DocumentStore, FsStore, Pipeline};
use publish::Publisher;
use std::{path::Path, sync::Arc, time::Duration};
use upload::HttpUploader;
use utils::{http::HttpFetcher, retry::RetryPolicy};
use watch::{InFlightRegistry, WatchCoordinator};

/// First backoff delay between upload or tagger attempts.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::set_verbose(cli.verbose);

    let config: &'static ArticleConfig = Box::leak(Box::new(load_config(&cli)?));
    let pipeline = Arc::new(build_pipeline(config)?);
    let registry = InFlightRegistry::new();

    match cli.command() {
        Commands::Scan => {
            scan::scan_existing(config, &pipeline, &registry);
            Ok(())
        }
        Commands::Watch => {
            if config.watch.scan_on_start {
                scan::scan_existing(config, &pipeline, &registry);
            }
            WatchCoordinator::new(config, pipeline, registry).run()
        }
    }
}

/// Load and validate configuration from CLI arguments
fn load_config(cli: &Cli) -> Result<ArticleConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        ArticleConfig::from_path(&config_path)?
    } else {
        log!("config"; "{} not found, using defaults", config_path.display());
        ArticleConfig::default()
    };
    config.update_with_cli(cli);
    config.validate()?;

    Ok(config)
}

/// Wire the HTTP clients, the clock and the rewriters into one pipeline.
fn build_pipeline(config: &'static ArticleConfig) -> Result<Pipeline> {
    let fetcher =
        Arc::new(HttpFetcher::new(config.upload.timeout()).context("failed to build HTTP client")?);
    let classifier = Arc::new(UrlClassifier::new(
        &config.upload,
        &config.classify,
        fetcher.clone(),
    ));
    debug!(
        "classify";
        "signature table v{}, {} entries",
        classifier.signatures_version(),
        config.classify.signatures.len()
    );
    let uploader = HttpUploader::new(
        &config.upload,
        RetryPolicy::new(config.upload.max_attempts, RETRY_BASE_DELAY),
        classifier.clone(),
        fetcher,
    )?;

    let tagger: Option<Arc<dyn Tagger>> = match &config.tagger.endpoint {
        Some(_) => Some(Arc::new(DifyTagger::new(&config.tagger)?)),
        None => {
            debug!("tagger"; "no endpoint, titles come from file names");
            None
        }
    };
    let clock = Arc::new(SequenceClock::from_now(
        config.front_matter.clock_offset_hours,
        config.front_matter.step_secs,
    ));
    let front_matter = FrontMatterGenerator::new(
        &config.front_matter,
        &config.tagger,
        clock,
        tagger,
        RetryPolicy::new(config.tagger.max_attempts, RETRY_BASE_DELAY),
    );

    let store: Arc<dyn DocumentStore> = Arc::new(FsStore);
    let publisher = if config.publish.enable {
        Some(Publisher::new(&config.publish, store.clone())?)
    } else {
        None
    };

    Ok(Pipeline::new(
        store,
        front_matter,
        MarkdownTransformer::new(&config.rewrite),
        Arc::new(uploader),
        classifier,
        publisher,
    ))
}
