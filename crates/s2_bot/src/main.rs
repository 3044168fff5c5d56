mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use s2_core::caption::NominatimGeocoder;
use s2_core::catalog::gcs::GcsCatalog;
use s2_core::clock::SystemClock;
use s2_core::composite::ImageCompositor;
use s2_core::config::BotConfig;
use s2_core::grid::{GridSampler, SamplerState, Whitelist};
use s2_core::publish::{DryRunPublisher, HttpPublisher, Publisher};
use s2_core::retry::CancelToken;
use s2_core::scheduler::{Collaborators, Pipeline, PublishScheduler};
use s2_core::selection::AcquisitionSelector;
use tracing::{error, info};

use crate::cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "s2-bot stopped");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<BotConfig> {
    let mut config = match &cli.config {
        Some(path) => BotConfig::from_json_file(path)?,
        None => BotConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn publisher(cli: &Cli, user_agent: &str) -> Result<Box<dyn Publisher>> {
    if !cli.post {
        info!("dry run, pass --post to publish");
        return Ok(Box::new(DryRunPublisher));
    }
    let endpoint =
        std::env::var("PUBLISH_ENDPOINT").context("PUBLISH_ENDPOINT must be configured")?;
    let token = std::env::var("PUBLISH_TOKEN").context("PUBLISH_TOKEN must be configured")?;
    let publisher = HttpPublisher::new(&endpoint, &token, user_agent)
        .context("failed to create publisher")?;
    Ok(Box::new(publisher))
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let service = &config.service;
    let timeout = Duration::from_secs(service.request_timeout_secs);

    let whitelist = Whitelist::load(&config.schedule.whitelist_path)
        .context("grid cell whitelist is required")?;
    info!(cells = whitelist.len(), "loaded whitelist");

    let catalog = GcsCatalog::new(
        &service.bucket,
        &service.catalog_api_base,
        &service.catalog_object_base,
        &service.user_agent,
    )
    .context("failed to create catalog client")?
    .with_request_timeout(timeout);
    let geocoder =
        NominatimGeocoder::with_timeout(&service.geocoder_endpoint, &service.user_agent, timeout)
            .context("failed to create geocoder")?;
    let publisher = publisher(&cli, &service.user_agent)?;
    let clock = SystemClock;

    let seed = cli.seed.unwrap_or_else(rand::random);
    info!(seed, "seeded grid sampler");

    let cancel = CancelToken::new();
    let pipeline = Pipeline {
        selector: AcquisitionSelector::new(config.selection.selector_config(), cancel.clone()),
        compositor: ImageCompositor::new(config.composite.settings()),
        gate: config.quality.gate(),
    };
    let services = Collaborators {
        catalog: &catalog,
        geocoder: &geocoder,
        publisher: publisher.as_ref(),
        clock: &clock,
    };
    let mut settings = config.scheduler_settings();
    settings.pinned_cell = cli.mgrs;

    let mut scheduler = PublishScheduler::new(
        settings,
        GridSampler::new(Arc::new(whitelist)),
        SamplerState::from_user_seed(seed),
        pipeline,
        services,
        cancel,
    );
    let summary = scheduler.run()?;
    info!(
        published = summary.published,
        attempts = summary.attempts,
        "finished"
    );
    Ok(())
}
