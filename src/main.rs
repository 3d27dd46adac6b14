mod config;
mod db;
mod error;
mod frames;
mod pipeline;
mod recognition;
mod registry;
mod report;
mod types;
mod validate;

use anyhow::{Context, Result};
use config::Config;
use db::PlateStore;
use env_logger::Env;
use log::{error, info, warn};
use pipeline::Pipeline;
use recognition::RecognitionClient;
use registry::RegistryClient;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("Starting plate-audit");

    if let Err(e) = run().await {
        error!("Plate audit failed: {:#}", e);
        std::process::exit(1);
    }
    info!("Exiting main");
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;
    info!("Using {:?}", config);

    let store = Arc::new(
        PlateStore::open(&config.db_path, config.reset_db)
            .with_context(|| format!("unable to open plate store {:?}", config.db_path))?,
    );
    let frames = frames::load_frames(&config.frames_dir)
        .with_context(|| format!("unable to read frames from {:?}", config.frames_dir))?;

    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("unable to build HTTP client")?;
    let recognizer = RecognitionClient::new(client.clone(), &config);
    let registry = RegistryClient::new(client, config.registry_url.clone());
    let pipeline = Pipeline::new(recognizer, registry, store.clone(), config.workers);

    let cancel = pipeline.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing frames in flight");
            cancel.cancel();
        }
    });

    let report = pipeline.run(frames).await;
    println!("{}", report);
    info!("Plate store now holds {} plates", store.count()?);
    Ok(())
}
