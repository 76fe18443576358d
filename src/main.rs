use anyhow::{bail, Context};
use avatar_outfitter::config::{load_settings, ViewerSettings};
use avatar_outfitter::utils::logging::{init_logging, log_system_info};
use avatar_outfitter::{
    AvatarPhase, ClothingCatalog, CompositionEngine, EngineOptions, GltfSceneLoader, APP_NAME, VERSION,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

/// Settings from the path given on the command line, else the per-user
/// config file, else defaults
fn resolve_settings() -> anyhow::Result<ViewerSettings> {
    match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => ViewerSettings::from_file(&path)
            .with_context(|| format!("reading settings from {}", path.display())),
        None => Ok(load_settings().unwrap_or_default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = resolve_settings()?;
    init_logging(&settings.logging).context("initializing logging")?;
    info!("Starting {} v{}", APP_NAME, VERSION);
    log_system_info();

    let catalog = match &settings.catalog.path {
        Some(path) => ClothingCatalog::load(path)
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => ClothingCatalog::builtin(),
    };

    let loader = Arc::new(GltfSceneLoader::new(settings.loader.asset_root.clone()));
    let mut engine = CompositionEngine::new(
        Arc::new(catalog),
        loader,
        Handle::current(),
        EngineOptions::from_settings(&settings),
    );

    engine.start();
    for (category, item_id) in &settings.startup {
        if let Err(e) = engine.select(*category, item_id) {
            warn!("Skipping startup selection: {}", e);
        }
    }
    engine.settle().await;

    for event in engine.drain_events() {
        match event.error() {
            Some(err) => error!("{}", err),
            None => info!("{:?}", event.kind),
        }
    }

    if engine.avatar_state() != AvatarPhase::Loaded {
        match engine.avatar_error() {
            Some(err) => bail!(err),
            None => bail!("avatar did not load"),
        }
    }

    let outfit: Vec<_> = engine
        .selection()
        .summary(engine.catalog())
        .into_iter()
        .map(|(category, name)| {
            json!({
                "category": category.display_name(),
                "item": name,
                "state": engine.load_state(category).to_string(),
            })
        })
        .collect();
    let meshes: Vec<_> = engine
        .render_items()?
        .into_iter()
        .map(|item| {
            json!({
                "name": item.name,
                "color": item.color.to_hex(),
                "translation": item.world.w_axis.truncate().to_array(),
            })
        })
        .collect();

    let report = json!({
        "outfit": outfit,
        "visible_meshes": meshes,
        "cache": {
            "loads_started": engine.cache_stats().loads_started,
            "hits": engine.cache_stats().hits,
            "failures": engine.cache_stats().failures,
        },
    });
    info!("Composed outfit:\n{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
