use std::{process, sync::Arc};

use tagcache::{
    application::error::AppError,
    cache::{CacheConfig, TagStore},
    config,
    infra::{
        http::{self, AppState},
        server, telemetry,
        upstream::HyperUpstream,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let cache_config = CacheConfig::from(&settings.cache);
    let store = Arc::new(TagStore::new(&cache_config));
    let upstream = Arc::new(HyperUpstream::new(
        &settings.backend,
        settings.server.max_header_bytes,
    )?);

    info!(
        target: "tagcache::startup",
        backend = %settings.backend.url,
        sloppiness = cache_config.sloppiness.ratio(),
        key_order = ?cache_config.key_order,
        group_header = %cache_config.group_header,
        "starting caching proxy"
    );

    let router = http::build_router(AppState::new(store, upstream, cache_config));
    server::serve(&settings.server, router).await?;

    Ok(())
}
