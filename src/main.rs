use std::{future::IntoFuture, pin::pin, process, sync::Arc, time::Duration};

use delivery_cache::{
    application::{
        delivery::{CachedDeliveryClient, HttpDeliverySource},
        error::AppError,
        signature,
    },
    cache::{CacheConfig, CacheManager},
    config,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    match command {
        config::Command::Serve(_) => {
            telemetry::init(&settings.logging).map_err(AppError::from)?;
            run_serve(settings).await
        }
        config::Command::Sign(args) => run_sign(&settings, &args).await,
    }
}

async fn run_sign(settings: &config::Settings, args: &config::SignArgs) -> Result<(), AppError> {
    let secret = settings.webhook.secret.as_deref().ok_or_else(|| {
        AppError::from(InfraError::configuration(
            "webhook.secret must be set to sign payloads",
        ))
    })?;
    let body = tokio::fs::read(&args.file)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    println!("{}", signature::sign(secret, &body)?);
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let cache = Arc::new(CacheManager::new(cache_config.clone()));
    let source = HttpDeliverySource::from_settings(&settings.delivery)?;

    if settings.webhook.secret.is_none() {
        warn!("webhook.secret is not set; every webhook will be rejected");
    }
    info!(
        cache_enabled = cache_config.is_enabled(),
        sliding_expiration_secs = cache_config.sliding_expiration().as_secs(),
        preview = source.is_preview(),
        "Delivery cache configured"
    );

    let delivery = CachedDeliveryClient::new(Arc::new(source), Arc::clone(&cache));
    let state = HttpState::new(delivery, settings.webhook.secret.clone());

    // Spawn cache sweeper
    let sweep_handle = cache_config.is_enabled().then(|| {
        let cache = Arc::clone(&cache);
        let period = cache_config.sweep_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                cache.sweep();
            }
        })
    });

    let result = serve_http(&settings, state).await;

    if let Some(handle) = sweep_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(settings.server.addr, err)))?;

    info!(addr = %settings.server.addr, "Listening");

    let stop = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown({
            let stop = Arc::clone(&stop);
            async move { stop.notified().await }
        })
        .into_future();
    let mut server = pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        () = shutdown_signal() => {
            info!("Shutdown requested, draining connections");
            stop.notify_one();
        }
    }

    drain(server, settings.server.graceful_shutdown).await
}

async fn drain<F>(server: F, grace: Duration) -> Result<(), AppError>
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    match tokio::time::timeout(grace, server).await {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(_) => {
            warn!(
                grace_secs = grace.as_secs(),
                "Graceful shutdown timed out, dropping open connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
