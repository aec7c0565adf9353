//! # Services Gateway - Main Entry Point
//!
//! Wires the library together for one services-management process:
//!
//! 1. load configuration (`GATEWAY_CONFIG_PATH` YAML file, or defaults plus environment)
//! 2. initialise logging
//! 3. register with the discovery backend; failure here stops the process
//! 4. start the membership watch on the main service (logging only)
//! 5. build the entity cache, gateway client and facades
//! 6. serve `/health` and the secured `/v1/me` route
//! 7. on SIGINT/SIGTERM, or lost liveness under `fail_fast`, stop background tasks and
//!    deregister

use anyhow::Context;
use axum::{middleware::from_fn_with_state, routing::get, Extension, Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use services_gateway::caching::{build_entity_cache, DisabledEntityCache, EntityCache};
use services_gateway::core::config::DiscoveryBackendKind;
use services_gateway::discovery::{ConsulBackend, DiscoveryBackend, ServiceChange, StaticBackend};
use services_gateway::gateway::dto::CurrentUser;
use services_gateway::gateway::UserGatewayImpl;
use services_gateway::middleware::secured;
use services_gateway::observability::init_logging;
use services_gateway::{AppConfig, GatewayClient, ServiceRegistry, UserGateway};

const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().await?;
    init_logging(&config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting services gateway");

    let backend: Arc<dyn DiscoveryBackend> = match config.registry.backend {
        DiscoveryBackendKind::Consul => Arc::new(ConsulBackend::new(&config.registry.consul)?),
        DiscoveryBackendKind::Static => {
            warn!("Using the in-process static registry; peers will not be discovered");
            Arc::new(StaticBackend::new())
        }
    };
    let registry = Arc::new(ServiceRegistry::new(backend, config.registry.clone()));

    let registration = registry
        .register(
            &config.registry.service_name,
            &config.registry.advertise_host,
            config.server.port,
        )
        .await
        .context("service registration failed")?;
    let instance_id = registration.registration().id.clone();

    let watch = registry.watch(&config.gateway.main_service_name, log_membership_change);

    let cache: Arc<dyn EntityCache> = match build_entity_cache(&config.cache).await {
        Ok(cache) => cache,
        Err(e) => {
            warn!(error = %e, "Entity cache unavailable, every lookup will use the network");
            Arc::new(DisabledEntityCache)
        }
    };

    let client = Arc::new(GatewayClient::new(
        config.gateway.main_service_name.clone(),
        Arc::clone(&registry),
        &config.gateway,
    )?);
    let users: Arc<dyn UserGateway> = Arc::new(UserGatewayImpl::new(client, cache));

    let service_name = config.registry.service_name.clone();
    let health_instance = instance_id.clone();
    let app = Router::new()
        .route("/v1/me", get(current_user))
        .route_layer(from_fn_with_state(users, secured))
        .route(
            "/health",
            get(move || async move {
                Json(json!({
                    "status": "ok",
                    "service": service_name,
                    "instance_id": health_instance,
                }))
            }),
        );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(address = %addr, instance_id = %instance_id, "Listening");

    let stop_server = CancellationToken::new();
    let server_stop = stop_server.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_stop.cancelled().await })
            .await
    });

    let mut failure: Option<anyhow::Error> = None;
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        lost = registration.liveness_lost(), if config.registry.fail_fast => {
            error!(error = %lost, "Liveness lost, shutting down");
            failure = Some(anyhow::Error::new(lost));
        }
        result = &mut server => {
            let message = match result {
                Ok(Ok(())) => "server stopped unexpectedly".to_string(),
                Ok(Err(e)) => format!("server failed: {}", e),
                Err(e) => format!("server task failed: {}", e),
            };
            error!(error = %message, "HTTP server ended");
            failure = Some(anyhow::anyhow!(message));
        }
    }

    stop_server.cancel();
    if !server.is_finished() && tokio::time::timeout(SERVER_DRAIN_TIMEOUT, &mut server).await.is_err() {
        warn!("In-flight requests did not finish in time");
        server.abort();
    }

    watch.stop().await;
    registration.deregister().await;
    registry.shutdown();
    info!("Services gateway stopped");

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn load_config() -> anyhow::Result<AppConfig> {
    match std::env::var("GATEWAY_CONFIG_PATH") {
        Ok(path) if !path.is_empty() => AppConfig::load_from_file(&path)
            .await
            .with_context(|| format!("failed to load configuration from {}", path)),
        _ => AppConfig::from_env().context("invalid configuration"),
    }
}

fn log_membership_change(change: ServiceChange) {
    for instance in &change.joined {
        info!(service = %change.service, instance_id = %instance.id, address = %instance.address, port = instance.port, "Instance joined");
    }
    for instance in &change.left {
        info!(service = %change.service, instance_id = %instance.id, "Instance left");
    }
}

async fn current_user(Extension(user): Extension<CurrentUser>) -> Json<CurrentUser> {
    Json(user)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
