//! precache-proxy entry point.
//!
//! Brings the configured generation into service, then serves HTTP/1.1 on
//! `listen_addr`. Logging goes to stderr as JSON.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use precache_client::{ActiveGeneration, FetchClient, FetchConfig, Interceptor, LifecycleController, Origin, RouteTable};
use precache_core::request::resolve;
use precache_core::{AppConfig, CacheDb, VersionStore};

mod error;
mod proxy;

use proxy::Proxy;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let origin = config.origin_url()?;
    let listen_addr: SocketAddr = config.listen_addr.parse().context("invalid listen_addr")?;

    tracing::info!(
        generation = %config.generation,
        origin = %origin,
        upstream = %config.upstream,
        db_path = %config.db_path.display(),
        "starting precache proxy"
    );

    let store: Arc<dyn VersionStore> = Arc::new(CacheDb::open(&config.db_path).await?);
    let fetch: Arc<dyn Origin> = Arc::new(FetchClient::new(FetchConfig::from_app(&config)?)?);
    let active = Arc::new(ActiveGeneration::new());

    let lifecycle = LifecycleController::new(
        store.clone(),
        fetch.clone(),
        active.clone(),
        origin.clone(),
        config.precache_manifest.clone(),
    );
    let report = lifecycle
        .deploy(&config.generation, config.skip_waiting)
        .await
        .with_context(|| format!("failed to deploy generation {}", config.generation))?;
    tracing::info!(
        generation = %report.generation,
        previous = ?report.previous,
        purged = ?report.purged,
        restored = report.restored,
        "generation active"
    );

    let routes = RouteTable::new(&origin, config.live_prefixes.iter().cloned(), config.precache_manifest.iter().cloned());
    let root_document = resolve(&origin, &config.root_document)?;
    let interceptor = Interceptor::new(store, fetch, active, routes, root_document);
    let proxy = Arc::new(Proxy::new(interceptor, origin, config.max_bytes));

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    let proxy = proxy.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |request: Request<Incoming>| {
                            let proxy = proxy.clone();
                            async move { proxy.serve(request).await }
                        });
                        if let Err(e) = http1::Builder::new().serve_connection(TokioIo::new(socket), service).await {
                            tracing::debug!(%peer, error = %e, "connection closed with error");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "failed to accept connection"),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl-C, shutting down");
                break;
            }
        }
    }

    Ok(())
}
