use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use subtitle_queue::{clock, RedisStore, SubtitleService};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use subtitle_server::adapters::{self, HttpCatalogSource};
use subtitle_server::config::ServerConfig;
use subtitle_server::routes::app;
use subtitle_server::state::AppState;
use subtitle_server::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
	dotenv::dotenv().ok();
	let config = ServerConfig::parse();
	init_tracing(&config);
	config.validate().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

	info!(role = ?config.role, redis = %config.queue.redis_url, "🎬 Starting subtitle server");

	let store = Arc::new(RedisStore::connect(&config.queue).await?);
	let client = reqwest::Client::builder().timeout(config.http_timeout).build()?;
	let catalog_source = Arc::new(HttpCatalogSource::new(client.clone(), config.catalog_url.clone()));
	let service = SubtitleService::new(config.queue.clone(), store, clock::system(), catalog_source)?;

	let shutdown = CancellationToken::new();
	let mut tasks = JoinSet::new();

	if config.role.runs_workers() {
		let pool = service.worker_pool(adapters::engines(&config, &client));
		let token = shutdown.clone();
		tasks.spawn(async move {
			if let Err(e) = pool.run(token.clone()).await {
				error!(error = %e, "Worker pool stopped");
				token.cancel();
			}
		});
	}

	if config.role.serves_http() {
		let refresher = service.catalog().spawn_refresher(shutdown.clone());
		tasks.spawn(async move {
			if let Err(e) = refresher.await {
				error!(error = %e, "Catalog refresher panicked");
			}
		});

		let listener = TcpListener::bind(config.bind_addr()).await?;
		info!("🚀 Listening on {}", listener.local_addr()?);
		let router = app(AppState::new(service.clone()));
		let token = shutdown.clone();
		tasks.spawn(async move {
			let served = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
				.with_graceful_shutdown(async move { token.cancelled().await })
				.await;
			if let Err(e) = served {
				error!(error = %e, "HTTP server failed");
			}
		});
	}

	tokio::select! {
		() = wait_for_shutdown_signal() => info!("🛑 Shutdown signal received (SIGTERM/SIGINT)"),
		() = shutdown.cancelled() => info!("🛑 A component stopped, shutting down"),
	}
	shutdown.cancel();

	while let Some(joined) = tasks.join_next().await {
		if let Err(e) = joined {
			error!(error = %e, "Task panicked during shutdown");
		}
	}
	info!("✅ Drained, exiting");
	Ok(())
}

async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!(error = %e, "Failed to listen for Ctrl+C");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
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
		() = ctrl_c => {},
		() = terminate => {},
	}
}
