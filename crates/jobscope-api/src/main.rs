//! jobscope-api - dashboard server for background-job brokers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobscope_api::{router, AppState};
use jobscope_bull::{BullAdapter, BullSettings};
use jobscope_core::{defaults, BrokerAdapter};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobscope=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let endpoint =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let bind = std::env::var("JOBSCOPE_BIND").unwrap_or_else(|_| "0.0.0.0:4567".to_string());

    let adapter = Arc::new(BullAdapter::new(BullSettings::from_env()));
    if let Err(e) = adapter.connect(&endpoint).await {
        error!(error = %e, %endpoint, "Failed to connect to broker");
        std::process::exit(1);
    }

    // One adapter subscription feeds every SSE consumer through the
    // broadcast channel. The subscription guard must outlive the server.
    let (events_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
    let bridge = events_tx.clone();
    let _subscription = match adapter
        .subscribe(Arc::new(move |event| {
            let _ = bridge.send(event);
        }))
        .await
    {
        Ok(sub) => Some(sub),
        Err(e) => {
            warn!(error = %e, "Event stream unavailable, continuing without live events");
            None
        }
    };

    let state = AppState {
        adapter: adapter.clone() as Arc<dyn BrokerAdapter>,
        events: events_tx,
    };

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, %bind, "Failed to bind");
            std::process::exit(1);
        }
    };
    info!(%bind, %endpoint, "jobscope-api listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error");
    }

    if let Err(e) = adapter.disconnect().await {
        warn!(error = %e, "Disconnect failed during shutdown");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install shutdown handler");
    }
    info!("Shutdown signal received");
}
