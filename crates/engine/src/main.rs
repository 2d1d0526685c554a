//! Delve Engine - Main entry point.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use delve_engine::infrastructure::settings::EngineSettings;
use delve_engine::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local overrides live in a repo-root .env; absence is fine.
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "delve_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Delve Engine");

    let settings = EngineSettings::from_env();
    let app = App::in_memory(settings);

    // Mirror the realtime feed into the log until a transport attaches.
    let mut feed = app.subscribe();
    tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::debug!(%json, "engine event"),
                    Err(e) => tracing::warn!("unserializable engine event: {e}"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event feed lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let workers = app.scheduler.start();
    tracing::info!("Engine ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    app.scheduler.shutdown();
    for worker in workers {
        let _ = worker.await;
    }
    Ok(())
}
