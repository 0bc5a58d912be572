use std::time::Instant;

use photon_client::config::{self, ClientConfig};
use photon_client::{Engine, HttpBackend, PollKind, RoutePhase, TracingSurface};
use tokio::signal;
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ClientConfig::from_env();
    tracing::info!(
        api_url = %config.api_url,
        full_poll_ms = config.intervals.full.as_millis() as u64,
        route_poll_ms = config.intervals.route.as_millis() as u64,
        chart_poll_ms = config.intervals.chart.as_millis() as u64,
        view_mode = ?config.view_mode,
        show_markers = config.show_markers,
        "starting photon client"
    );

    let backend = match HttpBackend::new(&config) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!(error = %e, "failed to build HTTP client");
            return;
        }
    };
    let engine = Engine::new(backend, TracingSurface::default(), &config);

    LocalSet::new()
        .run_until(async move {
            match engine.refresh_registry().await {
                Ok(count) => tracing::info!(links = count, "registry ready"),
                Err(e) => {
                    tracing::warn!(error = %e, "link registry unavailable, relying on telemetry geometry");
                }
            }

            if let Some((start, end)) = config::preset_route() {
                activate_preset(&engine, &start, &end).await;
            }

            engine.run(shutdown_signal()).await;
            tracing::info!(
                links = engine.with_surface(TracingSurface::link_count),
                markers = engine.with_surface(TracingSurface::marker_count),
                "photon client shut down"
            );
        })
        .await;
}

async fn activate_preset(engine: &Engine<HttpBackend, TracingSurface>, start: &str, end: &str) {
    engine.poll(PollKind::Full, Instant::now()).await;
    engine.select_link(start);
    engine.select_link(end);

    if engine.plan_route().await != RoutePhase::Planned {
        tracing::warn!(
            start,
            end,
            reason = engine.plan_message().as_deref().unwrap_or("unknown"),
            "preset route could not be planned"
        );
        return;
    }
    if engine.activate_route().await != RoutePhase::Active {
        tracing::warn!(
            start,
            end,
            reason = engine.plan_message().as_deref().unwrap_or("unknown"),
            "preset route could not be activated"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
