use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use beamsaw::solver::Optimizer;
use beamsaw::types::{OptimizeConfig, PartRequest, PlacementResult, Strategy};
use beamsaw::MaterialCatalog;
use serde::{Deserialize, Serialize};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Deserialize, Serialize)]
struct OptimizeRequest {
    catalog: MaterialCatalog,
    parts: Vec<PartRequest>,
    #[serde(default)]
    upgrade_sequence: Vec<String>,
    #[serde(default)]
    kerf: Option<f64>,
    #[serde(default)]
    strategy: Option<Strategy>,
    #[serde(default = "default_true")]
    global_offcuts: bool,
}

fn default_true() -> bool {
    true
}

async fn optimize(
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<PlacementResult>, (StatusCode, String)> {
    tracing::info!(
        parts = req.parts.len(),
        cores = req.catalog.cores.len(),
        "POST /optimize"
    );

    let defaults = OptimizeConfig::default();
    let config = OptimizeConfig {
        kerf: req.kerf.unwrap_or(defaults.kerf),
        upgrade_sequence: req.upgrade_sequence,
        strategy: req.strategy.unwrap_or(defaults.strategy),
        global_offcuts: req.global_offcuts,
        ..defaults
    };
    let optimizer = Optimizer::new(req.catalog, config);
    let parts = req.parts;

    // CPU-bound; keep it off the async workers
    let result = tokio::task::spawn_blocking(move || optimizer.optimize(&parts))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    Ok(Json(result))
}

fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[tokio::main]
async fn main() {
    let _sentry = init_sentry();

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("development.log")
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to open development.log: {e}");
            std::process::exit(1);
        });

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");

    let app = Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/optimize", post(optimize))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error: cannot bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    eprintln!("Listening on {addr}");
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
