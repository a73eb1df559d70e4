//! Keep-alive HTTP endpoints for the hosting platform.
//!
//! The handlers only see the process start time; they never touch monitor state.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Serialize;
use tokio::{net::TcpListener, task::JoinHandle};

pub struct LivenessState {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl LivenessState {
    pub fn new(started_at: DateTime<Utc>) -> Arc<LivenessState> {
        Arc::new(LivenessState {
            started_at,
            started: Instant::now(),
        })
    }
}

#[derive(Debug, Serialize)]
struct HomeResponse {
    status: &'static str,
    message: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    bot_status: &'static str,
    started_at: DateTime<Utc>,
    uptime_seconds: u64,
    timestamp: DateTime<Utc>,
}

pub fn router(state: Arc<LivenessState>) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

async fn home_handler() -> Json<HomeResponse> {
    Json(HomeResponse {
        status: "running",
        message: "Crypto price bot is alive!",
        timestamp: Utc::now(),
    })
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

async fn stats_handler(State(state): State<Arc<LivenessState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        bot_status: "active",
        started_at: state.started_at,
        uptime_seconds: state.started.elapsed().as_secs(),
        timestamp: Utc::now(),
    })
}

pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Web server listening on http://{}", addr);
    Ok(listener)
}

/// Serves the endpoints on a separate task.
pub fn spawn(listener: TcpListener, state: Arc<LivenessState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(state)).await {
            error!("Web server error: {}", e);
        }
    })
}
