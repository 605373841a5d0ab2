//! The thin HTTP adapter: five routes, each a direct call into
//! [`dialog_core::Engine`]. No business logic lives here - only
//! request/response shape and status-code mapping via [`ApiError`].

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use dialog_core::Engine;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/", get(connect))
        .route("/send", get(send))
        .route("/echo", get(echo))
        .route("/login", get(login))
        .route("/register", get(register))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

#[derive(Serialize)]
struct ConnectResponse {
    msg: Vec<String>,
    token: String,
}

async fn connect(State(engine): State<Arc<Engine>>) -> Result<Json<ConnectResponse>, ApiError> {
    let (msg, token) = engine.connect().await?;
    Ok(Json(ConnectResponse { msg, token }))
}

#[derive(Deserialize)]
struct SendParams {
    msg: String,
    token: String,
}

#[derive(Serialize)]
struct SendResponse {
    msg: Vec<String>,
    exit: bool,
}

async fn send(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<SendParams>,
) -> Result<Json<SendResponse>, ApiError> {
    let (msg, exit) = engine.send(&params.token, &params.msg).await?;
    Ok(Json(SendResponse { msg, exit }))
}

#[derive(Deserialize)]
struct EchoParams {
    seconds: i64,
    token: String,
}

#[derive(Serialize)]
struct EchoResponse {
    msg: Vec<String>,
    exit: bool,
    reset: bool,
}

async fn echo(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<EchoParams>,
) -> Result<Json<EchoResponse>, ApiError> {
    let (msg, exit, reset) = engine.echo(&params.token, params.seconds).await?;
    Ok(Json(EchoResponse { msg, exit, reset }))
}

#[derive(Deserialize)]
struct CredentialParams {
    username: String,
    passwd: String,
    token: String,
}

#[derive(Serialize)]
struct TokenResponse {
    token: Option<String>,
}

async fn login(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<CredentialParams>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = engine.login(&params.token, &params.username, &params.passwd).await?;
    Ok(Json(TokenResponse { token }))
}

async fn register(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<CredentialParams>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = engine
        .register(&params.token, &params.username, &params.passwd)
        .await?;
    Ok(Json(TokenResponse { token }))
}
