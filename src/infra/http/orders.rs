use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use serde::Serialize;

use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
    repo_error_to_http,
};
use crate::{
    application::{error::HttpError, orders::OrderService},
    cache::CacheSnapshot,
    infra::db::PostgresRepositories,
};

/// Response header naming where an order was served from.
pub const ORDER_SOURCE_HEADER: HeaderName = HeaderName::from_static("x-order-source");

#[derive(Clone)]
pub struct HttpState {
    pub orders: Arc<OrderService>,
    pub db: Arc<PostgresRepositories>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/orders/{order_uid}", get(get_order))
        .route("/api/cache", get(cache_status))
        .route("/api/cache/ledger", delete(clear_cache_ledger))
        .route("/_health/db", get(db_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn get_order(
    State(state): State<HttpState>,
    Path(order_uid): Path<String>,
) -> Result<Response, HttpError> {
    let lookup = state.orders.find(&order_uid).await?;

    let mut response = Json(lookup.order.as_ref()).into_response();
    response.headers_mut().insert(
        ORDER_SOURCE_HEADER,
        HeaderValue::from_static(lookup.source.as_str()),
    );
    Ok(response)
}

#[derive(Serialize)]
struct CacheStatus {
    #[serde(flatten)]
    snapshot: CacheSnapshot,
    ledger_rows: u64,
}

async fn cache_status(State(state): State<HttpState>) -> Result<Json<CacheStatus>, HttpError> {
    let cache = state.orders.cache();
    let ledger_rows = cache
        .ledger_len()
        .await
        .map_err(|err| repo_error_to_http("infra::http::cache_status", err))?;

    Ok(Json(CacheStatus {
        snapshot: cache.snapshot(),
        ledger_rows,
    }))
}

async fn clear_cache_ledger(State(state): State<HttpState>) -> StatusCode {
    state.orders.cache().finish().await;
    StatusCode::NO_CONTENT
}

async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.db.health_check().await)
}
