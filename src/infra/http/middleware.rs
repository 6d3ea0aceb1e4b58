use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::orders::ORDER_SOURCE_HEADER;
use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const ORDERS_PATH_PREFIX: &str = "/api/orders/";
const METRIC_ORDER_LOOKUP: &str = "ordercache_http_order_lookup_total";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Attach a request id, reusing a well-formed `x-request-id` sent by the caller.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .unwrap_or_else(Uuid::new_v4)
        .to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Outcome label of an order lookup, `None` for any other route.
fn order_lookup_outcome(path: &str, response: &Response) -> Option<&'static str> {
    let order_uid = path.strip_prefix(ORDERS_PATH_PREFIX)?;
    if order_uid.is_empty() {
        return None;
    }

    let status = response.status();
    if status.is_success() {
        let source = response
            .headers()
            .get(&ORDER_SOURCE_HEADER)
            .and_then(|value| value.to_str().ok());
        return Some(match source {
            Some("cache") => "cache",
            Some("store") => "store",
            _ => "unknown",
        });
    }
    if status.as_u16() == 404 {
        return Some("not_found");
    }
    Some("error")
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if let Some(outcome) = order_lookup_outcome(uri.path(), &response) {
        counter!(METRIC_ORDER_LOOKUP, "outcome" => outcome).increment(1);
        debug!(
            target = "ordercache::http::orders",
            order_uid = uri.path().trim_start_matches(ORDERS_PATH_PREFIX),
            outcome,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            request_id = request_id,
            "order lookup served",
        );
    }

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "ordercache::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "ordercache::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}
