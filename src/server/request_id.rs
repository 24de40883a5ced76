//! Request-scoped logging: every request gets a UUID that is logged
//! alongside the method/path and echoed back as `x-request-id`.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::pipeline::AppState;

pub async fn assign_request_id(
    State(_state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    log::info!("request_id={request_id} method={method} path={path} start");
    let mut response = next.run(req).await;
    log::info!(
        "request_id={request_id} method={method} path={path} status={}",
        response.status()
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}
