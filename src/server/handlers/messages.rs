//! `POST /v1/messages`.

use axum::extract::State;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;

use crate::convert::anthropic::MessagesRequest;
use crate::error::{AppError, Protocol};
use crate::pipeline::{anthropic, AppState};

pub async fn messages(
    State(state): State<AppState>,
    Json(request): Json<MessagesRequest>,
) -> Response {
    if !state.config.models.is_empty() && !state.config.models.contains_key(&request.model) {
        return AppError::ModelNotFound(request.model)
            .into_protocol_response(Protocol::Anthropic);
    }

    if request.stream {
        match anthropic::handle_stream(&state, request).await {
            Ok(stream) => {
                let stream = stream.map(|item| item.map_err(axum::Error::new));
                Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
            }
            Err(err) => err.into_protocol_response(Protocol::Anthropic),
        }
    } else {
        match anthropic::handle(&state, request).await {
            Ok(body) => Json(body).into_response(),
            Err(err) => err.into_protocol_response(Protocol::Anthropic),
        }
    }
}
