//! `POST /v1/chat/completions`.

use axum::extract::State;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;

use crate::convert::openai::ChatCompletionRequest;
use crate::error::{AppError, Protocol};
use crate::pipeline::{openai, AppState};

pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    if !state.config.models.is_empty() && !state.config.models.contains_key(&request.model) {
        return AppError::ModelNotFound(request.model)
            .into_protocol_response(Protocol::OpenAi);
    }

    if request.stream {
        match openai::handle_stream(&state, request).await {
            Ok(stream) => {
                let stream = stream.map(|item| item.map_err(axum::Error::new));
                Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
            }
            Err(err) => err.into_protocol_response(Protocol::OpenAi),
        }
    } else {
        match openai::handle(&state, request).await {
            Ok(body) => Json(body).into_response(),
            Err(err) => err.into_protocol_response(Protocol::OpenAi),
        }
    }
}
