use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agents::execute_query_pipeline;
use crate::models::{AppState, QueryResponse};

pub fn router(state: AppState) -> Router {
    let limit = state.config.server.max_upload_bytes;
    Router::new()
        .route("/api/query", post(post_query))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

struct QueryForm {
    filename: String,
    data: Bytes,
    question: String,
}

async fn read_form(mut multipart: Multipart) -> Result<QueryForm, String> {
    let mut upload: Option<(String, Bytes)> = None;
    let mut question = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Could not read upload: {}", e))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| format!("Could not read upload: {}", e))?;
                upload = Some((filename, data));
            }
            Some("question") => {
                question = field
                    .text()
                    .await
                    .map_err(|e| format!("Could not read question: {}", e))?;
            }
            _ => {}
        }
    }

    let (filename, data) = upload.ok_or_else(|| "No database file was uploaded".to_string())?;
    Ok(QueryForm {
        filename,
        data,
        question,
    })
}

async fn post_query(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> (StatusCode, Json<QueryResponse>) {
    let form = match multipart {
        Ok(multipart) => read_form(multipart).await,
        Err(rejection) => Err(rejection.body_text()),
    };

    let form = match form {
        Ok(form) => form,
        Err(message) => {
            warn!(error = %message, "Rejected query request");
            let response = QueryResponse::setup_error(message);
            return (response.status_code(), Json(response));
        }
    };

    let request_id = Uuid::new_v4();
    info!(
        %request_id,
        filename = %form.filename,
        size = form.data.len(),
        question_len = form.question.len(),
        "Received query request"
    );

    let outcome = execute_query_pipeline(
        &form.filename,
        &form.data,
        &form.question,
        &state.config,
        state.connector.as_ref(),
    )
    .instrument(info_span!("query", %request_id))
    .await;

    let response = QueryResponse::from(outcome);
    (response.status_code(), Json(response))
}
