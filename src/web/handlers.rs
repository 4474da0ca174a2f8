//! Request handlers. Each one validates at the boundary and delegates to a
//! service.

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::AppState;
use crate::errors::{AppError, AppResult};
use crate::models::{
    ConvertRequest, ConvertResponse, DownloadDescriptor, Format, FormatsResponse, HealthResponse,
    UploadResponse, UploadSession,
};
use crate::services::IncomingFile;

const UPLOAD_FIELDS: [&str; 2] = ["files[]", "files"];

/// `POST /api/upload`
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| {
            AppError::invalid_input(format!("Invalid multipart body: {}", e.body_text()))
        })?
    {
        let is_upload = field
            .name()
            .is_some_and(|name| UPLOAD_FIELDS.contains(&name));
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if !is_upload {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }

        let data = field.bytes().await.map_err(|e| {
            AppError::invalid_input(format!("Failed to read '{file_name}': {}", e.body_text()))
        })?;
        files.push(IncomingFile { file_name, data });
    }

    Ok(Json(state.uploads.ingest(&files).await?))
}

/// `POST /api/convert`
pub async fn convert(
    State(state): State<AppState>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> AppResult<Json<ConvertResponse>> {
    let Json(request) =
        payload.map_err(|rejection| AppError::invalid_input(rejection.body_text()))?;

    let session: UploadSession = state
        .codec
        .resolve(&request.token)
        .ok_or(AppError::InvalidSession)?;

    let ticket = state.conversion.convert(&session, &request.output_ext).await?;

    Ok(Json(ConvertResponse {
        download_url: format!("/api/download/{}", ticket.token),
        file_name: ticket.file_name,
    }))
}

/// `GET /api/download/{token}`
pub async fn download(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Response> {
    let descriptor: DownloadDescriptor = state
        .codec
        .resolve(&token)
        .ok_or_else(|| AppError::not_found("download"))?;

    if !state.output_area.contains(&descriptor.file).await {
        debug!("Download target {} is gone", descriptor.file.display());
        return Err(AppError::not_found("download"));
    }

    let file = tokio::fs::File::open(&descriptor.file)
        .await
        .map_err(|_| AppError::not_found("download"))?;
    let length = file.metadata().await.ok().map(|metadata| metadata.len());

    let content_type = Format::from_file_name(&descriptor.name)
        .map(|format| format.mime_type())
        .unwrap_or("application/octet-stream");
    let disposition = HeaderValue::from_str(&content_disposition(&descriptor.name))
        .map_err(|e| AppError::internal(format!("invalid Content-Disposition: {e}")))?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CACHE_CONTROL, "no-store");
    if let Some(length) = length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::internal(format!("failed to build download response: {e}")))
}

/// `GET /api/formats`
pub async fn formats(State(state): State<AppState>) -> Json<FormatsResponse> {
    Json(FormatsResponse {
        formats: state.registry.formats().clone(),
    })
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pending_cleanups: state.cleanup.pending(),
    })
}

/// `attachment` disposition with an ASCII fallback name and the exact UTF-8
/// name in `filename*` (RFC 5987).
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
    }

    #[test]
    fn test_content_disposition_escapes_unsafe_names() {
        let value = content_disposition("résumé \"final\".pdf");
        assert!(value.starts_with("attachment; filename=\"r_sum_ _final_.pdf\""));
        assert!(value.ends_with("filename*=UTF-8''r%C3%A9sum%C3%A9%20%22final%22.pdf"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}
