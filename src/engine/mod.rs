mod upload;

use crate::error::{ScanError, GENERIC_FAILURE};
use crate::intake::FileHandle;
use crate::interpret::interpret;
use crate::model::{ClientConfig, ErrorResponse, PredictResponse, Prediction, ScanEvent};
use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use tokio::sync::mpsc;

/// Submits scans to the backend's predict endpoint.
#[derive(Clone)]
pub struct UploadEngine {
    http: reqwest::Client,
    predict_url: Url,
}

impl UploadEngine {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        let predict_url = Url::parse(&cfg.predict_url())
            .with_context(|| format!("invalid server URL: {}", cfg.server_url))?;
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .context("build http client")?;
        Ok(Self { http, predict_url })
    }

    pub fn predict_url(&self) -> &Url {
        &self.predict_url
    }

    /// Run one attempt: read the file, submit it, and interpret the response.
    ///
    /// Progress is reported through `event_tx` tagged with `generation`. The
    /// terminal outcome is returned rather than sent so the caller decides how
    /// to publish it.
    pub async fn run(
        &self,
        generation: u64,
        file: &FileHandle,
        event_tx: mpsc::UnboundedSender<ScanEvent>,
    ) -> Result<Prediction, ScanError> {
        let data = tokio::fs::read(&file.path).await.map_err(|e| {
            tracing::warn!(file = %file.path.display(), error = %e, "failed to read scan");
            ScanError::validation(format!("Could not read {}: {}", file.name, e))
        })?;
        let raw = self
            .submit(generation, file, Bytes::from(data), event_tx)
            .await?;
        interpret(&raw)
    }

    async fn submit(
        &self,
        generation: u64,
        file: &FileHandle,
        data: Bytes,
        event_tx: mpsc::UnboundedSender<ScanEvent>,
    ) -> Result<PredictResponse, ScanError> {
        let len = data.len() as u64;
        let body = reqwest::Body::wrap_stream(upload::progress_body_stream(
            data, generation, event_tx,
        ));
        let part = Part::stream_with_length(body, len)
            .file_name(file.name.clone())
            .mime_str(&file.media_type)
            .map_err(|_| ScanError::validation(crate::error::NOT_AN_IMAGE))?;
        let form = Form::new().part("image", part);

        tracing::info!(
            generation,
            file = %file.name,
            bytes = len,
            url = %self.predict_url,
            "submitting scan"
        );

        let resp = match self
            .http
            .post(self.predict_url.clone())
            .multipart(form)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(generation, error = %e, "predict request failed");
                return Err(ScanError::transport(GENERIC_FAILURE));
            }
        };

        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| {
            tracing::warn!(generation, %status, error = %e, "failed to read predict response");
            ScanError::transport(GENERIC_FAILURE)
        })?;

        if !status.is_success() {
            let message = error_message_from_body(&body);
            tracing::warn!(generation, %status, reason = %message, "predict returned error status");
            return Err(ScanError::transport(message));
        }

        tracing::debug!(generation, %status, bytes = body.len(), "predict response received");
        serde_json::from_slice::<PredictResponse>(&body).map_err(|e| {
            tracing::warn!(generation, error = %e, "malformed predict response");
            ScanError::validation("Unexpected response from server")
        })
    }
}

/// Message for a failed request: the backend's `error` field verbatim when
/// present and non-empty, otherwise the generic fallback.
pub fn error_message_from_body(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorResponse>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| GENERIC_FAILURE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::IntakeSource;
    use crate::model::QualityBucket;
    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::io::Write;
    use std::time::Duration;

    fn config(server_url: String) -> ClientConfig {
        ClientConfig {
            server_url,
            completion_hold: Duration::from_millis(0),
            request_timeout: Duration::from_secs(5),
            user_agent: "lungscan-test".into(),
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn scan_file(bytes: usize) -> (tempfile::NamedTempFile, FileHandle) {
        let mut f = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        f.write_all(&vec![1u8; bytes]).unwrap();
        let handle = FileHandle::from_path(f.path(), IntakeSource::Picker);
        (f, handle)
    }

    /// Answers with a classification only for a non-empty PNG in the `image` field.
    async fn predict_checking_field(
        mut multipart: Multipart,
    ) -> (StatusCode, Json<serde_json::Value>) {
        while let Ok(Some(field)) = multipart.next_field().await {
            if field.name() == Some("image") {
                let ct = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.unwrap_or_default();
                if bytes.is_empty() || ct.as_deref() != Some("image/png") {
                    break;
                }
                return (
                    StatusCode::OK,
                    Json(serde_json::json!({
                        "predicted_class_name": "lung_aca",
                        "scores": [0.75, 0.10, 0.15],
                    })),
                );
            }
        }
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "no image field" })),
        )
    }

    #[tokio::test]
    async fn successful_upload_is_interpreted() {
        let base = serve(Router::new().route("/predict", post(predict_checking_field))).await;
        let engine = UploadEngine::new(&config(base)).unwrap();
        let (_f, handle) = scan_file(200_000);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let p = engine.run(9, &handle, tx).await.unwrap();
        assert_eq!(p.display_name, "Adenocarcinoma");
        assert_eq!(p.quality_bucket, QualityBucket::Good);
        assert!(!p.is_normal);

        let mut seen = Vec::new();
        while let Ok(ScanEvent::Progress {
            generation,
            percent,
        }) = rx.try_recv()
        {
            assert_eq!(generation, 9);
            seen.push(percent);
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
        assert_eq!(seen.last(), Some(&100));
    }

    #[tokio::test]
    async fn server_error_message_is_used_verbatim() {
        let app = Router::new().route(
            "/predict",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "model unavailable" })),
                )
            }),
        );
        let base = serve(app).await;
        let engine = UploadEngine::new(&config(base)).unwrap();
        let (_f, handle) = scan_file(10);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = engine.run(1, &handle, tx).await.unwrap_err();
        assert_eq!(err, ScanError::transport("model unavailable"));
    }

    #[tokio::test]
    async fn error_status_without_body_uses_fallback() {
        let app = Router::new().route("/predict", post(|| async { StatusCode::BAD_GATEWAY }));
        let base = serve(app).await;
        let engine = UploadEngine::new(&config(base)).unwrap();
        let (_f, handle) = scan_file(10);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = engine.run(1, &handle, tx).await.unwrap_err();
        assert_eq!(err, ScanError::transport("Analysis failed"));
    }

    #[tokio::test]
    async fn wrong_score_count_is_validation_error() {
        let app = Router::new().route(
            "/predict",
            post(|| async {
                Json(serde_json::json!({
                    "predicted_class_name": "lung_n",
                    "scores": [0.5, 0.5],
                }))
            }),
        );
        let base = serve(app).await;
        let engine = UploadEngine::new(&config(base)).unwrap();
        let (_f, handle) = scan_file(10);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = engine.run(1, &handle, tx).await.unwrap_err();
        assert!(matches!(err, ScanError::Validation(_)), "{err:?}");
    }

    #[tokio::test]
    async fn non_json_success_body_is_validation_error() {
        let app = Router::new().route("/predict", post(|| async { "ok" }));
        let base = serve(app).await;
        let engine = UploadEngine::new(&config(base)).unwrap();
        let (_f, handle) = scan_file(10);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = engine.run(1, &handle, tx).await.unwrap_err();
        assert_eq!(err, ScanError::validation("Unexpected response from server"));
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let engine = UploadEngine::new(&config(format!("http://{addr}"))).unwrap();
        let (_f, handle) = scan_file(10);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = engine.run(1, &handle, tx).await.unwrap_err();
        assert_eq!(err, ScanError::transport("Analysis failed"));
    }

    #[test]
    fn invalid_server_url_is_rejected() {
        assert!(UploadEngine::new(&config("not a url".into())).is_err());
    }

    #[test]
    fn error_body_parsing() {
        assert_eq!(error_message_from_body(br#"{"error":"bad scan"}"#), "bad scan");
        assert_eq!(error_message_from_body(br#"{"error":""}"#), "Analysis failed");
        assert_eq!(error_message_from_body(br#"{"detail":"x"}"#), "Analysis failed");
        assert_eq!(error_message_from_body(b"<html>"), "Analysis failed");
    }
}
