//! HTTP routes.

use std::fmt::Write as _;
use std::io;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures_util::stream;
use serde::Deserialize;
use sfup_core::{PendingDownload, TicketId, TransferError};
use sfup_crypto::TicketKey;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

use crate::error::{ApiError, ApiResult, integrity_check_failed};
use crate::state::AppState;

const RESERVED_MESSAGE: &str = "\nOk, all set up. We sent you an email with instructions!\n";

const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/reserve/{mail}", get(reserve))
        .route("/bash/{id}", get(bash))
        // the engine enforces max_file_size on the decoded body
        .route("/ul/{id}", post(upload).layer(DefaultBodyLimit::disable()))
        .route("/dl/{id}", get(download))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Unparseable ids are indistinguishable from unknown ones.
fn parse_id(raw: &str) -> ApiResult<TicketId> {
    raw.parse()
        .map_err(|_| ApiError::Transfer(TransferError::InvalidOrConsumed))
}

async fn reserve(
    State(state): State<AppState>,
    Path(mail): Path<String>,
    headers: HeaderMap,
) -> ApiResult<&'static str> {
    let base_url = state.base_url(&headers);
    state.engine.reserve(&mail, &base_url).await?;
    Ok(RESERVED_MESSAGE)
}

async fn bash(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<String> {
    let id = parse_id(&id)?;
    Ok(upload_script(&state.base_url(&headers), id))
}

fn upload_script(base_url: &str, id: TicketId) -> String {
    format!("#!/bin/bash\ncurl -qF \"file=@$1\" {base_url}/ul/{id}\n")
}

async fn upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<String> {
    let id = parse_id(&id)?;
    let base_url = state.base_url(&headers);

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::debug!("Malformed multipart body: {}", e);
        ApiError::BadRequest("Malformed multipart body")
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let receipt = state
            .engine
            .upload(id, &filename, Box::pin(field), &base_url)
            .await?;
        return Ok(upload_message(&receipt.download_url));
    }

    Err(ApiError::BadRequest("Missing \"file\" field"))
}

fn upload_message(url: &str) -> String {
    format!(
        "\nUpload done! To download the file, either use a browser:\n\n  {url}\n\n\
         or, from the commandline:\n\n  curl -OJf {url}\n\n\
         The file will be deleted from SFUP after the download.\n\n\
         Please note that if the integrity check fails, the call will return a status\n\
         code of 599.\n\nHave fun!\n"
    )
}

#[derive(Debug, Deserialize)]
struct DownloadParams {
    key: Option<String>,
}

async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DownloadParams>,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let key = params
        .key
        .as_deref()
        .and_then(|key| TicketKey::from_base64url(key).ok())
        .ok_or(ApiError::BadRequest("Missing or malformed key"))?;

    let pending = state.engine.open_download(id, &key).await?;
    let headers = [
        (CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
        (CONTENT_DISPOSITION, content_disposition(pending.filename())),
    ];

    if pending.size() > state.download_buffer_limit {
        tracing::debug!(ticket = %id, size = pending.size(), "Streaming download");
        return Ok((StatusCode::OK, headers, streamed_body(pending)).into_response());
    }

    // buffered so the status can still reflect the digest check
    let mut body = Vec::new();
    let status = match pending.stream_to(&mut body).await {
        Ok(_) => StatusCode::OK,
        Err(TransferError::IntegrityMismatch { bytes }) => {
            tracing::warn!(ticket = %id, bytes, "Delivering body that failed its integrity check");
            integrity_check_failed()
        }
        Err(e) => return Err(e.into()),
    };

    Ok((status, headers, body).into_response())
}

/// Body for downloads too large to buffer.
///
/// The status is already sent when the digest is known, so a failed check
/// ends the body with an error and the connection is cut before the final
/// chunk.
fn streamed_body(pending: PendingDownload) -> Body {
    let (mut writer, reader) = tokio::io::duplex(STREAM_CHUNK_SIZE);
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let outcome = pending.stream_to(&mut writer).await;
        drop(writer);
        let _ = done_tx.send(outcome);
    });

    let chunks = stream::unfold((reader, Some(done_rx)), |(mut reader, done)| async move {
        let done = done?;
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        match reader.read(&mut buf).await {
            Ok(0) => match done.await {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => {
                    tracing::warn!("Aborting streamed download: {}", e);
                    Some((Err(io::Error::other(e.to_string())), (reader, None)))
                }
                Err(_) => Some((
                    Err(io::Error::other("download task ended early")),
                    (reader, None),
                )),
            },
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), (reader, Some(done))))
            }
            Err(e) => Some((Err(e), (reader, None))),
        }
    });

    Body::from_stream(chunks)
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name.
fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len());
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }

    HeaderValue::from_str(&format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}"
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::Request;
    use http_body_util::BodyExt;
    use sfup_core::{EngineConfig, MemoryTicketStore, RecordingNotifier, TransferEngine};
    use axum::body::HttpBody;
    use sfup_files::BlobStore;
    use tower::ServiceExt;

    use crate::state::DEFAULT_DOWNLOAD_BUFFER_LIMIT;

    const BASE: &str = "https://drop.example.com";
    const BOUNDARY: &str = "sfup-test-boundary";

    struct TestApp {
        app: Router,
        state: AppState,
        notifier: Arc<RecordingNotifier>,
        _dir: tempfile::TempDir,
    }

    async fn test_app(config: EngineConfig) -> TestApp {
        test_app_with(config, DEFAULT_DOWNLOAD_BUFFER_LIMIT).await
    }

    async fn test_app_with(config: EngineConfig, buffer_limit: u64) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::open(dir.path()).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = TransferEngine::new(
            Arc::new(MemoryTicketStore::new()),
            blobs,
            notifier.clone(),
            config,
        );
        let state = AppState::new(engine, Some(BASE.to_string()))
            .with_download_buffer_limit(buffer_limit);

        TestApp {
            app: router(state.clone()),
            state,
            notifier,
            _dir: dir,
        }
    }

    fn allow_alice() -> EngineConfig {
        EngineConfig::with_allowed(["alice@example.com"])
    }

    fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(id: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/ul/{id}"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    async fn reserve_ticket(app: &TestApp) -> TicketId {
        let response = app
            .app
            .clone()
            .oneshot(get("/reserve/alice@example.com"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        app.notifier.sent().last().unwrap().ticket_id
    }

    fn download_path(message: &str) -> String {
        let url = message
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with(BASE))
            .unwrap();
        url[BASE.len()..].to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(EngineConfig::default()).await;
        let response = app.app.oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"ok");
    }

    #[tokio::test]
    async fn test_reserve_acknowledges_and_notifies() {
        let app = test_app(allow_alice()).await;
        let response = app
            .app
            .clone()
            .oneshot(get("/reserve/alice@example.com"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, RESERVED_MESSAGE.as_bytes());

        let sent = app.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "alice@example.com");
        assert_eq!(sent[0].base_url, BASE);
    }

    #[tokio::test]
    async fn test_reserve_unlisted_is_unauthorized() {
        let app = test_app(allow_alice()).await;
        let response = app
            .app
            .oneshot(get("/reserve/mallory@example.com"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_bytes(response).await,
            b"Sorry, your email is not authorized\n"
        );
    }

    #[tokio::test]
    async fn test_bash_script() {
        let app = test_app(EngineConfig::default()).await;
        let response = app.app.clone().oneshot(get("/bash/42")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let script = String::from_utf8(body_bytes(response).await).unwrap();
        assert_eq!(
            script,
            format!("#!/bin/bash\ncurl -qF \"file=@$1\" {BASE}/ul/42\n")
        );

        let response = app.app.oneshot(get("/bash/42;rm")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_then_download_once() {
        let app = test_app(allow_alice()).await;
        let id = reserve_ticket(&app).await;
        let payload = b"quarterly numbers\n".repeat(1000);

        let response = app
            .app
            .clone()
            .oneshot(upload_request(
                &id.to_string(),
                multipart_body("file", "report.pdf", &payload),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let message = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(message.contains("curl -OJf"));
        assert!(message.contains("599"));

        let path = download_path(&message);
        assert!(path.starts_with(&format!("/dl/{id}?key=")));

        let response = app.app.clone().oneshot(get(&path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"report.pdf\""));
        assert_eq!(body_bytes(response).await, payload);

        let response = app.app.oneshot(get(&path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_bytes(response).await, b"Invalid ID or already used\n");
    }

    #[tokio::test]
    async fn test_upload_unknown_ticket() {
        let app = test_app(EngineConfig::default()).await;
        let response = app
            .app
            .oneshot(upload_request("77", multipart_body("file", "a.txt", b"x")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_without_file_field() {
        let app = test_app(allow_alice()).await;
        let id = reserve_ticket(&app).await;

        let response = app
            .app
            .oneshot(upload_request(
                &id.to_string(),
                multipart_body("attachment", "a.txt", b"x"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let mut config = allow_alice();
        config.max_file_size = Some(16);
        let app = test_app(config).await;
        let id = reserve_ticket(&app).await;

        let response = app
            .app
            .clone()
            .oneshot(upload_request(
                &id.to_string(),
                multipart_body("file", "big.bin", &[7u8; 64]),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        // rolled back, so the ticket is gone
        let response = app
            .app
            .oneshot(upload_request(
                &id.to_string(),
                multipart_body("file", "small.bin", b"ok"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_download_key_errors() {
        let app = test_app(allow_alice()).await;
        let id = reserve_ticket(&app).await;
        app.app
            .clone()
            .oneshot(upload_request(
                &id.to_string(),
                multipart_body("file", "a.txt", b"secret"),
            ))
            .await
            .unwrap();

        let response = app
            .app
            .clone()
            .oneshot(get(&format!("/dl/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let wrong = TicketKey::generate().unwrap().to_base64url();
        let response = app
            .app
            .oneshot(get(&format!("/dl/{id}?key={wrong}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(app.state.engine.blobs().exists(id.get()).await);
    }

    #[tokio::test]
    async fn test_download_corrupted_returns_599() {
        let app = test_app(allow_alice()).await;
        let id = reserve_ticket(&app).await;
        let response = app
            .app
            .clone()
            .oneshot(upload_request(
                &id.to_string(),
                multipart_body("file", "a.txt", b"integrity matters"),
            ))
            .await
            .unwrap();
        let message = String::from_utf8(body_bytes(response).await).unwrap();

        let blob = app.state.engine.blobs().path(id.get());
        let mut bytes = std::fs::read(&blob).unwrap();
        bytes[0] ^= 0xFF;
        std::fs::write(&blob, bytes).unwrap();

        let response = app
            .app
            .oneshot(get(&download_path(&message)))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 599);
        assert_eq!(body_bytes(response).await.len(), 17);
        assert!(!blob.exists());
    }

    async fn upload_for_download(app: &TestApp, payload: &[u8]) -> (TicketId, String) {
        let id = reserve_ticket(app).await;
        let response = app
            .app
            .clone()
            .oneshot(upload_request(
                &id.to_string(),
                multipart_body("file", "large.bin", payload),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let message = String::from_utf8(body_bytes(response).await).unwrap();
        (id, download_path(&message))
    }

    #[tokio::test]
    async fn test_small_download_is_buffered() {
        let app = test_app_with(allow_alice(), 1024).await;
        let (_, path) = upload_for_download(&app, &[5u8; 1024]).await;

        let response = app.app.oneshot(get(&path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().size_hint().exact(), Some(1024));
    }

    #[tokio::test]
    async fn test_large_download_streams() {
        let app = test_app_with(allow_alice(), 1024).await;
        let payload: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        let (id, path) = upload_for_download(&app, &payload).await;

        let response = app.app.clone().oneshot(get(&path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().size_hint().exact(), None);
        let disposition = response.headers()[CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"large.bin\""));

        assert_eq!(body_bytes(response).await, payload);
        assert!(!app.state.engine.blobs().exists(id.get()).await);

        let response = app.app.oneshot(get(&path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_large_corrupted_download_aborts_body() {
        let app = test_app_with(allow_alice(), 1024).await;
        let (id, path) = upload_for_download(&app, &[9u8; 200_000]).await;

        let blob = app.state.engine.blobs().path(id.get());
        let mut bytes = std::fs::read(&blob).unwrap();
        bytes[150_000] ^= 0x01;
        std::fs::write(&blob, bytes).unwrap();

        let response = app.app.oneshot(get(&path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.into_body().collect().await.is_err());
        assert!(!blob.exists());
    }

    #[test]
    fn test_content_disposition_escapes() {
        let value = content_disposition("r\u{e9}sum\u{e9} \"final\".pdf");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"r_sum_ _final_.pdf\"; \
             filename*=UTF-8''r%C3%A9sum%C3%A9%20%22final%22.pdf"
        );
    }
}
