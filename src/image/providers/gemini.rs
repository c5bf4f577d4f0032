//! Gemini (Google) image editing adapter.

use crate::error::{sanitize_error_message, EditError, Result};
use crate::image::editor::ImageEditor;
use crate::image::types::{EditRequest, EditResult, EncodedImage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default Generative Language API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Environment variables searched for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 3] = ["API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Gemini image model variants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Gemini 2.5 Flash Image ("Nano Banana").
    #[default]
    FlashImage,
    /// Gemini 3 Pro Image ("Nano Banana Pro").
    ProImage,
    /// Any other model identifier.
    Custom(String),
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &str {
        match self {
            Self::FlashImage => "gemini-2.5-flash-image",
            Self::ProImage => "gemini-3-pro-image-preview",
            Self::Custom(id) => id,
        }
    }

    /// Models known to support image editing.
    pub fn known() -> [Self; 2] {
        [Self::FlashImage, Self::ProImage]
    }
}

impl std::str::FromStr for GeminiModel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "gemini-2.5-flash-image" | "flash" => Self::FlashImage,
            "gemini-3-pro-image-preview" | "pro" => Self::ProImage,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl std::fmt::Display for GeminiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for GeminiEditor.
#[derive(Debug, Clone, Default)]
pub struct GeminiEditorBuilder {
    api_key: Option<String>,
    model: GeminiModel,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl GeminiEditorBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `API_KEY`, `GEMINI_API_KEY`, then
    /// `GOOGLE_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Overrides the API endpoint. Falls back to `GEMINI_BASE_URL`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets a whole-request timeout. No timeout by default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the editor. A missing key is not an error here; it surfaces
    /// from [`ImageEditor::submit_edit`] before any request is sent.
    pub fn build(self) -> Result<GeminiEditor> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(api_key_from_env);

        let base_url = self
            .base_url
            .or_else(|| std::env::var("GEMINI_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let mut client = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            client = client.timeout(timeout);
        }

        Ok(GeminiEditor {
            client: client.build()?,
            api_key,
            model: self.model,
            base_url,
        })
    }
}

fn api_key_from_env() -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.trim().is_empty())
}

/// Gemini image editing adapter.
pub struct GeminiEditor {
    client: reqwest::Client,
    api_key: Option<String>,
    model: GeminiModel,
    base_url: String,
}

impl GeminiEditor {
    /// Creates a new `GeminiEditorBuilder`.
    pub fn builder() -> GeminiEditorBuilder {
        GeminiEditorBuilder::new()
    }

    /// Returns the configured model.
    pub fn model(&self) -> &GeminiModel {
        &self.model
    }

    /// Returns true if an API key was resolved.
    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| EditError::Configuration(API_KEY_ENV_VARS[0].into()))
    }

    async fn submit_impl(&self, request: &EditRequest) -> EditResult {
        let api_key = self.api_key()?;
        let start = Instant::now();

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            self.model.as_str(),
        );

        let body = GeminiRequest::from_edit_request(request);

        tracing::debug!(
            model = self.model.as_str(),
            media_type = %request.source.mime_type,
            prompt_len = request.prompt.len(),
            "submitting Gemini edit request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EditError::Transport {
                status: Some(status.as_u16()),
                message: format!("HTTP {}: {}", status.as_u16(), sanitize_error_message(&text)),
            });
        }

        let text = response.text().await?;
        let gemini_response: GeminiResponse = serde_json::from_str(&text)?;

        let image = extract_image(gemini_response)?.decode()?;

        tracing::debug!(
            media_type = image.media_type(),
            size = image.size(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Gemini edit complete"
        );

        Ok(image)
    }
}

#[async_trait]
impl ImageEditor for GeminiEditor {
    async fn submit_edit(&self, request: &EditRequest) -> EditResult {
        self.submit_impl(request).await
    }

    fn name(&self) -> &str {
        "Gemini (Google)"
    }

    async fn health_check(&self) -> Result<()> {
        let api_key = self.api_key()?;
        let url = format!("{}/v1beta/models/{}", self.base_url, self.model.as_str());

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(EditError::Transport {
            status: Some(status.as_u16()),
            message: format!("HTTP {}: {}", status.as_u16(), sanitize_error_message(&text)),
        })
    }
}

/// Picks the edited image out of a response.
///
/// Only the first candidate is consulted and its first part carrying inline
/// data wins; later parts are ignored.
fn extract_image(response: GeminiResponse) -> Result<EncodedImage> {
    let block_reason = response.prompt_feedback.and_then(|f| {
        f.block_reason_message
            .or_else(|| f.block_reason.map(|r| format!("prompt blocked: {r}")))
    });

    let Some(candidate) = response.candidates.into_iter().next() else {
        tracing::warn!("Gemini response had no candidates");
        return Err(EditError::NoImageReturned {
            detail: block_reason,
        });
    };

    let mut texts = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(inline) = part.inline_data {
            return Ok(EncodedImage {
                data: inline.data,
                mime_type: inline.mime_type,
            });
        }
        if let Some(text) = part.text.filter(|t| !t.trim().is_empty()) {
            texts.push(text.trim().to_string());
        }
    }

    let detail = if !texts.is_empty() {
        Some(texts.join(" "))
    } else {
        candidate
            .finish_reason
            .filter(|r| r != "STOP")
            .map(|r| format!("finish reason: {r}"))
            .or(block_reason)
    };

    tracing::warn!(detail = ?detail, "Gemini response contained no image");
    Err(EditError::NoImageReturned { detail })
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    #[serde(rename_all = "camelCase")]
    InlineData { inline_data: InlineData },
    Text { text: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
}

impl GeminiRequest {
    fn from_edit_request(req: &EditRequest) -> Self {
        let parts = vec![
            GeminiRequestPart::InlineData {
                inline_data: InlineData {
                    mime_type: req.source.mime_type.clone(),
                    data: req.source.data.clone(),
                },
            },
            GeminiRequestPart::Text {
                text: req.prompt.clone(),
            },
        ];

        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: vec!["IMAGE".to_string()],
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::image::encode::encode_bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn parse(json: &str) -> GeminiResponse {
        serde_json::from_str(json).unwrap()
    }

    fn sample_request() -> EditRequest {
        EditRequest::new(encode_bytes(vec![1, 2, 3], "image/jpeg"), "remove the background")
    }

    #[test]
    fn test_gemini_model_as_str() {
        assert_eq!(GeminiModel::FlashImage.as_str(), "gemini-2.5-flash-image");
        assert_eq!(GeminiModel::ProImage.as_str(), "gemini-3-pro-image-preview");
        assert_eq!(GeminiModel::Custom("x-image".into()).as_str(), "x-image");
    }

    #[test]
    fn test_gemini_model_parse() {
        assert_eq!("flash".parse::<GeminiModel>().unwrap(), GeminiModel::FlashImage);
        assert_eq!(
            "gemini-3-pro-image-preview".parse::<GeminiModel>().unwrap(),
            GeminiModel::ProImage
        );
        assert_eq!(
            "my-model".parse::<GeminiModel>().unwrap(),
            GeminiModel::Custom("my-model".into())
        );
        assert_eq!(GeminiModel::default(), GeminiModel::FlashImage);
    }

    #[test]
    fn test_builder_with_explicit_key() {
        let editor = GeminiEditorBuilder::new()
            .api_key("test-key")
            .model(GeminiModel::ProImage)
            .base_url("http://localhost:9/")
            .build()
            .unwrap();
        assert!(editor.has_credential());
        assert_eq!(editor.base_url, "http://localhost:9");
        assert_eq!(editor.model(), &GeminiModel::ProImage);
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        // Port 9 (discard) is never contacted: the key check comes first.
        let editor = GeminiEditor {
            client: reqwest::Client::new(),
            api_key: None,
            model: GeminiModel::default(),
            base_url: "http://127.0.0.1:9".into(),
        };

        let err = editor.submit_edit(&sample_request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().starts_with("API_KEY environment variable is not set"));

        let err = editor.health_check().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_session_without_credential_fails() {
        use crate::session::{GenerateOutcome, Phase, Session};
        use std::io::Write;

        let mut tmp = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        tmp.write_all(&[0x89, 0x50, 0x4E, 0x47]).unwrap();

        let session = Session::new(GeminiEditor {
            client: reqwest::Client::new(),
            api_key: None,
            model: GeminiModel::default(),
            base_url: "http://127.0.0.1:9".into(),
        });
        session.upload_path(tmp.path()).await.unwrap();
        session.edit_prompt("remove the background");

        match session.generate().await {
            GenerateOutcome::Failed(msg) => assert!(msg.contains("API_KEY")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(session.phase(), Phase::Failed);
    }

    /// One-route HTTP server answering every request with a canned response.
    struct CannedServer {
        url: String,
        hits: Arc<AtomicUsize>,
        last_request: Arc<Mutex<String>>,
    }

    async fn canned_server(status: u16, body: &'static str) -> CannedServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let last_request = Arc::new(Mutex::new(String::new()));

        let (counter, recorder) = (hits.clone(), last_request.clone());
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let request = read_request(&mut stream).await;
                counter.fetch_add(1, Ordering::SeqCst);
                *recorder.lock().unwrap() = request;

                let response = format!(
                    "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        CannedServer {
            url,
            hits,
            last_request,
        }
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = stream.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn editor_for(server: &CannedServer) -> GeminiEditor {
        GeminiEditor::builder()
            .api_key("test-key")
            .base_url(&server.url)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_edit_round_trip() {
        let server = canned_server(
            200,
            r#"{"candidates": [{"content": {"parts": [
                {"text": "Done."},
                {"inlineData": {"mimeType": "image/png", "data": "AAEC"}}
            ]}, "finishReason": "STOP"}]}"#,
        )
        .await;

        let image = editor_for(&server)
            .submit_edit(&sample_request())
            .await
            .unwrap();
        assert_eq!(image.data(), &[0, 1, 2]);
        assert_eq!(image.media_type(), "image/png");
        assert_eq!(server.hits.load(Ordering::SeqCst), 1);

        let request = server.last_request.lock().unwrap().clone();
        assert!(request.starts_with(
            "POST /v1beta/models/gemini-2.5-flash-image:generateContent HTTP/1.1"
        ));
        assert!(request.to_lowercase().contains("x-goog-api-key: test-key"));
        assert!(request.contains(r#""responseModalities":["IMAGE"]"#));
        assert!(request.contains(r#""text":"remove the background""#));
    }

    #[tokio::test]
    async fn test_submit_edit_http_error() {
        let server = canned_server(
            400,
            r#"{"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}}"#,
        )
        .await;

        let err = editor_for(&server)
            .submit_edit(&sample_request())
            .await
            .unwrap_err();
        match &err {
            EditError::Transport { status, message } => {
                assert_eq!(*status, Some(400));
                assert_eq!(message, "HTTP 400: API key not valid.");
            }
            other => panic!("expected transport error, got {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "Failed to edit image: HTTP 400: API key not valid."
        );
        assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_submit_edit_malformed_body() {
        let server = canned_server(200, "<html>not json</html>").await;

        let err = editor_for(&server)
            .submit_edit(&sample_request())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("malformed response"));
        assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_submit_edit_without_image() {
        let server = canned_server(
            200,
            r#"{"candidates": [{"content": {"parts": [{"text": "I can't edit faces."}]}}]}"#,
        )
        .await;

        let err = editor_for(&server)
            .submit_edit(&sample_request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EditError::NoImageReturned { detail: Some(ref d) } if d == "I can't edit faces."
        ));
        assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_health_check_against_server() {
        let server = canned_server(200, r#"{"name": "models/gemini-2.5-flash-image"}"#).await;
        editor_for(&server).health_check().await.unwrap();

        let request = server.last_request.lock().unwrap().clone();
        assert!(request.starts_with("GET /v1beta/models/gemini-2.5-flash-image HTTP/1.1"));
    }

    #[test]
    fn test_request_construction() {
        let gemini_req = GeminiRequest::from_edit_request(&sample_request());

        assert_eq!(gemini_req.contents.len(), 1);
        assert_eq!(gemini_req.contents[0].parts.len(), 2);
        assert_eq!(
            gemini_req.generation_config.response_modalities,
            vec!["IMAGE"]
        );
    }

    #[test]
    fn test_request_serialization_shape() {
        let gemini_req = GeminiRequest::from_edit_request(&sample_request());
        let json = serde_json::to_value(&gemini_req).unwrap();

        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        assert_eq!(parts[1]["text"], "remove the background");
        assert_eq!(json["generationConfig"]["responseModalities"][0], "IMAGE");
        assert!(json.get("generation_config").is_none());
    }

    #[test]
    fn test_extract_first_inline_part() {
        let resp = parse(
            r#"{
            "candidates": [{
                "content": {
                    "parts": [
                        {"inlineData": {"mimeType": "image/png", "data": "AAEC"}},
                        {"inlineData": {"mimeType": "image/jpeg", "data": "AwQF"}},
                        {"text": "Here you go"}
                    ]
                },
                "finishReason": "STOP"
            }]
        }"#,
        );
        let image = extract_image(resp).unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, "AAEC");
    }

    #[test]
    fn test_extract_skips_leading_text() {
        let resp = parse(
            r#"{
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Sure, here is the edited image."},
                        {"inlineData": {"mimeType": "image/webp", "data": "AAEC"}}
                    ]
                }
            }]
        }"#,
        );
        let image = extract_image(resp).unwrap();
        assert_eq!(image.mime_type, "image/webp");
    }

    #[test]
    fn test_extract_ignores_later_candidates() {
        let resp = parse(
            r#"{
            "candidates": [
                {"content": {"parts": [{"text": "I can't do that."}]}},
                {"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "AAEC"}}]}}
            ]
        }"#,
        );
        let err = extract_image(resp).unwrap_err();
        assert!(matches!(
            err,
            EditError::NoImageReturned { detail: Some(ref d) } if d == "I can't do that."
        ));
    }

    #[test]
    fn test_extract_no_image_data() {
        let resp = parse(r#"{"candidates": [{"content": {"parts": [{}]}}]}"#);
        let err = extract_image(resp).unwrap_err();
        assert!(matches!(err, EditError::NoImageReturned { detail: None }));
    }

    #[test]
    fn test_extract_no_candidates_with_block_reason() {
        let resp = parse(
            r#"{
            "candidates": [],
            "promptFeedback": {"blockReason": "SAFETY"}
        }"#,
        );
        let err = extract_image(resp).unwrap_err();
        assert!(matches!(
            err,
            EditError::NoImageReturned { detail: Some(ref d) } if d == "prompt blocked: SAFETY"
        ));
    }

    #[test]
    fn test_extract_safety_finish_reason() {
        let resp = parse(r#"{"candidates": [{"finishReason": "IMAGE_SAFETY"}]}"#);
        let err = extract_image(resp).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoImageReturned);
        assert!(err.to_string().contains("finish reason: IMAGE_SAFETY"));
    }

    #[test]
    fn test_extract_empty_response() {
        let err = extract_image(parse("{}")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoImageReturned);
    }

    #[test]
    fn test_snake_case_inline_data_accepted() {
        let resp = parse(
            r#"{"candidates": [{"content": {"parts": [
                {"inline_data": {"mime_type": "image/png", "data": "AAEC"}}
            ]}}]}"#,
        );
        let decoded = extract_image(resp).unwrap().decode().unwrap();
        assert_eq!(decoded.data(), &[0, 1, 2]);
        assert_eq!(decoded.media_type(), "image/png");
    }

    #[test]
    fn test_undecodable_image_is_transport_error() {
        let resp = parse(
            r#"{"candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": "image/png", "data": "!!not base64!!"}}
            ]}}]}"#,
        );
        let err = extract_image(resp).unwrap().decode().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
