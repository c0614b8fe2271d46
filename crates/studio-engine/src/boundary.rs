use serde::Deserialize;
use serde_json::{json, Value};
use studio_contracts::payload::ImagePayload;

use crate::error::TransformError;
use crate::orchestrator::Orchestrator;

pub const PROCESS_IMAGE_PATH: &str = "/api/process-image";
pub const HEALTH_PATH: &str = "/health";
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

const IMAGE_REQUIRED: &str = "Image data is required";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessImageRequest {
    #[serde(default)]
    pub image_data_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryResponse {
    pub status: u16,
    pub body: Value,
}

impl BoundaryResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    ProcessImage,
    Health,
    MethodNotAllowed,
    NotFound,
}

pub fn resolve_route(method: &str, url: &str) -> Route {
    let path = url.split('?').next().unwrap_or_default();
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    match path {
        PROCESS_IMAGE_PATH if method.eq_ignore_ascii_case("POST") => Route::ProcessImage,
        HEALTH_PATH if method.eq_ignore_ascii_case("GET") => Route::Health,
        PROCESS_IMAGE_PATH | HEALTH_PATH => Route::MethodNotAllowed,
        _ => Route::NotFound,
    }
}

/// `POST /api/process-image` with `{"imageDataUrl": "data:..."}`.
///
/// Checks run in a fixed order: image present, credential configured, data
/// URL decodable, then the fallback chain.
pub fn handle_process_image(body: &[u8], orchestrator: &Orchestrator) -> BoundaryResponse {
    let request: ProcessImageRequest = serde_json::from_slice(body).unwrap_or_default();
    let Some(data_url) = request
        .image_data_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return BoundaryResponse::error(400, IMAGE_REQUIRED);
    };

    if !orchestrator.has_credential() {
        let err = TransformError::missing_credential();
        return BoundaryResponse::error(err.status_code(), err.to_string());
    }

    let image = match ImagePayload::from_data_url(data_url) {
        Ok(image) => image,
        Err(err) => return BoundaryResponse::error(400, err.to_string()),
    };

    match orchestrator.transform(&image) {
        Ok(success) => BoundaryResponse::ok(json!({ "imageUrl": success.image_url })),
        Err(err) => {
            log::error!("Error processing image: {err}");
            BoundaryResponse::error(err.status_code(), err.to_string())
        }
    }
}

pub fn handle_health(orchestrator: &Orchestrator) -> BoundaryResponse {
    BoundaryResponse::ok(json!({
        "status": "ok",
        "endpoints": orchestrator.endpoint_names().len(),
        "credential_configured": orchestrator.has_credential(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::{handle_health, handle_process_image, resolve_route, BoundaryResponse, Route};
    use crate::backends::testing::ScriptedBackend;
    use crate::backends::ImageTransformBackend;
    use crate::orchestrator::Orchestrator;
    use crate::settings::GenerationSettings;

    const IMAGE_BODY: &[u8] = br#"{"imageDataUrl":"data:image/jpeg;base64,cHJvZHVjdA=="}"#;

    fn engine(backend: ScriptedBackend, credential: Option<&str>) -> Orchestrator {
        Orchestrator::new(
            vec![Box::new(backend) as Box<dyn ImageTransformBackend>],
            credential.map(str::to_string),
            GenerationSettings::default(),
        )
    }

    #[test]
    fn success_returns_image_url() {
        let response = handle_process_image(
            IMAGE_BODY,
            &engine(ScriptedBackend::success("a", "https://x/a.png"), Some("key")),
        );
        assert_eq!(
            response,
            BoundaryResponse::ok(json!({ "imageUrl": "https://x/a.png" }))
        );
    }

    #[test]
    fn missing_image_is_bad_request_before_anything_else() {
        let backend = ScriptedBackend::success("a", "https://x/a.png");
        let calls = backend.calls();
        let orchestrator = engine(backend, None);
        let bodies: [&[u8]; 5] = [
            b"{}",
            br#"{"imageDataUrl":""}"#,
            br#"{"imageDataUrl":null}"#,
            b"not json",
            b"",
        ];
        for body in bodies {
            assert_eq!(
                handle_process_image(body, &orchestrator),
                BoundaryResponse::error(400, "Image data is required")
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_credential_is_server_error() {
        let response = handle_process_image(
            IMAGE_BODY,
            &engine(ScriptedBackend::success("a", "https://x/a.png"), Some(" ")),
        );
        assert_eq!(response.status, 500);
        assert!(response.body["error"]
            .as_str()
            .unwrap_or_default()
            .starts_with("FAL_API_KEY is not configured"));
    }

    #[test]
    fn malformed_data_url_is_bad_request() {
        let response = handle_process_image(
            br#"{"imageDataUrl":"https://example.com/a.png"}"#,
            &engine(ScriptedBackend::success("a", "https://x/a.png"), Some("key")),
        );
        assert_eq!(
            response,
            BoundaryResponse::error(400, "Image data must be a data URL")
        );
    }

    #[test]
    fn orchestrator_failure_is_server_error_with_message() {
        let response = handle_process_image(
            IMAGE_BODY,
            &engine(ScriptedBackend::transport_error("a", "Invalid API key"), Some("key")),
        );
        assert_eq!(response, BoundaryResponse::error(500, "Invalid API key"));

        let response = handle_process_image(
            IMAGE_BODY,
            &engine(ScriptedBackend::unrecognized("a"), Some("key")),
        );
        assert_eq!(
            response,
            BoundaryResponse::error(500, "No endpoint returned a usable image")
        );
    }

    #[test]
    fn health_reports_chain_size() {
        let response = handle_health(&engine(ScriptedBackend::unrecognized("a"), None));
        assert_eq!(response.status, 200);
        assert_eq!(response.body["endpoints"], json!(1));
        assert_eq!(response.body["credential_configured"], json!(false));
    }

    #[test]
    fn routes_resolve_by_method_and_path() {
        assert_eq!(resolve_route("POST", "/api/process-image"), Route::ProcessImage);
        assert_eq!(resolve_route("POST", "/api/process-image/?x=1"), Route::ProcessImage);
        assert_eq!(resolve_route("GET", "/api/process-image"), Route::MethodNotAllowed);
        assert_eq!(resolve_route("GET", "/health"), Route::Health);
        assert_eq!(resolve_route("DELETE", "/health"), Route::MethodNotAllowed);
        assert_eq!(resolve_route("GET", "/"), Route::NotFound);
    }
}
