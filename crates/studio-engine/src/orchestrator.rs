use serde_json::{json, Map, Value};
use studio_contracts::events::{EventKind, EventPayload, EventWriter};
use studio_contracts::payload::ImagePayload;
use studio_contracts::runs::{AttemptRecord, AttemptStatus};

use crate::backends::{
    backends_for_registry, build_http_client, AttemptOutcome, AttemptRequest, EncodedImage,
    ImageTransformBackend,
};
use crate::error::TransformError;
use crate::settings::{GenerationSettings, StudioConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSuccess {
    pub request_id: String,
    pub image_url: String,
    pub endpoint: String,
    pub attempts: Vec<AttemptRecord>,
}

/// Drives one "place this product on a studio background" request through
/// the fallback chain.
///
/// Backends are tried strictly in order, one call at a time. The first
/// recognized image short-circuits the chain. Nothing is kept between calls
/// to [`Orchestrator::transform`], so one instance can serve any number of
/// concurrent requests.
pub struct Orchestrator {
    backends: Vec<Box<dyn ImageTransformBackend>>,
    credential: Option<String>,
    settings: GenerationSettings,
    events: Option<EventWriter>,
}

struct RecordedFailure {
    endpoint: String,
    reason: String,
}

impl Orchestrator {
    pub fn new(
        backends: Vec<Box<dyn ImageTransformBackend>>,
        credential: Option<String>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            backends,
            credential,
            settings,
            events: None,
        }
    }

    pub fn from_config(config: &StudioConfig) -> anyhow::Result<Self> {
        let http = build_http_client(config.http_timeout)?;
        Ok(Self::new(
            backends_for_registry(&config.endpoints, &http),
            config.credential.clone(),
            config.settings.clone(),
        ))
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn endpoint_names(&self) -> Vec<String> {
        self.backends
            .iter()
            .map(|backend| backend.name().to_string())
            .collect()
    }

    pub fn has_credential(&self) -> bool {
        self.usable_credential().is_some()
    }

    pub fn transform(&self, image: &ImagePayload) -> Result<TransformSuccess, TransformError> {
        let Some(credential) = self.usable_credential() else {
            return Err(TransformError::missing_credential());
        };
        if image.is_empty() {
            return Err(TransformError::InvalidImage(
                "Image data is required".to_string(),
            ));
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let encoded = EncodedImage::encode(image);
        let request = AttemptRequest {
            payload: image,
            encoded: &encoded,
            credential,
            settings: &self.settings,
        };
        self.emit(
            EventKind::TransformStarted,
            &request_id,
            json!({
                "endpoints": self.endpoint_names(),
                "input_mime": image.mime_type(),
                "input_bytes": image.len(),
                "input_sha256": image.sha256_hex(),
            }),
        );

        let mut attempts = Vec::with_capacity(self.backends.len());
        let mut last_failure: Option<RecordedFailure> = None;

        for backend in &self.backends {
            let endpoint = backend.name().to_string();
            match backend.attempt(&request) {
                AttemptOutcome::Success { image_url } => {
                    attempts.push(AttemptRecord {
                        endpoint: endpoint.clone(),
                        status: AttemptStatus::Succeeded,
                        reason: None,
                    });
                    self.emit(
                        EventKind::TransformSucceeded,
                        &request_id,
                        json!({
                            "endpoint": endpoint,
                            "image_url": image_url,
                            "attempts": attempts.len(),
                        }),
                    );
                    return Ok(TransformSuccess {
                        request_id,
                        image_url,
                        endpoint,
                        attempts,
                    });
                }
                AttemptOutcome::Failed { kind, reason } => {
                    log::warn!("endpoint {endpoint} failed ({}): {reason}", kind.as_str());
                    self.emit(
                        EventKind::EndpointFailed,
                        &request_id,
                        json!({
                            "endpoint": endpoint,
                            "kind": kind.as_str(),
                            "reason": reason,
                        }),
                    );
                    attempts.push(AttemptRecord {
                        endpoint: endpoint.clone(),
                        status: AttemptStatus::Failed,
                        reason: Some(reason.clone()),
                    });
                    last_failure = Some(RecordedFailure { endpoint, reason });
                }
                AttemptOutcome::Unrecognized => {
                    log::warn!("endpoint {endpoint} answered without a recognizable image");
                    self.emit(
                        EventKind::EndpointUnrecognized,
                        &request_id,
                        json!({ "endpoint": endpoint }),
                    );
                    attempts.push(AttemptRecord {
                        endpoint,
                        status: AttemptStatus::Unrecognized,
                        reason: None,
                    });
                }
            }
        }

        let err = match last_failure {
            Some(failure) => TransformError::AllEndpointsFailed {
                endpoint: failure.endpoint,
                message: failure.reason,
            },
            None => TransformError::NoUsableResponse,
        };
        self.emit(
            EventKind::TransformFailed,
            &request_id,
            json!({
                "kind": err.kind(),
                "error": err.to_string(),
                "attempts": attempts.len(),
            }),
        );
        Err(err)
    }

    fn usable_credential(&self) -> Option<&str> {
        self.credential
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn emit(&self, kind: EventKind, request_id: &str, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        let event: EventPayload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Err(err) = events.emit(kind, request_id, event) {
            log::warn!("event write failed: path={}, err={err}", events.path().display());
        }
    }
}
