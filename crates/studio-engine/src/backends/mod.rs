mod fal;

use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::Client as HttpClient;
use studio_contracts::endpoints::{EndpointRegistry, EndpointTransport};
use studio_contracts::payload::ImagePayload;

use crate::settings::GenerationSettings;

pub use fal::{FalJsonBackend, FalMultipartBackend};

/// Transport form of the image, built once per transform and shared by
/// every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    data_url: String,
}

impl EncodedImage {
    pub fn encode(payload: &ImagePayload) -> Self {
        Self {
            data_url: payload.to_data_url(),
        }
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }
}

pub struct AttemptRequest<'a> {
    pub payload: &'a ImagePayload,
    pub encoded: &'a EncodedImage,
    pub credential: &'a str,
    pub settings: &'a GenerationSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connect error, timeout or other send failure.
    Transport,
    /// Non-2xx status.
    Status,
    /// 2xx whose body could not be read or parsed.
    InvalidBody,
    /// 2xx carrying an explicit provider error and no image.
    Provider,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Status => "status",
            Self::InvalidBody => "invalid_body",
            Self::Provider => "provider",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { image_url: String },
    Failed { kind: FailureKind, reason: String },
    /// 2xx body matching no known shape; not a recorded failure.
    Unrecognized,
}

impl AttemptOutcome {
    pub fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            reason: reason.into(),
        }
    }
}

/// One external image-transformation service. Each adapter owns its request
/// encoding and its response-parsing rule.
pub trait ImageTransformBackend: Send + Sync {
    fn name(&self) -> &str;
    fn attempt(&self, request: &AttemptRequest<'_>) -> AttemptOutcome;
}

pub fn build_http_client(timeout: Option<Duration>) -> anyhow::Result<HttpClient> {
    let mut builder = HttpClient::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context("failed to build HTTP client")
}

pub fn backends_for_registry(
    registry: &EndpointRegistry,
    http: &HttpClient,
) -> Vec<Box<dyn ImageTransformBackend>> {
    registry
        .list()
        .map(|endpoint| -> Box<dyn ImageTransformBackend> {
            match endpoint.transport {
                EndpointTransport::Json => {
                    Box::new(FalJsonBackend::new(endpoint.clone(), http.clone()))
                }
                EndpointTransport::Multipart => {
                    Box::new(FalMultipartBackend::new(endpoint.clone(), http.clone()))
                }
            }
        })
        .collect()
}
