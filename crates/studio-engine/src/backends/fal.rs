use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response as HttpResponse};
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use studio_contracts::endpoints::EndpointDescriptor;

use super::{AttemptOutcome, AttemptRequest, FailureKind, ImageTransformBackend};
use crate::normalize::{normalize_response, ResponseShape};

const ERROR_TEXT_MAX_CHARS: usize = 512;

/// Fal endpoint taking the image inline as a data URL in a JSON body.
pub struct FalJsonBackend {
    endpoint: EndpointDescriptor,
    http: HttpClient,
}

impl FalJsonBackend {
    pub fn new(endpoint: EndpointDescriptor, http: HttpClient) -> Self {
        Self { endpoint, http }
    }
}

impl ImageTransformBackend for FalJsonBackend {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    fn attempt(&self, request: &AttemptRequest<'_>) -> AttemptOutcome {
        let mut payload = request.settings.json_fields();
        payload.insert(
            "image_url".to_string(),
            Value::String(request.encoded.data_url().to_string()),
        );
        let builder = self
            .http
            .post(&self.endpoint.url)
            .header(AUTHORIZATION, format!("Key {}", request.credential))
            .json(&Value::Object(payload));
        send_and_settle(&self.endpoint.url, builder)
    }
}

/// Fal endpoint taking the image as an `image_file` form upload.
pub struct FalMultipartBackend {
    endpoint: EndpointDescriptor,
    http: HttpClient,
}

impl FalMultipartBackend {
    pub fn new(endpoint: EndpointDescriptor, http: HttpClient) -> Self {
        Self { endpoint, http }
    }

    fn build_form(request: &AttemptRequest<'_>) -> Result<MultipartForm, reqwest::Error> {
        let file_name = format!("product.{}", request.payload.extension());
        let part = MultipartPart::bytes(request.payload.bytes().to_vec())
            .file_name(file_name)
            .mime_str(request.payload.mime_type())?;
        let mut form = MultipartForm::new().part("image_file", part);
        for (key, value) in request.settings.form_fields() {
            form = form.text(key, value);
        }
        Ok(form)
    }
}

impl ImageTransformBackend for FalMultipartBackend {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    fn attempt(&self, request: &AttemptRequest<'_>) -> AttemptOutcome {
        let form = match Self::build_form(request) {
            Ok(form) => form,
            Err(err) => {
                return AttemptOutcome::failed(
                    FailureKind::Transport,
                    format!(
                        "Endpoint {} form encoding failed: {err}",
                        self.endpoint.url
                    ),
                );
            }
        };
        let builder = self
            .http
            .post(&self.endpoint.url)
            .header(AUTHORIZATION, format!("Key {}", request.credential))
            .multipart(form);
        send_and_settle(&self.endpoint.url, builder)
    }
}

fn send_and_settle(url: &str, builder: RequestBuilder) -> AttemptOutcome {
    match builder.send() {
        Ok(response) => settle_response(url, response),
        Err(raw) => {
            let err = anyhow::Error::new(raw).context(format!("Endpoint {url} request failed"));
            AttemptOutcome::failed(
                FailureKind::Transport,
                error_chain_text(&err, ERROR_TEXT_MAX_CHARS),
            )
        }
    }
}

fn settle_response(url: &str, response: HttpResponse) -> AttemptOutcome {
    let status = response.status();
    let body = match response.text() {
        Ok(body) => body,
        Err(raw) => {
            let err =
                anyhow::Error::new(raw).context(format!("Endpoint {url} response body read failed"));
            let kind = if status.is_success() {
                FailureKind::InvalidBody
            } else {
                FailureKind::Status
            };
            return AttemptOutcome::failed(kind, error_chain_text(&err, ERROR_TEXT_MAX_CHARS));
        }
    };

    if !status.is_success() {
        let parsed = serde_json::from_str::<Value>(&body).unwrap_or(Value::Null);
        let reason = failure_message_from_body(&parsed).unwrap_or_else(|| {
            let status_text = status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.as_u16().to_string());
            format!("Endpoint {url} failed: {status_text}")
        });
        return AttemptOutcome::failed(
            FailureKind::Status,
            truncate_text(&reason, ERROR_TEXT_MAX_CHARS),
        );
    }

    let parsed: Value = match serde_json::from_str(&body) {
        Ok(parsed) => parsed,
        Err(err) => {
            return AttemptOutcome::failed(
                FailureKind::InvalidBody,
                format!("Endpoint {url} returned invalid JSON payload: {err}"),
            );
        }
    };

    match normalize_response(&parsed) {
        ResponseShape::ProviderError(message) => AttemptOutcome::failed(
            FailureKind::Provider,
            truncate_text(&message, ERROR_TEXT_MAX_CHARS),
        ),
        ResponseShape::Unrecognized => AttemptOutcome::Unrecognized,
        shape => match shape.image_url() {
            Some(url) => AttemptOutcome::Success {
                image_url: url.to_string(),
            },
            None => AttemptOutcome::Unrecognized,
        },
    }
}

/// `detail` first (plain or structured, as validation errors arrive), then
/// `message`.
fn failure_message_from_body(body: &Value) -> Option<String> {
    let from_field = |key: &str| match body.get(key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Array(rows) if !rows.is_empty() => serde_json::to_string(rows).ok(),
        Value::Object(obj) if !obj.is_empty() => serde_json::to_string(obj).ok(),
        _ => None,
    };
    from_field("detail").or_else(|| from_field("message"))
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
