use std::env;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use studio_contracts::endpoints::{EndpointRegistry, DEFAULT_API_BASE, DEFAULT_QUEUE_API_BASE};

pub const STUDIO_PROMPT: &str = "professional product photography, studio lighting, clean white background, high quality, commercial photography, product on white background, professional studio setup";
pub const STUDIO_STRENGTH: f64 = 0.6;
pub const STUDIO_INFERENCE_STEPS: u32 = 30;
pub const STUDIO_GUIDANCE_SCALE: f64 = 7.5;

/// Fixed generation parameters sent with every attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSettings {
    pub prompt: String,
    pub strength: f64,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            prompt: STUDIO_PROMPT.to_string(),
            strength: STUDIO_STRENGTH,
            num_inference_steps: STUDIO_INFERENCE_STEPS,
            guidance_scale: STUDIO_GUIDANCE_SCALE,
        }
    }
}

impl GenerationSettings {
    pub fn json_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("prompt", self.prompt.clone()),
            ("strength", trim_float(self.strength)),
            ("num_inference_steps", self.num_inference_steps.to_string()),
            ("guidance_scale", trim_float(self.guidance_scale)),
        ]
    }
}

/// Process configuration, read once at startup.
#[derive(Clone)]
pub struct StudioConfig {
    pub credential: Option<String>,
    pub endpoints: EndpointRegistry,
    pub http_timeout: Option<Duration>,
    pub settings: GenerationSettings,
}

impl std::fmt::Debug for StudioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudioConfig")
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("endpoints", &self.endpoints.names())
            .field("http_timeout", &self.http_timeout)
            .field("settings", &self.settings)
            .finish()
    }
}

impl StudioConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolves configuration through `lookup` so tests never touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let credential = non_empty("FAL_API_KEY").or_else(|| non_empty("FAL_KEY"));
        let api_base = non_empty("FAL_API_BASE")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let queue_api_base = non_empty("FAL_QUEUE_API_BASE")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_QUEUE_API_BASE.to_string());

        let endpoints = match non_empty("STUDIO_ENDPOINTS") {
            Some(raw) => EndpointRegistry::parse_list(&raw, &api_base)?,
            None => EndpointRegistry::with_bases(&api_base, &queue_api_base),
        };

        let http_timeout = match non_empty("STUDIO_HTTP_TIMEOUT_SECS") {
            Some(raw) => {
                let timeout = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|value| *value > 0.0)
                    .and_then(|value| Duration::try_from_secs_f64(value).ok())
                    .ok_or_else(|| {
                        format!("STUDIO_HTTP_TIMEOUT_SECS must be a positive number, got '{raw}'.")
                    })?;
                Some(timeout)
            }
            None => None,
        };

        Ok(Self {
            credential,
            endpoints,
            http_timeout,
            settings: GenerationSettings::default(),
        })
    }
}

fn trim_float(value: f64) -> String {
    let text = format!("{value:.4}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
