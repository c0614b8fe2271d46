use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "https://fal.run";
pub const DEFAULT_QUEUE_API_BASE: &str = "https://queue.fal.run";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EndpointTransport {
    #[default]
    Json,
    Multipart,
}

impl EndpointTransport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Multipart => "multipart",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub transport: EndpointTransport,
}

impl EndpointDescriptor {
    pub fn json(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            transport: EndpointTransport::Json,
        }
    }

    pub fn multipart(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            transport: EndpointTransport::Multipart,
        }
    }
}

/// Fallback chain in priority order. Names are unique; registering a name
/// twice replaces the earlier entry in place.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointRegistry {
    endpoints: IndexMap<String, EndpointDescriptor>,
}

impl EndpointRegistry {
    pub fn new(endpoints: Option<Vec<EndpointDescriptor>>) -> Self {
        let mut registry = Self {
            endpoints: IndexMap::new(),
        };
        let endpoints = endpoints
            .unwrap_or_else(|| default_endpoints(DEFAULT_API_BASE, DEFAULT_QUEUE_API_BASE));
        for endpoint in endpoints {
            registry.register(endpoint);
        }
        registry
    }

    pub fn with_bases(api_base: &str, queue_api_base: &str) -> Self {
        Self::new(Some(default_endpoints(api_base, queue_api_base)))
    }

    /// Builds a chain from a comma separated list. Each entry is a URL or a
    /// path relative to `api_base`; a `multipart:` prefix selects the form
    /// transport.
    pub fn parse_list(raw: &str, api_base: &str) -> Result<Self, String> {
        let mut registry = Self {
            endpoints: IndexMap::new(),
        };
        for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (transport, target) = match entry.split_once(':') {
                Some((prefix, rest)) if prefix.eq_ignore_ascii_case("multipart") => {
                    (EndpointTransport::Multipart, rest.trim())
                }
                Some((prefix, rest)) if prefix.eq_ignore_ascii_case("json") => {
                    (EndpointTransport::Json, rest.trim())
                }
                _ => (EndpointTransport::Json, entry),
            };
            if target.is_empty() {
                return Err(format!("Endpoint entry '{entry}' has no target."));
            }
            let url = resolve_endpoint_url(api_base, target);
            registry.register(EndpointDescriptor {
                name: endpoint_name(&url),
                url,
                transport,
            });
        }
        if registry.is_empty() {
            return Err("Endpoint list is empty.".to_string());
        }
        Ok(registry)
    }

    pub fn register(&mut self, endpoint: EndpointDescriptor) {
        self.endpoints.insert(endpoint.name.clone(), endpoint);
    }

    pub fn list(&self) -> impl Iterator<Item = &EndpointDescriptor> {
        self.endpoints.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.endpoints.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

pub fn resolve_endpoint_url(api_base: &str, target: &str) -> String {
    let target = target.trim();
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }
    format!(
        "{}/{}",
        api_base.trim().trim_end_matches('/'),
        target.trim_start_matches('/')
    )
}

/// Host plus path, without scheme. Queue and sync hosts serving the same
/// model stay distinct.
pub fn endpoint_name(url: &str) -> String {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    without_scheme.trim_end_matches('/').to_string()
}

fn default_endpoints(api_base: &str, queue_api_base: &str) -> Vec<EndpointDescriptor> {
    let mut endpoints = Vec::new();

    let mut push = |base: &str, path: &str| {
        let url = resolve_endpoint_url(base, path);
        endpoints.push(EndpointDescriptor::json(&endpoint_name(&url), &url));
    };

    push(api_base, "fal-ai/wan/v2.2-a14b/image-to-image");
    push(api_base, "fal-ai/flux-pro/image-to-image");
    push(queue_api_base, "fal-ai/wan/v2.2-a14b/image-to-image");

    endpoints
}
