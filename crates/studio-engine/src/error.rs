/// Terminal outcome of a failed transform. Per-endpoint failures never
/// surface here directly; they are folded into `AllEndpointsFailed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// Credential absent or blank. No endpoint is attempted.
    #[error("{0}")]
    Configuration(String),

    /// Image payload empty or undecodable. No endpoint is attempted.
    #[error("{0}")]
    InvalidImage(String),

    /// Every endpoint was tried; carries the last recorded failure.
    #[error("{message}")]
    AllEndpointsFailed { endpoint: String, message: String },

    /// Every endpoint answered, none with a recognized image and none with a
    /// hard failure.
    #[error("No endpoint returned a usable image")]
    NoUsableResponse,
}

impl TransformError {
    pub fn missing_credential() -> Self {
        Self::Configuration(
            "FAL_API_KEY is not configured. Please add it to the service environment".to_string(),
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::InvalidImage(_) => "invalid_image",
            Self::AllEndpointsFailed { .. } => "all_endpoints_failed",
            Self::NoUsableResponse => "no_usable_response",
        }
    }

    /// HTTP status the boundary answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidImage(_) => 400,
            Self::Configuration(_) | Self::AllEndpointsFailed { .. } | Self::NoUsableResponse => 500,
        }
    }
}
