use std::fs;
use std::path::Path;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataUrlError {
    #[error("Image data is required")]
    Empty,
    #[error("Image data must be a data URL")]
    MissingScheme,
    #[error("Image data URL is missing its payload separator")]
    MissingSeparator,
    #[error("Image data URL must be base64 encoded")]
    NotBase64,
    #[error("Image data URL payload is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("Please upload an image file (got {0})")]
    NotAnImage(String),
}

/// One uploaded image: raw bytes plus the MIME type they were declared or
/// sniffed as. Never mutated after construction.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    mime_type: String,
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Parses `data:[<mime>][;param]*;base64,<payload>`.
    ///
    /// A missing or generic MIME type is sniffed from the decoded bytes and
    /// falls back to [`DEFAULT_IMAGE_MIME`] when the signature is unknown.
    pub fn from_data_url(raw: &str) -> Result<Self, DataUrlError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DataUrlError::Empty);
        }
        let Some(scheme) = trimmed.get(..5) else {
            return Err(DataUrlError::MissingScheme);
        };
        if !scheme.eq_ignore_ascii_case("data:") {
            return Err(DataUrlError::MissingScheme);
        }
        let rest = &trimmed[5..];
        let Some((header, data)) = rest.split_once(',') else {
            return Err(DataUrlError::MissingSeparator);
        };

        let mut params = header.split(';').map(str::trim);
        let declared = params
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !params.any(|param| param.eq_ignore_ascii_case("base64")) {
            return Err(DataUrlError::NotBase64);
        }

        let compact: String = data.chars().filter(|ch| !ch.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(DataUrlError::Empty);
        }
        let bytes = BASE64
            .decode(compact.as_bytes())
            .map_err(|err| DataUrlError::InvalidBase64(err.to_string()))?;
        if bytes.is_empty() {
            return Err(DataUrlError::Empty);
        }

        let mime_type = if declared.is_empty() || declared == "application/octet-stream" {
            sniff_image_mime(&bytes)?.unwrap_or(DEFAULT_IMAGE_MIME).to_string()
        } else {
            declared
        };
        if !mime_type.starts_with("image/") {
            return Err(DataUrlError::NotAnImage(mime_type));
        }

        Ok(Self { bytes, mime_type })
    }

    /// Loads an image from disk, sniffing the MIME type from its signature
    /// and falling back to the file extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        if bytes.is_empty() {
            return Err(DataUrlError::Empty)
                .with_context(|| format!("{} is empty", path.display()));
        }
        let sniffed = sniff_image_mime(&bytes)
            .with_context(|| format!("{} is not an image", path.display()))?;
        let Some(mime_type) = sniffed.or_else(|| mime_for_path(path)) else {
            return Err(DataUrlError::NotAnImage("unknown type".to_string()))
                .with_context(|| format!("{} is not an image", path.display()));
        };
        Ok(Self {
            bytes,
            mime_type: mime_type.to_string(),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_data_url(&self) -> String {
        let mime = if self.mime_type.trim().is_empty() {
            DEFAULT_IMAGE_MIME
        } else {
            self.mime_type.as_str()
        };
        format!("data:{mime};base64,{}", BASE64.encode(&self.bytes))
    }

    /// File extension matching the MIME type, used for multipart file names.
    pub fn extension(&self) -> &'static str {
        let lowered = self.mime_type.to_ascii_lowercase();
        if lowered.contains("png") {
            return "png";
        }
        if lowered.contains("webp") {
            return "webp";
        }
        if lowered.contains("gif") {
            return "gif";
        }
        "jpg"
    }

    /// Hex sha256 of the raw bytes; lets logs identify a payload without
    /// carrying its content.
    pub fn sha256_hex(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }
}

/// `Ok(None)` when the signature is unknown; an error when the bytes are
/// positively identified as something other than an image.
fn sniff_image_mime(bytes: &[u8]) -> Result<Option<&'static str>, DataUrlError> {
    match infer::get(bytes) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => {
            Ok(Some(kind.mime_type()))
        }
        Some(kind) => Err(DataUrlError::NotAnImage(kind.mime_type().to_string())),
        None => Ok(None),
    }
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    use super::{DataUrlError, ImagePayload, DEFAULT_IMAGE_MIME};

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    #[test]
    fn parses_declared_mime_and_bytes() {
        let raw = format!("data:image/png;base64,{}", BASE64.encode(b"pixels"));
        let payload = ImagePayload::from_data_url(&raw).unwrap();
        assert_eq!(payload.mime_type(), "image/png");
        assert_eq!(payload.bytes(), b"pixels");
    }

    #[test]
    fn data_url_survives_a_trip_through_to_data_url() {
        let payload = ImagePayload::new(PNG_HEADER.to_vec(), "image/png");
        let parsed = ImagePayload::from_data_url(&payload.to_data_url()).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn missing_mime_is_sniffed_from_signature() {
        let raw = format!("data:;base64,{}", BASE64.encode(PNG_HEADER));
        let payload = ImagePayload::from_data_url(&raw).unwrap();
        assert_eq!(payload.mime_type(), "image/png");
    }

    #[test]
    fn unknown_signature_defaults_to_jpeg() {
        let raw = format!(
            "data:application/octet-stream;base64,{}",
            BASE64.encode(b"not a known signature")
        );
        let payload = ImagePayload::from_data_url(&raw).unwrap();
        assert_eq!(payload.mime_type(), DEFAULT_IMAGE_MIME);
    }

    #[test]
    fn scheme_and_params_are_case_insensitive() {
        let raw = format!("DATA:Image/WebP;name=a.webp;BASE64,{}", BASE64.encode(b"x"));
        let payload = ImagePayload::from_data_url(&raw).unwrap();
        assert_eq!(payload.mime_type(), "image/webp");
    }

    #[test]
    fn rejects_malformed_data_urls() {
        assert_eq!(ImagePayload::from_data_url("  "), Err(DataUrlError::Empty));
        assert_eq!(
            ImagePayload::from_data_url("https://x/a.png"),
            Err(DataUrlError::MissingScheme)
        );
        assert_eq!(
            ImagePayload::from_data_url("data:image/png;base64"),
            Err(DataUrlError::MissingSeparator)
        );
        assert_eq!(
            ImagePayload::from_data_url("data:image/png,rawbytes"),
            Err(DataUrlError::NotBase64)
        );
        assert_eq!(
            ImagePayload::from_data_url("data:image/png;base64,"),
            Err(DataUrlError::Empty)
        );
        assert!(matches!(
            ImagePayload::from_data_url("data:image/png;base64,@@@"),
            Err(DataUrlError::InvalidBase64(_))
        ));
    }

    #[test]
    fn rejects_non_image_mime() {
        let raw = format!("data:text/plain;base64,{}", BASE64.encode(b"hello"));
        assert_eq!(
            ImagePayload::from_data_url(&raw),
            Err(DataUrlError::NotAnImage("text/plain".to_string()))
        );
    }

    #[test]
    fn from_file_sniffs_signature_over_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("product.jpg");
        fs::write(&path, PNG_HEADER)?;
        let payload = ImagePayload::from_file(&path)?;
        assert_eq!(payload.mime_type(), "image/png");
        assert_eq!(payload.extension(), "png");
        Ok(())
    }

    #[test]
    fn from_file_rejects_empty_and_unknown_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let empty = temp.path().join("empty.png");
        fs::write(&empty, b"")?;
        assert!(ImagePayload::from_file(&empty).is_err());

        let notes = temp.path().join("notes.txt");
        fs::write(&notes, b"plain words")?;
        assert!(ImagePayload::from_file(&notes).is_err());
        Ok(())
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let payload = ImagePayload::new(b"abc".to_vec(), "image/jpeg");
        assert_eq!(
            payload.sha256_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
