use serde_json::Value;

/// Provider reply classified by the first matcher that accepts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseShape {
    /// `{"images": [{"url": ..}, ..]}` or `{"images": ["..", ..]}`
    ImageList(String),
    /// `{"image": {"url": ..}}`
    SingleImage(String),
    /// `{"url": ..}`
    BareUrl(String),
    /// `{"error": ".."}` with no usable image.
    ProviderError(String),
    Unrecognized,
}

impl ResponseShape {
    pub fn image_url(&self) -> Option<&str> {
        match self {
            Self::ImageList(url) | Self::SingleImage(url) | Self::BareUrl(url) => Some(url),
            Self::ProviderError(_) | Self::Unrecognized => None,
        }
    }
}

type ShapeMatcher = fn(&Value) -> Option<ResponseShape>;

/// Order matters: image shapes win over an `error` field in the same body.
const SHAPE_MATCHERS: &[ShapeMatcher] = &[
    match_image_list,
    match_single_image,
    match_bare_url,
    match_provider_error,
];

pub fn normalize_response(body: &Value) -> ResponseShape {
    SHAPE_MATCHERS
        .iter()
        .find_map(|matcher| matcher(body))
        .unwrap_or(ResponseShape::Unrecognized)
}

fn match_image_list(body: &Value) -> Option<ResponseShape> {
    let first = body.get("images")?.as_array()?.first()?;
    let url = match first {
        Value::String(url) => non_empty(url),
        Value::Object(obj) => obj.get("url").and_then(Value::as_str).and_then(non_empty),
        _ => None,
    }?;
    Some(ResponseShape::ImageList(url))
}

fn match_single_image(body: &Value) -> Option<ResponseShape> {
    let url = body
        .get("image")?
        .get("url")?
        .as_str()
        .and_then(non_empty)?;
    Some(ResponseShape::SingleImage(url))
}

fn match_bare_url(body: &Value) -> Option<ResponseShape> {
    let url = body.get("url")?.as_str().and_then(non_empty)?;
    Some(ResponseShape::BareUrl(url))
}

fn match_provider_error(body: &Value) -> Option<ResponseShape> {
    let message = body.get("error")?.as_str().and_then(non_empty)?;
    Some(ResponseShape::ProviderError(message))
}

/// Blank values do not count; anything else is returned exactly as sent.
fn non_empty(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }
    Some(raw.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{normalize_response, ResponseShape};

    #[test]
    fn equivalent_shapes_yield_identical_url() {
        let bodies = [
            json!({"images": [{"url": "https://x/a.png"}]}),
            json!({"images": ["https://x/a.png"]}),
            json!({"image": {"url": "https://x/a.png"}}),
            json!({"url": "https://x/a.png"}),
        ];
        for body in bodies {
            assert_eq!(
                normalize_response(&body).image_url(),
                Some("https://x/a.png"),
                "{body}"
            );
        }
    }

    #[test]
    fn first_image_of_the_list_wins() {
        let body = json!({
            "images": [{"url": "https://x/first.png"}, {"url": "https://x/second.png"}],
            "seed": 42,
        });
        assert_eq!(
            normalize_response(&body),
            ResponseShape::ImageList("https://x/first.png".to_string())
        );
    }

    #[test]
    fn matchers_apply_in_declared_order() {
        let body = json!({
            "url": "https://x/bare.png",
            "image": {"url": "https://x/single.png"},
            "images": [{"url": "https://x/list.png"}],
        });
        assert_eq!(
            normalize_response(&body),
            ResponseShape::ImageList("https://x/list.png".to_string())
        );

        let body = json!({
            "url": "https://x/bare.png",
            "image": {"url": "https://x/single.png"},
        });
        assert_eq!(
            normalize_response(&body),
            ResponseShape::SingleImage("https://x/single.png".to_string())
        );
    }

    #[test]
    fn unusable_list_falls_through_to_later_shapes() {
        let body = json!({"images": [], "url": "https://x/bare.png"});
        assert_eq!(
            normalize_response(&body),
            ResponseShape::BareUrl("https://x/bare.png".to_string())
        );

        let body = json!({"images": [{"content_type": "image/png"}], "image": {"url": "https://x/s.png"}});
        assert_eq!(
            normalize_response(&body),
            ResponseShape::SingleImage("https://x/s.png".to_string())
        );
    }

    #[test]
    fn provider_error_only_without_an_image() {
        assert_eq!(
            normalize_response(&json!({"error": "content policy"})),
            ResponseShape::ProviderError("content policy".to_string())
        );
        assert_eq!(
            normalize_response(&json!({"error": "partial", "url": "https://x/a.png"})),
            ResponseShape::BareUrl("https://x/a.png".to_string())
        );
    }

    #[test]
    fn extracted_values_are_not_rewritten() {
        assert_eq!(
            normalize_response(&json!({"url": " https://x/a.png\n"})),
            ResponseShape::BareUrl(" https://x/a.png\n".to_string())
        );
        assert_eq!(
            normalize_response(&json!({"error": "  quota exceeded "})),
            ResponseShape::ProviderError("  quota exceeded ".to_string())
        );
    }

    #[test]
    fn empty_or_foreign_bodies_are_unrecognized() {
        for body in [
            json!({}),
            json!([]),
            json!(null),
            json!({"url": ""}),
            json!({"url": 7}),
            json!({"image": "https://x/a.png"}),
            json!({"images": [""]}),
            json!({"error": "  "}),
            json!({"request_id": "abc", "status": "IN_QUEUE"}),
        ] {
            assert_eq!(normalize_response(&body), ResponseShape::Unrecognized, "{body}");
        }
    }
}
