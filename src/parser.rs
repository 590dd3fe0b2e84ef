//! Turns free-form model output into validated [`Response`] values.
//!
//! Parsing is two-staged so callers can tell a formatting problem (the JSON
//! could not be found or decoded) from a content problem (the JSON does not
//! match the schema).

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::model::{Response, Settings};

const FENCE: &str = "```";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to decode JSON from model response: {source}\nExtracted string:\n{payload}")]
    MalformedPayload {
        #[source]
        source: serde_json::Error,
        payload: String,
    },
    #[error("Failed to validate data against the response schema: {detail}")]
    SchemaViolation { detail: String },
}

impl ParseError {
    /// Stable machine-readable code for front ends.
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::MalformedPayload { .. } => "malformed_payload",
            ParseError::SchemaViolation { .. } => "schema_violation",
        }
    }
}

/// Narrow `text` down to the part most likely to be the JSON payload.
///
/// 1. The interior of the first fenced block (optionally tagged `json`).
/// 2. Otherwise the span from the first `{` to the last `}`.
/// 3. Otherwise the trimmed text.
///
/// Braces are not balanced: a `}` inside a trailing string can widen the span.
pub fn extract_payload(text: &str) -> &str {
    if let Some(inner) = fenced_block(text) {
        debug!(len = inner.len(), "payload taken from fenced block");
        return inner.trim();
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Some(span) = text.get(start..=end) {
                debug!(start, end, "payload taken from outermost braces");
                return span;
            }
        }
    }
    text.trim()
}

fn fenced_block(text: &str) -> Option<&str> {
    let (_, after_open) = text.split_once(FENCE)?;
    let body = after_open.strip_prefix("json").unwrap_or(after_open);
    body.split_once(FENCE).map(|(inner, _)| inner)
}

/// Parse model output into a validated [`Response`].
pub fn parse_response(text: &str) -> Result<Response, ParseError> {
    let response: Response = decode(text)?;
    response
        .check()
        .map_err(|detail| ParseError::SchemaViolation { detail })?;
    Ok(response)
}

/// Parse model output that answers with bare settings. A full envelope is
/// accepted too and yields the settings for the first image.
pub fn parse_settings(text: &str) -> Result<Settings, ParseError> {
    settings_from_value(decode_tree(text)?)
}

/// Keys that only appear on the [`Response`] envelope.
const ENVELOPE_KEYS: [&str; 3] = ["global_settings", "masks", "per_image_adjustments"];

/// Resolve an already-decoded JSON value into settings.
///
/// An object carrying any envelope key is decoded as a [`Response`]. Any
/// other object must name at least one settings field.
pub fn settings_from_value(tree: Value) -> Result<Settings, ParseError> {
    let Value::Object(map) = &tree else {
        return Err(ParseError::SchemaViolation {
            detail: format!("expected a settings object, found {tree}"),
        });
    };
    if ENVELOPE_KEYS.iter().any(|key| map.contains_key(*key)) {
        debug!("settings taken from a full response envelope");
        let response: Response = typed(tree)?;
        response
            .check()
            .map_err(|detail| ParseError::SchemaViolation { detail })?;
        return Ok(response.settings_for_image(1));
    }
    if !map.keys().any(|key| Settings::field(key).is_some()) {
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        return Err(ParseError::SchemaViolation {
            detail: format!("no develop settings found (keys: [{}])", keys.join(", ")),
        });
    }
    typed(tree)
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    typed(decode_tree(text)?)
}

fn decode_tree(text: &str) -> Result<Value, ParseError> {
    let payload = extract_payload(text);
    serde_json::from_str(payload).map_err(|source| ParseError::MalformedPayload {
        source,
        payload: payload.to_string(),
    })
}

fn typed<T: DeserializeOwned>(tree: Value) -> Result<T, ParseError> {
    serde_json::from_value(tree).map_err(|e| ParseError::SchemaViolation {
        detail: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_fenced_block() {
        let text = "Here is your response:\n```json\n{\"global_settings\": {\"exposure\": 0.5}}\n```\nEnjoy!";
        assert_eq!(
            extract_payload(text),
            "{\"global_settings\": {\"exposure\": 0.5}}"
        );
    }

    #[test]
    fn extracts_untagged_fenced_block() {
        let text = "```\n  {\"a\": 1}  \n```";
        assert_eq!(extract_payload(text), "{\"a\": 1}");
    }

    #[test]
    fn clean_json_is_returned_unchanged() {
        let text = "{\"global_settings\": {\"exposure\": 0.5}}";
        assert_eq!(extract_payload(text), text);
    }

    #[test]
    fn only_first_fence_pair_is_honored() {
        let text = "```json\n{\"first\": 1}\n```\ntext\n```json\n{\"second\": 2}\n```";
        assert_eq!(extract_payload(text), "{\"first\": 1}");
    }

    #[test]
    fn braces_span_first_to_last() {
        let text = "Sure! {\"a\": {\"b\": 1}} hope that helps }";
        assert_eq!(extract_payload(text), "{\"a\": {\"b\": 1}} hope that helps }");
    }

    #[test]
    fn prose_without_json_is_trimmed() {
        assert_eq!(extract_payload("  Not JSON at all \n"), "Not JSON at all");
        assert_eq!(extract_payload("} backwards {"), "} backwards {");
    }

    #[test]
    fn unterminated_fence_falls_back_to_braces() {
        let text = "```json\n{\"a\": 1}";
        assert_eq!(extract_payload(text), "{\"a\": 1}");
    }

    #[test]
    fn parses_full_example() {
        let text = r#"
    ```json
    {
      "analysis": "Great photo.",
      "global_settings": {
        "exposure": 0.30,
        "contrast": -5,
        "highlights": -35,
        "shadows": 25,
        "whites": 10,
        "blacks": -12,
        "color_temp": 5500,
        "tint": 5,
        "vibrance": 10,
        "saturation": -2,
        "texture": 15,
        "clarity": 10,
        "dehaze": 0,
        "sharpening": 40,
        "noise_reduction_luminance": 15
      },
      "masks": [
        {
          "type": "Subject Mask",
          "creation_instructions": "Select Subject",
          "settings": {
            "exposure": 0.1,
            "texture": 15
          }
        }
      ],
      "per_image_adjustments": []
    }
    ```
    "#;
        let response = parse_response(text).unwrap();
        assert_eq!(response.analysis.as_deref(), Some("Great photo."));
        let global = response.global_settings.as_ref().expect("global settings");
        assert_eq!(global.exposure, Some(0.30));
        assert_eq!(global.contrast, Some(-5));
        assert_eq!(global.dehaze, Some(0));
        assert_eq!(response.masks.len(), 1);
        assert_eq!(response.masks[0].mask_type, "Subject Mask");
        assert_eq!(response.masks[0].settings.texture, Some(15));
        assert!(response.per_image_adjustments.is_empty());
    }

    #[test]
    fn garbage_is_malformed_payload() {
        let err = parse_response("Not JSON at all").unwrap_err();
        assert!(matches!(err, ParseError::MalformedPayload { .. }));
        assert_eq!(err.kind(), "malformed_payload");
        assert!(err.to_string().contains("Failed to decode JSON"));
        assert!(err.to_string().contains("Not JSON at all"));
    }

    #[test]
    fn wrong_shape_is_schema_violation() {
        let err = parse_response(r#"{"global_settings": "Not an object"}"#).unwrap_err();
        assert!(matches!(err, ParseError::SchemaViolation { .. }));
        assert!(err.to_string().contains("Failed to validate data"));
    }

    #[test]
    fn top_level_array_is_schema_violation() {
        let err = parse_response("[1, 2, 3]").unwrap_err();
        assert_eq!(err.kind(), "schema_violation");
    }

    #[test]
    fn zero_image_index_is_schema_violation() {
        let err = parse_response(
            r#"{"per_image_adjustments": [{"image_index": 0, "settings": {"exposure": 1}}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "schema_violation");
    }

    #[test]
    fn clarification_only_response_is_valid() {
        let response =
            parse_response(r#"{"clarification_needed": "The image is completely black."}"#)
                .unwrap();
        assert!(response.global_settings.is_none());
        assert_eq!(
            response.clarification_needed.as_deref(),
            Some("The image is completely black.")
        );
    }

    #[test]
    fn parses_bare_settings_wrapped_in_prose() {
        let settings =
            parse_settings("The edit I'd suggest: {\"exposure\": 0.35, \"contrast\": 15} Enjoy.")
                .unwrap();
        assert_eq!(settings.exposure, Some(0.35));
        assert_eq!(settings.contrast, Some(15));
    }

    #[test]
    fn full_envelope_yields_first_image_settings() {
        let text = "```json\n{\"analysis\":\"ok\",\"global_settings\":{\"exposure\":0.5,\"contrast\":10},\
                    \"per_image_adjustments\":[{\"image_index\":1,\"settings\":{\"contrast\":20}}]}\n```";
        let settings = parse_settings(text).unwrap();
        assert_eq!(settings.exposure, Some(0.5));
        assert_eq!(settings.contrast, Some(20));
    }

    #[test]
    fn object_without_settings_fields_is_schema_violation() {
        let err = parse_settings(r#"{"analysis": "ok", "notes": 3}"#).unwrap_err();
        assert_eq!(err.kind(), "schema_violation");
        assert!(err.to_string().contains("analysis"));
        assert_eq!(parse_settings("{}").unwrap_err().kind(), "schema_violation");
        assert_eq!(parse_settings("[1]").unwrap_err().kind(), "schema_violation");
    }

    #[test]
    fn envelope_object_value_resolves_through_response() {
        let value = serde_json::json!({"global_settings": {"tint": 5}});
        let settings = settings_from_value(value).unwrap();
        assert_eq!(settings.tint, Some(5));
        assert!(!settings.is_empty());
    }

    #[test]
    fn envelope_with_zero_index_is_rejected() {
        let value = serde_json::json!({
            "per_image_adjustments": [{"image_index": 0, "settings": {"exposure": 1}}]
        });
        assert_eq!(settings_from_value(value).unwrap_err().kind(), "schema_violation");
    }
}
