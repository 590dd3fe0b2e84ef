//! Instruction text sent to vision models.
//!
//! The schema description is rendered from [`Settings::FIELDS`] so the prompt,
//! the XMP mapping and the bridge stay in lockstep without runtime reflection.

use std::fmt::Write as _;
use std::path::Path;

use schemars::schema_for;
use serde_json::Value;

use crate::model::{FieldKind, Response, Settings};
use crate::xmp;

const ROLE: &str = "You are an expert professional photographer and color grader. \
Analyze the provided image and suggest Adobe Lightroom develop settings to make it look \
stunning, perfectly exposed, and beautifully color-graded.";

const OUTPUT_RULE: &str = "CRITICAL INSTRUCTION: You MUST evaluate the attached image and \
output the final JSON immediately. DO NOT use any tools to search files, do not read code. \
Just look at the image and output the raw JSON!";

/// System message for chat-style APIs.
pub const SYSTEM_PROMPT: &str = "You are a professional Lightroom master editor.";

/// Inputs that shape the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptContext<'a> {
    /// Path the model can open itself (CLI agents). API providers attach the
    /// bytes instead and leave this empty.
    pub image_path: Option<&'a Path>,
    /// Current sidecar, if any.
    pub existing_xmp: Option<&'a str>,
}

/// Human-readable field list, grouped as in Lightroom's Basic panel.
pub fn schema_description() -> String {
    let mut out = String::new();
    let mut group = "";
    for spec in Settings::FIELDS {
        if spec.group != group {
            group = spec.group;
            let _ = writeln!(out, "{group}:");
        }
        let range = match spec.kind {
            FieldKind::Real => format!("{:.1} to {:.1}", spec.min, spec.max),
            FieldKind::Integer => format!("{} to {}", spec.min, spec.max),
        };
        let _ = writeln!(
            out,
            "  - {} ({}, {range}) -> crs:{}",
            spec.name,
            spec.kind.as_str(),
            spec.attribute
        );
    }
    out
}

/// JSON schema of the [`Response`] envelope.
pub fn response_json_schema() -> Value {
    let root = schema_for!(Response);
    serde_json::to_value(root).unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}

/// The full instruction for one image.
pub fn build_prompt(ctx: &PromptContext<'_>) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{ROLE}");
    let _ = writeln!(
        prompt,
        "You MUST output ONLY valid JSON matching this JSON schema:\n{}",
        response_json_schema()
    );
    let _ = write!(
        prompt,
        "\nEvery field is optional; omit a field rather than guessing. Fields:\n{}",
        schema_description()
    );
    let _ = writeln!(
        prompt,
        "Put local adjustments in \"masks\". If the image cannot be judged, set \
\"clarification_needed\" and leave the settings out."
    );

    if let Some(existing) = ctx.existing_xmp {
        let _ = write!(
            prompt,
            "\nHere are the current XMP settings for reference (they may be sub-optimal or zeroed):\n```xml\n{}\n```\n",
            existing.trim()
        );
        if let Ok(current) = xmp::read_settings(existing) {
            if !current.is_empty() {
                let values: Vec<String> = current
                    .entries()
                    .map(|(spec, value)| format!("{}={value}", spec.name))
                    .collect();
                let _ = writeln!(prompt, "Currently set: {}", values.join(", "));
            }
        }
    }

    let _ = write!(prompt, "\n{OUTPUT_RULE}");
    if let Some(path) = ctx.image_path {
        let _ = write!(prompt, "\nImage file: {}", path.display());
    }
    prompt
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn description_lists_every_field() {
        let text = schema_description();
        for spec in Settings::FIELDS {
            assert!(text.contains(spec.name), "missing {}", spec.name);
            assert!(text.contains(&format!("crs:{}", spec.attribute)));
        }
        assert!(text.contains("exposure (number, -5.0 to 5.0)"));
        assert!(text.contains("color_temp (integer, 2000 to 50000)"));
        assert!(text.starts_with("Basic Tone:"));
    }

    #[test]
    fn schema_names_envelope_properties() {
        let schema = response_json_schema();
        let props = schema["properties"].as_object().unwrap();
        for key in ["global_settings", "masks", "per_image_adjustments", "analysis"] {
            assert!(props.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn prompt_without_context() {
        let prompt = build_prompt(&PromptContext::default());
        assert!(prompt.starts_with("You are an expert professional photographer"));
        assert!(prompt.contains("output ONLY valid JSON"));
        assert!(prompt.contains("output the raw JSON!"));
        assert!(!prompt.contains("current XMP settings"));
        assert!(!prompt.contains("Image file:"));
    }

    #[test]
    fn prompt_with_xmp_and_path() {
        let existing = xmp::render(
            &Settings {
                contrast: Some(10),
                ..Settings::default()
            },
            None,
        );
        let path = Path::new("/tmp/IMG_1.jpg");
        let prompt = build_prompt(&PromptContext {
            image_path: Some(path),
            existing_xmp: Some(&existing),
        });
        assert!(prompt.contains("current XMP settings for reference"));
        assert!(prompt.contains("crs:Contrast2012=\"10\""));
        assert!(prompt.contains("Currently set: contrast=10"));
        assert!(prompt.ends_with("Image file: /tmp/IMG_1.jpg"));
    }
}
