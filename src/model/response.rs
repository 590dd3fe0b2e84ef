use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::settings::{MaskSettings, Settings};

/// A local adjustment the editor should create by hand (Lightroom masks
/// cannot be expressed as plain crs attributes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Mask {
    /// Mask kind as named in Lightroom, e.g. "Subject Mask" or "Sky Mask".
    #[serde(rename = "type")]
    pub mask_type: String,
    /// Human-readable steps for creating the mask.
    #[serde(default)]
    pub creation_instructions: String,
    pub settings: MaskSettings,
}

/// Overrides for one image of a batch, relative to the global settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PerImageAdjustment {
    /// 1-based position of the image in the request.
    pub image_index: u32,
    pub settings: Settings,
}

/// Top-level envelope a model answers with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Response {
    /// Set when the model could not produce a confident answer.
    #[serde(default)]
    pub clarification_needed: Option<String>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub global_settings: Option<Settings>,
    /// Applied in order.
    #[serde(default)]
    pub masks: Vec<Mask>,
    #[serde(default)]
    pub per_image_adjustments: Vec<PerImageAdjustment>,
}

impl Response {
    pub fn from_settings(settings: Settings) -> Self {
        Self {
            global_settings: Some(settings),
            ..Self::default()
        }
    }

    /// Global settings with every override for `image_index` applied in order.
    pub fn settings_for_image(&self, image_index: u32) -> Settings {
        let base = self.global_settings.clone().unwrap_or_default();
        self.per_image_adjustments
            .iter()
            .filter(|adj| adj.image_index == image_index)
            .fold(base, |acc, adj| acc.overlay(&adj.settings))
    }

    /// First violation of a constraint serde cannot express on its own.
    pub(crate) fn check(&self) -> Result<(), String> {
        match self
            .per_image_adjustments
            .iter()
            .position(|adj| adj.image_index == 0)
        {
            Some(pos) => Err(format!(
                "per_image_adjustments[{pos}].image_index must be a positive 1-based index, got 0"
            )),
            None => Ok(()),
        }
    }
}
