use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── Field vocabulary ─────────────────────────────────────────────

/// Numeric type of a develop field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Real,
    Integer,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Real => "number",
            FieldKind::Integer => "integer",
        }
    }
}

/// Static description of one develop field: JSON key, Camera Raw attribute
/// name, numeric type and the typical range. Ranges are hints for the model,
/// never enforced.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub attribute: &'static str,
    pub kind: FieldKind,
    pub min: f64,
    pub max: f64,
    pub group: &'static str,
}

const fn real(name: &'static str, attribute: &'static str, min: f64, max: f64, group: &'static str) -> FieldSpec {
    FieldSpec { name, attribute, kind: FieldKind::Real, min, max, group }
}

const fn int(name: &'static str, attribute: &'static str, min: f64, max: f64, group: &'static str) -> FieldSpec {
    FieldSpec { name, attribute, kind: FieldKind::Integer, min, max, group }
}

/// A single field value. Integers render without a decimal point, reals
/// always carry one (`1.0`, `-0.5`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Real(f64),
    Integer(i64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Real(v) => {
                let text = v.to_string();
                if v.is_finite() && !text.contains('.') && !text.contains('e') {
                    write!(f, "{text}.0")
                } else {
                    f.write_str(&text)
                }
            }
        }
    }
}

impl FieldValue {
    /// Parse an attribute value as written by Lightroom (`+0.35`, `-12`).
    pub fn parse(kind: FieldKind, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match kind {
            FieldKind::Real => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(FieldValue::Real),
            FieldKind::Integer => raw.parse::<i64>().ok().map(FieldValue::Integer),
        }
    }

    pub fn to_json(self) -> Value {
        match self {
            FieldValue::Real(v) => serde_json::json!(v),
            FieldValue::Integer(v) => serde_json::json!(v),
        }
    }
}

// ── Settings ─────────────────────────────────────────────────────

/// Suggested develop adjustments. Every field is independently optional:
/// `None` means "no suggestion", which is not the same as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Settings {
    // Basic tone
    /// Exposure2012 (e.g. -5.0 to 5.0)
    #[serde(default, deserialize_with = "lenient::real")]
    pub exposure: Option<f64>,
    /// Contrast2012 (e.g. -100 to 100)
    #[serde(default, deserialize_with = "lenient::integer")]
    pub contrast: Option<i32>,
    /// Highlights2012 (e.g. -100 to 100)
    #[serde(default, deserialize_with = "lenient::integer")]
    pub highlights: Option<i32>,
    /// Shadows2012 (e.g. -100 to 100)
    #[serde(default, deserialize_with = "lenient::integer")]
    pub shadows: Option<i32>,
    /// Whites2012 (e.g. -100 to 100)
    #[serde(default, deserialize_with = "lenient::integer")]
    pub whites: Option<i32>,
    /// Blacks2012 (e.g. -100 to 100)
    #[serde(default, deserialize_with = "lenient::integer")]
    pub blacks: Option<i32>,

    // Presence
    /// Texture (e.g. -100 to 100)
    #[serde(default, deserialize_with = "lenient::integer")]
    pub texture: Option<i32>,
    /// Clarity2012 (e.g. -100 to 100)
    #[serde(default, deserialize_with = "lenient::integer")]
    pub clarity: Option<i32>,
    /// Dehaze (e.g. -100 to 100)
    #[serde(default, deserialize_with = "lenient::integer")]
    pub dehaze: Option<i32>,
    /// Vibrance (e.g. -100 to 100)
    #[serde(default, deserialize_with = "lenient::integer")]
    pub vibrance: Option<i32>,
    /// Saturation (e.g. -100 to 100)
    #[serde(default, deserialize_with = "lenient::integer")]
    pub saturation: Option<i32>,

    // Color
    /// Temperature (e.g. 2000 to 50000)
    #[serde(default, deserialize_with = "lenient::integer")]
    pub color_temp: Option<i32>,
    /// Tint (e.g. -150 to 150)
    #[serde(default, deserialize_with = "lenient::integer")]
    pub tint: Option<i32>,
}

/// Per-mask adjustments share the global field set.
pub type MaskSettings = Settings;

impl Settings {
    /// Field table in declaration order. Drives the prompt schema, the XMP
    /// attribute mapping and the bridge parameter names.
    pub const FIELDS: &'static [FieldSpec] = &[
        real("exposure", "Exposure2012", -5.0, 5.0, "Basic Tone"),
        int("contrast", "Contrast2012", -100.0, 100.0, "Basic Tone"),
        int("highlights", "Highlights2012", -100.0, 100.0, "Basic Tone"),
        int("shadows", "Shadows2012", -100.0, 100.0, "Basic Tone"),
        int("whites", "Whites2012", -100.0, 100.0, "Basic Tone"),
        int("blacks", "Blacks2012", -100.0, 100.0, "Basic Tone"),
        int("texture", "Texture", -100.0, 100.0, "Presence"),
        int("clarity", "Clarity2012", -100.0, 100.0, "Presence"),
        int("dehaze", "Dehaze", -100.0, 100.0, "Presence"),
        int("vibrance", "Vibrance", -100.0, 100.0, "Presence"),
        int("saturation", "Saturation", -100.0, 100.0, "Presence"),
        int("color_temp", "Temperature", 2000.0, 50000.0, "Color"),
        int("tint", "Tint", -150.0, 150.0, "Color"),
    ];

    pub fn field(name: &str) -> Option<&'static FieldSpec> {
        Self::FIELDS.iter().find(|spec| spec.name == name)
    }

    pub fn field_by_attribute(attribute: &str) -> Option<&'static FieldSpec> {
        Self::FIELDS.iter().find(|spec| spec.attribute == attribute)
    }

    /// Value of the named field, or `None` when unset or unknown.
    pub fn value(&self, name: &str) -> Option<FieldValue> {
        let int = |v: Option<i32>| v.map(|v| FieldValue::Integer(i64::from(v)));
        match name {
            "exposure" => self.exposure.map(FieldValue::Real),
            "contrast" => int(self.contrast),
            "highlights" => int(self.highlights),
            "shadows" => int(self.shadows),
            "whites" => int(self.whites),
            "blacks" => int(self.blacks),
            "texture" => int(self.texture),
            "clarity" => int(self.clarity),
            "dehaze" => int(self.dehaze),
            "vibrance" => int(self.vibrance),
            "saturation" => int(self.saturation),
            "color_temp" => int(self.color_temp),
            "tint" => int(self.tint),
            _ => None,
        }
    }

    /// Set the named field. Returns `false` for unknown names or values that
    /// do not fit the field's type.
    pub fn set(&mut self, name: &str, value: FieldValue) -> bool {
        let slot = match name {
            "exposure" => {
                self.exposure = Some(match value {
                    FieldValue::Real(v) => v,
                    #[allow(clippy::cast_precision_loss)]
                    FieldValue::Integer(v) => v as f64,
                });
                return true;
            }
            "contrast" => &mut self.contrast,
            "highlights" => &mut self.highlights,
            "shadows" => &mut self.shadows,
            "whites" => &mut self.whites,
            "blacks" => &mut self.blacks,
            "texture" => &mut self.texture,
            "clarity" => &mut self.clarity,
            "dehaze" => &mut self.dehaze,
            "vibrance" => &mut self.vibrance,
            "saturation" => &mut self.saturation,
            "color_temp" => &mut self.color_temp,
            "tint" => &mut self.tint,
            _ => return false,
        };
        let converted = match value {
            FieldValue::Integer(v) => i32::try_from(v).ok(),
            FieldValue::Real(v) => lenient::integral(v),
        };
        match converted {
            Some(v) => {
                *slot = Some(v);
                true
            }
            None => false,
        }
    }

    /// Set fields paired with their spec, in table order.
    pub fn entries(&self) -> impl Iterator<Item = (&'static FieldSpec, FieldValue)> + '_ {
        Self::FIELDS
            .iter()
            .filter_map(move |spec| self.value(spec.name).map(|v| (spec, v)))
    }

    pub fn set_count(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.set_count() == 0
    }

    /// Copy of `self` with every field set in `other` taking precedence.
    pub fn overlay(&self, other: &Settings) -> Settings {
        let mut merged = self.clone();
        for (spec, value) in other.entries() {
            merged.set(spec.name, value);
        }
        merged
    }
}

// ── Lenient numeric decoding ─────────────────────────────────────

/// Model output is loosely typed: integers arrive as `10.0` or `"10"`.
/// These accept what a lax validator would and reject everything else.
pub(crate) mod lenient {
    use super::{Deserialize, Deserializer, Value};
    use serde::de::Error;

    pub(crate) fn integral(v: f64) -> Option<i32> {
        if v.is_finite() && v.fract() == 0.0 && v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX) {
            #[allow(clippy::cast_possible_truncation)]
            Some(v as i32)
        } else {
            None
        }
    }

    pub(crate) fn integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match &raw {
            Value::Null => Ok(None),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i32::try_from(i)
                        .map(Some)
                        .map_err(|_| D::Error::custom(format!("integer {i} is out of range")))
                } else {
                    n.as_f64()
                        .and_then(integral)
                        .map(Some)
                        .ok_or_else(|| D::Error::custom(format!("expected an integer, found {n}")))
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i32>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("expected an integer, found string {s:?}"))),
            other => Err(D::Error::custom(format!(
                "expected an integer, found {}",
                describe(other)
            ))),
        }
    }

    pub(crate) fn real<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match &raw {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("expected a number, found {n}"))),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("expected a number, found string {s:?}"))),
            other => Err(D::Error::custom(format!(
                "expected a number, found {}",
                describe(other)
            ))),
        }
    }

    fn describe(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "a boolean",
            Value::Number(_) => "a number",
            Value::String(_) => "a string",
            Value::Array(_) => "an array",
            Value::Object(_) => "an object",
        }
    }
}
