pub mod response;
pub mod settings;

// Re-export commonly used types at the model level.
pub use response::{Mask, PerImageAdjustment, Response};
pub use settings::{FieldKind, FieldSpec, FieldValue, MaskSettings, Settings};
