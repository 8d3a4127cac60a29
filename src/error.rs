use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use thiserror::Error;

/// Every way a classification request (or the one-time setup behind it) can fail.
///
/// None of these are retried: a malformed image stays malformed and a missing
/// model file does not reappear, so they are all handed to the caller as-is.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The input bytes or file could not be interpreted as an image.
    #[error("failed to decode image {context}: {source}")]
    ImageDecode {
        context: String,
        #[source]
        source: image::ImageError,
    },

    /// The image decoded, but its pixel layout cannot be coerced to RGB.
    #[error("unsupported pixel format {format}: cannot convert to RGB")]
    UnsupportedFormat { format: String },

    #[error("failed to load model {}: {message}", path.display())]
    ModelLoad { path: PathBuf, message: String },

    /// Classification was requested while the model state is `NotLoaded`.
    #[error("model not loaded: {reason}")]
    ModelNotLoaded { reason: String },

    #[error("inference failed: {message}")]
    Inference { message: String },

    /// The classifier produced a different number of scores than there are labels.
    #[error("classifier produced {actual} scores but the label table has {expected} entries")]
    OutputWidthMismatch { expected: usize, actual: usize },

    #[error("label index {index} out of range for table of {len} labels")]
    LabelIndexOutOfRange { index: usize, len: usize },

    #[error("invalid label resource: {message}")]
    LabelLoad { message: String },

    #[error("configuration: {message}")]
    Config { message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClassifierError {
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn label_load(message: impl Into<String>) -> Self {
        Self::LabelLoad {
            message: message.into(),
        }
    }

    /// Short machine-readable name of the variant, used by callers that render errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ImageDecode { .. } => "image_decode",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::ModelLoad { .. } => "model_load",
            Self::ModelNotLoaded { .. } => "model_not_loaded",
            Self::Inference { .. } => "inference",
            Self::OutputWidthMismatch { .. } => "output_width_mismatch",
            Self::LabelIndexOutOfRange { .. } => "label_index_out_of_range",
            Self::LabelLoad { .. } => "label_load",
            Self::Config { .. } => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }

    /// True for failures tied to a single image; anything else disables
    /// classification until the setup is fixed.
    pub fn is_per_image(&self) -> bool {
        matches!(
            self,
            Self::ImageDecode { .. }
                | Self::UnsupportedFormat { .. }
                | Self::Inference { .. }
                | Self::Io(_)
        )
    }
}

impl From<ort::Error> for ClassifierError {
    fn from(err: ort::Error) -> Self {
        ClassifierError::Inference {
            message: err.to_string(),
        }
    }
}

impl Serialize for ClassifierError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ClassifierError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
