use crate::error::{ClassifierError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ImageNet normalization constants
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

const DEFAULT_CROP_PCT: f32 = 0.875;

/// How raw 0..=255 pixel values are mapped into the range the model was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PixelNormalization {
    /// `pixel / 127.5 - 1.0`, range [-1, 1].
    SignedUnit,
    /// `pixel / 255.0`, range [0, 1].
    UnitRange,
    /// `(pixel / 255.0 - mean) / std` per channel.
    MeanStd { mean: [f32; 3], std: [f32; 3] },
}

impl PixelNormalization {
    pub fn imagenet() -> Self {
        PixelNormalization::MeanStd {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, the Keras default.
    Nhwc,
    /// `[1, 3, H, W]`, the PyTorch/ONNX default.
    Nchw,
}

/// Strategy for bringing an arbitrary aspect ratio to the square model input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitMode {
    /// Take the centered square covering `crop_pct` of the short edge, then scale it.
    CenterCrop { crop_pct: f32 },
    /// Scale the long edge to the input size and pad the rest with `fill`.
    Pad { fill: [u8; 3] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// The model ends in a softmax already.
    Probabilities,
    /// Raw scores; softmax is applied after inference.
    Logits,
}

/// Known model families with the preprocessing they were trained with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelPreset {
    KerasMobileNet,
    ImageNetOnnx,
}

impl ModelPreset {
    pub fn input_size(&self) -> u32 {
        match self {
            ModelPreset::KerasMobileNet | ModelPreset::ImageNetOnnx => 224,
        }
    }

    /// Expands the preset into the full model settings for the file at `path`.
    pub fn spec(&self, path: impl Into<PathBuf>) -> ModelSpec {
        let path = path.into();
        match self {
            ModelPreset::KerasMobileNet => ModelSpec {
                path,
                input_size: self.input_size(),
                normalization: PixelNormalization::SignedUnit,
                layout: TensorLayout::Nhwc,
                fit: FitMode::Pad { fill: [0, 0, 0] },
                output: OutputKind::Probabilities,
                use_gpu: false,
                intra_threads: default_intra_threads(),
            },
            ModelPreset::ImageNetOnnx => ModelSpec {
                path,
                input_size: self.input_size(),
                normalization: PixelNormalization::imagenet(),
                layout: TensorLayout::Nchw,
                fit: FitMode::CenterCrop {
                    crop_pct: DEFAULT_CROP_PCT,
                },
                output: OutputKind::Logits,
                use_gpu: false,
                intra_threads: default_intra_threads(),
            },
        }
    }
}

/// A model artifact together with every preprocessing choice that has to match it.
///
/// Normalization, layout and input size are only meaningful for the weights they were
/// trained with, so they live here instead of being configured independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub path: PathBuf,
    pub input_size: u32,
    pub normalization: PixelNormalization,
    pub layout: TensorLayout,
    pub fit: FitMode,
    pub output: OutputKind,
    #[serde(default)]
    pub use_gpu: bool,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

impl ModelSpec {
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(ClassifierError::config("input_size must be greater than 0"));
        }
        if self.intra_threads == 0 {
            return Err(ClassifierError::config(
                "intra_threads must be greater than 0",
            ));
        }
        if let FitMode::CenterCrop { crop_pct } = self.fit {
            if !(crop_pct > 0.0 && crop_pct <= 1.0) {
                return Err(ClassifierError::config(format!(
                    "crop_pct must be in (0, 1], got {crop_pct}"
                )));
            }
        }
        if let PixelNormalization::MeanStd { mean, std } = &self.normalization {
            for (i, &s) in std.iter().enumerate() {
                if !(s > 0.0 && s.is_finite()) {
                    return Err(ClassifierError::config(format!(
                        "std at index {i} must be greater than 0, got {s}"
                    )));
                }
            }
            if let Some(m) = mean.iter().find(|m| !m.is_finite()) {
                return Err(ClassifierError::config(format!("mean {m} is not finite")));
            }
        }
        Ok(())
    }
}

fn default_intra_threads() -> usize {
    4
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelSpec,
    pub labels_path: PathBuf,
    /// JSON catalog replacing the built-in suggestions.
    #[serde(default)]
    pub suggestions_path: Option<PathBuf>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Predictions below this confidence are flagged as unsure.
    #[serde(default)]
    pub min_confidence: f32,
}

impl AppConfig {
    pub fn from_preset(
        preset: ModelPreset,
        model_path: impl Into<PathBuf>,
        labels_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            model: preset.spec(model_path),
            labels_path: labels_path.into(),
            suggestions_path: None,
            top_k: default_top_k(),
            min_confidence: 0.0,
        }
    }

    /// Reads a JSON config file. Relative resource paths are resolved against the
    /// directory holding the config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClassifierError::config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut config: AppConfig = serde_json::from_str(&content)?;

        if let Some(base) = path.parent() {
            config.model.path = resolve(base, &config.model.path);
            config.labels_path = resolve(base, &config.labels_path);
            config.suggestions_path = config.suggestions_path.map(|p| resolve(base, &p));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        if self.top_k == 0 {
            return Err(ClassifierError::config("top_k must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ClassifierError::config(format!(
                "min_confidence must be in [0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
