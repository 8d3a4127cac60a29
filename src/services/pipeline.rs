use crate::error::{ClassifierError, Result};
use crate::models::classify_types::{Prediction, PredictionResult};
use crate::services::classifier::labels::LabelTable;
use crate::services::classifier::model_manager::ModelManager;
use crate::services::classifier::normalizer::ImageNormalizer;
use crate::services::fs_service;
use crate::services::suggestion_service::SuggestionCatalog;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// image -> normalized tensor -> class index -> label -> suggestions.
///
/// Holds only shared read-only collaborators, so one pipeline serves any number of
/// threads. Each call either returns a complete result or the first stage error.
#[derive(Clone)]
pub struct ClassificationPipeline {
    normalizer: ImageNormalizer,
    model: Arc<ModelManager>,
    labels: Arc<LabelTable>,
    catalog: Arc<SuggestionCatalog>,
    top_k: usize,
}

impl ClassificationPipeline {
    /// The normalizer is derived from the model settings so the two cannot disagree.
    pub fn new(
        model: Arc<ModelManager>,
        labels: Arc<LabelTable>,
        catalog: Arc<SuggestionCatalog>,
    ) -> Self {
        Self {
            normalizer: ImageNormalizer::from_spec(model.spec()),
            model,
            labels,
            catalog,
            top_k: 1,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn catalog(&self) -> &SuggestionCatalog {
        &self.catalog
    }

    pub fn model(&self) -> &ModelManager {
        &self.model
    }

    pub fn classify(&self, image: &DynamicImage) -> Result<PredictionResult> {
        let tensor = self.normalizer.normalize(image)?;
        let classifier = self.model.classifier()?;
        let probs = classifier.predict(&tensor)?;

        if probs.len() != self.labels.len() {
            return Err(ClassifierError::OutputWidthMismatch {
                expected: self.labels.len(),
                actual: probs.len(),
            });
        }
        probs.check_distribution()?;

        let index = probs
            .argmax()
            .ok_or_else(|| ClassifierError::inference("classifier returned no scores"))?;
        let label = self.labels.get(index)?;
        let confidence = probs.get(index).unwrap_or_default();
        debug!(label, index, confidence, "classified image");

        let ranked = probs
            .top_k(self.top_k)
            .into_iter()
            .map(|(idx, conf)| {
                Ok(Prediction {
                    class_name: self.labels.get(idx)?.to_string(),
                    confidence: conf,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let entry = self.catalog.entry(label);
        Ok(PredictionResult {
            label: label.to_string(),
            confidence,
            suggestions: entry.steps.clone(),
            image_urls: entry.image_urls.clone(),
            ranked,
        })
    }

    pub fn classify_path(&self, path: &Path) -> Result<PredictionResult> {
        let image = fs_service::load_image(path)?;
        self.classify(&image)
    }

    pub fn classify_bytes(&self, bytes: &[u8]) -> Result<PredictionResult> {
        let image = fs_service::decode_bytes(bytes)?;
        self.classify(&image)
    }
}
