use crate::config::AppConfig;
use crate::error::Result;
use crate::services::classifier::labels::LabelTable;
use crate::services::classifier::model_manager::ModelManager;
use crate::services::pipeline::ClassificationPipeline;
use crate::services::suggestion_service::SuggestionCatalog;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a caller needs, built once at startup and passed around explicitly.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: ClassificationPipeline,
}

impl AppState {
    /// Labels and suggestions are read immediately; the model loads on first use.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let manager = ModelManager::new(config.model.clone());
        Self::with_model(config, manager)
    }

    pub fn with_model(config: AppConfig, manager: ModelManager) -> Result<Self> {
        config.validate()?;

        let labels = LabelTable::from_file(&config.labels_path)?;
        info!(
            path = %config.labels_path.display(),
            count = labels.len(),
            "loaded labels"
        );

        let catalog = match &config.suggestions_path {
            Some(path) => SuggestionCatalog::from_file(path)?,
            None => SuggestionCatalog::builtin(),
        };
        let missing = catalog.missing_for(&labels);
        if !missing.is_empty() {
            warn!(?missing, "labels without suggestions will use the fallback text");
        }

        let pipeline = ClassificationPipeline::new(
            Arc::new(manager),
            Arc::new(labels),
            Arc::new(catalog),
        )
        .with_top_k(config.top_k);

        Ok(Self { config, pipeline })
    }
}
