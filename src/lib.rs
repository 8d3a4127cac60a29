pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

pub use config::{AppConfig, ModelPreset, ModelSpec};
pub use error::{ClassifierError, Result};
pub use models::classify_types::{Prediction, PredictionResult};
pub use services::classifier::inference::{Classifier, OnnxClassifier, ProbabilityVector};
pub use services::classifier::labels::LabelTable;
pub use services::classifier::model_manager::{ModelManager, ModelState};
pub use services::classifier::normalizer::{ImageNormalizer, InputTensor};
pub use services::pipeline::ClassificationPipeline;
pub use services::suggestion_service::SuggestionCatalog;
pub use state::AppState;
