use crate::config::ModelSpec;
use crate::error::{ClassifierError, Result};
use crate::services::classifier::inference::{Classifier, OnnxClassifier};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{error, info};

/// Result of the one-time model load. Call sites must handle `NotLoaded` explicitly.
#[derive(Clone)]
pub enum ModelState {
    Loaded(Arc<dyn Classifier>),
    NotLoaded { reason: String },
}

impl std::fmt::Debug for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelState::Loaded(_) => f.write_str("Loaded"),
            ModelState::NotLoaded { reason } => {
                f.debug_struct("NotLoaded").field("reason", reason).finish()
            }
        }
    }
}

pub type ClassifierLoader = dyn Fn(&ModelSpec) -> Result<Arc<dyn Classifier>> + Send + Sync;

/// Owns the model for the lifetime of the process.
///
/// The load runs lazily on first use and at most once, even under concurrent first
/// access. A failed load is never retried: the caller that triggered it receives the
/// `ModelLoad` error and every later caller gets `ModelNotLoaded` with the same reason.
pub struct ModelManager {
    spec: ModelSpec,
    state: OnceLock<ModelState>,
    loader: Box<ClassifierLoader>,
}

impl ModelManager {
    /// Lazily loads `spec.path` with ONNX Runtime.
    pub fn new(spec: ModelSpec) -> Self {
        Self::with_loader(spec, |spec| {
            OnnxClassifier::load(spec).map(|c| Arc::new(c) as Arc<dyn Classifier>)
        })
    }

    pub fn with_loader<F>(spec: ModelSpec, loader: F) -> Self
    where
        F: Fn(&ModelSpec) -> Result<Arc<dyn Classifier>> + Send + Sync + 'static,
    {
        Self {
            spec,
            state: OnceLock::new(),
            loader: Box::new(loader),
        }
    }

    /// Wraps an already constructed classifier; no load will ever run.
    pub fn from_classifier(spec: ModelSpec, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            spec,
            state: OnceLock::from(ModelState::Loaded(classifier)),
            loader: Box::new(no_loader),
        }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Returns the loaded classifier, loading it first if needed.
    pub fn classifier(&self) -> Result<Arc<dyn Classifier>> {
        let mut fresh_error = None;
        let state = self.state.get_or_init(|| {
            let start = Instant::now();
            info!(path = %self.spec.path.display(), "loading model");
            match (self.loader)(&self.spec) {
                Ok(classifier) => {
                    info!(
                        path = %self.spec.path.display(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "model loaded"
                    );
                    ModelState::Loaded(classifier)
                }
                Err(e) => {
                    error!(path = %self.spec.path.display(), "model load failed: {}", e);
                    let reason = e.to_string();
                    fresh_error = Some(e);
                    ModelState::NotLoaded { reason }
                }
            }
        });

        if let Some(e) = fresh_error {
            return Err(e);
        }

        match state {
            ModelState::Loaded(classifier) => Ok(Arc::clone(classifier)),
            ModelState::NotLoaded { reason } => Err(ClassifierError::ModelNotLoaded {
                reason: reason.clone(),
            }),
        }
    }

    /// State without triggering a load; `None` until the first use.
    pub fn state(&self) -> Option<&ModelState> {
        self.state.get()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state.get(), Some(ModelState::Loaded(_)))
    }

    pub fn get_error(&self) -> Option<String> {
        match self.state.get() {
            Some(ModelState::NotLoaded { reason }) => Some(reason.clone()),
            _ => None,
        }
    }
}

fn no_loader(spec: &ModelSpec) -> Result<Arc<dyn Classifier>> {
    Err(ClassifierError::ModelLoad {
        path: spec.path.clone(),
        message: "preloaded manager has no loader".to_string(),
    })
}
