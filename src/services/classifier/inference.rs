use crate::config::{ModelSpec, OutputKind};
use crate::error::{ClassifierError, Result};
use crate::services::classifier::normalizer::InputTensor;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::sync::Mutex;

// Loose enough for float16 exports.
const SUM_TOLERANCE: f32 = 1e-2;

/// Anything that turns one normalized image into one score per class.
///
/// Implementations are shared read-only across requests, so they must be `Send + Sync`.
pub trait Classifier: Send + Sync {
    fn predict(&self, input: &InputTensor) -> Result<ProbabilityVector>;
}

/// Per-class scores, non-negative and summing to roughly one.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityVector(Vec<f32>);

impl ProbabilityVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Numerically stable softmax over raw logits.
    pub fn from_logits(logits: &[f32]) -> Self {
        let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
        Self(
            logits
                .iter()
                .map(|&x| (x - max_logit).exp() / exp_sum)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Rejects vectors that are not a probability distribution: any negative or
    /// non-finite entry, or a sum further than `SUM_TOLERANCE` from one.
    pub fn check_distribution(&self) -> Result<()> {
        if let Some((idx, p)) = self
            .0
            .iter()
            .enumerate()
            .find(|(_, p)| !p.is_finite() || **p < 0.0)
        {
            return Err(ClassifierError::inference(format!(
                "score {p} at index {idx} is not a probability; \
                 is the model output declared as probabilities but really logits?"
            )));
        }
        let sum: f32 = self.0.iter().sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(ClassifierError::inference(format!(
                "scores sum to {sum}, not 1; check the model's configured output kind"
            )));
        }
        Ok(())
    }

    /// Index of the largest score. Ties go to the lowest index; NaN never wins.
    pub fn argmax(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (idx, &p) in self.0.iter().enumerate() {
            match best {
                Some((_, best_p)) if p <= best_p || p.is_nan() => {}
                None if p.is_nan() => {}
                _ => best = Some((idx, p)),
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Up to `k` (index, score) pairs, best first, ties by lowest index.
    pub fn top_k(&self, k: usize) -> Vec<(usize, f32)> {
        let mut indexed: Vec<(usize, f32)> = self
            .0
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| !p.is_nan())
            .collect();
        // Stable sort keeps equal scores in index order.
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        indexed.truncate(k);
        indexed
    }
}

/// ONNX Runtime adapter. Sessions need `&mut self` to run, so calls are serialized
/// behind a mutex while the adapter itself stays shareable.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
    output: OutputKind,
}

impl OnnxClassifier {
    pub fn load(spec: &ModelSpec) -> Result<Self> {
        let load_err = |message: String| ClassifierError::ModelLoad {
            path: spec.path.clone(),
            message,
        };

        if !spec.path.exists() {
            return Err(load_err("weights file not found".to_string()));
        }

        let _ = ort::init().with_name("waste-sorter").commit();

        let mut builder = Session::builder()
            .map_err(|e| load_err(format!("failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_err(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(spec.intra_threads)
            .map_err(|e| load_err(format!("failed to set intra threads: {e}")))?;

        if spec.use_gpu {
            builder = builder
                .with_execution_providers([
                    ort::execution_providers::DirectMLExecutionProvider::default().build(),
                    ort::execution_providers::CoreMLExecutionProvider::default().build(),
                    ort::execution_providers::CUDAExecutionProvider::default().build(),
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| load_err(format!("failed to register GPU execution providers: {e}")))?;
        } else {
            builder = builder
                .with_execution_providers([
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| load_err(format!("failed to register CPU execution provider: {e}")))?;
        }

        let session = builder
            .commit_from_file(&spec.path)
            .map_err(|e| load_err(format!("failed to load ONNX model: {e}")))?;

        if session.inputs().len() != 1 {
            return Err(load_err(format!(
                "expected a single image input, model declares {}",
                session.inputs().len()
            )));
        }
        if session.outputs().is_empty() {
            return Err(load_err("model declares no outputs".to_string()));
        }
        let input_name = session.inputs()[0].name().to_string();

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output: spec.output,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, input: &InputTensor) -> Result<ProbabilityVector> {
        let input_tensor = Value::from_array(input.view().to_owned())
            .map_err(|e| ClassifierError::inference(format!("failed to create tensor value: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifierError::inference("session lock poisoned"))?;

        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        let output_value = outputs
            .values()
            .next()
            .ok_or_else(|| ClassifierError::inference("model produced no outputs"))?;

        let (_, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::inference(format!("failed to extract output tensor: {e}")))?;

        Ok(match self.output {
            OutputKind::Probabilities => ProbabilityVector::new(data.to_vec()),
            OutputKind::Logits => ProbabilityVector::from_logits(data),
        })
    }
}
