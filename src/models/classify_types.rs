use crate::error::ClassifierError;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize, Clone)]
pub struct ModelStatus {
    pub ready: bool,
    pub error: Option<String>,
    pub model_path: PathBuf,
    pub labels: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Prediction {
    pub class_name: String,
    pub confidence: f32,
}

/// Outcome of classifying one image. Built fresh per call and never mutated.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PredictionResult {
    pub label: String,
    pub confidence: f32,
    pub suggestions: Vec<String>,
    pub image_urls: Vec<String>,
    /// Top-k predictions, best first; the first entry matches `label`.
    pub ranked: Vec<Prediction>,
}

#[derive(Debug, Serialize)]
pub struct FileResult {
    pub file_name: String,
    pub file_path: String,
    pub result: Option<PredictionResult>,
    pub error: Option<ClassifierError>,
    /// Set when the top confidence is below the configured minimum.
    pub unsure: bool,
    pub moved_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FolderReport {
    pub total: usize,
    pub classified: usize,
    pub failed: usize,
    pub results: Vec<FileResult>,
}
