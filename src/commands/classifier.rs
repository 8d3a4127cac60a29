use crate::error::{ClassifierError, Result};
use crate::models::classify_types::{FileResult, FolderReport, ModelStatus, PredictionResult};
use crate::services::fs_service;
use crate::state::AppState;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct OrganizeOptions {
    /// Destination root; defaults to the classified folder itself.
    pub output_folder: Option<PathBuf>,
    pub copy_files: bool,
}

#[derive(Debug, Serialize)]
pub struct CatalogReport {
    pub labels: usize,
    pub missing: Vec<String>,
    pub unused: Vec<String>,
}

pub fn get_model_status(state: &AppState) -> ModelStatus {
    let model = state.pipeline.model();
    ModelStatus {
        ready: model.is_ready(),
        error: model.get_error(),
        model_path: model.spec().path.clone(),
        labels: state.pipeline.labels().len(),
    }
}

/// Forces the one-time model load so failures surface at startup.
pub fn load_model(state: &AppState) -> Result<()> {
    state.pipeline.model().classifier().map(|_| ())
}

pub fn classify_image(state: &AppState, path: &Path) -> Result<PredictionResult> {
    state.pipeline.classify_path(path)
}

/// Classifies an encoded image already in memory, e.g. read from stdin.
pub fn classify_bytes(state: &AppState, bytes: &[u8]) -> Result<PredictionResult> {
    state.pipeline.classify_bytes(bytes)
}

pub fn classify_images(
    state: &AppState,
    folder: &Path,
    organize: Option<&OrganizeOptions>,
) -> Result<FolderReport> {
    // Setup failures stop the whole batch; only per-image failures are collected.
    load_model(state)?;

    let image_paths = fs_service::list_image_files(folder)?;
    let total = image_paths.len();
    let min_confidence = state.config.min_confidence;
    let start_time = Instant::now();

    let results: Vec<FileResult> = image_paths
        .par_iter()
        .map(|img_path| {
            let file_name = img_path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();

            match state.pipeline.classify_path(img_path) {
                Ok(result) => {
                    let unsure = result.confidence < min_confidence;
                    let moved_to = match organize {
                        Some(options) if !unsure => {
                            let base = options.output_folder.as_deref().unwrap_or(folder);
                            match fs_service::file_into_label_folder(
                                img_path,
                                base,
                                &result.label,
                                options.copy_files,
                            ) {
                                Ok(dest) => Some(dest.to_string_lossy().to_string()),
                                Err(e) => {
                                    warn!(file = %file_name, "failed to organize: {}", e);
                                    None
                                }
                            }
                        }
                        _ => None,
                    };
                    FileResult {
                        file_name,
                        file_path: img_path.to_string_lossy().to_string(),
                        result: Some(result),
                        error: None,
                        unsure,
                        moved_to,
                    }
                }
                Err(e) => {
                    warn!(file = %file_name, "failed to classify: {}", e);
                    FileResult {
                        file_name,
                        file_path: img_path.to_string_lossy().to_string(),
                        result: None,
                        error: Some(e),
                        unsure: false,
                        moved_to: None,
                    }
                }
            }
        })
        .collect();

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    info!(
        total,
        failed,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "classified folder"
    );

    Ok(FolderReport {
        total,
        classified: total - failed,
        failed,
        results,
    })
}

pub fn check_catalog(state: &AppState) -> CatalogReport {
    let labels = state.pipeline.labels();
    let catalog = state.pipeline.catalog();
    CatalogReport {
        labels: labels.len(),
        missing: catalog
            .missing_for(labels)
            .into_iter()
            .map(str::to_string)
            .collect(),
        unused: catalog
            .unused_for(labels)
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}

/// Turns an error into the exit-worthy form used by the binary.
pub fn describe_error(err: &ClassifierError) -> String {
    if err.is_per_image() {
        format!("could not classify this image: {err}")
    } else {
        format!("classification unavailable: {err}")
    }
}
