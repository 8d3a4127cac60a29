use image::{DynamicImage, Rgb, RgbImage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use waste_sorter_lib::commands::classifier::{self, OrganizeOptions};
use waste_sorter_lib::{
    AppConfig, AppState, ClassificationPipeline, Classifier, ClassifierError, InputTensor,
    LabelTable, ModelManager, ModelPreset, ProbabilityVector, Result, SuggestionCatalog,
};

struct Fixed(Vec<f32>);

impl Classifier for Fixed {
    fn predict(&self, input: &InputTensor) -> Result<ProbabilityVector> {
        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        Ok(ProbabilityVector::new(self.0.clone()))
    }
}

/// Scores "Glass" for bright images and "Cardboard" for dark ones.
struct Brightness;

impl Classifier for Brightness {
    fn predict(&self, input: &InputTensor) -> Result<ProbabilityVector> {
        let view = input.view();
        let mean = view.iter().sum::<f32>() / view.len() as f32;
        if mean > 0.0 {
            Ok(ProbabilityVector::new(vec![0.1, 0.8, 0.1]))
        } else {
            Ok(ProbabilityVector::new(vec![0.6, 0.3, 0.1]))
        }
    }
}

fn write_labels(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("labels.txt");
    std::fs::write(&path, content).unwrap();
    path
}

fn write_image(path: &Path, w: u32, h: u32, color: [u8; 3]) {
    RgbImage::from_pixel(w, h, Rgb(color)).save(path).unwrap();
}

fn state_with(dir: &Path, classifier: impl Classifier + 'static) -> AppState {
    let labels = write_labels(dir, "Cardboard\nGlass\nMetal\n");
    let config = AppConfig::from_preset(ModelPreset::KerasMobileNet, dir.join("model.onnx"), labels);
    let manager = ModelManager::from_classifier(config.model.clone(), Arc::new(classifier));
    AppState::with_model(config, manager).unwrap()
}

#[test]
fn classifies_glass_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path(), Fixed(vec![0.1, 0.7, 0.2]));
    let image = dir.path().join("bottle.png");
    write_image(&image, 320, 240, [200, 220, 210]);

    let result = classifier::classify_image(&state, &image).unwrap();
    assert_eq!(result.label, "Glass");
    assert!((result.confidence - 0.7).abs() < 1e-6);
    assert_eq!(result.suggestions, SuggestionCatalog::builtin().lookup("Glass"));
    assert_eq!(result.ranked.len(), 3);
}

#[test]
fn near_tie_goes_to_the_strict_maximum() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path(), Fixed(vec![0.33, 0.33, 0.34]));
    let image = dir.path().join("can.png");
    write_image(&image, 1, 1, [0, 0, 0]);

    let result = classifier::classify_image(&state, &image).unwrap();
    assert_eq!(result.label, "Metal");
}

#[test]
fn exact_tie_goes_to_the_lowest_index() {
    let dir = tempfile::tempdir().unwrap();
    let labels = LabelTable::load("A\nB\nGlass\nD\nE\nMetal").unwrap();
    let model = ModelManager::from_classifier(
        ModelPreset::KerasMobileNet.spec(dir.path().join("model.onnx")),
        Arc::new(Fixed(vec![0.1, 0.05, 0.3, 0.1, 0.15, 0.3])),
    );
    let pipeline = ClassificationPipeline::new(
        Arc::new(model),
        Arc::new(labels),
        Arc::new(SuggestionCatalog::builtin()),
    );
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 9, Rgb([1, 2, 3])));
    assert_eq!(pipeline.classify(&image).unwrap().label, "Glass");
}

#[test]
fn classification_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path(), Brightness);
    let image = dir.path().join("box.png");
    write_image(&image, 64, 64, [30, 20, 10]);

    let first = classifier::classify_image(&state, &image).unwrap();
    let second = classifier::classify_image(&state, &image).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.label, "Cardboard");
}

#[test]
fn bad_image_fails_without_affecting_later_requests() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path(), Brightness);
    let bad = dir.path().join("broken.jpg");
    std::fs::write(&bad, b"not a jpeg").unwrap();
    let good = dir.path().join("jar.png");
    write_image(&good, 80, 80, [250, 250, 250]);

    let err = classifier::classify_image(&state, &bad).unwrap_err();
    assert!(matches!(err, ClassifierError::ImageDecode { .. }));
    assert!(err.is_per_image());

    assert_eq!(classifier::classify_image(&state, &good).unwrap().label, "Glass");
}

#[test]
fn missing_model_disables_classification() {
    let dir = tempfile::tempdir().unwrap();
    let labels = write_labels(dir.path(), "Cardboard\nGlass\nMetal");
    let config = AppConfig::from_preset(
        ModelPreset::KerasMobileNet,
        dir.path().join("missing.onnx"),
        labels,
    );
    let state = AppState::from_config(config).unwrap();
    let image = dir.path().join("x.png");
    write_image(&image, 8, 8, [1, 1, 1]);

    assert!(matches!(
        classifier::classify_image(&state, &image),
        Err(ClassifierError::ModelLoad { .. })
    ));
    assert!(matches!(
        classifier::classify_image(&state, &image),
        Err(ClassifierError::ModelNotLoaded { .. })
    ));

    let status = classifier::get_model_status(&state);
    assert!(!status.ready);
    assert!(status.error.is_some());
    assert_eq!(status.labels, 3);
}

#[test]
fn blank_label_line_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let labels = write_labels(dir.path(), "Cardboard\n\nGlass");
    let config = AppConfig::from_preset(ModelPreset::KerasMobileNet, "model.onnx", labels);
    assert!(matches!(
        AppState::from_config(config),
        Err(ClassifierError::LabelLoad { .. })
    ));
}

#[test]
fn model_loads_lazily_and_once() {
    let dir = tempfile::tempdir().unwrap();
    let labels = write_labels(dir.path(), "Cardboard\nGlass\nMetal");
    let config = AppConfig::from_preset(ModelPreset::KerasMobileNet, "model.onnx", labels);
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let manager = ModelManager::with_loader(config.model.clone(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Fixed(vec![0.2, 0.2, 0.6])) as Arc<dyn Classifier>)
    });
    let state = AppState::with_model(config, manager).unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert!(!classifier::get_model_status(&state).ready);

    let image = dir.path().join("x.png");
    write_image(&image, 8, 8, [1, 1, 1]);
    for _ in 0..3 {
        classifier::classify_image(&state, &image).unwrap();
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(classifier::get_model_status(&state).ready);
}

#[test]
fn folder_batch_reports_per_image_failures_and_organizes() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path(), Brightness);
    let photos = dir.path().join("photos");
    std::fs::create_dir(&photos).unwrap();
    write_image(&photos.join("bright.png"), 30, 30, [240, 240, 240]);
    write_image(&photos.join("dark.png"), 30, 30, [10, 10, 10]);
    std::fs::write(photos.join("corrupt.jpg"), b"garbage").unwrap();
    std::fs::write(photos.join("notes.txt"), b"ignored").unwrap();

    let out = dir.path().join("sorted");
    let options = OrganizeOptions {
        output_folder: Some(out.clone()),
        copy_files: true,
    };
    let report = classifier::classify_images(&state, &photos, Some(&options)).unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.classified, 2);
    assert_eq!(report.failed, 1);

    let corrupt = report
        .results
        .iter()
        .find(|r| r.file_name == "corrupt.jpg")
        .unwrap();
    assert!(corrupt.result.is_none());
    assert!(corrupt.error.is_some());

    assert!(out.join("Glass").join("bright.png").exists());
    assert!(out.join("Cardboard").join("dark.png").exists());
    assert!(photos.join("bright.png").exists());
}

#[test]
fn low_confidence_results_are_flagged_and_left_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let labels = write_labels(dir.path(), "Cardboard\nGlass\nMetal");
    let mut config = AppConfig::from_preset(ModelPreset::KerasMobileNet, "model.onnx", labels);
    config.min_confidence = 0.9;
    let manager = ModelManager::from_classifier(
        config.model.clone(),
        Arc::new(Fixed(vec![0.1, 0.7, 0.2])),
    );
    let state = AppState::with_model(config, manager).unwrap();

    let photos = dir.path().join("photos");
    std::fs::create_dir(&photos).unwrap();
    write_image(&photos.join("maybe.png"), 16, 16, [90, 90, 90]);

    let report =
        classifier::classify_images(&state, &photos, Some(&OrganizeOptions::default())).unwrap();
    assert!(report.results[0].unsure);
    assert!(report.results[0].moved_to.is_none());
    assert!(photos.join("maybe.png").exists());
}

#[test]
fn catalog_check_reports_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let labels = write_labels(dir.path(), "Cardboard\nTextiles");
    let suggestions = dir.path().join("suggestions.json");
    std::fs::write(
        &suggestions,
        r#"{"Cardboard": {"steps": ["Flatten it."]}, "Glass": {"steps": ["Rinse it."]}}"#,
    )
    .unwrap();
    let mut config = AppConfig::from_preset(ModelPreset::KerasMobileNet, "model.onnx", labels);
    config.suggestions_path = Some(suggestions);
    let state = AppState::from_config(config).unwrap();

    let report = classifier::check_catalog(&state);
    assert_eq!(report.labels, 2);
    assert_eq!(report.missing, vec!["Textiles"]);
    assert_eq!(report.unused, vec!["Glass"]);
}

#[test]
fn bundled_config_matches_builtin_catalog() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("resources");
    let config = AppConfig::load(&root.join("config.json")).unwrap();
    assert_eq!(config.labels_path, root.join("labels.txt"));
    assert_eq!(config.model, ModelPreset::KerasMobileNet.spec(root.join("weights/waste_mobilenet.onnx")));

    let labels = LabelTable::from_file(&config.labels_path).unwrap();
    assert_eq!(labels.len(), 6);
    assert!(SuggestionCatalog::builtin().missing_for(&labels).is_empty());
}

#[test]
fn labels_can_come_from_a_model_config_json() {
    let dir = tempfile::tempdir().unwrap();
    let labels = dir.path().join("config.json");
    std::fs::write(
        &labels,
        r#"{"architectures": ["MobileNetV2"], "id2label": {"1": "Glass", "0": "Cardboard", "2": "Metal"}}"#,
    )
    .unwrap();
    let config = AppConfig::from_preset(ModelPreset::KerasMobileNet, "model.onnx", labels);
    let manager = ModelManager::from_classifier(
        config.model.clone(),
        Arc::new(Fixed(vec![0.1, 0.7, 0.2])),
    );
    let state = AppState::with_model(config, manager).unwrap();

    let image = dir.path().join("jar.png");
    write_image(&image, 40, 40, [200, 200, 200]);
    let result = classifier::classify_image(&state, &image).unwrap();
    assert_eq!(result.label, "Glass");
    assert_eq!(result.suggestions, SuggestionCatalog::builtin().lookup("Glass"));
}

#[test]
fn classifies_encoded_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path(), Brightness);
    let mut png = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 30, Rgb([250, 250, 250])))
        .write_to(&mut png, image::ImageFormat::Png)
        .unwrap();

    let result = classifier::classify_bytes(&state, png.get_ref()).unwrap();
    assert_eq!(result.label, "Glass");
}

#[test]
fn organizing_twice_keeps_earlier_files() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path(), Fixed(vec![0.1, 0.8, 0.1]));
    let photos = dir.path().join("photos");
    std::fs::create_dir_all(photos.join("Glass")).unwrap();
    std::fs::write(photos.join("Glass").join("jar.png"), b"earlier photo").unwrap();
    write_image(&photos.join("jar.png"), 20, 20, [200, 200, 200]);

    let report =
        classifier::classify_images(&state, &photos, Some(&OrganizeOptions::default())).unwrap();
    let moved = report.results[0].moved_to.clone().unwrap();
    assert!(moved.ends_with("jar (1).png"), "{moved}");
    assert_eq!(
        std::fs::read(photos.join("Glass").join("jar.png")).unwrap(),
        b"earlier photo"
    );
    assert!(!photos.join("jar.png").exists());
}

#[test]
fn logits_model_declared_as_probabilities_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path(), Fixed(vec![-3.0, 4.5, -1.0]));
    let image = dir.path().join("bottle.png");
    write_image(&image, 32, 32, [200, 220, 210]);

    assert!(matches!(
        classifier::classify_image(&state, &image),
        Err(ClassifierError::Inference { .. })
    ));
}
