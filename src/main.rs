use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use waste_sorter_lib::commands::classifier::{self, OrganizeOptions};
use waste_sorter_lib::logging::init_tracing;
use waste_sorter_lib::{AppConfig, AppState, ClassifierError, ModelPreset, PredictionResult};

/// Classify photos of waste and print how to dispose of them.
#[derive(Parser)]
#[command(name = "waste-sorter", version)]
struct Cli {
    #[command(flatten)]
    source: ConfigArgs,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON config file; flags below override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// ONNX model file
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,

    /// Label file, one class name per line
    #[arg(short, long, global = true)]
    labels: Option<PathBuf>,

    /// JSON suggestion catalog replacing the built-in one
    #[arg(long, global = true)]
    suggestions: Option<PathBuf>,

    /// Preprocessing preset matching the model (used without --config)
    #[arg(long, value_enum, global = true, default_value = "keras-mobile-net")]
    preset: ModelPreset,

    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// Try GPU execution providers before the CPU
    #[arg(long, global = true)]
    gpu: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Classify one or more image files; `-` reads one image from stdin
    Classify {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Classify every image in a folder
    Folder {
        folder: PathBuf,

        /// Move each image into a sub-folder named after its label
        #[arg(long)]
        organize: bool,

        /// Copy instead of move when organizing
        #[arg(long, requires = "organize")]
        copy: bool,

        /// Destination root when organizing
        #[arg(long, requires = "organize")]
        output: Option<PathBuf>,
    },
    /// Load the model and report its status
    Status,
    /// List labels without suggestions and suggestions without labels
    Check,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<AppConfig, ClassifierError> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => {
                let model = self.model.clone().ok_or_else(|| {
                    ClassifierError::config("either --config or --model is required")
                })?;
                let labels = self.labels.clone().ok_or_else(|| {
                    ClassifierError::config("either --config or --labels is required")
                })?;
                AppConfig::from_preset(self.preset, model, labels)
            }
        };

        if let Some(model) = &self.model {
            config.model.path = model.clone();
        }
        if let Some(labels) = &self.labels {
            config.labels_path = labels.clone();
        }
        if self.suggestions.is_some() {
            config.suggestions_path = self.suggestions.clone();
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if self.gpu {
            config.model.use_gpu = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn print_result(name: &str, result: &PredictionResult) {
    println!("{name}: {} ({:.1}%)", result.label, result.confidence * 100.0);
    for (i, step) in result.suggestions.iter().enumerate() {
        println!("  {}. {step}", i + 1);
    }
    if result.ranked.len() > 1 {
        let others: Vec<String> = result.ranked[1..]
            .iter()
            .map(|p| format!("{} {:.1}%", p.class_name, p.confidence * 100.0))
            .collect();
        println!("  also considered: {}", others.join(", "));
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), ClassifierError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// How a run ended when no setup step failed.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Done,
    /// Some images could not be classified; the rest were reported.
    PartialFailure { failed: usize, total: usize },
}

fn classify_one(state: &AppState, path: &Path) -> Result<PredictionResult, ClassifierError> {
    if path.as_os_str() == "-" {
        let mut bytes = Vec::new();
        std::io::stdin().read_to_end(&mut bytes)?;
        classifier::classify_bytes(state, &bytes)
    } else {
        classifier::classify_image(state, path)
    }
}

fn run(cli: Cli) -> Result<Outcome, ClassifierError> {
    let config = cli.source.resolve()?;
    let state = AppState::from_config(config)?;

    match cli.command {
        Command::Classify { images } => {
            let mut failures = 0;
            for path in &images {
                let name = path.display().to_string();
                match classify_one(&state, path) {
                    Ok(result) if cli.json => print_json(&result)?,
                    Ok(result) => print_result(&name, &result),
                    // Without a model nothing else can succeed either.
                    Err(e) if !e.is_per_image() => return Err(e),
                    Err(e) => {
                        failures += 1;
                        error!("{name}: {}", classifier::describe_error(&e));
                    }
                }
            }
            if failures > 0 {
                return Ok(Outcome::PartialFailure {
                    failed: failures,
                    total: images.len(),
                });
            }
        }
        Command::Folder {
            folder,
            organize,
            copy,
            output,
        } => {
            let options = organize.then(|| OrganizeOptions {
                output_folder: output,
                copy_files: copy,
            });
            let report = classifier::classify_images(&state, &folder, options.as_ref())?;
            if cli.json {
                print_json(&report)?;
            } else {
                for file in &report.results {
                    match (&file.result, &file.error) {
                        (Some(result), _) => {
                            print_result(&file.file_name, result);
                            if file.unsure {
                                println!("  (low confidence)");
                            }
                            if let Some(dest) = &file.moved_to {
                                println!("  -> {dest}");
                            }
                        }
                        (None, Some(e)) => println!("{}: {}", file.file_name, classifier::describe_error(e)),
                        (None, None) => {}
                    }
                }
                println!(
                    "{} classified, {} failed, {} total",
                    report.classified, report.failed, report.total
                );
            }
            if report.failed > 0 {
                return Ok(Outcome::PartialFailure {
                    failed: report.failed,
                    total: report.total,
                });
            }
        }
        Command::Status => {
            let load = classifier::load_model(&state);
            let status = classifier::get_model_status(&state);
            if cli.json {
                print_json(&status)?;
            } else {
                println!("model:  {}", status.model_path.display());
                println!("labels: {}", status.labels);
                println!("ready:  {}", status.ready);
                if let Some(reason) = &status.error {
                    println!("error:  {reason}");
                }
            }
            load?;
        }
        Command::Check => {
            let report = classifier::check_catalog(&state);
            if cli.json {
                print_json(&report)?;
            } else {
                println!("{} labels", report.labels);
                if report.missing.is_empty() {
                    println!("every label has suggestions");
                } else {
                    println!("no suggestions for: {}", report.missing.join(", "));
                }
                if !report.unused.is_empty() {
                    println!("unused suggestions: {}", report.unused.join(", "));
                }
            }
        }
    }

    Ok(Outcome::Done)
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::PartialFailure { failed, total }) => {
            error!("{failed} of {total} images could not be classified");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
