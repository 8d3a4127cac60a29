use crate::error::{ClassifierError, Result};
use std::path::Path;

/// Class names, index-aligned with the classifier's output vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    /// Parses one label per line. Order is significant and blank lines are rejected,
    /// since a skipped line would shift every following index. A leading byte-order
    /// mark and whitespace around each label are dropped.
    pub fn load(source: &str) -> Result<Self> {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        let mut labels = Vec::new();
        for (line_no, line) in source.lines().enumerate() {
            let label = line.trim();
            if label.is_empty() {
                return Err(ClassifierError::label_load(format!(
                    "blank label on line {}",
                    line_no + 1
                )));
            }
            labels.push(label.to_string());
        }
        Self::from_labels(labels)
    }

    /// A `.json` file is read as a model config carrying `id2label`; anything else
    /// as a plain label list.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ClassifierError::label_load(format!("failed to read {}: {}", path.display(), e))
        })?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_id2label_json(&source)
        } else {
            Self::load(&source)
        }
    }

    /// Reads the `id2label` object of a model `config.json`. Keys must cover `0..n`
    /// without gaps.
    pub fn from_id2label_json(content: &str) -> Result<Self> {
        let config: serde_json::Value = serde_json::from_str(content)?;
        let id2label = config["id2label"]
            .as_object()
            .ok_or_else(|| ClassifierError::label_load("config missing id2label field"))?;

        let mut labels: Vec<(usize, String)> = id2label
            .iter()
            .map(|(k, v)| {
                let idx = k.parse::<usize>().map_err(|_| {
                    ClassifierError::label_load(format!("id2label key {k:?} is not an index"))
                })?;
                let label = v.as_str().ok_or_else(|| {
                    ClassifierError::label_load(format!("id2label value for {k} is not a string"))
                })?;
                Ok((idx, label.trim().to_string()))
            })
            .collect::<Result<_>>()?;
        labels.sort_by_key(|(idx, _)| *idx);

        if let Some((pos, (idx, _))) = labels
            .iter()
            .enumerate()
            .find(|(pos, (idx, _))| pos != idx)
        {
            return Err(ClassifierError::label_load(format!(
                "id2label is not dense: expected index {pos}, found {idx}"
            )));
        }

        Self::from_labels(labels.into_iter().map(|(_, label)| label).collect())
    }

    pub fn from_labels(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(ClassifierError::label_load("label table is empty"));
        }
        Ok(Self { labels })
    }

    pub fn get(&self, index: usize) -> Result<&str> {
        self.labels
            .get(index)
            .map(String::as_str)
            .ok_or(ClassifierError::LabelIndexOutOfRange {
                index,
                len: self.labels.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}
