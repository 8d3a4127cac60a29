use crate::error::{ClassifierError, Result};
use crate::models::suggestion_types::SuggestionEntry;
use crate::services::classifier::labels::LabelTable;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

pub const FALLBACK_SUGGESTION: &str = "No specific suggestions available.";

/// Read-only mapping from class name to disposal steps.
///
/// A missing label is a content gap, not a programming error: lookups degrade to a
/// single fallback step and log a warning instead of failing the request.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionCatalog {
    entries: HashMap<String, SuggestionEntry>,
    fallback: SuggestionEntry,
}

impl SuggestionCatalog {
    pub fn new(entries: HashMap<String, SuggestionEntry>) -> Self {
        Self {
            entries,
            fallback: SuggestionEntry {
                steps: vec![FALLBACK_SUGGESTION.to_string()],
                image_urls: Vec::new(),
            },
        }
    }

    /// Catalog for the six waste classes the bundled models are trained on.
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(label, steps, urls)| {
                (
                    label.to_string(),
                    SuggestionEntry {
                        steps: steps.iter().map(|s| s.to_string()).collect(),
                        image_urls: urls.iter().map(|s| s.to_string()).collect(),
                    },
                )
            })
            .collect();
        Self::new(entries)
    }

    /// Parses `{ "<label>": { "steps": [...], "image_urls": [...] } }`.
    pub fn from_json(content: &str) -> Result<Self> {
        let entries: HashMap<String, SuggestionEntry> = serde_json::from_str(content)?;
        if let Some((label, _)) = entries.iter().find(|(_, entry)| entry.steps.is_empty()) {
            return Err(ClassifierError::config(format!(
                "suggestion entry {label:?} has no steps"
            )));
        }
        Ok(Self::new(entries))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClassifierError::config(format!(
                "failed to read suggestions {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn entry(&self, label: &str) -> &SuggestionEntry {
        match self.entries.get(label) {
            Some(entry) => entry,
            None => {
                warn!(label, "no suggestions for label");
                &self.fallback
            }
        }
    }

    pub fn lookup(&self, label: &str) -> &[String] {
        &self.entry(label).steps
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains_key(label)
    }

    /// Labels the classifier can produce that have no catalog entry, in table order.
    pub fn missing_for<'a>(&self, labels: &'a LabelTable) -> Vec<&'a str> {
        labels.iter().filter(|l| !self.contains(l)).collect()
    }

    /// Catalog keys that no label in the table will ever produce.
    pub fn unused_for(&self, labels: &LabelTable) -> Vec<&str> {
        let mut unused: Vec<&str> = self
            .entries
            .keys()
            .map(String::as_str)
            .filter(|key| !labels.iter().any(|l| l == *key))
            .collect();
        unused.sort_unstable();
        unused
    }
}

impl Default for SuggestionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

type BuiltinEntry = (&'static str, &'static [&'static str], &'static [&'static str]);

const BUILTIN: &[BuiltinEntry] = &[
    (
        "Cardboard",
        &[
            "Flatten the cardboard boxes.",
            "Remove any plastic tape, labels or windows.",
            "Take the flattened cardboard to a recycling facility or drop it in the recycling bin.",
        ],
        &[
            "https://example.com/flatten-cardboard.jpg",
            "https://example.com/remove-tape.jpg",
            "https://example.com/recycling-bin.jpg",
        ],
    ),
    (
        "Compost",
        &[
            "Collect compostable waste like food scraps and yard waste.",
            "Chop waste into smaller pieces for faster decomposition.",
            "Layer green (nitrogen-rich) and brown (carbon-rich) materials.",
            "Turn the pile regularly to aerate it and speed up composting.",
        ],
        &[
            "https://example.com/collect-waste.jpg",
            "https://example.com/chop-waste.jpg",
            "https://example.com/layer-materials.jpg",
            "https://example.com/turn-pile.jpg",
        ],
    ),
    (
        "Glass",
        &[
            "Rinse the glass items to remove any leftover contents.",
            "Remove lids and caps.",
            "Separate glass by color (clear, green, brown) if your local facility requires it.",
            "Take the clean, sorted glass to a drop-off point or place it in the recycling bin.",
        ],
        &[
            "https://example.com/rinse-glass.jpg",
            "https://example.com/remove-lids.jpg",
            "https://example.com/sort-glass.jpg",
            "https://example.com/recycle-glass.jpg",
        ],
    ),
    (
        "Metal",
        &[
            "Rinse metal cans or containers to remove food or liquid residue.",
            "Crush cans to save space in your recycling bin.",
            "Take the metal items to a recycling facility or leave them in the metal recycling bin.",
        ],
        &[
            "https://example.com/rinse-metal.jpg",
            "https://example.com/crush-cans.jpg",
            "https://example.com/recycle-metal.jpg",
        ],
    ),
    (
        "Paper",
        &[
            "Sort paper into categories: newspaper, office paper, magazines.",
            "Remove any staples, paperclips, tape or plastic coverings.",
            "Place sorted paper in the recycling bin or drop it at a recycling center.",
        ],
        &[
            "https://example.com/sort-paper.jpg",
            "https://example.com/remove-staples.jpg",
            "https://example.com/recycle-paper.jpg",
        ],
    ),
    (
        "Plastic",
        &[
            "Check the recycling number to make sure the item is recyclable in your area.",
            "Rinse the container to remove any food or drink residue.",
            "Crush bottles and containers to save space.",
            "Place clean, sorted plastic in the correct recycling bin.",
        ],
        &[
            "https://example.com/check-recycle-number.jpg",
            "https://example.com/rinse-plastic.jpg",
            "https://example.com/crush-plastic.jpg",
            "https://example.com/recycle-plastic.jpg",
        ],
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_label_falls_back_without_error() {
        let catalog = SuggestionCatalog::builtin();
        assert_eq!(
            catalog.lookup("Nonexistent"),
            &["No specific suggestions available.".to_string()]
        );
        assert!(catalog.entry("Nonexistent").image_urls.is_empty());
    }

    #[test]
    fn builtin_covers_the_six_waste_classes() {
        let catalog = SuggestionCatalog::builtin();
        for label in ["Cardboard", "Compost", "Glass", "Metal", "Paper", "Plastic"] {
            assert!(catalog.contains(label), "{label}");
            assert!(!catalog.lookup(label).is_empty());
        }
        assert_eq!(catalog.lookup("Glass")[0], "Rinse the glass items to remove any leftover contents.");
        assert!(!catalog.contains("glass"));
    }

    #[test]
    fn coverage_report_lists_gaps_both_ways() {
        let catalog = SuggestionCatalog::builtin();
        let labels = LabelTable::load("Cardboard\nTextiles\nGlass\nE-waste").unwrap();
        assert_eq!(catalog.missing_for(&labels), vec!["Textiles", "E-waste"]);
        assert_eq!(
            catalog.unused_for(&labels),
            vec!["Compost", "Metal", "Paper", "Plastic"]
        );
    }

    #[test]
    fn json_catalog_replaces_builtin() {
        let catalog = SuggestionCatalog::from_json(
            r#"{"Textiles": {"steps": ["Donate wearable clothes.", "Recycle the rest."]}}"#,
        )
        .unwrap();
        assert_eq!(catalog.lookup("Textiles").len(), 2);
        assert!(catalog.entry("Textiles").image_urls.is_empty());
        assert_eq!(catalog.lookup("Glass"), &[FALLBACK_SUGGESTION.to_string()]);
    }

    #[test]
    fn json_entry_without_steps_is_rejected() {
        assert!(SuggestionCatalog::from_json(r#"{"Glass": {"steps": []}}"#).is_err());
        assert!(SuggestionCatalog::from_json("not json").is_err());
    }
}
