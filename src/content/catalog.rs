use crate::{ReadalongError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Identifier of a narratable segment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One section of the article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: SegmentId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub content: String,
}

impl Section {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: SegmentId::new(id),
            title: title.into(),
            subtitle: None,
            content: content.into(),
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    /// Words in narration order: title, subtitle, then body
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.title
            .split_whitespace()
            .chain(self.subtitle.iter().flat_map(|s| s.split_whitespace()))
            .chain(self.content.split_whitespace())
    }

    pub fn word_count(&self) -> usize {
        self.words().count()
    }
}

/// Ordered list of article sections
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    sections: Vec<Section>,
}

impl Catalog {
    pub fn from_sections(sections: Vec<Section>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for section in &sections {
            if !seen.insert(section.id.clone()) {
                return Err(ReadalongError::ConfigError(format!(
                    "Duplicate section id: {}",
                    section.id
                )));
            }
        }
        Ok(Self { sections })
    }

    /// Load the catalog from a JSON array of sections
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let sections: Vec<Section> = serde_json::from_str(&raw).map_err(|e| {
            ReadalongError::ConfigError(format!("Invalid catalog {}: {}", path.display(), e))
        })?;
        info!("Loaded {} sections from {}", sections.len(), path.display());
        Self::from_sections(sections)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn get(&self, id: &SegmentId) -> Option<&Section> {
        self.sections.iter().find(|s| &s.id == id)
    }

    pub fn position(&self, id: &SegmentId) -> Option<usize> {
        self.sections.iter().position(|s| &s.id == id)
    }

    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.sections.iter().map(|s| s.id.clone()).collect()
    }

    pub fn word_counts(&self) -> Vec<usize> {
        let counts: Vec<usize> = self.sections.iter().map(Section::word_count).collect();
        debug!("Section word counts: {:?}", counts);
        counts
    }

    /// Render the whole article as markdown, used as companion context
    pub fn to_markdown(&self) -> String {
        self.sections
            .iter()
            .map(|s| match &s.subtitle {
                Some(sub) => format!("## {}\n*{}*\n{}", s.title, sub, s.content),
                None => format!("## {}\n{}", s.title, s.content),
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }
}
