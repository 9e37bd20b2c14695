//! Codes and concepts attached to measures, groups, populations and values

use serde::{Deserialize, Serialize};

/// A single coded value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeDef {
    pub system: Option<String>,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl CodeDef {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            code: code.into(),
            version: None,
            display: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Display if present, otherwise the bare code
    pub fn text(&self) -> &str {
        self.display.as_deref().unwrap_or(&self.code)
    }
}

/// A concept: zero or more codings plus free text
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConceptDef {
    #[serde(default)]
    pub codings: Vec<CodeDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ConceptDef {
    pub fn new(codings: Vec<CodeDef>) -> Self {
        Self {
            codings,
            text: None,
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            codings: Vec::new(),
            text: Some(text.into()),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn first(&self) -> Option<&CodeDef> {
        self.codings.first()
    }

    pub fn is_empty(&self) -> bool {
        self.codings.is_empty() && self.text.is_none()
    }

    /// Concept text, falling back to the first coding's display or code
    pub fn display_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .or_else(|| self.first().map(CodeDef::text))
    }
}
