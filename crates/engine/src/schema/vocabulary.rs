//! Concept vocabularies used to annotate schema fields.
//!
//! A field declares the concept it holds with a URI (`x-refersTo`). The
//! standard vocabulary is embedded in the crate; owners can add a private one.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::types::ConceptRef;

static STANDARD_VOCABULARY: &str = include_str!("../../data/vocabulary.json");

/// A concept a field can refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Short identifier (`label`, `latitude`, ...).
    pub id: String,
    /// Display title.
    pub title: String,
    /// URIs that designate this concept.
    #[serde(default)]
    pub identifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Expected field type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub concept_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Concept {
    /// Returns true if `uri` designates this concept.
    pub fn matches(&self, uri: &str) -> bool {
        self.id == uri || self.identifiers.iter().any(|i| i == uri)
    }

    /// Returns the annotation written on a field that refers to this concept.
    pub fn to_ref(&self) -> ConceptRef {
        ConceptRef {
            id: self.id.clone(),
            title: self.title.clone(),
            primary: true,
        }
    }
}

/// An ordered list of concepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    concepts: Vec<Concept>,
}

impl Vocabulary {
    /// Creates a vocabulary from a list of concepts.
    pub fn new(concepts: Vec<Concept>) -> Self {
        Self { concepts }
    }

    /// Returns the embedded standard vocabulary.
    pub fn standard() -> &'static Vocabulary {
        static INSTANCE: OnceLock<Vocabulary> = OnceLock::new();
        INSTANCE.get_or_init(|| match serde_json::from_str(STANDARD_VOCABULARY) {
            Ok(concepts) => Vocabulary::new(concepts),
            Err(e) => {
                error!(error = %e, "Failed to parse the embedded vocabulary");
                Vocabulary::default()
            }
        })
    }

    /// Returns the first concept designated by `uri`.
    pub fn lookup(&self, uri: &str) -> Option<&Concept> {
        self.concepts.iter().find(|c| c.matches(uri))
    }

    pub fn concepts(&self) -> &[Concept] {
        &self.concepts
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}
