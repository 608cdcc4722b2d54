//! Schema comparison.
//!
//! Decides whether a patched schema keeps the shape of the stored one, lists
//! the changes that break API consumers, and compares validation rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Field;

/// Kind of a breaking schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakingChangeKind {
    /// The field disappeared.
    Missing,
    /// The type or the effective format changed.
    Type,
    /// The field is new. Only reported in strict mode.
    Added,
}

impl BreakingChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakingChangeKind::Missing => "missing",
            BreakingChangeKind::Type => "type",
            BreakingChangeKind::Added => "added",
        }
    }
}

/// A change that breaks consumers of the dataset API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BreakingChange {
    #[serde(rename = "type")]
    pub kind: BreakingChangeKind,
    pub key: String,
}

impl BreakingChange {
    pub fn new(kind: BreakingChangeKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

impl fmt::Display for BreakingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.key)
    }
}

/// Options of [`breaking_changes_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreakingChangeOptions {
    /// Skip extension-owned fields.
    pub ignore_extensions: bool,
    /// Also report added fields.
    pub strict: bool,
}

fn bare(schema: &[Field], ignore_calculated: bool) -> Vec<Field> {
    let mut fields: Vec<Field> = schema
        .iter()
        .filter(|f| !(ignore_calculated && f.calculated))
        .map(Field::structural)
        .collect();
    fields.sort_by(|a, b| a.key.cmp(&b.key));
    fields
}

/// Returns true if both schemas have the same shape.
///
/// Cosmetic and validation attributes are ignored, and so is field order.
/// With `ignore_calculated`, every calculated field is left out of the
/// comparison, extension-owned ones included.
pub fn structurally_equal(a: &[Field], b: &[Field], ignore_calculated: bool) -> bool {
    bare(a, ignore_calculated) == bare(b, ignore_calculated)
}

/// Lists the missing fields and type changes between two schemas.
pub fn breaking_changes(old: &[Field], patched: &[Field]) -> Vec<BreakingChange> {
    breaking_changes_with(old, patched, BreakingChangeOptions::default())
}

/// Lists the breaking changes between two schemas.
///
/// Calculated fields never break anything. At most one change is reported
/// per field.
pub fn breaking_changes_with(
    old: &[Field],
    patched: &[Field],
    options: BreakingChangeOptions,
) -> Vec<BreakingChange> {
    let considered = |f: &&Field| !f.calculated && !(options.ignore_extensions && f.is_extension());
    let mut changes = Vec::new();

    for field in old.iter().filter(considered) {
        let Some(patched_field) = patched.iter().find(|p| p.key == field.key) else {
            changes.push(BreakingChange::new(BreakingChangeKind::Missing, &field.key));
            continue;
        };
        if patched_field.field_type != field.field_type
            || patched_field.effective_format() != field.effective_format()
        {
            changes.push(BreakingChange::new(BreakingChangeKind::Type, &field.key));
        }
    }

    if options.strict {
        for field in patched.iter().filter(considered) {
            if !old.iter().any(|f| f.key == field.key) {
                changes.push(BreakingChange::new(BreakingChangeKind::Added, &field.key));
            }
        }
    }

    changes
}

/// Returns true if any field carries an active validation rule.
pub fn has_validation_rules(schema: &[Field]) -> bool {
    schema.iter().any(|f| f.validation_rules().any())
}

/// Returns true if the rules of `new` are the rules already enforced by `old`.
///
/// Only fields present in both schemas are compared, and only the rules
/// `new` declares.
pub fn validation_compatible(new: &[Field], old: &[Field]) -> bool {
    new.iter().all(|field| {
        let Some(existing) = old.iter().find(|f| f.key == field.key) else {
            return true;
        };
        let rules = field.validation_rules();
        let previous = existing.validation_rules();
        let same = |declared: bool, equal: bool| !declared || equal;

        let rules_match = same(rules.required.is_some(), rules.required == previous.required)
            && same(rules.minimum.is_some(), rules.minimum == previous.minimum)
            && same(rules.maximum.is_some(), rules.maximum == previous.maximum)
            && same(rules.min_length.is_some(), rules.min_length == previous.min_length)
            && same(rules.max_length.is_some(), rules.max_length == previous.max_length)
            && same(rules.pattern.is_some(), rules.pattern == previous.pattern)
            && same(
                rules.labels_restricted.is_some(),
                rules.labels_restricted == previous.labels_restricted,
            );
        if !rules_match {
            return false;
        }

        let restricted = |f: &Field| f.labels_restricted == Some(true);
        !(restricted(field) && restricted(existing) && field.labels != existing.labels)
    })
}
