//! Completeness reconciliation
//!
//! Checks that every input resource identifier can be found in the final
//! outline. Files must appear in the resources section. Modules, assignments
//! and quizzes may appear in any other section. LMS id sequences are per
//! table, so an identifier only counts for the category its key allows.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::document::Outline;
use crate::course::{ResourceInventory, ResourceKind, normalize_id};

/// What to do when the outline is missing input resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletenessPolicy {
    /// Skip reconciliation
    Off,
    /// Warn and attach the report to the result
    Report,
    /// Fail the run
    #[default]
    Enforce,
}

/// Reconciliation result for one resource category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryReport {
    pub expected: usize,
    pub missing: Vec<String>,
    /// Input records that carry no identifier and cannot be checked
    pub untracked: usize,
}

/// Reconciliation result for a whole outline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletenessReport {
    pub categories: BTreeMap<ResourceKind, CategoryReport>,
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        self.categories.values().all(|c| c.missing.is_empty())
    }

    pub fn missing_total(&self) -> usize {
        self.categories.values().map(|c| c.missing.len()).sum()
    }

    pub fn missing(&self, kind: ResourceKind) -> &[String] {
        self.categories.get(&kind).map_or(&[], |c| c.missing.as_slice())
    }
}

impl std::fmt::Display for CompletenessReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .categories
            .iter()
            .filter(|(_, c)| !c.missing.is_empty())
            .map(|(kind, c)| format!("{} missing {}/{} [{}]", kind, c.missing.len(), c.expected, c.missing.join(", ")))
            .collect();
        if parts.is_empty() {
            write!(f, "complete")
        } else {
            write!(f, "{}", parts.join("; "))
        }
    }
}

/// Compare the outline against the input inventory
pub fn reconcile(outline: &Outline, inventory: &ResourceInventory) -> CompletenessReport {
    debug!(expected = inventory.total(), "reconcile: called");
    let mut listed = FoundIds::default();
    if let Some(resources) = outline.resources() {
        listed.collect(resources);
    }
    let mut placed = FoundIds::default();
    for section in outline.structure_sections() {
        placed.collect(section);
    }
    debug!(listed = listed.len(), placed = placed.len(), "reconcile: collected identifiers");

    let mut report = CompletenessReport::default();
    for kind in ResourceKind::ALL {
        let found = match kind {
            ResourceKind::File => &listed,
            _ => &placed,
        };
        let ids: Vec<&String> = inventory.ids(kind).collect();
        let category = CategoryReport {
            expected: ids.len(),
            missing: ids.into_iter().filter(|id| !found.contains(kind, id)).cloned().collect(),
            untracked: inventory.untracked(kind),
        };
        if !category.missing.is_empty() {
            warn!(%kind, missing = ?category.missing, "Outline is missing input resources");
        }
        report.categories.insert(kind, category);
    }
    report
}

/// Which categories an identifier key may refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdScope {
    Any,
    Only(ResourceKind),
}

/// Classify `id`, `ids`, `*_id`, `*_ids`, `*Id` and `*Ids` keys
///
/// A `module_`/`assignment_`/`quiz_`/`file_` prefix pins the category; the
/// course's own id is never a resource.
fn id_scope(key: &str) -> Option<IdScope> {
    if key.eq_ignore_ascii_case("id") || key.eq_ignore_ascii_case("ids") {
        return Some(IdScope::Any);
    }
    let prefix = ["_ids", "_id", "Ids", "Id"]
        .iter()
        .find_map(|suffix| key.strip_suffix(suffix))?;
    match prefix.to_ascii_lowercase().as_str() {
        "course" => None,
        "module" => Some(IdScope::Only(ResourceKind::Module)),
        "assignment" => Some(IdScope::Only(ResourceKind::Assignment)),
        "quiz" => Some(IdScope::Only(ResourceKind::Quiz)),
        "file" => Some(IdScope::Only(ResourceKind::File)),
        _ => Some(IdScope::Any),
    }
}

/// Identifiers found in part of an outline
#[derive(Debug, Default)]
struct FoundIds {
    any: BTreeSet<String>,
    scoped: BTreeMap<ResourceKind, BTreeSet<String>>,
}

impl FoundIds {
    fn contains(&self, kind: ResourceKind, id: &str) -> bool {
        self.any.contains(id) || self.scoped.get(&kind).is_some_and(|ids| ids.contains(id))
    }

    fn len(&self) -> usize {
        self.any.len() + self.scoped.values().map(BTreeSet::len).sum::<usize>()
    }

    fn collect(&mut self, value: &Value) {
        match value {
            Value::Object(map) => {
                for (key, v) in map {
                    if let Some(scope) = id_scope(key) {
                        let target = match scope {
                            IdScope::Any => &mut self.any,
                            IdScope::Only(kind) => self.scoped.entry(kind).or_default(),
                        };
                        match v {
                            Value::Array(items) => target.extend(items.iter().filter_map(normalize_id)),
                            other => target.extend(normalize_id(other)),
                        }
                    }
                    self.collect(v);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.collect(item);
                }
            }
            _ => {}
        }
    }
}
