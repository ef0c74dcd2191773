//! Course data fetched for one pipeline run

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::id::CourseId;
use super::record::{CourseRecord, records_from_values, records_to_text};

/// Notice carried by the quiz placeholder
pub const NO_QUIZZES_NOTICE: &str = "No quizzes found in this course";

/// Category of an input resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Module,
    Assignment,
    Quiz,
    File,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Module,
        ResourceKind::Assignment,
        ResourceKind::Quiz,
        ResourceKind::File,
    ];

    /// Plural name, as used for LMS endpoints and prompt labels
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Module => "modules",
            Self::Assignment => "assignments",
            Self::Quiz => "quizzes",
            Self::File => "files",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.plural())
    }
}

/// Quizzes, or the marker that none could be retrieved
#[derive(Debug, Clone, PartialEq)]
pub enum QuizSet {
    Found(Vec<CourseRecord>),
    NoneFound { notice: String },
}

impl QuizSet {
    pub fn none_found() -> Self {
        Self::NoneFound {
            notice: NO_QUIZZES_NOTICE.to_string(),
        }
    }

    /// Rebuild from collection values, recognizing the placeholder's own text form
    pub fn from_values(values: Vec<Value>) -> Self {
        let placeholder = matches!(
            values.as_slice(),
            [Value::Object(fields)]
                if fields.len() == 1 && fields.get("message").and_then(Value::as_str) == Some(NO_QUIZZES_NOTICE)
        );
        if placeholder {
            Self::none_found()
        } else {
            Self::Found(records_from_values(values))
        }
    }

    /// Real quiz records; empty for the placeholder
    pub fn records(&self) -> &[CourseRecord] {
        match self {
            Self::Found(records) => records,
            Self::NoneFound { .. } => &[],
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::NoneFound { .. })
    }

    /// Prompt text: the placeholder becomes a single notice element
    pub fn to_text(&self) -> String {
        match self {
            Self::Found(records) => records_to_text(records),
            Self::NoneFound { notice } => json!([{ "message": notice }]).to_string(),
        }
    }
}

/// Course metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseInfo {
    pub name: Option<String>,
    pub code: Option<String>,
    pub instructor: Option<String>,
}

impl CourseInfo {
    /// Extract metadata from the LMS course object
    ///
    /// The instructor comes from `teacher` when present, otherwise from the
    /// display names in `teachers`.
    pub fn from_record(course: &Value) -> Self {
        debug!("CourseInfo::from_record: called");
        let text = |key: &str| {
            course
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let instructor = text("teacher").or_else(|| {
            let names: Vec<&str> = course
                .get("teachers")
                .and_then(Value::as_array)?
                .iter()
                .filter_map(|t| t.get("display_name").and_then(Value::as_str))
                .collect();
            if names.is_empty() { None } else { Some(names.join(", ")) }
        });

        Self {
            name: text("name"),
            code: text("course_code"),
            instructor,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.code.is_none() && self.instructor.is_none()
    }
}

/// The four course collections as pre-serialized JSON text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseMaterials {
    pub modules: String,
    pub assignments: String,
    pub quizzes: String,
    pub files: String,
}

impl CourseMaterials {
    pub fn text(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Module => &self.modules,
            ResourceKind::Assignment => &self.assignments,
            ResourceKind::Quiz => &self.quizzes,
            ResourceKind::File => &self.files,
        }
    }

    /// Recover the resource inventory from caller-supplied text
    ///
    /// A collection that is not a JSON array cannot be inventoried; it is
    /// logged and left out of reconciliation.
    pub fn inventory(&self) -> ResourceInventory {
        debug!("CourseMaterials::inventory: called");
        let mut inventory = ResourceInventory::default();
        for kind in ResourceKind::ALL {
            match serde_json::from_str::<Value>(self.text(kind)) {
                Ok(Value::Array(values)) if kind == ResourceKind::Quiz => {
                    inventory.add_records(kind, QuizSet::from_values(values).records())
                }
                Ok(Value::Array(values)) => inventory.add_records(kind, &records_from_values(values)),
                Ok(_) | Err(_) => {
                    warn!(%kind, "CourseMaterials::inventory: collection is not a JSON array, not tracked");
                }
            }
        }
        inventory
    }
}

/// Identifiers of the input resources, per category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceInventory {
    ids: BTreeMap<ResourceKind, BTreeSet<String>>,
    untracked: BTreeMap<ResourceKind, usize>,
}

impl ResourceInventory {
    pub fn add_records(&mut self, kind: ResourceKind, records: &[CourseRecord]) {
        let ids = self.ids.entry(kind).or_default();
        for record in records {
            match record.id() {
                Some(id) => {
                    ids.insert(id);
                }
                None => *self.untracked.entry(kind).or_default() += 1,
            }
        }
    }

    pub fn ids(&self, kind: ResourceKind) -> impl Iterator<Item = &String> {
        self.ids.get(&kind).into_iter().flatten()
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.ids.get(&kind).map_or(0, BTreeSet::len)
    }

    /// Records of this kind that carry no identifier
    pub fn untracked(&self, kind: ResourceKind) -> usize {
        self.untracked.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.ids.values().map(BTreeSet::len).sum()
    }
}

/// Everything fetched from the LMS for one run; immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct RawCourseData {
    pub course_id: CourseId,
    pub modules: Vec<CourseRecord>,
    pub assignments: Vec<CourseRecord>,
    pub quizzes: QuizSet,
    pub files: Vec<CourseRecord>,
    pub course_info: CourseInfo,
}

impl RawCourseData {
    /// Serialize the four collections for prompt embedding
    pub fn materials(&self) -> CourseMaterials {
        CourseMaterials {
            modules: records_to_text(&self.modules),
            assignments: records_to_text(&self.assignments),
            quizzes: self.quizzes.to_text(),
            files: records_to_text(&self.files),
        }
    }

    /// Identifiers that must be traceable into the final outline
    pub fn inventory(&self) -> ResourceInventory {
        let mut inventory = ResourceInventory::default();
        inventory.add_records(ResourceKind::Module, &self.modules);
        inventory.add_records(ResourceKind::Assignment, &self.assignments);
        inventory.add_records(ResourceKind::Quiz, self.quizzes.records());
        inventory.add_records(ResourceKind::File, &self.files);
        inventory
    }
}
