//! Course data model and resource fetching
//!
//! Course records are opaque: only the stable `id` field is interpreted,
//! everything else passes through to the prompts unchanged.

mod data;
mod id;
mod record;
mod source;

pub use data::{
    CourseInfo, CourseMaterials, NO_QUIZZES_NOTICE, QuizSet, RawCourseData, ResourceInventory, ResourceKind,
};
pub use id::CourseId;
pub use record::{CourseRecord, normalize_id, records_from_values, records_to_text};
pub use source::{CourseSource, fetch_course_data};
