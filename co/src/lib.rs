//! CourseOutline - staged LLM generation of LMS course outlines
//!
//! Course data (modules, assignments, quizzes, files and course metadata) is
//! fetched from the LMS and refined through three dependent reasoning-service
//! calls into a structured outline.
//!
//! # Core Concepts
//!
//! - **Staged Refinement**: Analysis, then Planning, then Organization, each
//!   stage consuming the text of the one before it
//! - **Grounded Output**: the final stage re-reads the original course data
//! - **No Silent Loss**: the outline is reconciled against every input id
//! - **Degrade, Don't Fail**: missing quizzes become a placeholder
//!
//! # Modules
//!
//! - [`course`] - Course data model and LMS fetching
//! - [`llm`] - Reasoning-service client trait and OpenAI implementation
//! - [`prompts`] - Stage prompt templates
//! - [`outline`] - Pipeline orchestration, output parsing and reconciliation
//! - [`tools`] - Function-calling schemas for the LMS retrievals
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod course;
pub mod llm;
pub mod outline;
pub mod prompts;
pub mod tools;

// Re-export commonly used types
pub use config::{Config, LlmConfig, LmsConfig, PipelineConfig};
pub use course::{CourseId, CourseInfo, CourseMaterials, CourseSource, RawCourseData, fetch_course_data};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, create_client};
pub use outline::{
    CompletenessPolicy, CompletenessReport, GeneratedOutline, Outline, OutlinePipeline, PipelineError, PipelineRun,
    PipelineState,
};
pub use prompts::{PromptLoader, Stage};
