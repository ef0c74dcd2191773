//! Prompt Loader
//!
//! Loads stage templates from an override directory or falls back to the
//! embedded defaults, then renders them with Handlebars.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info};

use super::embedded;
use super::stage::{Stage, StageInput};
use crate::course::{CourseId, CourseInfo, CourseMaterials};

/// Context for rendering stage templates
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    /// Course the run is scoped to
    pub course_id: String,
    /// Course metadata, when known
    pub course_info: Option<CourseInfo>,
    /// Original course data (Analysis and Organization)
    pub materials: Option<CourseMaterials>,
    /// Output of the preceding stage (Planning and Organization)
    pub previous_output: Option<String>,
}

impl PromptContext {
    /// Context for the Analysis stage
    pub fn analysis(course_id: &CourseId, materials: &CourseMaterials, course_info: Option<&CourseInfo>) -> Self {
        debug!(%course_id, "PromptContext::analysis: called");
        Self {
            course_id: course_id.to_string(),
            course_info: course_info.filter(|i| !i.is_empty()).cloned(),
            materials: Some(materials.clone()),
            previous_output: None,
        }
    }

    /// Context for the Planning stage; only the analysis is carried forward
    pub fn planning(course_id: &CourseId, analysis: &str) -> Self {
        debug!(%course_id, analysis_len = analysis.len(), "PromptContext::planning: called");
        Self {
            course_id: course_id.to_string(),
            course_info: None,
            materials: None,
            previous_output: Some(analysis.to_string()),
        }
    }

    /// Context for the Organization stage; the original data is re-embedded
    pub fn organization(
        course_id: &CourseId,
        plan: &str,
        materials: &CourseMaterials,
        course_info: Option<&CourseInfo>,
    ) -> Self {
        debug!(%course_id, plan_len = plan.len(), "PromptContext::organization: called");
        Self {
            course_id: course_id.to_string(),
            course_info: course_info.filter(|i| !i.is_empty()).cloned(),
            materials: Some(materials.clone()),
            previous_output: Some(plan.to_string()),
        }
    }
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that checks `dir` before the embedded templates
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let exists = dir.is_dir();
        debug!(?dir, %exists, "PromptLoader::new: called");
        Self {
            hbs: Self::engine(),
            override_dir: if exists { Some(dir.to_path_buf()) } else { None },
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            override_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Course data and stage outputs are JSON and must reach the model verbatim
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks the override directory (`{name}.pmt`) first, then the embedded set.
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref dir) = self.override_dir {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in override directory");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
            debug!(?path, "PromptLoader::load_template: not in override directory");
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: found in embedded");
            return Ok(content.to_string());
        }

        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a single template with the given context
    pub fn render(&self, template_name: &str, context: &PromptContext) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }

    /// Build the system and user instructions for one stage
    pub fn build(&self, stage: Stage, context: &PromptContext) -> Result<StageInput> {
        debug!(%stage, "PromptLoader::build: called");
        if stage.needs_materials() && context.materials.is_none() {
            return Err(eyre!("{} prompt requires the original course data", stage));
        }
        if stage.needs_previous_output() && context.previous_output.is_none() {
            return Err(eyre!("{} prompt requires the preceding stage output", stage));
        }

        let name = stage.template_name();
        let system_instruction = self.render(&format!("{}-system", name), context)?;
        let user_instruction = self.render(&format!("{}-user", name), context)?;
        info!(
            "Built {} prompt ({} + {} chars)",
            stage,
            system_instruction.len(),
            user_instruction.len()
        );

        Ok(StageInput {
            system_instruction,
            user_instruction,
        })
    }
}
