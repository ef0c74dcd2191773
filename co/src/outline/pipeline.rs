//! Outline pipeline orchestrator
//!
//! Drives one run through FETCHING -> ANALYZING -> PLANNING -> ORGANIZING ->
//! DONE. Stages are strictly sequential: each stage's prompt embeds the text
//! of the one before it, and Organization re-embeds the original course data
//! so the final outline is grounded against the source rather than only the
//! plan.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use eyre::Context;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::document::Outline;
use super::error::PipelineError;
use super::reconcile::{CompletenessPolicy, CompletenessReport, reconcile};
use super::runner::{StageOutput, StageRunner};
use super::state::{PipelineRun, PipelineState, StageRecord};
use crate::config::{Config, PipelineConfig};
use crate::course::{CourseId, CourseInfo, CourseMaterials, CourseSource, ResourceInventory, fetch_course_data};
use crate::llm::{LlmClient, TokenUsage, create_client};
use crate::prompts::{PromptContext, PromptLoader, Stage};

/// Successful pipeline result
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedOutline {
    pub run_id: Uuid,
    pub course_id: CourseId,
    pub outline: Outline,
    /// Absent when reconciliation is off
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completeness: Option<CompletenessReport>,
    pub stages: Vec<StageRecord>,
    pub usage: TokenUsage,
    pub generated_at: DateTime<Utc>,
}

/// The three-stage outline generator
pub struct OutlinePipeline {
    runner: StageRunner,
    loader: PromptLoader,
    config: PipelineConfig,
}

impl OutlinePipeline {
    /// Stages without a configured model send no model, so the client's own applies
    pub fn new(llm: Arc<dyn LlmClient>, config: PipelineConfig, loader: PromptLoader) -> Self {
        debug!(?config, "OutlinePipeline::new: called");
        Self {
            runner: StageRunner::new(llm, config.max_tokens, config.stage_timeout()),
            loader,
            config,
        }
    }

    /// Build the pipeline from application config
    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        debug!(provider = %config.llm.provider, "OutlinePipeline::from_config: called");
        let llm = create_client(&config.llm).context("Failed to create LLM client")?;
        let loader = match &config.pipeline.prompts_dir {
            Some(dir) => PromptLoader::new(dir),
            None => PromptLoader::embedded_only(),
        };
        let pipeline = config.pipeline.clone().with_default_model(&config.llm.model);
        Ok(Self::new(llm, pipeline, loader))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch the run's course from `source`, then generate its outline
    pub async fn run_course(
        &self,
        run: &mut PipelineRun,
        source: &dyn CourseSource,
    ) -> Result<GeneratedOutline, PipelineError> {
        debug!(run_id = %run.id, course_id = %run.course_id, "OutlinePipeline::run_course: called");
        run.transition(PipelineState::Fetching);

        let cancel = run.cancel_token().clone();
        let data = match fetch_course_data(source, &run.course_id, self.config.fetch_timeout(), &cancel).await {
            Ok(data) => data,
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Course fetch failed");
                run.fail();
                return Err(e);
            }
        };

        let materials = data.materials();
        let inventory = data.inventory();
        self.generate(run, &materials, Some(&data.course_info), inventory).await
    }

    /// Generate an outline from caller-supplied course data
    ///
    /// Reconciliation uses the identifiers found in the materials text.
    pub async fn generate_outline(
        &self,
        run: &mut PipelineRun,
        materials: &CourseMaterials,
        course_info: Option<&CourseInfo>,
    ) -> Result<GeneratedOutline, PipelineError> {
        debug!(run_id = %run.id, course_id = %run.course_id, "OutlinePipeline::generate_outline: called");
        let inventory = materials.inventory();
        self.generate(run, materials, course_info, inventory).await
    }

    async fn generate(
        &self,
        run: &mut PipelineRun,
        materials: &CourseMaterials,
        course_info: Option<&CourseInfo>,
        inventory: ResourceInventory,
    ) -> Result<GeneratedOutline, PipelineError> {
        let result = self.generate_stages(run, materials, course_info, inventory).await;
        if let Err(e) = &result {
            warn!(run_id = %run.id, state = %run.state(), error = %e, "Pipeline run failed");
            run.fail();
        }
        result
    }

    async fn generate_stages(
        &self,
        run: &mut PipelineRun,
        materials: &CourseMaterials,
        course_info: Option<&CourseInfo>,
        inventory: ResourceInventory,
    ) -> Result<GeneratedOutline, PipelineError> {
        let course_id = run.course_id.clone();

        let analysis = self
            .stage(run, Stage::Analysis, PromptContext::analysis(&course_id, materials, course_info))
            .await?;
        let plan = self
            .stage(run, Stage::Planning, PromptContext::planning(&course_id, &analysis.text))
            .await?;
        let organized = self
            .stage(
                run,
                Stage::Organization,
                PromptContext::organization(&course_id, &plan.text, materials, course_info),
            )
            .await?;

        let outline = Outline::parse(&organized.text)?;
        debug!(sections = outline.as_map().len(), "OutlinePipeline::generate_stages: outline parsed");

        let completeness = match self.config.completeness {
            CompletenessPolicy::Off => None,
            policy => {
                let report = reconcile(&outline, &inventory);
                if !report.is_complete() {
                    if policy == CompletenessPolicy::Enforce {
                        return Err(PipelineError::Incomplete(report));
                    }
                    warn!(run_id = %run.id, "Outline incomplete: {}", report);
                }
                Some(report)
            }
        };

        run.transition(PipelineState::Done);
        info!(
            run_id = %run.id,
            "Outline for course {} generated ({} resources, {} tokens)",
            course_id,
            outline.resource_count(),
            run.usage().total()
        );

        Ok(GeneratedOutline {
            run_id: run.id,
            course_id,
            outline,
            completeness,
            stages: run.stages().to_vec(),
            usage: run.usage(),
            generated_at: Utc::now(),
        })
    }

    /// Build the prompt for one stage and run it
    async fn stage(
        &self,
        run: &mut PipelineRun,
        stage: Stage,
        context: PromptContext,
    ) -> Result<StageOutput, PipelineError> {
        debug!(run_id = %run.id, %stage, "OutlinePipeline::stage: called");
        run.transition(PipelineState::for_stage(stage));

        let input = self.loader.build(stage, &context).map_err(|e| PipelineError::Prompt {
            stage,
            message: format!("{:#}", e),
        })?;
        let model = self.config.model_for(stage);
        let cancel = run.cancel_token().clone();
        let output = self.runner.run(stage, input, model, &cancel).await?;

        run.record_stage(StageRecord {
            stage,
            model: output.model.clone(),
            output_chars: output.text.len(),
            usage: output.usage,
            elapsed: output.elapsed,
        });
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use serde_json::json;

    fn materials() -> CourseMaterials {
        CourseMaterials {
            modules: json!([{"id": 1, "name": "Week 1"}]).to_string(),
            assignments: json!([{"id": 10, "name": "HW1"}]).to_string(),
            quizzes: json!([{"message": "No quizzes found in this course"}]).to_string(),
            files: json!([{"id": 100, "url": "https://lms.test/f/100"}]).to_string(),
        }
    }

    const FINAL: &str = r#"{
        "course_information": {"name": "Intro"},
        "content_organization": [{"id": 1, "items": [{"id": 10}]}],
        "resources": [{"id": 100, "url": "https://lms.test/f/100"}]
    }"#;

    fn pipeline(mock: Arc<MockLlmClient>, policy: CompletenessPolicy) -> OutlinePipeline {
        let config = PipelineConfig {
            planning_model: Some("planner".to_string()),
            completeness: policy,
            ..Default::default()
        };
        OutlinePipeline::new(mock, config, PromptLoader::embedded_only())
    }

    #[tokio::test]
    async fn test_three_stages_in_order() {
        let mock = Arc::new(MockLlmClient::texts(&[r#"{"analysis":1}"#, r#"{"plan":2}"#, FINAL]));
        let pipeline = pipeline(mock.clone(), CompletenessPolicy::Enforce);
        let mut run = PipelineRun::new(CourseId::from(7u64));

        let result = pipeline.generate_outline(&mut run, &materials(), None).await.unwrap();

        assert_eq!(mock.call_count(), 3);
        assert_eq!(run.state(), PipelineState::Done);
        assert_eq!(
            run.history().collect::<Vec<_>>(),
            vec![
                PipelineState::Pending,
                PipelineState::Analyzing,
                PipelineState::Planning,
                PipelineState::Organizing,
                PipelineState::Done
            ]
        );
        assert_eq!(result.stages.len(), 3);
        assert_eq!(result.outline.resource_count(), 1);
        assert!(result.completeness.unwrap().is_complete());

        let requests = mock.requests();
        assert_eq!(requests[0].model, None);
        assert_eq!(requests[1].model.as_deref(), Some("planner"));
        assert_eq!(requests[2].model, None);
        assert!(requests[1].messages[0].content.contains(r#"{"analysis":1}"#));
        assert!(requests[2].messages[0].content.contains(r#"{"plan":2}"#));
        assert!(requests[2].messages[0].content.contains("https://lms.test/f/100"));
    }

    #[tokio::test]
    async fn test_generation_failure_stops_run() {
        let mock = Arc::new(MockLlmClient::scripted(vec![
            Ok(crate::llm::CompletionResponse::text("{}")),
            Err("overloaded".to_string()),
        ]));
        let pipeline = pipeline(mock.clone(), CompletenessPolicy::Enforce);
        let mut run = PipelineRun::new(CourseId::from(7u64));

        let err = pipeline.generate_outline(&mut run, &materials(), None).await.unwrap_err();

        assert_eq!(err.failed_stage(), Some(Stage::Planning));
        assert_eq!(mock.call_count(), 2);
        assert_eq!(run.state(), PipelineState::Failed);
        assert_eq!(run.stages().len(), 1);
    }

    #[tokio::test]
    async fn test_completeness_policies() {
        let partial = r#"{"resources": []}"#;

        let mock = Arc::new(MockLlmClient::texts(&["{}", "{}", partial]));
        let mut run = PipelineRun::new(CourseId::from(7u64));
        let err = pipeline(mock, CompletenessPolicy::Enforce)
            .generate_outline(&mut run, &materials(), None)
            .await
            .unwrap_err();
        match err {
            PipelineError::Incomplete(report) => assert_eq!(report.missing_total(), 3),
            other => panic!("expected incomplete, got {:?}", other),
        }

        let mock = Arc::new(MockLlmClient::texts(&["{}", "{}", partial]));
        let mut run = PipelineRun::new(CourseId::from(7u64));
        let result = pipeline(mock, CompletenessPolicy::Report)
            .generate_outline(&mut run, &materials(), None)
            .await
            .unwrap();
        assert!(!result.completeness.unwrap().is_complete());

        let mock = Arc::new(MockLlmClient::texts(&["{}", "{}", partial]));
        let mut run = PipelineRun::new(CourseId::from(7u64));
        let result = pipeline(mock, CompletenessPolicy::Off)
            .generate_outline(&mut run, &materials(), None)
            .await
            .unwrap();
        assert!(result.completeness.is_none());
    }

    #[tokio::test]
    async fn test_result_serializes() {
        let mock = Arc::new(MockLlmClient::texts(&["{}", "{}", FINAL]));
        let mut run = PipelineRun::new(CourseId::from(7u64));
        let result = pipeline(mock, CompletenessPolicy::Enforce)
            .generate_outline(&mut run, &materials(), None)
            .await
            .unwrap();

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["course_id"], "7");
        assert_eq!(value["outline"]["resources"][0]["id"], 100);
        assert_eq!(value["stages"][2]["stage"], "organization");
        assert_eq!(value["completeness"]["categories"]["file"]["expected"], 1);
    }

    #[tokio::test]
    async fn test_unset_stage_models_defer_to_client() {
        let mock = Arc::new(MockLlmClient::texts(&["{}", "{}", FINAL]));
        let pipeline = OutlinePipeline::new(mock.clone(), PipelineConfig::default(), PromptLoader::embedded_only());
        let mut run = PipelineRun::new(CourseId::from(7u64));

        pipeline.generate_outline(&mut run, &materials(), None).await.unwrap();

        let models: Vec<_> = mock.requests().into_iter().map(|r| r.model).collect();
        assert_eq!(models, vec![None, None, None]);
    }

    #[test]
    #[serial_test::serial]
    fn test_from_config_fills_stage_models_from_llm_model() {
        let mut config = Config::default();
        config.llm.model = "gpt-4o-mini".to_string();
        config.llm.api_key_env = "COURSEOUTLINE_PIPELINE_TEST_KEY".to_string();
        config.pipeline.organization_model = Some("gpt-4o".to_string());

        // SAFETY: serialized test, no other thread reads this variable
        unsafe { std::env::set_var("COURSEOUTLINE_PIPELINE_TEST_KEY", "sk-test") };
        let pipeline = OutlinePipeline::from_config(&config).unwrap();
        unsafe { std::env::remove_var("COURSEOUTLINE_PIPELINE_TEST_KEY") };

        assert_eq!(pipeline.config().model_for(Stage::Analysis), Some("gpt-4o-mini"));
        assert_eq!(pipeline.config().model_for(Stage::Planning), Some("gpt-4o-mini"));
        assert_eq!(pipeline.config().model_for(Stage::Organization), Some("gpt-4o"));
    }
}
