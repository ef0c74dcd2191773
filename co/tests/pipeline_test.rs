//! End-to-end pipeline tests against a stubbed LMS and reasoning service

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lmsclient::LmsError;
use serde_json::{Value, json};

use courseoutline::config::PipelineConfig;
use courseoutline::course::{CourseId, CourseMaterials, CourseSource, NO_QUIZZES_NOTICE, ResourceKind};
use courseoutline::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, ResponseFormat, TokenUsage};
use courseoutline::outline::{CompletenessPolicy, OutlinePipeline, PipelineError, PipelineRun, PipelineState};
use courseoutline::prompts::{PromptLoader, Stage};

/// LMS stub with fixed course data and optional failing endpoints
struct StubCourse {
    modules: Vec<Value>,
    assignments: Vec<Value>,
    quizzes: Vec<Value>,
    files: Vec<Value>,
    fail: Vec<&'static str>,
}

impl StubCourse {
    fn new(files: usize) -> Self {
        Self {
            modules: vec![
                json!({"id": 1, "name": "Week 1: Foundations", "position": 1}),
                json!({"id": 2, "name": "Week 2: Memory", "position": 2}),
            ],
            assignments: vec![
                json!({"id": 10, "name": "Project 1", "due_at": "2024-09-10T23:59:00Z"}),
                json!({"id": 11, "name": "Project 2", "due_at": "2024-09-24T23:59:00Z"}),
            ],
            quizzes: vec![json!({"id": 20, "title": "Quiz 1"})],
            files: (0..files)
                .map(|i| {
                    json!({
                        "id": 100 + i,
                        "display_name": format!("lecture-{:02}.pdf", i),
                        "url": format!("https://lms.test/files/{}/download", 100 + i)
                    })
                })
                .collect(),
            fail: Vec::new(),
        }
    }

    fn failing(mut self, endpoint: &'static str) -> Self {
        self.fail.push(endpoint);
        self
    }

    fn answer(&self, endpoint: &'static str, values: &[Value]) -> Result<Vec<Value>, LmsError> {
        if self.fail.contains(&endpoint) {
            return Err(LmsError::Api {
                status: 500,
                message: format!("{} unavailable", endpoint),
            });
        }
        Ok(values.to_vec())
    }
}

#[async_trait]
impl CourseSource for StubCourse {
    async fn get_course(&self, course_id: &CourseId) -> Result<Value, LmsError> {
        self.answer("course", &[])?;
        Ok(json!({"id": course_id.as_str(), "name": "Computer Systems", "course_code": "CMSC216"}))
    }

    async fn get_course_modules(&self, _: &CourseId) -> Result<Vec<Value>, LmsError> {
        self.answer("modules", &self.modules)
    }

    async fn get_course_assignments(&self, _: &CourseId) -> Result<Vec<Value>, LmsError> {
        self.answer("assignments", &self.assignments)
    }

    async fn get_course_quizzes(&self, _: &CourseId) -> Result<Vec<Value>, LmsError> {
        self.answer("quizzes", &self.quizzes)
    }

    async fn get_course_files(&self, _: &CourseId) -> Result<Vec<Value>, LmsError> {
        self.answer("files", &self.files)
    }
}

/// Deterministic reasoning-service stub
///
/// Analysis and Planning echo their prompt back inside a JSON object. The
/// Organization call copies the course data lines of its prompt into an
/// outline, optionally dropping files.
#[derive(Default)]
struct EchoLlm {
    requests: Mutex<Vec<CompletionRequest>>,
    responses: Mutex<Vec<String>>,
    drop_files: usize,
}

impl EchoLlm {
    fn dropping(drop_files: usize) -> Self {
        Self {
            drop_files,
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn prompt(&self, i: usize) -> String {
        self.requests.lock().unwrap()[i].messages[0].content.clone()
    }

    fn response(&self, i: usize) -> String {
        self.responses.lock().unwrap()[i].clone()
    }

    fn organize(&self, prompt: &str) -> String {
        let line = |label: &str| -> Value {
            prompt
                .lines()
                .find_map(|l| l.strip_prefix(label))
                .and_then(|rest| serde_json::from_str(rest).ok())
                .unwrap_or(Value::Null)
        };
        let mut files = line("Files: ");
        if let Value::Array(items) = &mut files {
            let keep = items.len().saturating_sub(self.drop_files);
            items.truncate(keep);
        }
        json!({
            "content_organization": {
                "modules": line("Modules: "),
                "assignments": line("Assignments: "),
                "quizzes": line("Quizzes: ")
            },
            "resources": files
        })
        .to_string()
    }
}

#[async_trait]
impl LlmClient for EchoLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request.messages[0].content.clone();
        let text = if prompt.contains("Use this planned structure:") {
            self.organize(&prompt)
        } else {
            json!({ "echo": prompt }).to_string()
        };
        self.requests.lock().unwrap().push(request);
        self.responses.lock().unwrap().push(text.clone());
        Ok(CompletionResponse {
            content: Some(text),
            model: None,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
            ..Default::default()
        })
    }
}

/// Returns fixed texts in order
struct ScriptedLlm {
    texts: Vec<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(texts: Vec<&'static str>) -> Self {
        Self {
            texts,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let i = self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts
            .get(i)
            .map(|t| CompletionResponse::text(*t))
            .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))
    }
}

/// Never answers
struct HangingLlm;

#[async_trait]
impl LlmClient for HangingLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        std::future::pending().await
    }
}

fn pipeline(llm: Arc<dyn LlmClient>, policy: CompletenessPolicy) -> OutlinePipeline {
    let config = PipelineConfig {
        completeness: policy,
        ..Default::default()
    };
    OutlinePipeline::new(llm, config, PromptLoader::embedded_only())
}

fn course() -> CourseId {
    CourseId::from(1378721u64)
}

#[tokio::test]
async fn test_resources_match_input_files() {
    for files in [1usize, 3, 25] {
        let llm = Arc::new(EchoLlm::default());
        let mut run = PipelineRun::new(course());

        let result = pipeline(llm.clone(), CompletenessPolicy::Enforce)
            .run_course(&mut run, &StubCourse::new(files))
            .await
            .unwrap();

        assert_eq!(result.outline.resource_count(), files);
        assert!(result.completeness.as_ref().unwrap().is_complete());
        assert_eq!(run.state(), PipelineState::Done);
        assert_eq!(llm.calls(), 3);
    }
}

#[tokio::test]
async fn test_quiz_failure_still_completes() {
    let llm = Arc::new(EchoLlm::default());
    let mut run = PipelineRun::new(course());

    let result = pipeline(llm.clone(), CompletenessPolicy::Enforce)
        .run_course(&mut run, &StubCourse::new(2).failing("quizzes"))
        .await
        .unwrap();

    assert_eq!(run.state(), PipelineState::Done);
    let quizzes = &result.outline.content_organization().unwrap()["quizzes"];
    assert_eq!(quizzes[0]["message"], NO_QUIZZES_NOTICE);
    assert!(llm.prompt(2).contains(NO_QUIZZES_NOTICE));
    let report = result.completeness.unwrap();
    assert!(report.categories[&ResourceKind::Quiz].missing.is_empty());
}

#[tokio::test]
async fn test_fetch_failure_makes_no_generation_calls() {
    for endpoint in ["modules", "assignments", "files", "course"] {
        let llm = Arc::new(EchoLlm::default());
        let mut run = PipelineRun::new(course());

        let err = pipeline(llm.clone(), CompletenessPolicy::Enforce)
            .run_course(&mut run, &StubCourse::new(2).failing(endpoint))
            .await
            .unwrap_err();

        assert!(err.is_fatal_fetch(), "{} failure was not a fetch error: {}", endpoint, err);
        assert_eq!(run.state(), PipelineState::Failed);
        assert_eq!(llm.calls(), 0, "{} failure still called the model", endpoint);
        assert!(!run.history().any(|s| s == PipelineState::Analyzing));
    }
}

#[tokio::test]
async fn test_final_output_must_be_json_object() {
    for last in ["Here is the outline you asked for.", "[{\"id\": 100}]", ""] {
        let llm = Arc::new(ScriptedLlm::new(vec![r#"{"analysis": {}}"#, r#"{"plan": {}}"#, last]));
        let mut run = PipelineRun::new(course());

        let err = pipeline(llm, CompletenessPolicy::Enforce)
            .run_course(&mut run, &StubCourse::new(1))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MalformedOutput { .. }), "{:?}", err);
        assert_eq!(err.raw_output(), Some(last));
        assert_eq!(run.state(), PipelineState::Failed);
        assert_eq!(run.stages().len(), 3);
    }
}

#[tokio::test]
async fn test_invalid_intermediate_output_is_passed_along() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        "not json at all",
        "still not json",
        r#"{"resources": [{"id": 100}]}"#,
    ]));
    let mut run = PipelineRun::new(course());

    let result = pipeline(llm, CompletenessPolicy::Off)
        .run_course(&mut run, &StubCourse::new(1))
        .await
        .unwrap();
    assert_eq!(result.outline.resource_count(), 1);
}

#[tokio::test]
async fn test_stage_hand_off_chain() {
    let llm = Arc::new(EchoLlm::default());
    let mut run = PipelineRun::new(course());
    let stub = StubCourse::new(3);

    pipeline(llm.clone(), CompletenessPolicy::Enforce)
        .run_course(&mut run, &stub)
        .await
        .unwrap();

    let analysis_out = llm.response(0);
    let plan_out = llm.response(1);
    assert!(llm.prompt(1).contains(&analysis_out));
    assert!(llm.prompt(2).contains(&plan_out));

    let organization = llm.prompt(2);
    for collection in [&stub.modules, &stub.assignments, &stub.quizzes, &stub.files] {
        assert!(organization.contains(&Value::Array(collection.clone()).to_string()));
    }
    assert!(organization.contains("Code: CMSC216"));

    // Planning sees only the analysis, not the raw files
    let planning_without_echo = llm.prompt(1).replace(&analysis_out, "");
    assert!(!planning_without_echo.contains("lecture-00.pdf"));

    let requests = llm.requests.lock().unwrap();
    assert!(requests.iter().all(|r| r.response_format == ResponseFormat::JsonObject));
}

#[tokio::test]
async fn test_deterministic_orchestration() {
    let mut outlines = Vec::new();
    for _ in 0..2 {
        let mut run = PipelineRun::new(course());
        let result = pipeline(Arc::new(EchoLlm::default()), CompletenessPolicy::Enforce)
            .run_course(&mut run, &StubCourse::new(4))
            .await
            .unwrap();
        outlines.push(result.outline);
    }
    assert_eq!(outlines[0], outlines[1]);
}

#[tokio::test]
async fn test_dropped_resources_detected() {
    let mut run = PipelineRun::new(course());
    let err = pipeline(Arc::new(EchoLlm::dropping(2)), CompletenessPolicy::Enforce)
        .run_course(&mut run, &StubCourse::new(5))
        .await
        .unwrap_err();
    match err {
        PipelineError::Incomplete(report) => {
            assert_eq!(report.missing(ResourceKind::File), &["103".to_string(), "104".to_string()]);
            assert_eq!(report.missing_total(), 2);
        }
        other => panic!("expected incomplete outline, got {:?}", other),
    }
    assert_eq!(run.state(), PipelineState::Failed);

    let mut run = PipelineRun::new(course());
    let result = pipeline(Arc::new(EchoLlm::dropping(2)), CompletenessPolicy::Report)
        .run_course(&mut run, &StubCourse::new(5))
        .await
        .unwrap();
    assert_eq!(result.completeness.unwrap().missing_total(), 2);
    assert_eq!(run.state(), PipelineState::Done);
}

#[tokio::test]
async fn test_generate_from_supplied_materials() {
    let llm = Arc::new(EchoLlm::default());
    let materials = CourseMaterials {
        modules: json!([{"id": "m1"}]).to_string(),
        assignments: "[]".to_string(),
        quizzes: json!([{"message": NO_QUIZZES_NOTICE}]).to_string(),
        files: json!([{"id": "f1", "url": "https://lms.test/f1"}]).to_string(),
    };
    let mut run = PipelineRun::new(course());

    let result = pipeline(llm, CompletenessPolicy::Enforce)
        .generate_outline(&mut run, &materials, None)
        .await
        .unwrap();

    assert_eq!(result.outline.resource_count(), 1);
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
}

#[tokio::test]
async fn test_stage_deadline() {
    let config = PipelineConfig {
        stage_timeout_ms: 30,
        ..Default::default()
    };
    let pipeline = OutlinePipeline::new(Arc::new(HangingLlm), config, PromptLoader::embedded_only());
    let mut run = PipelineRun::new(course());

    let err = pipeline.run_course(&mut run, &StubCourse::new(1)).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Timeout {
            phase: PipelineState::Analyzing,
            ..
        }
    ));
    assert_eq!(err.failed_stage(), Some(Stage::Analysis));
    assert_eq!(run.state(), PipelineState::Failed);
}

#[tokio::test]
async fn test_cancel_in_flight_stage() {
    let pipeline = pipeline(Arc::new(HangingLlm), CompletenessPolicy::Enforce);
    let mut run = PipelineRun::new(course());
    let token = run.cancel_token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let err = pipeline.run_course(&mut run, &StubCourse::new(1)).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Cancelled {
            phase: PipelineState::Analyzing
        }
    ));
    assert_eq!(run.state(), PipelineState::Failed);
}
