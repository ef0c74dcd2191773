//! Resource fetching

use std::time::Duration;

use async_trait::async_trait;
use lmsclient::{LmsClient, LmsError};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::data::{CourseInfo, QuizSet, RawCourseData};
use super::id::CourseId;
use super::record::records_from_values;
use crate::outline::{PipelineError, PipelineState};

/// Where course data comes from
///
/// Implemented by the LMS client; tests provide stubs.
#[async_trait]
pub trait CourseSource: Send + Sync {
    async fn get_course(&self, course_id: &CourseId) -> Result<Value, LmsError>;
    async fn get_course_modules(&self, course_id: &CourseId) -> Result<Vec<Value>, LmsError>;
    async fn get_course_assignments(&self, course_id: &CourseId) -> Result<Vec<Value>, LmsError>;
    async fn get_course_quizzes(&self, course_id: &CourseId) -> Result<Vec<Value>, LmsError>;
    async fn get_course_files(&self, course_id: &CourseId) -> Result<Vec<Value>, LmsError>;
}

#[async_trait]
impl CourseSource for LmsClient {
    async fn get_course(&self, course_id: &CourseId) -> Result<Value, LmsError> {
        LmsClient::get_course(self, course_id.as_str()).await
    }

    async fn get_course_modules(&self, course_id: &CourseId) -> Result<Vec<Value>, LmsError> {
        LmsClient::get_course_modules(self, course_id.as_str()).await
    }

    async fn get_course_assignments(&self, course_id: &CourseId) -> Result<Vec<Value>, LmsError> {
        LmsClient::get_course_assignments(self, course_id.as_str()).await
    }

    async fn get_course_quizzes(&self, course_id: &CourseId) -> Result<Vec<Value>, LmsError> {
        LmsClient::get_course_quizzes(self, course_id.as_str()).await
    }

    async fn get_course_files(&self, course_id: &CourseId) -> Result<Vec<Value>, LmsError> {
        LmsClient::get_course_files(self, course_id.as_str()).await
    }
}

/// Fetch everything one pipeline run needs
///
/// The five retrievals are independent and run concurrently. Quizzes degrade
/// to a placeholder on any failure; every other failure aborts the fetch.
pub async fn fetch_course_data(
    source: &dyn CourseSource,
    course_id: &CourseId,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<RawCourseData, PipelineError> {
    debug!(%course_id, ?deadline, "fetch_course_data: called");

    let fatal = |resource: &'static str| {
        let course_id = course_id.clone();
        move |source: LmsError| PipelineError::Fetch {
            resource,
            course_id,
            source,
        }
    };

    let quizzes = async {
        match source.get_course_quizzes(course_id).await {
            Ok(values) => QuizSet::Found(records_from_values(values)),
            Err(e) if e.is_not_found() => {
                info!(%course_id, "Quizzes not available for this course, using placeholder");
                QuizSet::none_found()
            }
            Err(e) => {
                warn!(%course_id, error = %e, "Quiz retrieval failed, using placeholder");
                QuizSet::none_found()
            }
        }
    };

    let all = async {
        tokio::try_join!(
            async { source.get_course(course_id).await.map_err(fatal("course")) },
            async { source.get_course_modules(course_id).await.map_err(fatal("modules")) },
            async { source.get_course_assignments(course_id).await.map_err(fatal("assignments")) },
            async { Ok::<_, PipelineError>(quizzes.await) },
            async { source.get_course_files(course_id).await.map_err(fatal("files")) },
        )
    };

    let (course, modules, assignments, quizzes, files) = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(%course_id, "fetch_course_data: cancelled");
            return Err(PipelineError::Cancelled { phase: PipelineState::Fetching });
        }
        result = tokio::time::timeout(deadline, all) => match result {
            Ok(fetched) => fetched?,
            Err(_) => {
                debug!(%course_id, "fetch_course_data: deadline expired");
                return Err(PipelineError::Timeout { phase: PipelineState::Fetching, after: deadline });
            }
        },
    };

    let data = RawCourseData {
        course_id: course_id.clone(),
        modules: records_from_values(modules),
        assignments: records_from_values(assignments),
        quizzes,
        files: records_from_values(files),
        course_info: CourseInfo::from_record(&course),
    };
    info!(
        "Fetched course {}: {} modules, {} assignments, {} quizzes{}, {} files",
        course_id,
        data.modules.len(),
        data.assignments.len(),
        data.quizzes.records().len(),
        if data.quizzes.is_placeholder() { " (placeholder)" } else { "" },
        data.files.len()
    );
    Ok(data)
}
