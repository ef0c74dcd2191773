//! CourseOutline - course outline generator
//!
//! CLI entry point for fetching LMS courses and generating their outlines.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use eyre::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courseoutline::cli::{Cli, Command, OutputFormat, config_path_arg, generate_after_help, resolve_output_path};
use courseoutline::config::Config;
use courseoutline::course::{CourseId, CourseInfo, CourseMaterials};
use courseoutline::outline::{GeneratedOutline, OutlinePipeline, PipelineError, PipelineRun};
use courseoutline::tools::lms_tool_definitions;
use lmsclient::LmsClient;

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("courseoutline")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = match cli_log_level.map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(log_dir.join("courseoutline.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Help text only; the real load below reports config errors
    let help_config = Config::load(config_path_arg(std::env::args()).as_ref()).unwrap_or_default();
    let cmd = Cli::command().after_help(generate_after_help(&help_config));
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    setup_logging(cli.requested_log_level()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("CourseOutline loaded config: model={}", config.llm.model);

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Outline {
            course_id,
            output,
            token,
        } => {
            debug!(%course_id, ?output, "main: matched Outline command");
            cmd_outline(&config, course_id, output.as_deref(), token.as_deref()).await
        }
        Command::Generate {
            course_id,
            modules,
            assignments,
            quizzes,
            files,
            name,
            code,
            instructor,
            output,
        } => {
            debug!(%course_id, "main: matched Generate command");
            let materials = CourseMaterials {
                modules: read_collection(&modules)?,
                assignments: read_collection(&assignments)?,
                quizzes: read_collection(&quizzes)?,
                files: read_collection(&files)?,
            };
            let info = CourseInfo {
                name,
                code,
                instructor,
            };
            cmd_generate(&config, course_id, materials, info, output.as_deref()).await
        }
        Command::Courses { token, format } => {
            debug!(?format, "main: matched Courses command");
            cmd_courses(&config, token.as_deref(), format).await
        }
        Command::Tools => {
            debug!("main: matched Tools command");
            cmd_tools()
        }
    }
}

/// Fetch a course from the LMS and generate its outline
async fn cmd_outline(config: &Config, course_id: CourseId, output: Option<&Path>, token: Option<&str>) -> Result<()> {
    debug!(%course_id, "cmd_outline: called");
    config.validate()?;
    let client = lms_client(config, token)?;
    let pipeline = OutlinePipeline::from_config(config)?;

    let mut run = PipelineRun::with_cancel(course_id.clone(), cancel_on_ctrl_c());
    eprintln!("{} Generating outline for course {}", "→".cyan(), course_id.to_string().cyan());

    let result = pipeline.run_course(&mut run, &client).await;
    finish(result, &course_id, output)
}

/// Generate an outline from collections read from disk
async fn cmd_generate(
    config: &Config,
    course_id: CourseId,
    materials: CourseMaterials,
    info: CourseInfo,
    output: Option<&Path>,
) -> Result<()> {
    debug!(%course_id, "cmd_generate: called");
    config.validate()?;
    let pipeline = OutlinePipeline::from_config(config)?;

    let mut run = PipelineRun::with_cancel(course_id.clone(), cancel_on_ctrl_c());
    eprintln!("{} Generating outline for course {}", "→".cyan(), course_id.to_string().cyan());

    let result = pipeline.generate_outline(&mut run, &materials, Some(&info)).await;
    finish(result, &course_id, output)
}

/// List courses visible to the token
async fn cmd_courses(config: &Config, token: Option<&str>, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_courses: called");
    let client = lms_client(config, token)?;
    let courses = client.get_courses().await.context("Failed to list courses")?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&courses)?);
        }
        OutputFormat::Text => {
            if courses.is_empty() {
                println!("No courses found");
            }
            for course in &courses {
                let field = |key: &str| match course.get(key) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(serde_json::Value::Number(n)) => n.to_string(),
                    _ => "-".to_string(),
                };
                println!("{:>10}  {:<16} {}", field("id").yellow(), field("course_code"), field("name"));
            }
        }
    }
    Ok(())
}

/// Print the LMS retrieval tool schemas
fn cmd_tools() -> Result<()> {
    debug!("cmd_tools: called");
    let schemas: Vec<serde_json::Value> = lms_tool_definitions().iter().map(|t| t.to_openai_schema()).collect();
    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}

fn lms_client(config: &Config, token: Option<&str>) -> Result<LmsClient> {
    let token = config.lms_token(token)?;
    LmsClient::new(config.lms.client_config(token)).context("Failed to create LMS client")
}

/// Token cancelled on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling run");
            child.cancel();
        }
    });
    token
}

fn read_collection(path: &Path) -> Result<String> {
    debug!(?path, "read_collection: called");
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Report the run result and write the outline
fn finish(result: Result<GeneratedOutline, PipelineError>, course_id: &CourseId, output: Option<&Path>) -> Result<()> {
    let generated = match result {
        Ok(generated) => generated,
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            if let Some(stage) = e.failed_stage() {
                debug!(%stage, "finish: run failed in stage");
            }
            if let PipelineError::Generation { source, .. } = &e
                && let Some(after) = source.retry_after()
            {
                eprintln!("{} Rate limited, try again in {}s", "!".yellow(), after.as_secs());
            }
            if let Some(raw) = e.raw_output() {
                debug!(%raw, "finish: malformed final output");
            }
            return Err(e).context(format!("Outline generation failed for course {}", course_id));
        }
    };

    if let Some(report) = &generated.completeness
        && !report.is_complete()
    {
        eprintln!("{} Outline incomplete: {}", "!".yellow(), report);
    }

    let json = serde_json::to_string_pretty(&generated.outline)?;
    match output {
        Some(path) => {
            let path = resolve_output_path(path, course_id);
            fs::write(&path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Outline written to {}", "✓".green(), path.display());
        }
        None => println!("{}", json),
    }

    eprintln!(
        "{} Done in {} stages, {} tokens",
        "✓".green(),
        generated.stages.len(),
        generated.usage.total()
    );
    Ok(())
}
