//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

use crate::config::Config;
use crate::course::CourseId;

/// CourseOutline - structured outlines for LMS courses
#[derive(Parser)]
#[command(
    name = "co",
    about = "Generate structured course outlines from LMS course data",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Shorthand for --log-level DEBUG
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Effective log level requested on the command line
    pub fn requested_log_level(&self) -> Option<&str> {
        if self.verbose {
            Some("DEBUG")
        } else {
            self.log_level.as_deref()
        }
    }
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch a course from the LMS and generate its outline
    Outline {
        /// Course identifier
        #[arg(value_parser = CourseId::from_str)]
        course_id: CourseId,

        /// Write the outline to this file (or directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// LMS bearer token (defaults to the token environment variable)
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Generate an outline from course data already on disk
    Generate {
        /// Course identifier
        #[arg(value_parser = CourseId::from_str)]
        course_id: CourseId,

        /// JSON array of modules
        #[arg(long, value_name = "FILE")]
        modules: PathBuf,

        /// JSON array of assignments
        #[arg(long, value_name = "FILE")]
        assignments: PathBuf,

        /// JSON array of quizzes
        #[arg(long, value_name = "FILE")]
        quizzes: PathBuf,

        /// JSON array of files
        #[arg(long, value_name = "FILE")]
        files: PathBuf,

        /// Course name
        #[arg(long)]
        name: Option<String>,

        /// Course code
        #[arg(long)]
        code: Option<String>,

        /// Instructor name
        #[arg(long)]
        instructor: Option<String>,

        /// Write the outline to this file (or directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the courses visible to the token
    Courses {
        /// LMS bearer token (defaults to the token environment variable)
        #[arg(short, long)]
        token: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the LMS retrieval tool definitions (function-calling schemas)
    Tools,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("courseoutline")
        .join("logs")
        .join("courseoutline.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Config path given on the command line, found before full parsing
///
/// The help text is built before clap parses, so `--config` is looked up by hand.
pub fn config_path_arg<I>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "-c" || arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

/// Generate the after_help text with credential checks and the log location
///
/// Checks the environment variables the config names for the API key and
/// the LMS token.
pub fn generate_after_help(config: &Config) -> String {
    debug!("generate_after_help: called");
    let mut help = String::new();

    help.push_str("Credentials:\n");
    for var in [&config.llm.api_key_env, &config.lms.token_env] {
        let set = std::env::var(var).map(|v| !v.trim().is_empty()).unwrap_or(false);
        let icon = if set { "\u{2705}" } else { "\u{274C}" };
        help.push_str(&format!("  {} {}\n", icon, var));
    }

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}

/// Output format for listing commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}

/// Default file name for a course's outline
pub fn outline_file_name(course_id: &CourseId) -> String {
    format!("course-outline-{}.json", course_id)
}

/// Resolve where to write an outline
///
/// A directory gets the default file name; anything else is used as-is.
pub fn resolve_output_path(output: &std::path::Path, course_id: &CourseId) -> PathBuf {
    debug!(?output, %course_id, "resolve_output_path: called");
    if output.is_dir() {
        output.join(outline_file_name(course_id))
    } else {
        output.to_path_buf()
    }
}
