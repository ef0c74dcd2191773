//! LmsClient - read-only Canvas LMS REST client
//!
//! Retrieves course collections (modules, assignments, quizzes, files) and
//! course metadata for a course identifier. Records are returned untouched as
//! JSON values; interpreting them is the caller's business.
//!
//! # Example
//!
//! ```ignore
//! use lmsclient::{LmsClient, LmsClientConfig};
//!
//! let client = LmsClient::new(LmsClientConfig::new(token))?;
//! let modules = client.get_course_modules("1378721").await?;
//! ```

mod client;
mod error;

pub use client::{DEFAULT_BASE_URL, DEFAULT_MAX_PAGES, DEFAULT_PER_PAGE, LmsClient, LmsClientConfig, next_page_link};
pub use error::LmsError;
