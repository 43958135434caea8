//! # Pagesmith Core
//!
//! The "Brain" of the Pagesmith system - turns a task brief into a published
//! repository: decodes attachments, asks a completion endpoint for a
//! multi-file web project, commits everything to GitHub, enables Pages, and
//! notifies the evaluator.
//!
//! ## Architecture
//!
//! - `attachments` - inbound attachment decoding and prompt summaries
//! - `generate/` - prompt assembly and the multi-file response parser
//! - `github` - repository store client (repos, contents, commits, pages)
//! - `workflow` - the ordered publishing sequence
//! - `store` - the on-disk idempotency store
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pagesmith_core::{config::Config, context::AppContext, workflow};
//!
//! let ctx = AppContext::new(Config::from_env()?)?;
//! let (payload, report) = workflow::process_request(&ctx, request).await?;
//! ```

pub mod attachments;
pub mod config;
pub mod context;
pub mod generate;
pub mod github;
pub mod license;
pub mod llm;
pub mod models;
pub mod store;
pub mod workflow;
