//! CLI command implementations.
//!
//! Every handler takes a [`CommandContext`] and returns `anyhow::Result<()>`;
//! library errors stay [`AceError`](crate::AceError) inside the `anyhow`
//! wrapper so `run` can map them to exit codes.

mod common;
mod fill;
mod json_emit;
mod render;
mod show;
mod start;
mod status;
mod templates;
mod validate;

pub use common::CommandContext;
pub use fill::execute_fill_command;
pub use json_emit::{StatusJsonOutput, emit_document_json, emit_status_json};
pub use render::execute_render_command;
pub use show::execute_show_command;
pub use start::execute_start_command;
pub use status::execute_status_command;
pub use templates::execute_templates_command;
pub use validate::execute_validate_command;
