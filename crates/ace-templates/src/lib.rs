//! ACE phase templates
//!
//! Provides the five built-in phase templates (START, ANALYZE, CREATE,
//! EVALUATE, COMMIT), the parser that checks their structure at load time,
//! and the placeholder resolver that binds user inputs to slots.
//!
//! Templates can be overridden per phase by placing `<phase>.md` files in the
//! directory configured as `[templates] dir`.

pub mod parser;
pub mod resolver;
pub mod store;
pub mod template;

pub use parser::{extract_markers, parse_template};
pub use resolver::{ResolveContext, is_unfilled, materialize_references, render_inputs, resolve};
pub use store::{TemplateSource, TemplateStore};
pub use template::{Slot, Template};
