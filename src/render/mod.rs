//! Output rendering: markdown tables via minijinja templates, or pretty JSON.

pub mod json;
pub mod markdown;
