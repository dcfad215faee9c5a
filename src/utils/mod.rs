//! Small helpers shared across modules.

pub mod minify;
pub mod slug;
