pub mod commands;
pub mod util;

pub use util::{is_initialized, load_context, require_initialized};
