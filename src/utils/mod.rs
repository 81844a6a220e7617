//! Utility modules

mod keyfile;
mod persistence;
mod slug;
mod validation;

pub use keyfile::load_or_create as load_or_create_api_key;
pub use persistence::{load_json_array, save_json_array};
pub use slug::{book_id, mtime_base36, slugify};
pub use validation::{check_engine, engine_available, DependencyStatus};
