mod api;
mod notes;
pub mod utils;

pub use utils::{test_app, test_utils};
