pub mod forum;
pub mod schools;

pub use forum::*;
pub use schools::*;

use rocket::serde::json::Json;

use crate::validation::{ApiData, data};

#[get("/health")]
pub fn health() -> Json<ApiData<&'static str>> {
    data("ok")
}
