pub mod extended;
pub mod inputs;
pub mod join_key;
pub mod repository;

pub use extended::*;
pub use inputs::*;
pub use join_key::*;
pub use repository::*;
