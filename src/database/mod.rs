pub mod generation;
pub mod memberships;
pub mod schema;
pub mod settings;

pub use generation::*;
pub use memberships::*;
pub use schema::*;
pub use settings::*;
