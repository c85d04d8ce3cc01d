pub mod client;
pub mod memory;
pub mod types;

pub use client::*;
pub use memory::*;
pub use types::*;
