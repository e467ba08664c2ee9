pub mod error;
pub mod stats;
pub mod types;

pub use error::*;
pub use types::*;
