pub mod error;
pub mod model;

pub use error::{OrchError, Result};
pub use model::*;
