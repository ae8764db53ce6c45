pub mod acquisition;
pub mod conditioning;
pub mod config;
pub mod error;
pub mod filters;
pub mod local;
pub mod session;
pub mod stimulus;
pub mod utils;

pub use error::{P300Error, Result};
