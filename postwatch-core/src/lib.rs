pub mod accounts;
pub mod config;
pub mod error;
pub mod error_utils;
pub mod fetch;
pub mod types;

pub use accounts::*;
pub use config::*;
pub use error::*;
pub use error_utils::*;
pub use fetch::*;
pub use types::*;
