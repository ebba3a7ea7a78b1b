pub mod config;
pub mod error;
pub mod node;
pub mod types;

pub use config::*;
pub use error::*;
pub use node::*;
pub use types::*;
