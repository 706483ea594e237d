pub mod config;
pub mod error;
pub mod ids;
pub mod model;

pub use config::Config;
pub use error::*;
pub use ids::*;
pub use model::*;
