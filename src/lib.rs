pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod validation;

pub use config::GatewayConfig;
pub use error::{ErrorDetail, ErrorKind, GatewayError};
pub use models::*;
pub use services::*;
pub use validation::*;
