pub mod collaborators; // Speech and reporting service interfaces
pub mod connection_pool;
pub mod database; // PostgreSQL and SQLite adapters
pub mod executor;
pub mod query_orchestrator;
pub mod schema_enhancer;
pub mod translator;

pub use collaborators::*;
pub use connection_pool::*;
pub use executor::*;
pub use query_orchestrator::*;
pub use schema_enhancer::*;
pub use translator::*;
