pub mod catalog;
pub mod execution;
pub mod orchestration;
pub mod translation;
pub mod validation;

pub use catalog::*;
pub use execution::*;
pub use orchestration::*;
pub use translation::*;
pub use validation::*;
