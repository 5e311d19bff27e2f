pub mod sql_analysis;
pub mod sql_validator;

pub use sql_validator::{SqlValidator, StageOutcome, ValidatedSql, ValidatorLimits};
