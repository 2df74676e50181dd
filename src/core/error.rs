use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovenantError {
    #[error("Invalid cardinality: {0}")]
    InvalidCardinality(String),
    #[error("Invalid combination: {0}")]
    InvalidCombination(String),
    #[error("Invalid contract: {0}")]
    InvalidContract(String),
    #[error("Index divergence: {0}")]
    IndexDivergence(String),
}

pub type Result<T> = std::result::Result<T, CovenantError>;
