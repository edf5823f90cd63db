use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TidelogError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Ownership violation: {0}")]
    Authorization(String),
    #[error("Domain violation: {0}")]
    DomainViolation(String),
}

impl TidelogError {
    /// Stable label used when a delivery failure is reported back to the
    /// publishing collaborator. Not-found and domain violations must stay
    /// distinguishable from generic failures downstream.
    pub fn label(&self) -> &'static str {
        match self {
            TidelogError::RusqliteError(_) => "sqlite",
            TidelogError::IoError(_) => "io",
            TidelogError::ConfigError(_) => "config",
            TidelogError::ValidationError(_) => "validation",
            TidelogError::NotFound(_) => "not_found",
            TidelogError::Authorization(_) => "authorization",
            TidelogError::DomainViolation(_) => "domain_violation",
        }
    }
}
