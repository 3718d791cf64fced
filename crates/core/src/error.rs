use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown domain id: {0}")]
    UnknownDomain(String),
    #[error("unknown question id '{question}' in domain '{domain}'")]
    UnknownQuestion { domain: String, question: String },
    #[error("invalid workflow transition: cannot {action} from {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },
    #[error("failed to read catalog file: {0}")]
    CatalogRead(std::io::Error),
    #[error("failed to parse catalog: {0}")]
    CatalogParse(serde_yaml::Error),
    #[error("persistence error: {0}")]
    Store(#[from] StoreError),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
