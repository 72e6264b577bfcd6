use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrisisError {
    #[error("not initialized: run 'crisis init'")]
    NotInitialized,

    #[error("document not found: {collection}/{id}")]
    DocumentNotFound { collection: String, id: String },

    #[error("document already exists: {collection}/{id}")]
    DocumentExists { collection: String, id: String },

    #[error("change not found: #{0}")]
    ChangeNotFound(u64),

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("document {collection}/{id} is not a JSON object")]
    InvalidDocument { collection: String, id: String },

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CrisisError>;
