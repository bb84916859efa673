use thiserror::Error;

/// Common error type that can hold any renscript error
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("auth error: {0}")]
    Auth(#[from] crate::identity::AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Generic(String),
}

impl From<String> for CommonError {
    fn from(s: String) -> Self {
        CommonError::Generic(s)
    }
}

impl From<&str> for CommonError {
    fn from(s: &str) -> Self {
        CommonError::Generic(s.to_string())
    }
}
