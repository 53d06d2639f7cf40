use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Native SDK not initialized: {0}")]
    NotInitialized(String),

    #[error("Native SDK rejected the call: {code} - {detail}")]
    Native { code: String, detail: String },
}

pub type Result<T> = std::result::Result<T, BridgeError>;
