pub type PasteResult<T> = Result<T, PasteError>;

#[derive(thiserror::Error, Debug)]
pub enum PasteError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("dimension mismatch: instance resized to {image:?} but mask resized to {mask:?}")]
    DimensionMismatch { image: (u32, u32), mask: (u32, u32) },

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PasteError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Configuration and invariant violations abort the run; everything else
    /// surfaced through this type is an IO or decode failure.
    pub fn is_fatal_contract(&self) -> bool {
        matches!(self, Self::Config(_) | Self::DimensionMismatch { .. })
    }
}

impl From<serde_json::Error> for PasteError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}
