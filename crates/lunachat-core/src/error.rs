use thiserror::Error;

/// Failures from the inference API
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inference API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("inference API error: {0}")]
    Api(String),

    #[error("could not decode stream chunk: {0}")]
    Decode(String),

    #[error("no API key configured (set GROQ_API_KEY)")]
    MissingApiKey,
}

/// Failures from the preset object store
#[derive(Debug, Error)]
pub enum PresetStoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid preset JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid store key: {0}")]
    InvalidKey(String),
}

/// Everything the chat session can report back to the presentation layer.
/// None of these end the session.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("token budget {requested} outside 1..={max}")]
    InvalidTokenBudget { requested: u32, max: u32 },

    #[error(transparent)]
    Transport(#[from] InferenceError),

    #[error("preset store: {0}")]
    PresetStore(#[from] PresetStoreError),

    #[error("a response is still streaming")]
    Busy,

    #[error("message is empty")]
    EmptyMessage,
}
