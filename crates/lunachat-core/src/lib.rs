pub mod ai;
pub mod config;
pub mod error;
pub mod models;
pub mod presets;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use ai::{CompletionRequest, Fragment, FragmentStream, GroqClient, InferenceClient};
pub use config::Config;
pub use error::{ChatError, InferenceError, PresetStoreError};
pub use models::ModelDescriptor;
pub use presets::{DirectoryStore, MemoryStore, PresetStore, SystemPrompts};
pub use session::{
    forward_turn, ChatSession, SessionConfig, SessionState, StreamEvent, Turn, TurnId,
};
pub use state::{ChatMessage, ChatRole, Transcript};
