pub mod catalog;
pub mod config;
pub mod error;
pub mod event;
pub mod progress;
pub mod state;

pub use catalog::{AvailableModels, ModelCatalog, ModelInfo, ModelInfoTable};
pub use config::{CatalogConfig, ChainChatConfig, ServerConfig, TimeoutConfig};
pub use error::{ChainChatError, Result};
pub use event::ChatEvent;
pub use progress::{DownloadProgress, PullPhase, PullProgress};
pub use state::{
    AppState, GenerationSession, ModelRow, Selection, MODEL_NAME_REQUIRED, NO_MODELS_SELECTED,
    PROMPT_REQUIRED, TIMEOUT_MESSAGE,
};
