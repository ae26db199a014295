//! View state - everything the user sees, mutated only through these transitions

use serde::Serialize;

use crate::{
    AvailableModels, ChainChatError, DownloadProgress, ModelCatalog, ModelInfo, ModelInfoTable,
    PullPhase, PullProgress, Result,
};

pub const TIMEOUT_MESSAGE: &str = "Request timed out. Please try again.";
pub const MODEL_NAME_REQUIRED: &str = "Model name is required.";
pub const PROMPT_REQUIRED: &str = "Prompt is required.";
pub const NO_MODELS_SELECTED: &str = "Select at least one model.";

/// RAM tier, use case and the models ticked from the filtered list.
///
/// `models` is always a subset of the filtered list; it keeps tick order,
/// which is the order the server chains the models in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub ram: Option<String>,
    pub use_case: Option<String>,
    pub models: Vec<String>,
}

impl Selection {
    pub fn is_selected(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationSession {
    pub prompt: String,
    pub need_reasoning: bool,
    /// Append-only while a generation is streaming
    pub response: String,
}

/// One line of the model picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRow<'a> {
    pub name: &'a str,
    pub info: Option<&'a ModelInfo>,
    pub available: bool,
    pub selected: bool,
}

impl ModelRow<'_> {
    /// Models missing from the server get a pull action
    pub fn needs_pull(&self) -> bool {
        !self.available
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    catalog: ModelCatalog,
    model_info: ModelInfoTable,
    selection: Selection,
    session: GenerationSession,
    available: AvailableModels,
    progress: DownloadProgress,
    pull_phase: PullPhase,
    loading: bool,
    error: Option<String>,
}

impl AppState {
    pub fn new(catalog: ModelCatalog, model_info: ModelInfoTable) -> Self {
        Self {
            catalog,
            model_info,
            ..Default::default()
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn model_info(&self) -> &ModelInfoTable {
        &self.model_info
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn session(&self) -> &GenerationSession {
        &self.session
    }

    pub fn response(&self) -> &str {
        &self.session.response
    }

    pub fn available(&self) -> &AvailableModels {
        &self.available
    }

    pub fn progress(&self) -> &DownloadProgress {
        &self.progress
    }

    pub fn pull_phase(&self) -> PullPhase {
        self.pull_phase
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn ram_options(&self) -> Vec<&str> {
        self.catalog.ram_tiers()
    }

    pub fn use_case_options(&self) -> Vec<&str> {
        self.catalog.use_cases()
    }

    /// Models for the chosen RAM tier and use case; empty until both are set.
    pub fn filtered_models(&self) -> &[String] {
        match (&self.selection.ram, &self.selection.use_case) {
            (Some(ram), Some(use_case)) => self.catalog.models_for(ram, use_case),
            _ => &[],
        }
    }

    pub fn model_row<'a>(&'a self, name: &'a str) -> ModelRow<'a> {
        ModelRow {
            name,
            info: self.model_info.get(name),
            available: self.available.contains(name),
            selected: self.selection.is_selected(name),
        }
    }

    pub fn model_rows(&self) -> Vec<ModelRow<'_>> {
        self.filtered_models()
            .iter()
            .map(|name| self.model_row(name))
            .collect()
    }

    /// Empty string clears the filter. Always clears the model selection.
    pub fn set_ram(&mut self, value: &str) {
        self.selection.ram = non_empty(value);
        self.selection.models.clear();
    }

    pub fn set_use_case(&mut self, value: &str) {
        self.selection.use_case = non_empty(value);
        self.selection.models.clear();
    }

    /// Returns whether the selection changed. Names outside the filtered list are ignored.
    pub fn toggle_model(&mut self, name: &str, checked: bool) -> bool {
        if !self.filtered_models().iter().any(|m| m == name) {
            return false;
        }

        let selected = self.selection.is_selected(name);
        match (checked, selected) {
            (true, false) => {
                self.selection.models.push(name.to_string());
                true
            }
            (false, true) => {
                self.selection.models.retain(|m| m != name);
                true
            }
            _ => false,
        }
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.session.prompt = prompt.into();
    }

    pub fn set_need_reasoning(&mut self, need_reasoning: bool) {
        self.session.need_reasoning = need_reasoning;
    }

    pub fn set_available(&mut self, available: AvailableModels) {
        self.available = available;
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn validate_submission(&self) -> Result<()> {
        if self.session.prompt.trim().is_empty() {
            return Err(ChainChatError::validation(PROMPT_REQUIRED));
        }
        if self.selection.models.is_empty() {
            return Err(ChainChatError::validation(NO_MODELS_SELECTED));
        }
        Ok(())
    }

    pub fn begin_generation(&mut self) {
        self.loading = true;
        self.session.response.clear();
        self.error = None;
    }

    pub fn append_chunk(&mut self, chunk: &str) {
        self.session.response.push_str(chunk);
    }

    pub fn begin_pull(&mut self) {
        self.loading = true;
        self.session.response.clear();
        self.error = None;
        self.progress = DownloadProgress::starting();
        self.pull_phase = PullPhase::Requesting;
    }

    /// Apply one progress record. Returns true once the pull has completed.
    pub fn apply_pull_record(&mut self, record: &PullProgress) -> bool {
        self.progress = DownloadProgress::from_record(record);
        if record.is_success() {
            self.pull_phase = PullPhase::Completed;
            self.loading = false;
            return true;
        }
        self.pull_phase = PullPhase::Streaming;
        false
    }

    pub fn fail_pull(&mut self, phase: PullPhase, message: Option<String>) {
        self.pull_phase = phase;
        self.error = message;
        self.loading = false;
    }

    pub fn finish_loading(&mut self) {
        self.loading = false;
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
