//! Chat controller - owns the view state and drives the gateway clients

use std::sync::Arc;

use chainchat_core::{
    AppState, ChainChatConfig, ChainChatError, ChatEvent, ModelCatalog, ModelInfoTable, PullPhase,
    MODEL_NAME_REQUIRED, TIMEOUT_MESSAGE,
};
use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{CatalogBackend, GenerationBackend};
use crate::catalog::CatalogClient;
use crate::generate::{GenerateRequest, GenerationClient};

/// Every user action goes through here. Operations take `&mut self`, so one
/// runs at a time; views observe progress through [`ChatEvent`]s.
pub struct ChatController {
    state: AppState,
    generator: Arc<dyn GenerationBackend>,
    catalog: Arc<dyn CatalogBackend>,
    events: Option<UnboundedSender<ChatEvent>>,
    in_flight: Option<CancellationToken>,
    /// Set once a pull has gone out; cleared by the next completed refresh
    refresh_owed: bool,
}

impl ChatController {
    pub fn new(
        state: AppState,
        generator: Arc<dyn GenerationBackend>,
        catalog: Arc<dyn CatalogBackend>,
    ) -> Self {
        Self {
            state,
            generator,
            catalog,
            events: None,
            in_flight: None,
            refresh_owed: false,
        }
    }

    /// Gateway clients and catalog files as configured
    pub fn from_config(config: &ChainChatConfig) -> Self {
        let catalog = ModelCatalog::load(config.catalog.models_path.as_deref());
        let model_info = ModelInfoTable::load(config.catalog.info_path.as_deref());
        Self::new(
            AppState::new(catalog, model_info),
            Arc::new(GenerationClient::from_config(config)),
            Arc::new(CatalogClient::from_config(config)),
        )
    }

    pub fn with_events(mut self, events: UnboundedSender<ChatEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Initial load: find out what the server already has
    pub async fn load(&mut self) {
        self.refresh_available_models().await;
    }

    pub async fn refresh_available_models(&mut self) {
        let available = self.catalog.fetch_available_models().await;
        debug!(count = available.len(), "Available models refreshed");
        self.refresh_owed = false;
        self.emit(ChatEvent::AvailableModels {
            count: available.len(),
        });
        self.state.set_available(available);
    }

    pub async fn change_ram_filter(&mut self, value: &str) {
        info!(ram = value, "RAM filter changed");
        self.state.set_ram(value);
        self.emit(ChatEvent::SelectionCleared);
        self.refresh_available_models().await;
    }

    pub async fn change_use_case_filter(&mut self, value: &str) {
        info!(use_case = value, "Use case filter changed");
        self.state.set_use_case(value);
        self.emit(ChatEvent::SelectionCleared);
        self.refresh_available_models().await;
    }

    /// No-op for models outside the filtered list
    pub fn toggle_model(&mut self, name: &str, checked: bool) -> bool {
        self.state.toggle_model(name, checked)
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.state.set_prompt(prompt);
    }

    pub fn set_need_reasoning(&mut self, need_reasoning: bool) {
        self.state.set_need_reasoning(need_reasoning);
    }

    /// Stream a response for the current prompt and selection into the state.
    pub async fn submit_prompt(&mut self) {
        if let Err(e) = self.state.validate_submission() {
            self.report_error(e.to_string());
            return;
        }

        let cancel = self.start_request();
        self.state.begin_generation();
        self.emit(ChatEvent::Loading { active: true });

        let session = self.state.session();
        let request = GenerateRequest::new(
            session.prompt.clone(),
            self.state.selection().models.clone(),
            session.need_reasoning,
        );
        let mut stream = self.generator.generate(request, cancel);

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    self.state.append_chunk(&chunk);
                    self.emit(ChatEvent::Chunk { content: chunk });
                }
                Err(ChainChatError::Timeout(_)) => {
                    warn!("Generation timed out");
                    self.report_error(TIMEOUT_MESSAGE);
                    break;
                }
                Err(ChainChatError::Cancelled) => {
                    debug!("Generation cancelled");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Generation failed");
                    self.report_error(format!("Error generating response: {}", e));
                    break;
                }
            }
        }

        self.in_flight = None;
        self.state.finish_loading();
        self.emit(ChatEvent::GenerationDone);
        self.emit(ChatEvent::Loading { active: false });
    }

    /// Download `name` on the server, then refresh the installed list whatever happened.
    pub async fn pull_model(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            self.report_error(MODEL_NAME_REQUIRED);
            return;
        }

        let cancel = self.start_request();
        self.refresh_owed = true;
        self.state.begin_pull();
        self.emit(ChatEvent::Loading { active: true });
        self.emit(ChatEvent::Progress {
            progress: self.state.progress().clone(),
        });

        let mut stream = self.catalog.pull_model(name, cancel);
        while let Some(item) = stream.next().await {
            match item {
                Ok(record) => {
                    let done = self.state.apply_pull_record(&record);
                    self.emit(ChatEvent::Progress {
                        progress: self.state.progress().clone(),
                    });
                    if done {
                        break;
                    }
                }
                Err(ChainChatError::Timeout(_)) => {
                    warn!(model = name, "Pull timed out");
                    self.fail_pull(PullPhase::TimedOut, Some(TIMEOUT_MESSAGE.to_string()));
                    break;
                }
                Err(ChainChatError::Cancelled) => {
                    debug!(model = name, "Pull cancelled");
                    self.fail_pull(PullPhase::Failed, None);
                    break;
                }
                Err(e) => {
                    error!(model = name, error = %e, "Pull failed");
                    self.fail_pull(PullPhase::Failed, Some(format!("Error pulling model: {}", e)));
                    break;
                }
            }
        }

        if self.state.pull_phase().is_active() {
            self.fail_pull(
                PullPhase::Failed,
                Some("Error pulling model: stream ended before completion".to_string()),
            );
        }

        self.in_flight = None;
        self.state.finish_loading();
        self.emit(ChatEvent::PullDone {
            phase: self.state.pull_phase(),
        });
        self.emit(ChatEvent::Loading { active: false });
        self.refresh_available_models().await;
    }

    /// Abort whatever request is running. For views that drop an operation
    /// future midway (e.g. on Ctrl-C) and need the state settled again.
    /// A pull cut short still gets its refresh of the installed list.
    pub async fn interrupt(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
        if self.state.pull_phase().is_active() {
            self.state.fail_pull(PullPhase::Failed, None);
        }
        if self.state.is_loading() {
            self.state.finish_loading();
            self.emit(ChatEvent::Loading { active: false });
        }
        if self.refresh_owed {
            debug!("Refreshing after interrupted pull");
            self.refresh_available_models().await;
        }
    }

    /// Fresh token for a new request; a still-registered older request is aborted.
    fn start_request(&mut self) -> CancellationToken {
        if let Some(previous) = self.in_flight.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        self.in_flight = Some(token.clone());
        token
    }

    fn fail_pull(&mut self, phase: PullPhase, message: Option<String>) {
        if let Some(message) = &message {
            self.emit(ChatEvent::Error {
                message: message.clone(),
            });
        }
        self.state.fail_pull(phase, message);
    }

    fn report_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.emit(ChatEvent::Error {
            message: message.clone(),
        });
        self.state.set_error(message);
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProgressStream;
    use crate::deadline::Deadline;
    use crate::generate::TextStream;
    use async_trait::async_trait;
    use chainchat_core::{AvailableModels, DownloadProgress, PullProgress, NO_MODELS_SELECTED, PROMPT_REQUIRED};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    enum GenerateScript {
        Chunks(Vec<&'static str>),
        ChunksThenFail(Vec<&'static str>, &'static str),
        Stall,
    }

    struct FakeGenerator {
        script: GenerateScript,
        requests: Mutex<Vec<GenerateRequest>>,
        tokens: Mutex<Vec<CancellationToken>>,
    }

    impl FakeGenerator {
        fn new(script: GenerateScript) -> Arc<Self> {
            Arc::new(Self {
                script,
                requests: Mutex::new(Vec::new()),
                tokens: Mutex::new(Vec::new()),
            })
        }
    }

    impl GenerationBackend for FakeGenerator {
        fn generate(&self, request: GenerateRequest, cancel: CancellationToken) -> TextStream {
            self.requests.lock().unwrap().push(request);
            self.tokens.lock().unwrap().push(cancel.clone());

            match &self.script {
                GenerateScript::Chunks(chunks) => {
                    let items: Vec<_> = chunks.iter().map(|c| Ok::<_, ChainChatError>(c.to_string())).collect();
                    Box::pin(futures::stream::iter(items))
                }
                GenerateScript::ChunksThenFail(chunks, message) => {
                    let mut items: Vec<_> = chunks.iter().map(|c| Ok::<_, ChainChatError>(c.to_string())).collect();
                    items.push(Err(ChainChatError::Http(message.to_string())));
                    Box::pin(futures::stream::iter(items))
                }
                GenerateScript::Stall => Box::pin(async_stream::stream! {
                    let deadline = Deadline::after(Duration::from_secs(600), cancel);
                    match deadline.run(std::future::pending::<String>()).await {
                        Ok(text) => yield Ok(text),
                        Err(e) => yield Err(e),
                    }
                }),
            }
        }
    }

    enum PullScript {
        Records(Vec<PullProgress>),
        Fail(Vec<PullProgress>, &'static str),
        Timeout,
        Pending,
    }

    struct FakeCatalog {
        available: AvailableModels,
        pull: PullScript,
        fetch_calls: AtomicUsize,
        pull_calls: AtomicUsize,
    }

    impl FakeCatalog {
        fn new(available: AvailableModels, pull: PullScript) -> Arc<Self> {
            Arc::new(Self {
                available,
                pull,
                fetch_calls: AtomicUsize::new(0),
                pull_calls: AtomicUsize::new(0),
            })
        }

        fn fetches(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CatalogBackend for FakeCatalog {
        async fn fetch_available_models(&self) -> AvailableModels {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.available.clone()
        }

        fn pull_model(&self, _name: &str, _cancel: CancellationToken) -> ProgressStream {
            self.pull_calls.fetch_add(1, Ordering::SeqCst);
            match &self.pull {
                PullScript::Records(records) => {
                    Box::pin(futures::stream::iter(records.clone().into_iter().map(Ok::<_, ChainChatError>)))
                }
                PullScript::Fail(records, message) => {
                    let mut items: Vec<_> = records.clone().into_iter().map(Ok::<_, ChainChatError>).collect();
                    items.push(Err(ChainChatError::Server(message.to_string())));
                    Box::pin(futures::stream::iter(items))
                }
                PullScript::Timeout => Box::pin(futures::stream::iter(vec![Err(
                    ChainChatError::Timeout(Duration::from_secs(1200)),
                )])),
                PullScript::Pending => Box::pin(futures::stream::pending::<chainchat_core::Result<PullProgress>>()),
            }
        }
    }

    fn controller(generator: Arc<FakeGenerator>, catalog: Arc<FakeCatalog>) -> ChatController {
        let state = AppState::new(ModelCatalog::bundled(), ModelInfoTable::bundled());
        ChatController::new(state, generator, catalog)
    }

    fn idle_catalog() -> Arc<FakeCatalog> {
        FakeCatalog::new(AvailableModels::default(), PullScript::Records(vec![]))
    }

    async fn ready_to_submit(controller: &mut ChatController) {
        controller.change_ram_filter("8GB").await;
        controller.change_use_case_filter("chat").await;
        assert!(controller.toggle_model("llama3.2:3b", true));
        assert!(controller.toggle_model("gemma2:2b", true));
        controller.set_prompt("Say hello");
    }

    #[tokio::test]
    async fn test_filter_changes_refresh_and_clear() {
        let catalog = FakeCatalog::new(AvailableModels::new(["gemma2:2b"]), PullScript::Records(vec![]));
        let mut controller = controller(FakeGenerator::new(GenerateScript::Chunks(vec![])), catalog.clone());

        controller.load().await;
        assert_eq!(catalog.fetches(), 1);

        ready_to_submit(&mut controller).await;
        assert_eq!(catalog.fetches(), 3);
        assert_eq!(controller.state().selection().models.len(), 2);

        controller.change_use_case_filter("code").await;
        assert!(controller.state().selection().models.is_empty());
        assert_eq!(catalog.fetches(), 4);

        let rows = controller.state().model_rows();
        assert!(rows.iter().all(|r| !r.available));
    }

    #[tokio::test]
    async fn test_submit_accumulates_chunks() {
        let generator = FakeGenerator::new(GenerateScript::Chunks(vec!["Hel", "lo, ", "world!"]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = controller(generator.clone(), idle_catalog()).with_events(tx);

        ready_to_submit(&mut controller).await;
        controller.set_need_reasoning(true);
        controller.submit_prompt().await;

        assert_eq!(controller.state().response(), "Hello, world!");
        assert!(!controller.state().is_loading());
        assert_eq!(controller.state().error(), None);

        let requests = generator.requests.lock().unwrap().clone();
        assert_eq!(
            requests,
            vec![GenerateRequest::new(
                "Say hello",
                vec!["llama3.2:3b".into(), "gemma2:2b".into()],
                true
            )]
        );

        let mut chunks = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ChatEvent::Chunk { content } = event {
                chunks.push(content);
            }
        }
        assert_eq!(chunks, vec!["Hel", "lo, ", "world!"]);
    }

    #[tokio::test]
    async fn test_submit_clears_previous_response() {
        let generator = FakeGenerator::new(GenerateScript::Chunks(vec!["again"]));
        let mut controller = controller(generator, idle_catalog());
        ready_to_submit(&mut controller).await;

        controller.submit_prompt().await;
        controller.submit_prompt().await;
        assert_eq!(controller.state().response(), "again");
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let generator = FakeGenerator::new(GenerateScript::Chunks(vec!["x"]));
        let mut controller = controller(generator.clone(), idle_catalog());

        controller.submit_prompt().await;
        assert_eq!(controller.state().error(), Some(PROMPT_REQUIRED));

        controller.set_prompt("hi");
        controller.submit_prompt().await;
        assert_eq!(controller.state().error(), Some(NO_MODELS_SELECTED));

        assert!(generator.requests.lock().unwrap().is_empty());
        assert!(!controller.state().is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_timeout() {
        let generator = FakeGenerator::new(GenerateScript::Stall);
        let mut controller = controller(generator.clone(), idle_catalog());
        ready_to_submit(&mut controller).await;

        controller.submit_prompt().await;

        assert_eq!(controller.state().error(), Some(TIMEOUT_MESSAGE));
        assert!(!controller.state().is_loading());
        let tokens = generator.tokens.lock().unwrap();
        assert!(tokens[0].is_cancelled());
    }

    #[tokio::test]
    async fn test_submit_network_failure_surfaces() {
        let generator = FakeGenerator::new(GenerateScript::ChunksThenFail(vec!["Partial"], "connection reset"));
        let mut controller = controller(generator, idle_catalog());
        ready_to_submit(&mut controller).await;

        controller.submit_prompt().await;

        assert_eq!(controller.state().response(), "Partial");
        assert_eq!(
            controller.state().error(),
            Some("Error generating response: HTTP error: connection reset")
        );
        assert!(!controller.state().is_loading());
    }

    #[tokio::test]
    async fn test_pull_empty_name() {
        let catalog = idle_catalog();
        let mut controller = controller(FakeGenerator::new(GenerateScript::Chunks(vec![])), catalog.clone());

        controller.pull_model("").await;

        assert_eq!(controller.state().error(), Some(MODEL_NAME_REQUIRED));
        assert_eq!(catalog.pull_calls.load(Ordering::SeqCst), 0);
        assert_eq!(catalog.fetches(), 0);
        assert!(!controller.state().is_loading());
    }

    #[tokio::test]
    async fn test_pull_success() {
        let catalog = FakeCatalog::new(
            AvailableModels::new(["phi3:mini"]),
            PullScript::Records(vec![
                PullProgress::new("downloading", 100, 1000),
                PullProgress::new("success", 1000, 1000),
            ]),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller =
            controller(FakeGenerator::new(GenerateScript::Chunks(vec![])), catalog.clone()).with_events(tx);

        controller.pull_model("phi3:mini").await;

        assert_eq!(
            controller.state().progress(),
            &DownloadProgress { status: "Download completed".into(), completed: 1000, total: 1000 }
        );
        assert!(!controller.state().is_loading());
        assert_eq!(controller.state().pull_phase(), PullPhase::Completed);
        assert_eq!(catalog.fetches(), 1);
        assert!(controller.state().available().contains("phi3:mini"));

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ChatEvent::Progress { progress } = event {
                statuses.push(progress.status);
            }
        }
        assert_eq!(statuses, vec!["Starting...", "downloading", "Download completed"]);
    }

    #[tokio::test]
    async fn test_pull_server_failure() {
        let catalog = FakeCatalog::new(
            AvailableModels::default(),
            PullScript::Fail(vec![PullProgress::new("pulling manifest", 0, 0)], "file does not exist"),
        );
        let mut controller = controller(FakeGenerator::new(GenerateScript::Chunks(vec![])), catalog.clone());

        controller.pull_model("nope:1b").await;

        assert_eq!(
            controller.state().error(),
            Some("Error pulling model: Server error: file does not exist")
        );
        assert_eq!(controller.state().pull_phase(), PullPhase::Failed);
        assert!(!controller.state().is_loading());
        assert_eq!(catalog.fetches(), 1);
    }

    #[tokio::test]
    async fn test_pull_timeout() {
        let catalog = FakeCatalog::new(AvailableModels::default(), PullScript::Timeout);
        let mut controller = controller(FakeGenerator::new(GenerateScript::Chunks(vec![])), catalog.clone());

        controller.pull_model("big:70b").await;

        assert_eq!(controller.state().error(), Some(TIMEOUT_MESSAGE));
        assert_eq!(controller.state().pull_phase(), PullPhase::TimedOut);
        assert_eq!(catalog.fetches(), 1);
    }

    #[tokio::test]
    async fn test_pull_stream_ends_early() {
        let catalog = FakeCatalog::new(
            AvailableModels::default(),
            PullScript::Records(vec![PullProgress::new("downloading", 1, 10)]),
        );
        let mut controller = controller(FakeGenerator::new(GenerateScript::Chunks(vec![])), catalog);

        controller.pull_model("m:1b").await;

        assert_eq!(controller.state().pull_phase(), PullPhase::Failed);
        assert!(!controller.state().is_loading());
        assert!(controller.state().error().unwrap().starts_with("Error pulling model"));
    }

    #[tokio::test]
    async fn test_interrupt_settles_state() {
        let generator = FakeGenerator::new(GenerateScript::Stall);
        let mut controller = controller(generator.clone(), idle_catalog());
        ready_to_submit(&mut controller).await;

        {
            let op = controller.submit_prompt();
            let _ = tokio::time::timeout(Duration::from_millis(20), op).await;
        }
        assert!(controller.state().is_loading());

        controller.interrupt().await;
        assert!(!controller.state().is_loading());
        assert!(generator.tokens.lock().unwrap()[0].is_cancelled());
    }

    #[tokio::test]
    async fn test_interrupted_pull_still_refreshes_once() {
        let catalog = FakeCatalog::new(AvailableModels::new(["phi4:14b"]), PullScript::Pending);
        let mut controller = controller(FakeGenerator::new(GenerateScript::Chunks(vec![])), catalog.clone());

        {
            let op = controller.pull_model("phi4:14b");
            let _ = tokio::time::timeout(Duration::from_millis(20), op).await;
        }
        assert!(controller.state().is_loading());
        assert_eq!(catalog.fetches(), 0);

        controller.interrupt().await;
        assert_eq!(controller.state().pull_phase(), PullPhase::Failed);
        assert!(!controller.state().is_loading());
        assert_eq!(catalog.fetches(), 1);
        assert!(controller.state().available().contains("phi4:14b"));

        // nothing owed any more
        controller.interrupt().await;
        assert_eq!(catalog.fetches(), 1);
    }

    #[tokio::test]
    async fn test_interrupted_generation_does_not_refresh() {
        let catalog = idle_catalog();
        let mut controller = controller(FakeGenerator::new(GenerateScript::Stall), catalog.clone());
        ready_to_submit(&mut controller).await;
        let before = catalog.fetches();

        {
            let op = controller.submit_prompt();
            let _ = tokio::time::timeout(Duration::from_millis(20), op).await;
        }
        controller.interrupt().await;
        assert_eq!(catalog.fetches(), before);
    }
}
