use std::path::PathBuf;
use std::sync::Arc;

use lunachat_core::{
    forward_turn, models, ChatError, ChatSession, Config, InferenceClient, PresetStore,
    StreamEvent, SystemPrompts,
};
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::input::TextInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popup {
    SystemPrompt,
    ModelPicker,
    TokenBudget,
    PresetPicker,
    SavePreset,
    Transcript,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Info(String),
    Error(String),
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub popup: Option<Popup>,
    pub status: Option<Status>,

    // Conversation
    pub session: ChatSession,
    pub chat_input: TextInput,
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub follow_output: bool,
    stream_task: Option<JoinHandle<()>>,
    stream_tx: UnboundedSender<StreamEvent>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Popup state
    pub prompt_input: TextInput,
    pub budget_input: TextInput,
    pub preset_name_input: TextInput,
    pub model_picker_state: ListState,
    pub preset_picker_state: ListState,
    pub transcript_scroll: u16,

    // Data
    pub presets: SystemPrompts,
    store: Arc<dyn PresetStore>,
    client: Arc<dyn InferenceClient>,
    config: Config,
    config_path: Option<PathBuf>,
}

impl App {
    pub fn new(
        config: Config,
        config_path: Option<PathBuf>,
        store: Arc<dyn PresetStore>,
        client: Arc<dyn InferenceClient>,
        stream_tx: UnboundedSender<StreamEvent>,
    ) -> anyhow::Result<Self> {
        let presets = SystemPrompts::load(store.as_ref());

        // Fall back to the first model if the saved one is no longer offered
        let model_id = config
            .default_model
            .as_deref()
            .and_then(models::find)
            .unwrap_or_else(models::default_model)
            .id;

        let session = ChatSession::new(presets.default_prompt(), model_id)?;

        let status = if config.api_key().is_none() {
            Some(Status::Error(
                "No API key: set GROQ_API_KEY or groq_api_key in config.json".to_string(),
            ))
        } else {
            None
        };

        Ok(Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            popup: None,
            status,

            session,
            chat_input: TextInput::new(),
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_output: true,
            stream_task: None,
            stream_tx,

            animation_frame: 0,

            prompt_input: TextInput::new(),
            budget_input: TextInput::new(),
            preset_name_input: TextInput::new(),
            model_picker_state: ListState::default(),
            preset_picker_state: ListState::default(),
            transcript_scroll: 0,

            presets,
            store,
            client,
            config,
            config_path,
        })
    }

    pub fn is_streaming(&self) -> bool {
        !self.session.is_idle()
    }

    pub fn set_info(&mut self, message: impl Into<String>) {
        self.status = Some(Status::Info(message.into()));
    }

    pub fn set_error(&mut self, error: &ChatError) {
        self.status = Some(Status::Error(error.to_string()));
    }

    // Chat actions
    pub fn submit_message(&mut self) {
        match self.session.begin_turn(self.chat_input.value()) {
            Ok(turn) => {
                self.chat_input.clear();
                self.status = None;
                self.follow_output = true;

                let client = Arc::clone(&self.client);
                let tx = self.stream_tx.clone();
                self.stream_task = Some(tokio::spawn(forward_turn(client, turn, tx)));
            }
            Err(ChatError::EmptyMessage) => {}
            Err(e) => self.set_error(&e),
        }
    }

    pub fn handle_stream_event(&mut self, event: StreamEvent) {
        if let Err(e) = self.session.apply(event) {
            self.set_error(&e);
        }
        if self.session.is_idle() {
            self.stream_task = None;
        }
        if self.follow_output {
            self.scroll_chat_to_bottom();
        }
    }

    fn abort_stream(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
    }

    pub fn clear_conversation(&mut self) {
        self.abort_stream();
        self.session.reset_transcript();
        self.chat_scroll = 0;
        self.set_info("Conversation cleared");
    }

    pub fn shutdown(&mut self) {
        self.abort_stream();
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_streaming() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_output = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_chat_scroll();
        self.chat_scroll = (self.chat_scroll + lines).min(max);
        self.follow_output = self.chat_scroll >= max;
    }

    /// Scroll chat to bottom so the newest output is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        self.chat_scroll = self.max_chat_scroll();
    }

    fn max_chat_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.total_chat_lines().saturating_sub(visible_height)
    }

    fn total_chat_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };

        let count = |text: &str| -> u16 {
            text.lines()
                .map(|line| {
                    // Use character count, not byte length, for proper UTF-8 handling
                    let char_count = line.chars().count();
                    ((char_count / wrap_width) + 1) as u16
                })
                .fold(0u16, u16::saturating_add)
        };

        let mut total_lines: u16 = 0;
        for msg in self.session.transcript().visible() {
            // Role line, content, blank line after message
            total_lines = total_lines.saturating_add(count(&msg.content).saturating_add(2));
        }

        if self.is_streaming() {
            let pending = self.session.pending();
            let body = if pending.is_empty() { 1 } else { count(&pending) };
            total_lines = total_lines.saturating_add(body.saturating_add(1));
        }

        total_lines
    }

    // System prompt editor
    pub fn open_system_prompt(&mut self) {
        let current = self.session.config().system_prompt.clone();
        self.prompt_input.set(&current);
        self.popup = Some(Popup::SystemPrompt);
    }

    pub fn apply_system_prompt(&mut self) {
        let text = self.prompt_input.take();
        self.session.set_system_prompt(&text);
        self.popup = None;
        self.set_info("System prompt set");
    }

    // Raw transcript view, system message included
    pub fn open_transcript_view(&mut self) {
        self.transcript_scroll = 0;
        self.popup = Some(Popup::Transcript);
    }

    /// One line per message, role-tagged, content escaped
    pub fn raw_transcript(&self) -> Vec<String> {
        self.session
            .messages()
            .iter()
            .enumerate()
            .map(|(i, msg)| {
                format!("{}: {{ role: {}, content: {:?} }}", i, msg.role.as_str(), msg.content)
            })
            .collect()
    }

    pub fn transcript_scroll_down(&mut self, lines: u16) {
        let max = u16::try_from(self.raw_transcript().len()).unwrap_or(u16::MAX);
        self.transcript_scroll = self.transcript_scroll.saturating_add(lines).min(max);
    }

    pub fn transcript_scroll_up(&mut self, lines: u16) {
        self.transcript_scroll = self.transcript_scroll.saturating_sub(lines);
    }

    // Model picker methods
    pub fn open_model_picker(&mut self) {
        let current = models::all()
            .iter()
            .position(|m| m.id == self.session.config().model_id);
        self.model_picker_state.select(current.or(Some(0)));
        self.popup = Some(Popup::ModelPicker);
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = models::all().len();
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        let Some(model) = self
            .model_picker_state
            .selected()
            .and_then(|i| models::all().get(i))
        else {
            return;
        };
        self.popup = None;

        if model.id == self.session.config().model_id {
            return;
        }

        self.abort_stream();
        match self.session.select_model(model.id) {
            Ok(()) => {
                self.chat_scroll = 0;
                self.set_info(format!("Switched to {}, conversation cleared", model.name));
                self.persist_default_model(model.id);
            }
            Err(e) => self.set_error(&e),
        }
    }

    fn persist_default_model(&mut self, model_id: &str) {
        self.config.default_model = Some(model_id.to_string());
        if let Some(path) = &self.config_path {
            if let Err(e) = self.config.save_to(path) {
                warn!(error = %e, "could not save default model");
            }
        }
    }

    // Token budget
    pub fn open_token_budget(&mut self) {
        let current = self.session.config().max_tokens.to_string();
        self.budget_input.set(&current);
        self.popup = Some(Popup::TokenBudget);
    }

    pub fn apply_token_budget(&mut self) {
        let raw = self.budget_input.take();
        self.popup = None;

        let requested = match raw.trim().parse::<u64>() {
            Ok(n) => u32::try_from(n).unwrap_or(u32::MAX),
            Err(_) => {
                self.status = Some(Status::Error(format!("Not a number: {:?}", raw)));
                return;
            }
        };

        let stored = self.session.set_token_budget(requested);
        if stored == requested {
            self.set_info(format!("Max tokens: {}", stored));
        } else {
            let max = self.session.model().max_tokens;
            self.set_info(format!("Max tokens: {} (allowed 1..={})", stored, max));
        }
    }

    // Presets
    pub fn preset_names(&self) -> Vec<String> {
        self.presets.names().map(str::to_string).collect()
    }

    pub fn open_preset_picker(&mut self) {
        self.preset_picker_state.select(Some(0));
        self.popup = Some(Popup::PresetPicker);
    }

    pub fn preset_picker_nav_down(&mut self) {
        let len = self.presets.len();
        if len > 0 {
            let i = self.preset_picker_state.selected().unwrap_or(0);
            self.preset_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn preset_picker_nav_up(&mut self) {
        let i = self.preset_picker_state.selected().unwrap_or(0);
        self.preset_picker_state.select(Some(i.saturating_sub(1)));
    }

    fn selected_preset(&self) -> Option<String> {
        self.preset_picker_state
            .selected()
            .and_then(|i| self.preset_names().into_iter().nth(i))
    }

    pub fn apply_selected_preset(&mut self) {
        let Some(name) = self.selected_preset() else {
            return;
        };
        if let Some(text) = self.presets.get(&name).map(str::to_string) {
            self.session.set_system_prompt(&text);
            self.set_info(format!("System prompt set from preset '{}'", name));
        }
        self.popup = None;
    }

    pub fn delete_selected_preset(&mut self) {
        let Some(name) = self.selected_preset() else {
            return;
        };
        if !self.presets.remove(&name) {
            self.set_info("The default preset cannot be deleted");
            return;
        }
        self.save_presets(&format!("Deleted preset '{}'", name));
        let len = self.presets.len();
        if let Some(i) = self.preset_picker_state.selected() {
            self.preset_picker_state.select(Some(i.min(len.saturating_sub(1))));
        }
    }

    pub fn open_save_preset(&mut self) {
        self.preset_name_input.clear();
        self.popup = Some(Popup::SavePreset);
    }

    pub fn save_current_as_preset(&mut self) {
        let name = self.preset_name_input.take().trim().to_string();
        self.popup = None;
        if name.is_empty() {
            return;
        }
        let prompt = self.session.config().system_prompt.clone();
        self.presets.insert(&name, &prompt);
        self.save_presets(&format!("Saved preset '{}'", name));
    }

    fn save_presets(&mut self, done: &str) {
        match self.presets.save(self.store.as_ref()) {
            Ok(()) => {
                info!(presets = self.presets.len(), "system prompts saved");
                self.set_info(done);
            }
            Err(e) => self.set_error(&ChatError::PresetStore(e)),
        }
    }

    pub fn close_popup(&mut self) {
        self.popup = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::stream::{self, StreamExt};
    use lunachat_core::{
        ChatMessage, ChatRole, CompletionRequest, Fragment, FragmentStream, InferenceError,
        MemoryStore,
    };
    use lunachat_core::presets::PRESETS_KEY;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct EchoClient;

    #[async_trait]
    impl InferenceClient for EchoClient {
        async fn stream_completion(
            &self,
            request: &CompletionRequest,
        ) -> Result<FragmentStream, InferenceError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            if last == "fail" {
                return Err(InferenceError::Api("rejected".into()));
            }
            let items = vec![Ok(Fragment::text("echo: ")), Ok(Fragment::Text(last))];
            Ok(stream::iter(items).boxed())
        }
    }

    fn app() -> (App, Arc<MemoryStore>, UnboundedReceiver<StreamEvent>) {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let config = Config { groq_api_key: Some("test".into()), ..Config::new() };
        let app = App::new(config, None, store.clone(), Arc::new(EchoClient), tx).unwrap();
        (app, store, rx)
    }

    async fn drain(app: &mut App, rx: &mut UnboundedReceiver<StreamEvent>) {
        while app.is_streaming() {
            let event = rx.recv().await.expect("stream event");
            app.handle_stream_event(event);
        }
    }

    fn type_text(input: &mut TextInput, text: &str) {
        for c in text.chars() {
            input.insert(c);
        }
    }

    #[tokio::test]
    async fn test_submit_streams_reply_into_transcript() {
        let (mut app, _store, mut rx) = app();
        type_text(&mut app.chat_input, "hi");

        app.submit_message();
        assert!(app.is_streaming());
        assert!(app.chat_input.is_empty());

        drain(&mut app, &mut rx).await;
        assert_eq!(app.session.messages().last(), Some(&ChatMessage::assistant("echo: hi")));
        assert!(app.stream_task.is_none());
    }

    #[tokio::test]
    async fn test_failed_turn_shows_error_and_keeps_user_message() {
        let (mut app, _store, mut rx) = app();
        type_text(&mut app.chat_input, "fail");

        app.submit_message();
        drain(&mut app, &mut rx).await;

        assert!(matches!(app.status, Some(Status::Error(ref e)) if e.contains("rejected")));
        assert_eq!(app.session.messages().last().map(|m| m.role), Some(ChatRole::User));
    }

    #[tokio::test]
    async fn test_failure_queued_before_clear_keeps_info_status() {
        let (mut app, _store, mut rx) = app();
        type_text(&mut app.chat_input, "fail");
        app.submit_message();

        let queued = rx.recv().await.expect("stream event");
        app.clear_conversation();
        app.handle_stream_event(queued);

        assert!(matches!(app.status, Some(Status::Info(ref m)) if m == "Conversation cleared"));
        assert!(app.session.last_error().is_none());
        assert_eq!(app.session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_raw_transcript_includes_system_message() {
        let (mut app, _store, mut rx) = app();
        type_text(&mut app.chat_input, "say \"hi\"");
        app.submit_message();
        drain(&mut app, &mut rx).await;

        app.open_transcript_view();
        assert_eq!(app.popup, Some(Popup::Transcript));

        let raw = app.raw_transcript();
        assert_eq!(raw.len(), 3);
        assert!(raw[0].starts_with("0: { role: system, content: "));
        assert_eq!(raw[1], r#"1: { role: user, content: "say \"hi\"" }"#);
        assert!(raw[2].contains("role: assistant"));

        app.transcript_scroll_down(10);
        assert_eq!(app.transcript_scroll, 3);
        app.transcript_scroll_up(1);
        assert_eq!(app.transcript_scroll, 2);
    }

    #[tokio::test]
    async fn test_blank_submit_is_ignored() {
        let (mut app, _store, _rx) = app();
        type_text(&mut app.chat_input, "   ");
        app.submit_message();
        assert!(!app.is_streaming());
        assert_eq!(app.session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_model_switch_clears_conversation() {
        let (mut app, _store, mut rx) = app();
        type_text(&mut app.chat_input, "hi");
        app.submit_message();
        drain(&mut app, &mut rx).await;

        app.open_model_picker();
        app.model_picker_nav_down();
        app.model_picker_nav_down();
        app.select_model();

        assert_eq!(app.session.config().model_id, "mixtral-8x7b-32768");
        assert_eq!(app.session.messages().len(), 1);
        assert_eq!(app.session.messages()[0].role, ChatRole::System);
        assert!(app.popup.is_none());
    }

    #[tokio::test]
    async fn test_token_budget_is_clamped() {
        let (mut app, _store, _rx) = app();
        app.open_token_budget();
        app.budget_input.set("99999999999");
        app.apply_token_budget();
        assert_eq!(app.session.config().max_tokens, 8192);

        app.open_token_budget();
        app.budget_input.set("abc");
        app.apply_token_budget();
        assert_eq!(app.session.config().max_tokens, 8192);
        assert!(matches!(app.status, Some(Status::Error(_))));
    }

    #[tokio::test]
    async fn test_presets_save_apply_and_delete() {
        let (mut app, store, _rx) = app();

        app.open_system_prompt();
        app.prompt_input.set("Answer in French.");
        app.apply_system_prompt();
        assert_eq!(app.session.transcript().system_prompt(), Some("Answer in French."));

        app.open_save_preset();
        type_text(&mut app.preset_name_input, "french");
        app.save_current_as_preset();
        let blob = store.read(PRESETS_KEY).unwrap().unwrap();
        assert!(blob.contains("Answer in French."));

        // back to default, then re-apply the saved preset
        app.open_preset_picker();
        app.apply_selected_preset();
        assert_eq!(app.session.config().system_prompt, "You are a helpful assistant.");

        app.open_preset_picker();
        app.preset_picker_nav_down();
        app.apply_selected_preset();
        assert_eq!(app.session.config().system_prompt, "Answer in French.");

        app.open_preset_picker();
        app.delete_selected_preset();
        assert_eq!(app.presets.len(), 2);
        app.preset_picker_nav_down();
        app.delete_selected_preset();
        assert_eq!(app.presets.len(), 1);
        assert!(!store.read(PRESETS_KEY).unwrap().unwrap().contains("french"));
    }
}
