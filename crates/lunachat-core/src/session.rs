//! Chat session state machine
//!
//! A [`ChatSession`] owns one conversation: the transcript, the active system
//! prompt, the selected model and the token budget. It moves between
//! [`SessionState::Idle`] and [`SessionState::AwaitingResponse`]; only one
//! completion can be in flight at a time.
//!
//! Turns can be driven in one call with [`ChatSession::submit`], or piecewise
//! (`begin_turn`, then `push_fragment`/`finish_turn`/`fail_turn`, or
//! [`ChatSession::apply`]) when the stream is consumed on another task.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::ai::{CompletionRequest, Fragment, InferenceClient};
use crate::error::{ChatError, InferenceError};
use crate::models::{self, ModelDescriptor};
use crate::state::{ChatMessage, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingResponse,
}

/// Identifies one submission so late events from an abandoned turn are dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnId(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub id: TurnId,
    pub request: CompletionRequest,
}

/// Stream progress reported back from wherever the stream is being consumed
#[derive(Debug)]
pub enum StreamEvent {
    Fragment(TurnId, Fragment),
    Finished(TurnId),
    Failed(TurnId, InferenceError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub model_id: &'static str,
    pub max_tokens: u32,
}

/// Response text collected so far for the in-flight turn
#[derive(Debug, Default)]
struct PendingResponse {
    pieces: Vec<Fragment>,
}

impl PendingResponse {
    fn push(&mut self, fragment: Fragment) {
        if let Fragment::Text(s) = &fragment {
            if s.is_empty() {
                return;
            }
            if let Some(Fragment::Text(run)) = self.pieces.last_mut() {
                run.push_str(s);
                return;
            }
        }
        self.pieces.push(fragment);
    }

    /// Plain text concatenates as-is. Once any structured chunk shows up,
    /// every piece is stringified and the pieces are joined with newlines.
    fn content(&self) -> String {
        match self.pieces.as_slice() {
            [] => String::new(),
            [Fragment::Text(s)] => s.clone(),
            pieces => pieces
                .iter()
                .map(|p| match p {
                    Fragment::Text(s) => s.clone(),
                    Fragment::Structured(v) => v.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug)]
pub struct ChatSession {
    transcript: Transcript,
    config: SessionConfig,
    state: SessionState,
    next_turn: u64,
    in_flight: Option<TurnId>,
    pending: PendingResponse,
    last_error: Option<String>,
}

impl ChatSession {
    /// Start a session on `model_id` with `system_prompt` already applied
    pub fn new(system_prompt: &str, model_id: &str) -> Result<Self, ChatError> {
        let model = lookup(model_id)?;
        let mut session = Self {
            transcript: Transcript::new(),
            config: SessionConfig {
                system_prompt: String::new(),
                model_id: model.id,
                max_tokens: model.default_budget(),
            },
            state: SessionState::Idle,
            next_turn: 0,
            in_flight: None,
            pending: PendingResponse::default(),
            last_error: None,
        };
        session.set_system_prompt(system_prompt);
        Ok(session)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.transcript.messages()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }

    pub fn model(&self) -> &'static ModelDescriptor {
        // model_id only ever comes from the table
        models::find(self.config.model_id).unwrap_or_else(models::default_model)
    }

    pub fn in_flight(&self) -> Option<TurnId> {
        self.in_flight
    }

    /// Response text received so far for the in-flight turn
    pub fn pending(&self) -> String {
        self.pending.content()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn set_system_prompt(&mut self, text: &str) {
        self.transcript.set_system(text);
        self.config.system_prompt = text.to_string();
    }

    /// Drop the conversation but keep the system prompt. Abandons any
    /// in-flight turn.
    pub fn reset_transcript(&mut self) {
        if let Some(turn) = self.in_flight.take() {
            debug!(?turn, "abandoning in-flight turn");
        }
        self.pending = PendingResponse::default();
        self.state = SessionState::Idle;
        self.transcript.clear();
        let prompt = std::mem::take(&mut self.config.system_prompt);
        self.set_system_prompt(&prompt);
    }

    pub fn select_model(&mut self, model_id: &str) -> Result<(), ChatError> {
        let model = lookup(model_id)?;
        if model.id == self.config.model_id {
            return Ok(());
        }
        info!(from = self.config.model_id, to = model.id, "model changed, resetting transcript");
        let capacity_changed = self.model().max_tokens != model.max_tokens;
        self.reset_transcript();
        self.config.model_id = model.id;
        if capacity_changed {
            self.config.max_tokens = model.default_budget();
        }
        Ok(())
    }

    /// Check a budget against the selected model without storing it
    pub fn validate_token_budget(&self, requested: u32) -> Result<u32, ChatError> {
        let max = self.model().max_tokens;
        if (1..=max).contains(&requested) {
            Ok(requested)
        } else {
            Err(ChatError::InvalidTokenBudget { requested, max })
        }
    }

    /// Store a budget, clamped into `1..=max_tokens`. Returns what was stored.
    pub fn set_token_budget(&mut self, requested: u32) -> u32 {
        let stored = self.model().clamp_budget(requested);
        if stored != requested {
            debug!(requested, stored, "token budget clamped");
        }
        self.config.max_tokens = stored;
        stored
    }

    /// Append the user's message and open a turn
    pub fn begin_turn(&mut self, text: &str) -> Result<Turn, ChatError> {
        if self.state != SessionState::Idle {
            return Err(ChatError::Busy);
        }
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        self.transcript.push(ChatMessage::user(text));
        self.last_error = None;
        self.pending = PendingResponse::default();

        let id = TurnId(self.next_turn);
        self.next_turn += 1;
        self.in_flight = Some(id);
        self.state = SessionState::AwaitingResponse;

        Ok(Turn {
            id,
            request: CompletionRequest {
                model: self.config.model_id.to_string(),
                messages: self.transcript.messages().to_vec(),
                max_tokens: self.config.max_tokens,
            },
        })
    }

    fn is_current(&self, turn: TurnId) -> bool {
        if self.in_flight == Some(turn) {
            true
        } else {
            debug!(?turn, "ignoring event for stale turn");
            false
        }
    }

    pub fn push_fragment(&mut self, turn: TurnId, fragment: Fragment) {
        if self.is_current(turn) {
            self.pending.push(fragment);
        }
    }

    /// Commit the assistant's reply, even when it is empty
    pub fn finish_turn(&mut self, turn: TurnId) -> Option<&ChatMessage> {
        if !self.is_current(turn) {
            return None;
        }
        let content = std::mem::take(&mut self.pending).content();
        self.transcript.push(ChatMessage::assistant(content));
        self.in_flight = None;
        self.state = SessionState::Idle;
        self.transcript.last()
    }

    /// Drop the partial reply and go back to idle. The user's message stays.
    ///
    /// Returns `None` when `turn` is no longer in flight; failures of
    /// abandoned turns are not errors.
    pub fn fail_turn(&mut self, turn: TurnId, error: InferenceError) -> Option<ChatError> {
        if !self.is_current(turn) {
            return None;
        }
        Some(self.abort_turn(error))
    }

    fn abort_turn(&mut self, error: InferenceError) -> ChatError {
        warn!(error = %error, "completion failed");
        self.pending = PendingResponse::default();
        self.in_flight = None;
        self.state = SessionState::Idle;
        self.last_error = Some(error.to_string());
        ChatError::Transport(error)
    }

    pub fn apply(&mut self, event: StreamEvent) -> Result<(), ChatError> {
        match event {
            StreamEvent::Fragment(turn, fragment) => self.push_fragment(turn, fragment),
            StreamEvent::Finished(turn) => {
                self.finish_turn(turn);
            }
            StreamEvent::Failed(turn, error) => {
                if let Some(e) = self.fail_turn(turn, error) {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Run one whole turn against `client`
    pub async fn submit<C>(&mut self, client: &C, text: &str) -> Result<ChatMessage, ChatError>
    where
        C: InferenceClient + ?Sized,
    {
        let turn = self.begin_turn(text)?;

        let mut stream = match client.stream_completion(&turn.request).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.abort_turn(e)),
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => self.push_fragment(turn.id, fragment),
                Err(e) => return Err(self.abort_turn(e)),
            }
        }

        Ok(self
            .finish_turn(turn.id)
            .cloned()
            .unwrap_or_else(|| ChatMessage::assistant("")))
    }
}

/// Consume a turn's stream on the current task and forward everything as
/// [`StreamEvent`]s. Stops early once the receiver is gone.
pub async fn forward_turn(
    client: Arc<dyn InferenceClient>,
    turn: Turn,
    tx: UnboundedSender<StreamEvent>,
) {
    let mut stream = match client.stream_completion(&turn.request).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = tx.send(StreamEvent::Failed(turn.id, e));
            return;
        }
    };

    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(fragment) => StreamEvent::Fragment(turn.id, fragment),
            Err(e) => {
                let _ = tx.send(StreamEvent::Failed(turn.id, e));
                return;
            }
        };
        if tx.send(event).is_err() {
            return;
        }
    }

    let _ = tx.send(StreamEvent::Finished(turn.id));
}

fn lookup(model_id: &str) -> Result<&'static ModelDescriptor, ChatError> {
    models::find(model_id).ok_or_else(|| ChatError::UnknownModel(model_id.to_string()))
}
