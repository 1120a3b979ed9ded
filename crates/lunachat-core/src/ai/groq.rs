use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::sse::{SseDecoder, SseEvent};
use super::{CompletionRequest, Fragment, FragmentStream, InferenceClient};
use crate::error::InferenceError;
use crate::state::ChatMessage;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Serialize)]
struct GroqRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    stream: bool,
}

/// Client for Groq's OpenAI-compatible chat completions endpoint
#[derive(Clone)]
pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GroqClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[async_trait]
impl InferenceClient for GroqClient {
    async fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<FragmentStream, InferenceError> {
        if !self.has_api_key() {
            return Err(InferenceError::MissingApiKey);
        }

        let body = GroqRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            stream: true,
        };

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "opening completion stream"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, "completion request rejected");
            return Err(InferenceError::Status { status, body });
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();

        Ok(fragments(bytes))
    }
}

struct StreamState {
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: SseDecoder,
    queue: VecDeque<Result<Fragment, InferenceError>>,
    done: bool,
}

impl StreamState {
    fn enqueue(&mut self, event: SseEvent) {
        if self.done {
            return;
        }
        match event {
            SseEvent::Done => self.done = true,
            SseEvent::Data(payload) => match parse_chunk(&payload) {
                Ok(Some(fragment)) => self.queue.push_back(Ok(fragment)),
                Ok(None) => {}
                Err(e) => {
                    self.queue.push_back(Err(e));
                    self.done = true;
                }
            },
        }
    }
}

/// Turn a raw SSE body into fragments. The stream ends at `[DONE]`, at end of
/// body, or right after the first error.
fn fragments(body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>) -> FragmentStream {
    let state = StreamState {
        body,
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.queue.pop_front() {
                if item.is_err() {
                    st.queue.clear();
                }
                return Some((item, st));
            }
            if st.done {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for event in st.decoder.feed(&bytes) {
                        st.enqueue(event);
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(InferenceError::Http(e)), st));
                }
                None => {
                    if let Some(event) = st.decoder.finish() {
                        st.enqueue(event);
                    }
                    st.done = true;
                }
            }
        }
    })
    .boxed()
}

/// Pull the delta out of one `chat.completion.chunk` payload.
///
/// Returns `None` for chunks that carry no content (role headers, usage
/// trailers, empty deltas).
pub(crate) fn parse_chunk(payload: &str) -> Result<Option<Fragment>, InferenceError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| InferenceError::Decode(e.to_string()))?;

    if let Some(err) = value.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(InferenceError::Api(message));
    }

    match value.pointer("/choices/0/delta/content") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(Fragment::Text(s.clone()))),
        Some(other) => Ok(Some(Fragment::Structured(other.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(chunks: Vec<&'static str>) -> BoxStream<'static, Result<Vec<u8>, reqwest::Error>> {
        stream::iter(chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec()))).boxed()
    }

    #[test]
    fn test_parse_text_delta() {
        let chunk = r#"{"id":"x","choices":[{"index":0,"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_chunk(chunk).unwrap(), Some(Fragment::text("Hel")));
    }

    #[test]
    fn test_parse_skips_empty_and_role_only_deltas() {
        let role = r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#;
        let usage = r#"{"choices":[],"x_groq":{"usage":{"total_tokens":12}}}"#;
        let null = r#"{"choices":[{"delta":{"content":null},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_chunk(role).unwrap(), None);
        assert_eq!(parse_chunk(usage).unwrap(), None);
        assert_eq!(parse_chunk(null).unwrap(), None);
    }

    #[test]
    fn test_parse_structured_delta() {
        let chunk = r#"{"choices":[{"delta":{"content":[{"type":"text","text":"a"}]}}]}"#;
        match parse_chunk(chunk).unwrap() {
            Some(Fragment::Structured(v)) => assert!(v.is_array()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_object() {
        let chunk = r#"{"error":{"message":"rate limited","type":"tokens"}}"#;
        match parse_chunk(chunk) {
            Err(InferenceError::Api(msg)) => assert_eq!(msg, "rate limited"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_malformed_json() {
        assert!(matches!(parse_chunk("{not json"), Err(InferenceError::Decode(_))));
    }

    #[tokio::test]
    async fn test_fragments_in_order_until_done() {
        let stream = fragments(body(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: {\"choi",
            "ces\":[{\"delta\":{\"content\":\", world\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]));

        let out: Vec<_> = stream.collect().await;
        let texts: Vec<Fragment> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(
            texts,
            vec![Fragment::text("Hel"), Fragment::text("lo"), Fragment::text(", world")]
        );
    }

    #[tokio::test]
    async fn test_fragments_stop_after_error() {
        let stream = fragments(body(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"boom\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
        ]));

        let out: Vec<_> = stream.collect().await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Ok(Fragment::Text(ref s)) if s == "a"));
        assert!(matches!(out[1], Err(InferenceError::Api(_))));
    }

    #[tokio::test]
    async fn test_body_without_done_marker_ends_cleanly() {
        let stream = fragments(body(vec!["data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}"]));
        let out: Vec<_> = stream.collect().await;
        assert_eq!(out.len(), 1);
        assert!(out[0].is_ok());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GroqClient::new("  ");
        let request = CompletionRequest {
            model: "llama3-8b-8192".into(),
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 16,
        };
        assert!(matches!(
            client.stream_completion(&request).await,
            Err(InferenceError::MissingApiKey)
        ));
    }

    #[test]
    fn test_request_wire_format() {
        let messages = vec![ChatMessage::system("s"), ChatMessage::user("u")];
        let req = GroqRequest { model: "m", messages: &messages, max_tokens: 5, stream: true };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "u");
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 5);
    }
}
