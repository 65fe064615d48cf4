//! OpenAI chat completions client.
//!
//! Generation is cost-sensitive and on the critical path of an answer, so
//! failures propagate and requests are never retried.
//!
//! # Streaming
//!
//! With `"stream": true` the API answers with server-sent events. Each
//! `data:` line holds a JSON chunk whose `choices[0].delta.content` is the
//! next text increment; the literal `data: [DONE]` ends the stream. Lines
//! are reassembled across network chunk boundaries before decoding.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

use docs_assistant_core::generation::{AnswerModel, GenerationRequest, TextStream};

use crate::config::AnswerConfig;
use crate::embedding::OPENAI_API_KEY_ENV;
use crate::http;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub fn create_answer_model(config: &AnswerConfig) -> Result<Arc<dyn AnswerModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledAnswerModel)),
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config)?)),
        other => bail!("Unknown answer provider: {}", other),
    }
}

/// Fails every call. Strict-mode answers below the confidence threshold
/// still succeed, since they never reach the model.
pub struct DisabledAnswerModel;

#[async_trait]
impl AnswerModel for DisabledAnswerModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        bail!("Answer generation is disabled")
    }
}

pub struct OpenAIChatModel {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAIChatModel {
    pub fn new(config: &AnswerConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            api_key: http::secret_from_env(OPENAI_API_KEY_ENV)?,
            model: config.model.clone(),
        })
    }

    fn body(&self, request: &GenerationRequest, stream: bool) -> Value {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system,
        })];
        messages.extend(
            request
                .messages
                .iter()
                .map(|m| serde_json::json!({ "role": m.role, "content": m.content })),
        );
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": stream,
        })
    }
}

#[async_trait]
impl AnswerModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = self.body(request, false);
        let json = http::send_json("OpenAI", 0, || {
            self.client
                .post(OPENAI_CHAT_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        parse_completion(&json)
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream> {
        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&self.body(request, true))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        Ok(decode_text_stream(response.bytes_stream()))
    }
}

/// Turns the raw event-stream body into text increments. A body that ends
/// before `data: [DONE]` yields a final error so a cut-off answer is never
/// taken as complete.
fn decode_text_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<anyhow::Error>,
{
    let state = StreamState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    st.finished = st.decoder.decode_into(chunk.as_ref(), &mut st.pending);
                }
                Some(Err(e)) => {
                    st.pending.push_back(Err(e.into()));
                    st.finished = true;
                }
                None => {
                    st.pending
                        .push_back(Err(anyhow!("OpenAI stream ended before [DONE]")));
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// `choices[0].message.content`; a null content decodes as empty text.
fn parse_completion(json: &Value) -> Result<String> {
    let message = json
        .pointer("/choices/0/message")
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices"))?;
    Ok(message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string())
}

struct StreamState<S> {
    bytes: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Delta(String),
    Done,
}

/// Reassembles server-sent event lines from raw network chunks.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk and return the `data:` payloads of every completed line.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }

    /// Decode a chunk, queueing text increments and errors. Returns `true`
    /// once the stream has ended.
    fn decode_into(&mut self, chunk: &[u8], pending: &mut VecDeque<Result<String>>) -> bool {
        for payload in self.push(chunk) {
            match parse_stream_payload(&payload) {
                Ok(Some(StreamEvent::Delta(text))) => pending.push_back(Ok(text)),
                Ok(Some(StreamEvent::Done)) => return true,
                Ok(None) => {}
                Err(e) => {
                    pending.push_back(Err(e));
                    return true;
                }
            }
        }
        false
    }
}

fn parse_stream_payload(payload: &str) -> Result<Option<StreamEvent>> {
    if payload == "[DONE]" {
        return Ok(Some(StreamEvent::Done));
    }
    let json: Value = serde_json::from_str(payload)?;
    if let Some(err) = json.get("error") {
        bail!("OpenAI stream error: {}", err);
    }
    Ok(json
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(|c| StreamEvent::Delta(c.to_string())))
}
