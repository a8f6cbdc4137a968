//! OpenAI-compatible streaming source
//!
//! POSTs a chat-completions request with `stream: true` and yields the
//! delta content of each SSE `data:` event as one fragment. The stream
//! ends on `data: [DONE]`; dropping it closes the connection early.

use std::collections::VecDeque;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::WeftConfig;
use crate::util::constants::{CONNECT_TIMEOUT, GENERATION_TIMEOUT};

use super::{FragmentStream, GenerationRequest, GenerationSource, OPENAI_DEFAULT_MODEL};

/// Default API endpoint root
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiSource {
    api_key: String,
    base_url: String,
    client: Client,
}

impl OpenAiSource {
    /// Build from the `OPENAI_API_KEY` environment variable.
    pub fn new() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?;
        Self::with_base_url(api_key, OPENAI_BASE_URL)
    }

    /// Build from a loaded config (env vars take precedence inside it).
    pub fn from_config(config: &WeftConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .context("no API key in config or environment")?;
        let base_url = config.resolved_base_url();
        Self::with_base_url(api_key, base_url)
    }

    /// Build against a custom endpoint (proxies, local servers, tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(GENERATION_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("weft/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn resolve_model<'a>(&self, model: &'a str) -> &'a str {
        if model.is_empty() {
            OPENAI_DEFAULT_MODEL
        } else {
            model
        }
    }
}

#[async_trait]
impl GenerationSource for OpenAiSource {
    async fn stream(&self, request: GenerationRequest) -> Result<FragmentStream> {
        let model = self.resolve_model(&request.model).to_string();
        let messages: Vec<Value> = request
            .context
            .into_turns()
            .into_iter()
            .map(|turn| json!({ "role": turn.role, "content": turn.content }))
            .collect();

        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": request.temperature,
            "stream": true,
        });

        debug!(model = %model, "opening completion stream");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send request to completion endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("completion endpoint error {}: {}", status, body);
        }

        Ok(Box::pin(sse_fragments(Box::pin(response.bytes_stream()))))
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        OPENAI_DEFAULT_MODEL
    }
}

struct SseState<B> {
    bytes: B,
    // Raw byte buffer: a UTF-8 sequence may split across network chunks,
    // so lines are only decoded once a full `\n`-terminated line is seen.
    buf: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
}

/// Decode an SSE byte stream into content fragments.
fn sse_fragments<B>(bytes: B) -> impl Stream<Item = Result<String>> + Send
where
    B: Stream<Item = reqwest::Result<Bytes>> + Send + Unpin + 'static,
{
    let state = SseState {
        bytes,
        buf: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Some((Ok(fragment), state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buf.extend_from_slice(&chunk);
                    drain_lines(&mut state.buf, &mut state.pending, &mut state.done);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((
                        Err(anyhow::Error::new(e).context("error reading completion stream")),
                        state,
                    ));
                }
                None => {
                    state.done = true;
                    return None;
                }
            }
        }
    })
}

/// Split complete lines off `buf`, parse `data:` events, queue fragments.
fn drain_lines(buf: &mut Vec<u8>, pending: &mut VecDeque<String>, done: &mut bool) {
    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buf.drain(..=pos).collect();
        let line = match std::str::from_utf8(&line) {
            Ok(s) => s.trim_end_matches(['\n', '\r']),
            Err(_) => continue,
        };
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            *done = true;
            return;
        }
        let Ok(event) = serde_json::from_str::<Value>(data) else {
            continue;
        };
        if let Some(content) = event["choices"][0]["delta"]["content"].as_str() {
            if !content.is_empty() {
                pending.push_back(content.to_string());
            }
        }
    }
}
