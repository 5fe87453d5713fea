// SPDX-License-Identifier: Apache-2.0
//! An `LlmClient` backed by a real OpenAI-compatible `/chat/completions`
//! endpoint. Grounded on `sven-model/openai_compat.rs`'s
//! `OpenAICompatProvider`: same auth styles, same SSE line-buffering
//! (`drain_complete_sse_lines`/`parse_sse_data_line`), generalized to the
//! core's narrower `LlmEvent` vocabulary.

use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use sam_interfaces::{LlmClient, LlmEvent, LlmMessage, LlmResponseStream, LlmRole, LlmToolCall, LlmUsage, ToolSpec};
use sam_types::SamError;
use serde_json::{json, Value};
use tracing::debug;

/// How the API key is attached to requests (spec §6 makes no mention of
/// auth; this mirrors the three styles the teacher's driver set actually
/// needs across its ~25 OpenAI-compatible providers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    Bearer,
    ApiKeyHeader,
    None,
}

pub struct HttpLlmClient {
    model: String,
    api_key: Option<String>,
    chat_url: String,
    auth_style: AuthStyle,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(chat_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>, auth_style: AuthStyle) -> Self {
        Self { model: model.into(), api_key, chat_url: chat_url.into(), auth_style, client: reqwest::Client::new() }
    }

    /// Reads `SAM_LLM_BASE_URL` / `SAM_LLM_MODEL` / `SAM_LLM_API_KEY` from
    /// the environment, the way `sven-model::from_config` resolves a
    /// provider's API key from `api_key_env` rather than a config field.
    /// Not part of `AgentConfig` (spec §6's config table is exact).
    pub fn from_env() -> anyhow::Result<Self> {
        let base = std::env::var("SAM_LLM_BASE_URL").context("SAM_LLM_BASE_URL not set")?;
        let model = std::env::var("SAM_LLM_MODEL").context("SAM_LLM_MODEL not set")?;
        let api_key = std::env::var("SAM_LLM_API_KEY").ok();
        let auth_style = match std::env::var("SAM_LLM_AUTH_STYLE").as_deref() {
            Ok("api-key-header") => AuthStyle::ApiKeyHeader,
            Ok("none") => AuthStyle::None,
            _ => AuthStyle::Bearer,
        };
        let chat_url = format!("{}/chat/completions", base.trim_end_matches('/'));
        Ok(Self::new(chat_url, model, api_key, auth_style))
    }
}

fn role_str(role: LlmRole) -> &'static str {
    match role {
        LlmRole::System => "system",
        LlmRole::User => "user",
        LlmRole::Assistant => "assistant",
        LlmRole::ToolResult => "tool",
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn invoke(&self, messages: Vec<LlmMessage>, tools: Vec<ToolSpec>) -> Result<LlmResponseStream, SamError> {
        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": role_str(m.role), "content": m.content }))
            .collect();

        let wire_tools: Vec<Value> = tools
            .iter()
            .filter(|t| !t.is_peer_delegation())
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters_schema,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": wire_messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if !wire_tools.is_empty() {
            body["tools"] = json!(wire_tools);
        }

        debug!(model = %self.model, message_count = wire_messages.len(), "sending chat completion request");

        let mut req = self.client.post(&self.chat_url).json(&body);
        req = match self.auth_style {
            AuthStyle::Bearer => {
                let key = self.api_key.as_deref().ok_or_else(|| SamError::Llm("API key not set".to_string()))?;
                req.bearer_auth(key)
            }
            AuthStyle::ApiKeyHeader => {
                let key = self.api_key.as_deref().ok_or_else(|| SamError::Llm("API key not set".to_string()))?;
                req.header("api-key", key)
            }
            AuthStyle::None => req,
        };

        let resp = req.send().await.map_err(|e| SamError::Llm(format!("request failed: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SamError::Llm(format!("error {status}: {text}")));
        }

        let events = collect_sse_events(resp).await?;
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

/// Drains the whole SSE response into a flat `Vec<LlmEvent>`, assembling
/// incremental tool-call deltas (routed by their `index` field, same as
/// `sven-model`'s accumulation contract) into complete `LlmEvent::ToolCall`
/// entries once the stream reaches `[DONE]`.
async fn collect_sse_events(resp: reqwest::Response) -> Result<Vec<LlmEvent>, SamError> {
    let mut byte_stream = resp.bytes_stream();
    let mut buf = String::new();
    let mut events = Vec::new();
    let mut tool_calls: BTreeMap<u32, (String, String, String)> = BTreeMap::new();

    'outer: while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk.map_err(|e| SamError::Llm(format!("stream error: {e}")))?;
        buf.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(nl_pos) = buf.find('\n') {
            let line = buf[..nl_pos].trim_end_matches('\r').to_string();
            buf = buf[nl_pos + 1..].to_string();

            let Some(data) = line.strip_prefix("data: ") else { continue };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                flush_tool_calls(&mut tool_calls, &mut events);
                events.push(LlmEvent::Done);
                break 'outer;
            }

            let parsed: Value = match serde_json::from_str(data) {
                Ok(v) => v,
                Err(_) => continue,
            };
            parse_chunk(&parsed, &mut tool_calls, &mut events);
        }
    }

    if !matches!(events.last(), Some(LlmEvent::Done)) {
        flush_tool_calls(&mut tool_calls, &mut events);
        events.push(LlmEvent::Done);
    }
    Ok(events)
}

fn flush_tool_calls(tool_calls: &mut BTreeMap<u32, (String, String, String)>, events: &mut Vec<LlmEvent>) {
    for (_, (id, name, arguments)) in std::mem::take(tool_calls) {
        let arguments: Value = serde_json::from_str(&arguments).unwrap_or(Value::Object(Default::default()));
        events.push(LlmEvent::ToolCall(LlmToolCall { id, name, arguments }));
    }
}

fn parse_chunk(v: &Value, tool_calls: &mut BTreeMap<u32, (String, String, String)>, events: &mut Vec<LlmEvent>) {
    if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
        let cached = usage
            .get("prompt_tokens_details")
            .and_then(|d| d.get("cached_tokens"))
            .and_then(|t| t.as_u64())
            .unwrap_or(0);
        events.push(LlmEvent::Usage(LlmUsage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
            cached_input_tokens: cached,
        }));
        return;
    }

    let delta = &v["choices"][0]["delta"];

    if let Some(calls) = delta.get("tool_calls").and_then(|c| c.as_array()) {
        for tc in calls {
            let index = tc["index"].as_u64().unwrap_or(0) as u32;
            let entry = tool_calls.entry(index).or_insert_with(|| (String::new(), String::new(), String::new()));
            if let Some(id) = tc["id"].as_str() {
                if !id.is_empty() {
                    entry.0 = id.to_string();
                }
            }
            if let Some(name) = tc["function"]["name"].as_str() {
                if !name.is_empty() {
                    entry.1 = name.to_string();
                }
            }
            if let Some(args) = tc["function"]["arguments"].as_str() {
                entry.2.push_str(args);
            }
        }
        return;
    }

    if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            events.push(LlmEvent::TextDelta(text.to_string()));
        }
    }
}
