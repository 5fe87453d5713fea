// SPDX-License-Identifier: Apache-2.0
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use sam_interfaces::{LlmClient, LlmEvent, LlmMessage, LlmResponseStream, LlmToolCall, LlmUsage, ToolSpec};
use sam_types::SamError;

/// A pre-scripted `LlmClient`. Each call to `invoke` pops the next
/// response script from the front of the queue, mirroring
/// `sven-model::ScriptedMockProvider` (`crates/sven-model/src/mock.rs`).
/// This lets tests specify exact event sequences — including tool calls —
/// without a real model call.
pub struct ScriptedLlmClient {
    scripts: Mutex<Vec<Vec<LlmEvent>>>,
    /// Every `messages` argument seen by `invoke`, in call order — lets
    /// tests assert the turn algorithm re-prompted with the expected
    /// peer-result content after a suspension.
    pub calls: Mutex<Vec<Vec<LlmMessage>>>,
    /// When `true`, `invoke` returns `SamError::Llm` instead of a stream —
    /// used to exercise the bounded-retry failure path.
    fail_next: std::sync::atomic::AtomicBool,
}

impl ScriptedLlmClient {
    pub fn new(scripts: Vec<Vec<LlmEvent>>) -> Self {
        Self { scripts: Mutex::new(scripts), calls: Mutex::new(Vec::new()), fail_next: std::sync::atomic::AtomicBool::new(false) }
    }

    /// Convenience: a client that always answers with one text reply and
    /// zero tool calls (spec §8 Scenario A).
    pub fn always_text(reply: impl Into<String>) -> Self {
        let text = reply.into();
        Self::new(vec![vec![
            LlmEvent::TextDelta(text),
            LlmEvent::Usage(LlmUsage { input_tokens: 10, output_tokens: 5, cached_input_tokens: 0 }),
            LlmEvent::Done,
        ]])
    }

    /// Convenience: first call emits one tool call, second call (after the
    /// tool/peer result is fed back) answers with final text (spec §8
    /// Scenario B).
    pub fn tool_then_text(call_id: impl Into<String>, tool_name: impl Into<String>, args: serde_json::Value, final_text: impl Into<String>) -> Self {
        Self::new(vec![
            vec![
                LlmEvent::ToolCall(LlmToolCall { id: call_id.into(), name: tool_name.into(), arguments: args }),
                LlmEvent::Done,
            ],
            vec![LlmEvent::TextDelta(final_text.into()), LlmEvent::Done],
        ])
    }

    /// Convenience: first call emits `calls.len()` tool calls in one turn
    /// (spec §8 Scenario C, parallel tools), second call answers with
    /// final text.
    pub fn parallel_tools_then_text(calls: Vec<(String, String, serde_json::Value)>, final_text: impl Into<String>) -> Self {
        let mut first_round: Vec<LlmEvent> = calls
            .into_iter()
            .map(|(id, name, arguments)| LlmEvent::ToolCall(LlmToolCall { id, name, arguments }))
            .collect();
        first_round.push(LlmEvent::Done);
        Self::new(vec![first_round, vec![LlmEvent::TextDelta(final_text.into()), LlmEvent::Done]])
    }

    pub fn inject_failure(&self) {
        self.fail_next.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn calls_made(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn invoke(&self, messages: Vec<LlmMessage>, _tools: Vec<ToolSpec>) -> Result<LlmResponseStream, SamError> {
        self.calls.lock().unwrap().push(messages);

        if self.fail_next.swap(false, std::sync::atomic::Ordering::SeqCst) {
            return Err(SamError::Llm("injected failure".to_string()));
        }

        let events = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                vec![LlmEvent::TextDelta("[no more scripts]".to_string()), LlmEvent::Done]
            } else {
                scripts.remove(0)
            }
        };
        Ok(Box::pin(stream::iter(events)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn always_text_replies_once_then_falls_back() {
        let client = ScriptedLlmClient::always_text("4");
        let mut s = client.invoke(vec![LlmMessage::user("2+2?")], vec![]).await.unwrap();
        let first = s.next().await.unwrap();
        assert!(matches!(first, LlmEvent::TextDelta(t) if t == "4"));

        let mut s2 = client.invoke(vec![], vec![]).await.unwrap();
        let first2 = s2.next().await.unwrap();
        assert!(matches!(first2, LlmEvent::TextDelta(t) if t.contains("no more scripts")));
    }

    #[tokio::test]
    async fn records_every_call() {
        let client = ScriptedLlmClient::always_text("hi");
        let _ = client.invoke(vec![LlmMessage::user("a")], vec![]).await.unwrap();
        let _ = client.invoke(vec![LlmMessage::user("b")], vec![]).await.unwrap();
        assert_eq!(client.calls_made(), 2);
    }

    #[tokio::test]
    async fn injected_failure_surfaces_llm_error_once() {
        let client = ScriptedLlmClient::always_text("hi");
        client.inject_failure();
        let err = client.invoke(vec![], vec![]).await.unwrap_err();
        assert!(matches!(err, SamError::Llm(_)));
        assert!(client.invoke(vec![], vec![]).await.is_ok());
    }

    #[tokio::test]
    async fn parallel_tools_script_emits_all_calls_in_first_round() {
        let client = ScriptedLlmClient::parallel_tools_then_text(
            vec![
                ("c1".into(), "ask_a".into(), serde_json::json!({})),
                ("c2".into(), "ask_b".into(), serde_json::json!({})),
            ],
            "combined",
        );
        let mut s = client.invoke(vec![], vec![]).await.unwrap();
        let mut tool_calls = 0;
        while let Some(ev) = s.next().await {
            if matches!(ev, LlmEvent::ToolCall(_)) {
                tool_calls += 1;
            }
        }
        assert_eq!(tool_calls, 2);
    }
}
