// SPDX-License-Identifier: Apache-2.0
//! Tool-call middleware (spec §9 design note: "Callbacks with side-effect
//! captures" — `before_tool_callback`/`after_tool_callback` in the
//! source, replaced here with an explicit list of `(pre, post)` pairs
//! invoked around each tool call, receiving an immutable context struct
//! rather than closing over mutable state).

use sam_types::{A2aContext, ToolResult};

/// Immutable view of the call a middleware pair observes. Middlewares
/// cannot mutate the task; they can only inspect and, for `pre`,
/// short-circuit the call with a substitute result.
#[derive(Debug, Clone)]
pub struct ToolCallContext {
    pub task_id: String,
    pub a2a_context: A2aContext,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Returned by a `pre` hook: either let the call proceed, or short-circuit
/// it with a substitute result (e.g. a rate-limit rejection) without ever
/// reaching the tool/peer.
pub enum PreToolOutcome {
    Proceed,
    ShortCircuit(ToolResult),
}

pub trait ToolMiddleware: Send + Sync {
    /// Runs immediately before dispatch. Default: always proceed.
    fn pre(&self, _ctx: &ToolCallContext) -> PreToolOutcome {
        PreToolOutcome::Proceed
    }

    /// Runs after the result is known (local execution, peer response, or
    /// timeout), purely for observation — it cannot alter the result.
    fn post(&self, _ctx: &ToolCallContext, _result: &ToolResult) {}
}

/// Runs `pre` across every middleware in order; the first short-circuit
/// wins and later middlewares' `pre` are skipped (mirrors a middleware
/// chain short-circuiting on first veto).
pub fn run_pre_chain(middlewares: &[Box<dyn ToolMiddleware>], ctx: &ToolCallContext) -> PreToolOutcome {
    for mw in middlewares {
        if let PreToolOutcome::ShortCircuit(result) = mw.pre(ctx) {
            return PreToolOutcome::ShortCircuit(result);
        }
    }
    PreToolOutcome::Proceed
}

pub fn run_post_chain(middlewares: &[Box<dyn ToolMiddleware>], ctx: &ToolCallContext, result: &ToolResult) {
    for mw in middlewares {
        mw.post(ctx, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectByName(&'static str);
    impl ToolMiddleware for RejectByName {
        fn pre(&self, ctx: &ToolCallContext) -> PreToolOutcome {
            if ctx.tool_name == self.0 {
                PreToolOutcome::ShortCircuit(ToolResult::Error { code: "REJECTED".into(), message: "blocked".into() })
            } else {
                PreToolOutcome::Proceed
            }
        }
    }

    fn ctx(tool_name: &str) -> ToolCallContext {
        ToolCallContext {
            task_id: "t1".into(),
            a2a_context: A2aContext::default(),
            tool_name: tool_name.to_string(),
            arguments: serde_json::json!({}),
        }
    }

    #[test]
    fn pre_chain_proceeds_with_no_middlewares() {
        assert!(matches!(run_pre_chain(&[], &ctx("any")), PreToolOutcome::Proceed));
    }

    #[test]
    fn pre_chain_short_circuits_on_veto() {
        let middlewares: Vec<Box<dyn ToolMiddleware>> = vec![Box::new(RejectByName("dangerous_tool"))];
        match run_pre_chain(&middlewares, &ctx("dangerous_tool")) {
            PreToolOutcome::ShortCircuit(ToolResult::Error { code, .. }) => assert_eq!(code, "REJECTED"),
            _ => panic!("expected short-circuit"),
        }
        assert!(matches!(run_pre_chain(&middlewares, &ctx("safe_tool")), PreToolOutcome::Proceed));
    }

    #[test]
    fn post_chain_runs_every_middleware() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        struct Counter(std::sync::Arc<AtomicUsize>);
        impl ToolMiddleware for Counter {
            fn post(&self, _ctx: &ToolCallContext, _result: &ToolResult) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let counter = std::sync::Arc::new(AtomicUsize::new(0));
        let middlewares: Vec<Box<dyn ToolMiddleware>> =
            vec![Box::new(Counter(counter.clone())), Box::new(Counter(counter.clone()))];
        run_post_chain(&middlewares, &ctx("x"), &ToolResult::Text { text: "ok".into() });
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
