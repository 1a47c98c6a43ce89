//! Worker adapter: drives one worker's capability through its tool loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;

use crate::context::CycleContext;
use crate::error::{LlmError, WorkerError};
use crate::llm::{
    ChatMessage, LlmProvider, Reasoning, ReasoningContext, ToolCall, WorkerOutcome,
};
use crate::memory::{Turn, TurnRole};
use crate::tools::{ToolError, ToolRegistry};
use crate::worker::WorkerKind;
use crate::worker::prompts;
use crate::worker::scratchpad::{ScratchPad, ToolResult};

/// Reply used when a worker keeps calling tools past its budget.
pub const TOOL_LIMIT_REPLY: &str =
    "죄송합니다. 도구 호출 한도를 초과하여 작업을 완료할 수 없었습니다.";

/// Per-cycle bounds for a worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerLimits {
    /// Tool invocations allowed in one cycle.
    pub max_tool_calls: usize,
    pub llm_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            max_tool_calls: 8,
            llm_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of a completed worker cycle.
#[derive(Debug, Clone)]
pub struct WorkerRun {
    pub reply: String,
    /// The cycle's tool traffic, returned to the caller and then dropped.
    pub scratchpad: ScratchPad,
    /// Whether the reply came from hitting the tool budget.
    pub hit_tool_limit: bool,
}

/// Uniform execution wrapper around one worker capability.
pub struct WorkerAdapter {
    kind: WorkerKind,
    reasoning: Reasoning,
    tools: Arc<ToolRegistry>,
    limits: WorkerLimits,
}

impl WorkerAdapter {
    pub fn new(
        kind: WorkerKind,
        llm: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        limits: WorkerLimits,
    ) -> Self {
        Self {
            kind,
            reasoning: Reasoning::new(llm).with_system_prompt(prompts::system_prompt(kind)),
            tools,
            limits,
        }
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Run the worker to a final reply for this cycle.
    ///
    /// Tool failures and timeouts are written into the scratchpad as text and
    /// the loop continues. A request for an unregistered tool, or a failed
    /// capability call, ends the cycle with an error.
    pub async fn run(
        &self,
        turns: &[Turn],
        mut scratchpad: ScratchPad,
        ctx: &CycleContext,
    ) -> Result<WorkerRun, WorkerError> {
        let tool_defs = self.tools.tool_definitions().await;
        let mut history = Vec::with_capacity(turns.len() + 1);
        if let Some(date) = prompts::date_context(self.kind, Local::now()) {
            history.push(ChatMessage::system(date));
        }
        history.extend(history_messages(turns));

        loop {
            let mut messages = history.clone();
            messages.extend(scratchpad.to_messages());
            let reason_ctx = ReasoningContext::new()
                .with_messages(messages)
                .with_tools(tool_defs.clone());

            let output = tokio::time::timeout_at(
                ctx.call_deadline(self.limits.llm_timeout),
                self.reasoning.respond(&reason_ctx),
            )
            .await
            .map_err(|_| LlmError::Timeout(self.limits.llm_timeout))??;

            tracing::debug!(
                session_id = %ctx.session_id,
                worker = %self.kind,
                input_tokens = output.usage.input_tokens,
                output_tokens = output.usage.output_tokens,
                "Worker step"
            );

            let (calls, content) = match output.outcome {
                WorkerOutcome::FinalReply(reply) => {
                    return Ok(WorkerRun {
                        reply,
                        scratchpad,
                        hit_tool_limit: false,
                    });
                }
                WorkerOutcome::ToolRequest { calls, content } => (calls, content),
            };

            // Reject the whole round before any side effect if it names a
            // tool this worker does not have.
            for call in &calls {
                if !self.tools.has(&call.name).await {
                    tracing::error!(
                        session_id = %ctx.session_id,
                        worker = %self.kind,
                        tool = %call.name,
                        "Unknown tool requested"
                    );
                    return Err(WorkerError::UnknownTool {
                        worker: self.kind.to_string(),
                        tool: call.name.clone(),
                    });
                }
            }

            scratchpad.begin_round(content, calls.clone());
            for call in &calls {
                if scratchpad.invocation_count() >= self.limits.max_tool_calls {
                    tracing::warn!(
                        session_id = %ctx.session_id,
                        worker = %self.kind,
                        limit = self.limits.max_tool_calls,
                        "Tool call limit reached"
                    );
                    return Ok(WorkerRun {
                        reply: TOOL_LIMIT_REPLY.to_string(),
                        scratchpad,
                        hit_tool_limit: true,
                    });
                }
                let result = self.execute_tool(call, ctx).await;
                scratchpad.record(result);
            }
        }
    }

    async fn execute_tool(&self, call: &ToolCall, ctx: &CycleContext) -> ToolResult {
        let start = Instant::now();
        let Some(tool) = self.tools.get(&call.name).await else {
            // Checked before the round started; only reachable if the tool
            // was unregistered mid-cycle.
            return ToolResult::failed(
                format!("tool {} is not available", call.name),
                start.elapsed(),
            );
        };

        tracing::debug!(
            session_id = %ctx.session_id,
            tool = %call.name,
            params = %call.arguments,
            "Tool call started"
        );

        // The request deadline may leave less than the configured timeout.
        let deadline = ctx.call_deadline(self.limits.tool_timeout);
        let allowed = deadline.saturating_duration_since(tokio::time::Instant::now());
        let result =
            tokio::time::timeout_at(deadline, tool.execute(call.arguments.clone(), ctx)).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(output)) => {
                tracing::debug!(
                    tool = %call.name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Tool call succeeded"
                );
                ToolResult::succeeded(output.to_text(), elapsed)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    session_id = %ctx.session_id,
                    tool = %call.name,
                    error = %e,
                    "Tool call failed"
                );
                ToolResult::failed(e, elapsed)
            }
            Err(_) => {
                tracing::warn!(
                    session_id = %ctx.session_id,
                    tool = %call.name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Tool call timed out"
                );
                ToolResult::failed(ToolError::Timeout(allowed), elapsed)
            }
        }
    }
}

/// Map session turns onto chat messages. Worker replies keep their author
/// as the speaker name; system turns are replies the user saw, so they go
/// out as assistant messages.
pub fn history_messages(turns: &[Turn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .map(|turn| match turn.role {
            TurnRole::User => ChatMessage::user(&turn.content),
            TurnRole::Worker => {
                let msg = ChatMessage::assistant(&turn.content);
                match turn.author {
                    Some(kind) => msg.with_name(kind.as_str()),
                    None => msg,
                }
            }
            TurnRole::System => ChatMessage::assistant(&turn.content),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::llm::provider::{
        ChoiceRequest, ChoiceResponse, CompletionRequest, CompletionResponse, FinishReason,
        ToolCompletionRequest, ToolCompletionResponse,
    };
    use crate::llm::Role;
    use crate::memory::{ConversationMemory, MemoryStore, NewTurn};
    use crate::tools::{Tool, ToolOutput};

    /// Plays back a fixed script of tool-call rounds, then a final reply.
    struct ScriptedLlm {
        script: Mutex<VecDeque<Vec<ToolCall>>>,
        final_reply: String,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        fn new(script: Vec<Vec<ToolCall>>, final_reply: &str) -> Self {
            Self {
                script: Mutex::new(script.into()),
                final_reply: final_reply.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.final_reply.clone(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            })
        }

        async fn complete_with_tools(
            &self,
            req: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(req.messages.clone());
            let next = self.script.lock().unwrap().pop_front();
            Ok(match next {
                Some(calls) => ToolCompletionResponse {
                    content: None,
                    tool_calls: calls,
                    input_tokens: 0,
                    output_tokens: 0,
                    finish_reason: FinishReason::ToolUse,
                },
                None => ToolCompletionResponse {
                    content: Some(self.final_reply.clone()),
                    tool_calls: Vec::new(),
                    input_tokens: 0,
                    output_tokens: 0,
                    finish_reason: FinishReason::Stop,
                },
            })
        }

        async fn complete_choice(&self, _req: ChoiceRequest) -> Result<ChoiceResponse, LlmError> {
            unreachable!("workers never route")
        }
    }

    /// Always asks for the same tool.
    struct LoopingLlm;

    #[async_trait]
    impl LlmProvider for LoopingLlm {
        fn model_name(&self) -> &str {
            "looping"
        }
        async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            unreachable!("tools are always offered")
        }
        async fn complete_with_tools(
            &self,
            _req: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            Ok(ToolCompletionResponse {
                content: None,
                tool_calls: vec![call("c", "counter")],
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::ToolUse,
            })
        }
        async fn complete_choice(&self, _req: ChoiceRequest) -> Result<ChoiceResponse, LlmError> {
            unreachable!()
        }
    }

    struct SlowLlm;

    #[async_trait]
    impl LlmProvider for SlowLlm {
        fn model_name(&self) -> &str {
            "slow"
        }
        async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            unreachable!()
        }
        async fn complete_with_tools(
            &self,
            _req: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            unreachable!()
        }
        async fn complete_choice(&self, _req: ChoiceRequest) -> Result<ChoiceResponse, LlmError> {
            unreachable!()
        }
    }

    struct CountingTool {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingTool {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "counter"
        }
        fn description(&self) -> &str {
            "counts invocations"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _params: serde_json::Value,
            _ctx: &CycleContext,
        ) -> Result<ToolOutput, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                Err(ToolError::ExternalService("upstream down".into()))
            } else {
                Ok(ToolOutput::text(format!("call #{n}"), Duration::ZERO))
            }
        }
    }

    /// Sleeps far longer than any test timeout.
    struct StallingTool;

    #[async_trait]
    impl Tool for StallingTool {
        fn name(&self) -> &str {
            "counter"
        }
        fn description(&self) -> &str {
            "never finishes in time"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _params: serde_json::Value,
            _ctx: &CycleContext,
        ) -> Result<ToolOutput, ToolError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ToolOutput::text("too late", Duration::ZERO))
        }
    }

    fn stalling_adapter(llm: Arc<dyn LlmProvider>, limits: WorkerLimits) -> WorkerAdapter {
        let tools = Arc::new(ToolRegistry::with_tools([
            Arc::new(StallingTool) as Arc<dyn Tool>
        ]));
        WorkerAdapter::new(WorkerKind::Calendar, llm, tools, limits)
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: serde_json::json!({}),
        }
    }

    fn turns() -> Vec<Turn> {
        let memory = ConversationMemory::new(10);
        memory.append("s", NewTurn::user("hello"));
        memory.read("s")
    }

    fn ctx() -> CycleContext {
        CycleContext::new("s", Duration::from_secs(10))
    }

    fn adapter(
        llm: Arc<dyn LlmProvider>,
        tool: Arc<CountingTool>,
        limits: WorkerLimits,
    ) -> WorkerAdapter {
        let tools = Arc::new(ToolRegistry::with_tools([tool as Arc<dyn Tool>]));
        WorkerAdapter::new(WorkerKind::Calendar, llm, tools, limits)
    }

    #[tokio::test]
    async fn tool_result_is_fed_back() {
        let llm = Arc::new(ScriptedLlm::new(vec![vec![call("c1", "counter")]], "done"));
        let tool = Arc::new(CountingTool::new(false));
        let worker = adapter(llm.clone(), tool.clone(), WorkerLimits::default());

        let run = worker.run(&turns(), ScratchPad::new(), &ctx()).await.unwrap();
        assert_eq!(run.reply, "done");
        assert!(!run.hit_tool_limit);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
        assert_eq!(run.scratchpad.invocation_count(), 1);

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let last = seen[1].last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.content, "call #1");
    }

    #[tokio::test]
    async fn tool_failure_is_text_not_error() {
        let llm = Arc::new(ScriptedLlm::new(vec![vec![call("c1", "counter")]], "sorry"));
        let tool = Arc::new(CountingTool::new(true));
        let worker = adapter(llm.clone(), tool, WorkerLimits::default());

        let run = worker.run(&turns(), ScratchPad::new(), &ctx()).await.unwrap();
        assert_eq!(run.reply, "sorry");
        let round = &run.scratchpad.rounds()[0];
        assert!(!round.results[0].success);
        assert!(round.results[0].output.starts_with("Error: "));
    }

    #[tokio::test]
    async fn unknown_tool_is_fatal_and_runs_nothing() {
        let llm = Arc::new(ScriptedLlm::new(
            vec![vec![call("c1", "counter"), call("c2", "teleport")]],
            "unused",
        ));
        let tool = Arc::new(CountingTool::new(false));
        let worker = adapter(llm, tool.clone(), WorkerLimits::default());

        let err = worker
            .run(&turns(), ScratchPad::new(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::UnknownTool { ref tool, .. } if tool == "teleport"));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tool_loop_is_bounded() {
        for max in [0, 1, 3, 8] {
            let tool = Arc::new(CountingTool::new(false));
            let limits = WorkerLimits {
                max_tool_calls: max,
                ..WorkerLimits::default()
            };
            let worker = adapter(Arc::new(LoopingLlm), tool.clone(), limits);

            let run = worker.run(&turns(), ScratchPad::new(), &ctx()).await.unwrap();
            assert!(run.hit_tool_limit);
            assert_eq!(run.reply, TOOL_LIMIT_REPLY);
            assert_eq!(tool.calls.load(Ordering::SeqCst), max);
        }
    }

    #[tokio::test]
    async fn slow_capability_times_out() {
        let tool = Arc::new(CountingTool::new(false));
        let limits = WorkerLimits {
            llm_timeout: Duration::from_millis(20),
            ..WorkerLimits::default()
        };
        let worker = adapter(Arc::new(SlowLlm), tool, limits);

        let err = worker
            .run(&turns(), ScratchPad::new(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Capability(LlmError::Timeout(_))));
    }

    #[tokio::test]
    async fn tool_timeout_is_fed_back_as_text() {
        let llm = Arc::new(ScriptedLlm::new(
            vec![vec![call("c1", "counter")]],
            "늦어서 죄송합니다",
        ));
        let limits = WorkerLimits {
            tool_timeout: Duration::from_millis(20),
            ..WorkerLimits::default()
        };
        let worker = stalling_adapter(llm.clone(), limits);

        let run = worker.run(&turns(), ScratchPad::new(), &ctx()).await.unwrap();
        assert_eq!(run.reply, "늦어서 죄송합니다");
        assert!(!run.hit_tool_limit);

        let result = &run.scratchpad.rounds()[0].results[0];
        assert!(!result.success);
        assert!(result.output.starts_with("Error: Timeout after"), "{}", result.output);

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].last().unwrap().content, result.output);
    }

    #[tokio::test]
    async fn tool_timeout_reports_time_left_on_the_request() {
        let worker = stalling_adapter(
            Arc::new(ScriptedLlm::new(Vec::new(), "unused")),
            WorkerLimits::default(),
        );
        let short = CycleContext::new("s", Duration::from_millis(50));

        let result = worker.execute_tool(&call("c1", "counter"), &short).await;
        assert!(!result.success);
        assert!(result.output.starts_with("Error: Timeout after"));
        assert!(!result.output.contains("30s"), "{}", result.output);
        assert!(result.duration < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn worker_without_tools_uses_plain_completion() {
        let llm = Arc::new(ScriptedLlm::new(Vec::new(), "안녕하세요"));
        let worker = WorkerAdapter::new(
            WorkerKind::Chat,
            llm.clone(),
            Arc::new(ToolRegistry::new()),
            WorkerLimits::default(),
        );
        let run = worker.run(&turns(), ScratchPad::new(), &ctx()).await.unwrap();
        assert_eq!(run.reply, "안녕하세요");
        // plain completion path, no tool request recorded
        assert!(llm.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn history_keeps_worker_names() {
        let memory = ConversationMemory::new(10);
        memory.append("s", NewTurn::user("q"));
        memory.append("s", NewTurn::worker(WorkerKind::Search, "a"));
        memory.append("s", NewTurn::system("refused"));

        let msgs = history_messages(&memory.read("s"));
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[1].name.as_deref(), Some("Researcher"));
        assert_eq!(msgs[2].role, Role::Assistant);
        assert!(msgs[2].name.is_none());
    }
}
