//! One-turn conversation driver.
//!
//! [`DialogueOrchestrator`] holds only shared read-only data. Each call to
//! [`DialogueOrchestrator::advance`] takes the caller's state and context,
//! and returns the next state and updated context. Nothing about the
//! conversation is retained between calls.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ember_core::{CompletionEvent, SessionContext};
use ember_vector::{RetrievalEngine, RetrievalResult};

use crate::completion::{summarize, CompletionSink, IDENTIFIER_FIELD};
use crate::error::DialogError;
use crate::graph::{ConversationGraph, ConversationState, Resolution, StateId};

/// Context key holding the last knowledge-base answer.
pub const KB_ANSWER_FIELD: &str = "kb_response.answer";
/// Context key holding the answer's source; absent on a fallback answer.
pub const KB_SOURCE_FIELD: &str = "kb_response.source";
/// Context key holding the best similarity score, four decimals.
pub const KB_CONFIDENCE_FIELD: &str = "kb_response.confidence";

const DEFAULT_SUMMARY_LIMIT: usize = 50;
const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(2);

/// When the generic advance rule may fire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Any input other than the retreat token advances.
    #[default]
    Permissive,
    /// As `Permissive`, but blank input re-prompts.
    Strict,
}

impl FallbackPolicy {
    fn permits(self, input: &str) -> bool {
        match self {
            FallbackPolicy::Permissive => true,
            FallbackPolicy::Strict => !input.trim().is_empty(),
        }
    }
}

impl FromStr for FallbackPolicy {
    type Err = DialogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(FallbackPolicy::Permissive),
            "strict" => Ok(FallbackPolicy::Strict),
            other => Err(DialogError::InvalidGraph(format!(
                "unknown fallback policy: {other}"
            ))),
        }
    }
}

/// Result of one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub next_state: StateId,
    pub context: SessionContext,
    /// Arguments for the renderer of `next_state`'s template.
    pub render_args: SessionContext,
}

impl Turn {
    fn new(next_state: StateId, context: SessionContext) -> Self {
        Self {
            render_args: context.clone(),
            next_state,
            context,
        }
    }
}

/// One turn as received from a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub current_state: String,
    pub input: String,
    #[serde(default)]
    pub context: SessionContext,
}

/// Stateless dialogue engine over a shared graph and retrieval engine.
#[derive(Clone)]
pub struct DialogueOrchestrator {
    graph: Arc<ConversationGraph>,
    retrieval: Arc<RetrievalEngine>,
    sink: Arc<dyn CompletionSink>,
    policy: FallbackPolicy,
    summary_limit: usize,
    sink_timeout: Duration,
}

impl DialogueOrchestrator {
    pub fn new(
        graph: Arc<ConversationGraph>,
        retrieval: Arc<RetrievalEngine>,
        sink: Arc<dyn CompletionSink>,
    ) -> Self {
        Self {
            graph,
            retrieval,
            sink,
            policy: FallbackPolicy::default(),
            summary_limit: DEFAULT_SUMMARY_LIMIT,
            sink_timeout: DEFAULT_SINK_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Maximum summary length, in characters, of completion events.
    pub fn with_summary_limit(mut self, max_chars: usize) -> Self {
        self.summary_limit = max_chars;
        self
    }

    /// Upper bound on one completion sink call. A slow sink is abandoned
    /// and the turn completes without it.
    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = timeout;
        self
    }

    pub fn graph(&self) -> &ConversationGraph {
        &self.graph
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Advance the conversation by one turn.
    ///
    /// An unknown `current_state` is replaced by the initial state and the
    /// input is processed there. Failed validation returns the same state and
    /// the context untouched. The only error is a retrieval failure in the
    /// knowledge-query state.
    pub async fn advance(
        &self,
        current_state: &str,
        input: &str,
        mut context: SessionContext,
    ) -> Result<Turn, DialogError> {
        let state = match self.graph.state(current_state) {
            Some(state) => state,
            None => {
                warn!(
                    state = current_state,
                    initial = %self.graph.initial(),
                    "Unknown state, restarting conversation"
                );
                self.graph.initial_state()
            }
        };

        let (next_state, retreated) = if state.id == *self.graph.knowledge_query() {
            let result = self.retrieval.answer(input).await?;
            debug!(score = result.score, confident = result.is_confident(), "Knowledge query answered");
            store_retrieval(&mut context, &result);
            (self.graph.knowledge_response().clone(), false)
        } else {
            if let Some(validator) = &state.validator {
                if !validator.accepts(input) {
                    debug!(state = %state.id, "Input rejected by validator");
                    return Ok(Turn::new(state.id.clone(), context));
                }
            }
            self.resolve(state, input)
        };

        if !retreated {
            if let Some(capture) = &state.capture {
                capture.apply(input, &mut context);
            }
        }

        if let Some(next) = self.graph.state(next_state.as_str()) {
            self.report_completion(next, &context).await;
        }

        debug!(from = %state.id, to = %next_state, "Turn advanced");
        Ok(Turn::new(next_state, context))
    }

    /// Transport entry point for a deserialized turn.
    pub async fn handle(&self, request: TurnRequest) -> Result<Turn, DialogError> {
        self.advance(&request.current_state, &request.input, request.context)
            .await
    }

    fn resolve(&self, state: &ConversationState, input: &str) -> (StateId, bool) {
        match state.transitions.resolve(input) {
            Resolution::Rule(target) => (target.clone(), false),
            Resolution::Retreat(target) => (target.clone(), true),
            Resolution::Advance(target) if self.policy.permits(input) => (target.clone(), false),
            Resolution::Advance(_) | Resolution::Stay => (state.id.clone(), false),
        }
    }

    async fn report_completion(&self, next: &ConversationState, context: &SessionContext) {
        let Some(outcome) = next.completion else {
            return;
        };

        let event = CompletionEvent::new(
            context.get_or_empty(IDENTIFIER_FIELD),
            outcome,
            &summarize(outcome, context),
            self.summary_limit,
        );
        match tokio::time::timeout(self.sink_timeout, self.sink.record(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(outcome = %outcome, error = %e, "Failed to record completion event");
            }
            Err(_) => {
                let e = DialogError::CompletionLog(format!(
                    "sink did not respond within {:?}",
                    self.sink_timeout
                ));
                warn!(outcome = %outcome, error = %e, "Failed to record completion event");
            }
        }
    }
}

fn store_retrieval(context: &mut SessionContext, result: &RetrievalResult) {
    context.insert(KB_ANSWER_FIELD, result.answer.as_str());
    match &result.source {
        Some(source) => context.insert(KB_SOURCE_FIELD, source.as_str()),
        None => {
            context.remove(KB_SOURCE_FIELD);
        }
    }
    context.insert(KB_CONFIDENCE_FIELD, format!("{:.4}", result.score));
}
