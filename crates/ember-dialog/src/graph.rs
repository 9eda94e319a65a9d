//! Declarative conversation graph.
//!
//! A graph is a table of states. Each state names a render template, a
//! transition table, and optionally an input validator, a field capture, and
//! a completion outcome. The graph is validated once when built and is
//! read-only afterwards.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use ember_core::Outcome;

use crate::capture::FieldCapture;
use crate::error::DialogError;
use crate::validator::InputValidator;

/// Reserved token meaning "go back", matched case-insensitively.
pub const RETREAT_TOKEN: &str = "back";

/// Identifier of a conversation state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(String);

impl StateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StateId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl PartialEq<str> for StateId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StateId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Opaque reference to a render template, interpreted only by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateRef(String);

impl TemplateRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `token -> target` rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub token: String,
    pub target: StateId,
}

/// How a transition table classified an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Exact token match.
    Rule(&'a StateId),
    /// The retreat token.
    Retreat(&'a StateId),
    /// Caught by the generic advance rule.
    Advance(&'a StateId),
    /// Nothing matched; re-prompt.
    Stay,
}

/// Ordered token rules plus optional advance and retreat targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionTable {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<TransitionRule>,
    /// Target for any input that is neither a rule token nor the retreat token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advance: Option<StateId>,
    /// Target for the retreat token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retreat: Option<StateId>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, token: impl Into<String>, target: impl Into<StateId>) -> Self {
        self.rules.push(TransitionRule {
            token: token.into(),
            target: target.into(),
        });
        self
    }

    pub fn advance_to(mut self, target: impl Into<StateId>) -> Self {
        self.advance = Some(target.into());
        self
    }

    pub fn retreat_to(mut self, target: impl Into<StateId>) -> Self {
        self.retreat = Some(target.into());
        self
    }

    /// Classify `input`.
    ///
    /// Rule tokens are compared case-sensitively and win over everything
    /// else. The retreat token never falls through to the advance rule, even
    /// in a state without a retreat target.
    pub fn resolve(&self, input: &str) -> Resolution<'_> {
        if let Some(rule) = self.rules.iter().find(|r| r.token == input) {
            return Resolution::Rule(&rule.target);
        }
        if input.eq_ignore_ascii_case(RETREAT_TOKEN) {
            return match &self.retreat {
                Some(target) => Resolution::Retreat(target),
                None => Resolution::Stay,
            };
        }
        match &self.advance {
            Some(target) => Resolution::Advance(target),
            None => Resolution::Stay,
        }
    }

    /// Every state this table can lead to.
    pub fn targets(&self) -> impl Iterator<Item = &StateId> {
        self.rules
            .iter()
            .map(|r| &r.target)
            .chain(self.advance.iter())
            .chain(self.retreat.iter())
    }

    /// A terminal state's table has no outgoing transitions.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.advance.is_none() && self.retreat.is_none()
    }
}

/// A named point in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: StateId,
    pub template: TemplateRef,
    #[serde(default)]
    pub transitions: TransitionTable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<InputValidator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<FieldCapture>,
    /// Entering this state completes a flow with the given outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<Outcome>,
}

impl ConversationState {
    pub fn new(id: impl Into<StateId>, template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            template: TemplateRef::new(template),
            transitions: TransitionTable::default(),
            validator: None,
            capture: None,
            completion: None,
        }
    }

    pub fn transitions(mut self, transitions: TransitionTable) -> Self {
        self.transitions = transitions;
        self
    }

    pub fn validator(mut self, validator: InputValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn capture(mut self, capture: FieldCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn completes(mut self, outcome: Outcome) -> Self {
        self.completion = Some(outcome);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Serializable description of a conversation graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub initial: StateId,
    /// State whose input is answered by retrieval instead of the table.
    pub knowledge_query: StateId,
    /// State entered after every knowledge query.
    pub knowledge_response: StateId,
    pub states: Vec<ConversationState>,
}

/// A validated, read-only conversation graph.
#[derive(Debug, Clone)]
pub struct ConversationGraph {
    definition: GraphDefinition,
    positions: HashMap<StateId, usize>,
}

impl ConversationGraph {
    /// Validate `definition` and index its states.
    ///
    /// Fails on duplicate state ids, a missing initial or knowledge state, a
    /// transition to an undefined state, or the absence of a terminal state.
    pub fn new(definition: GraphDefinition) -> Result<Self, DialogError> {
        let mut positions = HashMap::with_capacity(definition.states.len());
        for (position, state) in definition.states.iter().enumerate() {
            if positions.insert(state.id.clone(), position).is_some() {
                return Err(DialogError::InvalidGraph(format!(
                    "duplicate state {}",
                    state.id
                )));
            }
        }

        if !positions.contains_key(&definition.initial) {
            return Err(DialogError::MissingInitialState(
                definition.initial.to_string(),
            ));
        }
        for special in [&definition.knowledge_query, &definition.knowledge_response] {
            if !positions.contains_key(special) {
                return Err(DialogError::InvalidGraph(format!(
                    "knowledge state {} is not defined",
                    special
                )));
            }
        }

        for state in &definition.states {
            if let Some(target) = state
                .transitions
                .targets()
                .find(|t| !positions.contains_key(*t))
            {
                return Err(DialogError::DanglingTransition {
                    from: state.id.to_string(),
                    to: target.to_string(),
                });
            }
        }

        if !definition.states.iter().any(ConversationState::is_terminal) {
            return Err(DialogError::NoTerminalState);
        }

        Ok(Self {
            definition,
            positions,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, DialogError> {
        let definition: GraphDefinition =
            serde_json::from_str(json).map_err(|e| DialogError::InvalidGraph(e.to_string()))?;
        Self::new(definition)
    }

    pub fn to_json(&self) -> Result<String, DialogError> {
        serde_json::to_string_pretty(&self.definition)
            .map_err(|e| DialogError::InvalidGraph(e.to_string()))
    }

    pub fn state(&self, id: &str) -> Option<&ConversationState> {
        self.positions
            .get(id)
            .map(|&position| &self.definition.states[position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn template_of(&self, id: &str) -> Result<&TemplateRef, DialogError> {
        self.state(id)
            .map(|s| &s.template)
            .ok_or_else(|| DialogError::UnknownState(id.to_string()))
    }

    pub fn transitions_of(&self, id: &str) -> Result<&TransitionTable, DialogError> {
        self.state(id)
            .map(|s| &s.transitions)
            .ok_or_else(|| DialogError::UnknownState(id.to_string()))
    }

    pub fn initial(&self) -> &StateId {
        &self.definition.initial
    }

    pub fn initial_state(&self) -> &ConversationState {
        &self.definition.states[self.positions[&self.definition.initial]]
    }

    pub fn knowledge_query(&self) -> &StateId {
        &self.definition.knowledge_query
    }

    pub fn knowledge_response(&self) -> &StateId {
        &self.definition.knowledge_response
    }

    /// States in definition order.
    pub fn states(&self) -> &[ConversationState] {
        &self.definition.states
    }

    pub fn completion_states(&self) -> impl Iterator<Item = (&StateId, Outcome)> {
        self.definition
            .states
            .iter()
            .filter_map(|s| s.completion.map(|outcome| (&s.id, outcome)))
    }

    pub fn terminal_states(&self) -> impl Iterator<Item = &StateId> {
        self.definition
            .states
            .iter()
            .filter(|s| s.is_terminal())
            .map(|s| &s.id)
    }

    /// States that can reach `target` in one transition.
    pub fn predecessors(&self, target: &str) -> HashSet<&StateId> {
        self.definition
            .states
            .iter()
            .filter(|s| s.transitions.targets().any(|t| t == target))
            .map(|s| &s.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definition.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definition.states.is_empty()
    }
}
