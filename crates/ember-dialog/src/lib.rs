//! Dialogue orchestration for Ember.
//!
//! A declarative conversation graph (states, transition tables, input
//! validators, field captures) and a stateless orchestrator that advances a
//! caller-owned conversation by one turn, delegating free-text questions to
//! the retrieval engine and reporting completed flows to a completion sink.

pub mod capture;
pub mod completion;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod restaurant;
pub mod validator;

pub use capture::{ChoiceOption, FieldCapture};
pub use completion::{CompletionSink, JsonLinesSink, MemorySink, TracingSink};
pub use error::DialogError;
pub use graph::{
    ConversationGraph, ConversationState, GraphDefinition, Resolution, StateId, TemplateRef,
    TransitionTable,
};
pub use orchestrator::{DialogueOrchestrator, FallbackPolicy, Turn, TurnRequest};
pub use validator::InputValidator;
