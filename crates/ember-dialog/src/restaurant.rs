//! The restaurant booking, modification, feedback and question-answering
//! conversation.

use ember_core::Outcome;

use crate::capture::FieldCapture;
use crate::error::DialogError;
use crate::graph::{ConversationGraph, ConversationState, GraphDefinition, TransitionTable};
use crate::validator::InputValidator;

pub const INITIAL_STATE: &str = "start";
pub const MAIN_OPTIONS: &str = "main_options";
pub const KNOWLEDGE_QUERY: &str = "knowledge_query";
pub const KNOWLEDGE_RESPONSE: &str = "knowledge_response";
pub const END_STATE: &str = "end";

pub const CITIES: &[&str] = &["Bangalore", "Delhi"];
pub const BANGALORE_LOCATIONS: &[&str] =
    &["Indiranagar", "JP Nagar", "Electronic City", "Koramangala"];
pub const DELHI_LOCATIONS: &[&str] = &["Connaught Place", "Vasant Kunj", "Janakpuri"];
pub const TIME_SLOTS: &[&str] = &["Lunch (12:00 PM - 4:00 PM)", "Dinner (6:30 PM - 11:00 PM)"];

/// A numbered menu whose every entry leads to `target`.
fn menu_to(count: usize, target: &str) -> TransitionTable {
    (1..=count).fold(TransitionTable::new(), |table, n| table.on(n.to_string(), target))
}

/// A completion state: "1" restarts, "2" ends.
fn completion(id: &str, template: &str, outcome: Outcome) -> ConversationState {
    ConversationState::new(id, template)
        .transitions(
            TransitionTable::new()
                .on("1", INITIAL_STATE)
                .on("2", END_STATE)
                .retreat_to(MAIN_OPTIONS),
        )
        .completes(outcome)
}

/// Free-text step: any input advances, "back" retreats.
fn step(id: &str, template: &str, next: &str, back: &str) -> ConversationState {
    ConversationState::new(id, template)
        .transitions(TransitionTable::new().advance_to(next).retreat_to(back))
}

/// The full restaurant definition, before validation.
pub fn restaurant_definition() -> GraphDefinition {
    let states = vec![
        ConversationState::new(INITIAL_STATE, "start.jinja").transitions(
            TransitionTable::new()
                .on("1", "collect_city")
                .on("2", "collect_city")
                .on("3", KNOWLEDGE_QUERY)
                .on("4", "feedback"),
        ),
        ConversationState::new("collect_city", "city_selection.jinja")
            .transitions(
                TransitionTable::new()
                    .on("1", "collect_location_bangalore")
                    .on("2", "collect_location_delhi")
                    .retreat_to(INITIAL_STATE),
            )
            .capture(FieldCapture::numbered("city", CITIES)),
        ConversationState::new("collect_location_bangalore", "location_bangalore.jinja")
            .transitions(menu_to(BANGALORE_LOCATIONS.len(), MAIN_OPTIONS).retreat_to("collect_city"))
            .capture(FieldCapture::numbered("location", BANGALORE_LOCATIONS)),
        ConversationState::new("collect_location_delhi", "location_delhi.jinja")
            .transitions(menu_to(DELHI_LOCATIONS.len(), MAIN_OPTIONS).retreat_to("collect_city"))
            .capture(FieldCapture::numbered("location", DELHI_LOCATIONS)),
        ConversationState::new(MAIN_OPTIONS, "main_options.jinja").transitions(
            TransitionTable::new()
                .on("1", "new_booking")
                .on("2", "modify_booking")
                .on("3", KNOWLEDGE_QUERY)
                .on("4", "feedback")
                .retreat_to("collect_city"),
        ),
        // Booking
        step("new_booking", "new_booking.jinja", "collect_date", MAIN_OPTIONS),
        step("collect_date", "collect_date.jinja", "collect_time", "new_booking")
            .validator(InputValidator::DatePattern)
            .capture(FieldCapture::verbatim("date")),
        ConversationState::new("collect_time", "collect_time.jinja")
            .transitions(menu_to(TIME_SLOTS.len(), "collect_guests").retreat_to("collect_date"))
            .capture(FieldCapture::numbered("time_slot", TIME_SLOTS)),
        step("collect_guests", "collect_guests.jinja", "collect_phone", "collect_time")
            .validator(InputValidator::IntRange { min: 1, max: 20 })
            .capture(FieldCapture::verbatim("guests")),
        step("collect_phone", "collect_phone.jinja", "booking_confirmation", "collect_guests")
            .validator(InputValidator::FixedLengthDigits { len: 10 })
            .capture(FieldCapture::verbatim("phone")),
        ConversationState::new("booking_confirmation", "booking_confirmation.jinja").transitions(
            TransitionTable::new()
                .on("1", "booking_complete")
                .on("2", "new_booking")
                .retreat_to("collect_phone"),
        ),
        completion("booking_complete", "booking_complete.jinja", Outcome::NewBooking),
        // Modification
        step("modify_booking", "modify_booking.jinja", "verify_reference", MAIN_OPTIONS),
        step("verify_reference", "verify_reference.jinja", "modification_options", "modify_booking")
            .validator(InputValidator::AlnumPattern { len: 6 })
            .capture(FieldCapture::verbatim("reference")),
        ConversationState::new("modification_options", "modification_options.jinja").transitions(
            TransitionTable::new()
                .on("1", "collect_date")
                .on("2", "collect_time")
                .on("3", "collect_guests")
                .on("4", "cancel_booking")
                .retreat_to("verify_reference"),
        ),
        ConversationState::new("cancel_booking", "cancel_booking.jinja").transitions(
            TransitionTable::new()
                .on("1", "cancellation_complete")
                .on("2", "modification_options")
                .retreat_to("modification_options"),
        ),
        completion(
            "cancellation_complete",
            "cancellation_complete.jinja",
            Outcome::Cancellation,
        ),
        // Questions
        step(KNOWLEDGE_QUERY, "knowledge_query.jinja", KNOWLEDGE_RESPONSE, MAIN_OPTIONS),
        ConversationState::new(KNOWLEDGE_RESPONSE, "knowledge_response.jinja").transitions(
            TransitionTable::new()
                .on("1", KNOWLEDGE_QUERY)
                .on("2", MAIN_OPTIONS)
                .retreat_to(KNOWLEDGE_QUERY),
        ),
        // Feedback
        step("feedback", "feedback.jinja", "collect_ratings", MAIN_OPTIONS),
        step("collect_ratings", "collect_ratings.jinja", "collect_comments", "feedback")
            .validator(InputValidator::IntRange { min: 1, max: 5 })
            .capture(FieldCapture::verbatim("rating")),
        step("collect_comments", "collect_comments.jinja", "feedback_complete", "collect_ratings")
            .capture(FieldCapture::verbatim("comments")),
        completion("feedback_complete", "feedback_complete.jinja", Outcome::Feedback),
        ConversationState::new(END_STATE, "end.jinja"),
    ];

    GraphDefinition {
        initial: INITIAL_STATE.into(),
        knowledge_query: KNOWLEDGE_QUERY.into(),
        knowledge_response: KNOWLEDGE_RESPONSE.into(),
        states,
    }
}

impl ConversationGraph {
    /// The restaurant conversation, validated.
    pub fn restaurant() -> Result<Self, DialogError> {
        Self::new(restaurant_definition())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Resolution;

    #[test]
    fn test_restaurant_graph_is_valid() {
        let graph = ConversationGraph::restaurant().unwrap();
        assert_eq!(graph.len(), 24);
        assert_eq!(graph.initial().as_str(), INITIAL_STATE);
        assert_eq!(
            graph.terminal_states().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec![END_STATE]
        );
    }

    #[test]
    fn test_every_inner_state_can_retreat() {
        let graph = ConversationGraph::restaurant().unwrap();
        for state in graph.states() {
            if state.is_terminal() || state.id == INITIAL_STATE {
                continue;
            }
            assert!(
                state.transitions.retreat.is_some(),
                "{} has no retreat edge",
                state.id
            );
        }
    }

    #[test]
    fn test_flows_reconverge_at_main_options() {
        let graph = ConversationGraph::restaurant().unwrap();
        let preds = graph.predecessors(MAIN_OPTIONS);
        for from in [
            "collect_location_bangalore",
            "collect_location_delhi",
            "new_booking",
            "modify_booking",
            KNOWLEDGE_QUERY,
            KNOWLEDGE_RESPONSE,
            "feedback",
        ] {
            assert!(preds.iter().any(|p| *p == from), "{from} does not reach main_options");
        }
    }

    #[test]
    fn test_completion_states() {
        let graph = ConversationGraph::restaurant().unwrap();
        let mut completions: Vec<_> = graph
            .completion_states()
            .map(|(id, outcome)| (id.as_str(), outcome.tag()))
            .collect();
        completions.sort();
        assert_eq!(
            completions,
            vec![
                ("booking_complete", "new_booking"),
                ("cancellation_complete", "cancellation"),
                ("feedback_complete", "feedback"),
            ]
        );
    }

    #[test]
    fn test_validators_attached() {
        let graph = ConversationGraph::restaurant().unwrap();
        let phone = graph.state("collect_phone").unwrap();
        let validator = phone.validator.as_ref().unwrap();
        assert!(validator.accepts("9876543210"));
        assert!(!validator.accepts("12345"));

        let reference = graph.state("verify_reference").unwrap();
        assert!(reference.validator.as_ref().unwrap().accepts("AB12CD"));
        assert!(graph.state("collect_comments").unwrap().validator.is_none());
    }

    #[test]
    fn test_location_menus_match_choices() {
        let graph = ConversationGraph::restaurant().unwrap();
        let delhi = graph.transitions_of("collect_location_delhi").unwrap();
        assert!(matches!(delhi.resolve("3"), Resolution::Rule(t) if *t == MAIN_OPTIONS));
        assert_eq!(delhi.resolve("4"), Resolution::Stay);
    }

    #[test]
    fn test_templates_follow_state_names() {
        let graph = ConversationGraph::restaurant().unwrap();
        assert_eq!(graph.template_of("collect_city").unwrap().as_str(), "city_selection.jinja");
        assert_eq!(graph.template_of(END_STATE).unwrap().as_str(), "end.jinja");
    }
}
