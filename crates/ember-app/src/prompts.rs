//! Plain-text prompts for the interactive loop, keyed by template name.

use ember_core::SessionContext;
use ember_dialog::orchestrator::{KB_ANSWER_FIELD, KB_SOURCE_FIELD};
use ember_dialog::TemplateRef;

/// Shown when a knowledge question could not be encoded.
pub const RETRIEVAL_UNAVAILABLE: &str =
    "Sorry, I can't look that up right now. Please try asking again.";

/// Render the prompt for `template`, filling in context fields.
pub fn render(template: &TemplateRef, ctx: &SessionContext) -> String {
    let name = template.as_str();
    let name = name.strip_suffix(".jinja").unwrap_or(name);
    let f = |field: &str| ctx.get_or_empty(field).to_string();

    match name {
        "start" => "Welcome to Barbeque Nation!\n\
                    1. Book a table\n2. Modify a booking\n3. Ask a question\n4. Give feedback"
            .to_string(),
        "city_selection" => "Which city?\n1. Bangalore\n2. Delhi".to_string(),
        "location_bangalore" => {
            "Choose an outlet:\n1. Indiranagar\n2. JP Nagar\n3. Electronic City\n4. Koramangala"
                .to_string()
        }
        "location_delhi" => {
            "Choose an outlet:\n1. Connaught Place\n2. Vasant Kunj\n3. Janakpuri".to_string()
        }
        "main_options" => format!(
            "{} ({}). What would you like to do?\n\
             1. New booking\n2. Modify a booking\n3. Ask a question\n4. Give feedback",
            f("location"),
            f("city"),
        ),
        "new_booking" => "Let's book a table. Send anything to continue.".to_string(),
        "collect_date" => "Which date? (DD-MM-YYYY)".to_string(),
        "collect_time" => {
            "Which slot?\n1. Lunch (12:00 PM - 4:00 PM)\n2. Dinner (6:30 PM - 11:00 PM)".to_string()
        }
        "collect_guests" => "How many guests? (1-20)".to_string(),
        "collect_phone" => "Your 10-digit phone number?".to_string(),
        "booking_confirmation" => format!(
            "Booking at {} on {}, {} for {} guests. Phone {}.\n1. Confirm\n2. Start over",
            f("location"),
            f("date"),
            f("time_slot"),
            f("guests"),
            f("phone"),
        ),
        "booking_complete" => "Your table is booked.\n1. Main menu\n2. Exit".to_string(),
        "modify_booking" => "Let's find your booking. Send anything to continue.".to_string(),
        "verify_reference" => "Your 6-character booking reference?".to_string(),
        "modification_options" => format!(
            "Booking {}:\n1. Change date\n2. Change time\n3. Change guests\n4. Cancel booking",
            f("reference"),
        ),
        "cancel_booking" => format!(
            "Cancel booking {}?\n1. Yes, cancel\n2. No, go back",
            f("reference")
        ),
        "cancellation_complete" => {
            "Your booking has been cancelled.\n1. Main menu\n2. Exit".to_string()
        }
        "knowledge_query" => "What would you like to know?".to_string(),
        "knowledge_response" => {
            let mut out = f(KB_ANSWER_FIELD);
            if let Some(source) = ctx.get(KB_SOURCE_FIELD) {
                out.push_str(&format!("\n(Source: {source})"));
            }
            out.push_str("\n1. Ask another question\n2. Main menu");
            out
        }
        "feedback" => "We'd love your feedback. Send anything to continue.".to_string(),
        "collect_ratings" => "Rate your visit from 1 to 5.".to_string(),
        "collect_comments" => "Any comments?".to_string(),
        "feedback_complete" => format!(
            "Thanks for rating us {}/5!\n1. Main menu\n2. Exit",
            f("rating")
        ),
        "end" => "Thank you for calling Barbeque Nation. Goodbye!".to_string(),
        other => format!("[{other}]"),
    }
}
