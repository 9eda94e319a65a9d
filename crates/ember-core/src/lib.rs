pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::EmberConfig;
pub use error::{EmberError, Result};
pub use events::{CompletionEvent, Outcome};
pub use types::SessionContext;
