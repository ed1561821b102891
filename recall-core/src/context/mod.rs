//! Conversation context types.
//!
//! Provides the message/role vocabulary shared by the LLM port and the
//! conversation-history normalization step at the front of a query.

mod types;

pub use types::{extract_question, Message, Role};
