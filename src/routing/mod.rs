//! Message routing: agent identity, conversation keys, and the should-handle gate.

pub mod gate;
pub mod traits;

pub use gate::{mentions_bot, is_reply_to_bot, MentionGate, IGNORE_MENTION_REQUIRED};
pub use traits::{AgentName, ChatType, ConversationKey, GateDecision, HandleGate};

/// Create the default handle gate.
pub fn create_gate() -> Box<dyn HandleGate> {
    Box::new(MentionGate)
}
