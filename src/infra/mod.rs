pub mod dead_letter;
pub mod traits;

pub use dead_letter::JsonlDeadLetterSink;
pub use traits::{DeadLetter, DeadLetterSink};

use std::sync::Arc;

use crate::config::RouteConfig;

pub fn create_dead_letter_sink(config: &RouteConfig) -> Arc<dyn DeadLetterSink> {
    Arc::new(JsonlDeadLetterSink::new(config.dead_letter_path.clone()))
}
