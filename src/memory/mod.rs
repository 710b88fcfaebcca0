pub mod cache;
pub mod remote;
pub mod store;
pub mod traits;

pub use cache::MemoryCache;
pub use remote::SupabaseMemory;
pub use store::{MemoryStore, MAX_SHORT_MEMORY_CHARS};
pub use traits::{
    HistoryEntry, MemorySource, RemoteMemory, RemoteWrite, Role, SetOutcome, Sourced,
};

use std::sync::Arc;

use crate::config::RouteConfig;

/// Factory: build the memory store, attaching the Supabase tier when both
/// its URL and key are configured.
pub fn create_memory(config: &RouteConfig) -> MemoryStore {
    let remote: Option<Arc<dyn RemoteMemory>> = if config.remote_store.is_enabled() {
        Some(Arc::new(SupabaseMemory::new(&config.remote_store)))
    } else {
        None
    };
    MemoryStore::new(remote, config.max_conversation_messages)
}

/// Backend label for status output.
pub fn effective_memory_backend_name(store: &MemoryStore) -> String {
    match store.remote_name() {
        Some(remote) => format!("in-process + {remote}"),
        None => "in-process".to_string(),
    }
}
