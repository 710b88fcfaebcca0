pub mod schema;

pub use schema::{
    normalize_username, parse_id_list, AgentModelConfig, BridgeConfig, DeliveryConfig,
    PlatformConfig, RemoteStoreConfig, RouteConfig, MAX_CONVERSATION_MESSAGES_LIMIT,
};
