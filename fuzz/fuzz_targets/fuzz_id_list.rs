#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let users = agent_router::config::parse_id_list(s, false);
        assert!(users.iter().all(|id| *id >= 0));
        let chats = agent_router::config::parse_id_list(s, true);
        assert!(chats.len() >= users.len());
    }
});
