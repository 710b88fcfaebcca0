#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Some(command) = agent_router::auto_reply::parse_command(s) {
            assert!(!command.name.contains(' '));
            assert!(!command.name.contains('@'));
        }
        let _ = agent_router::auto_reply::strip_bot_mentions(s);
    }
});
