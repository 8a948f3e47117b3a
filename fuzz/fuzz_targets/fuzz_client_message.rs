#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Client messages are normally only serialized, but a hostile or
    // confused server echoing them back must not be able to break parsing.
    let _ = serde_json::from_slice::<trackline_client::protocol::ClientMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<trackline_client::protocol::ClientMessage>(s);
    }
});
