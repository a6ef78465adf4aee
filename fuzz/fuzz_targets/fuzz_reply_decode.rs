#![no_main]
use docwire::protocol::{MongoOp, ReplyMessage};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 65536 { return; }
    // Decoding arbitrary bytes must fail cleanly, never panic.
    if let Ok(reply) = ReplyMessage::<bson::Document>::from_bytes(data, MongoOp::Query, i32::MAX) {
        for doc in reply.results() {
            let _ = doc;
        }
        let _ = reply.server_error();
    }
});
