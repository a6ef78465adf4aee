#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 4096 { return; }
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(cs) = docwire::config::ConnectionString::parse(s) {
            let _ = cs.redacted();
        }
        let _ = docwire::config::parse_options(s);
    }
});
