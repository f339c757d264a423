#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Report parser must not panic on any input.
    let _ = prcov::parsers::coveragepy::parse(data);
});
