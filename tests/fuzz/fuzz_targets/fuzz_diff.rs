#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Diff parser must not panic on any input, and whatever it accepts must
    // group without panicking either.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(added) = prcov::diff::parse_diff(s) {
            for lines in added.values() {
                let _ = prcov::groups::compute_contiguous_groups(
                    lines,
                    &Default::default(),
                    &Default::default(),
                    prcov::groups::MAX_ANNOTATION_GAP,
                );
            }
        }
    }
});
