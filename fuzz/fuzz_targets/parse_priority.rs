/*
 * fuzz_targets/parse_priority.rs
 *
 * fuzz target for priority parsing. parse_priority must never panic, and
 * anything it accepts must survive a trip through its own name.
 *
 * edge cases: "SC_LP_", "sc_lp_é", "8", "-1", "  info  ", ""
 */

#![no_main]

use libfuzzer_sys::fuzz_target;
use sc_runtime::priority::parse_priority;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = core::str::from_utf8(data) {
        if let Ok(p) = parse_priority(s) {
            assert_eq!(parse_priority(p.name()), Ok(p));
        }
    }
});
