/*
 * fuzz_targets/trace_config.rs
 *
 * fuzz target for the SC_TRACE_FILE / SC_TRACE_LP pair. Input is split at
 * the first NUL into file prefix and priority. from_values and path_for
 * must never panic.
 */

#![no_main]

use libfuzzer_sys::fuzz_target;
use sc_runtime::config::TraceConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = core::str::from_utf8(data) else {
        return;
    };
    let (file, priority) = s.split_once('\0').unwrap_or((s, ""));
    if let Ok(cfg) = TraceConfig::from_values(Some(file), Some(priority)) {
        let _ = cfg.path_for(-1);
        let _ = cfg.path_for(i32::MAX);
    }
});
