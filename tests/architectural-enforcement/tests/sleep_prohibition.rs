//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. One-shot timers
//! wait on a deadline (`tokio::time::sleep_until`); periodic work uses
//! `tokio::time::interval`, so a cancelled timer never wakes a task.

use architectural_enforcement::{is_sleep_call, report, scan_production};

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan_production(is_sleep_call);
    report("Sleep calls found in production code!", &violations);
}
