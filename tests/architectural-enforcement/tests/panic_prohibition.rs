//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code propagates errors or logs them; it MUST NOT
//! call `unwrap()` or `expect()`. Test modules are exempt.

use architectural_enforcement::{is_panicking_unwrap, report, scan_production};

#[test]
fn test_no_unwrap_in_production_code() {
    let violations = scan_production(is_panicking_unwrap);
    report("unwrap()/expect() found in production code!", &violations);
}
