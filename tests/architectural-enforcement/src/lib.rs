//! Architectural Enforcement Integration Tests
//!
//! Source scanners shared by the tests in `tests/`. Each test walks the
//! production sources of the player crates and fails on patterns that break
//! the core's rules:
//! - No sleep() calls; timers use deadlines or intervals
//! - No unwrap()/expect() outside test modules
//!
//! Only production lines are scanned: comments are stripped and everything
//! from the first `#[cfg(test)]` in a file onwards is skipped.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source trees checked by every scanner, relative to the
/// workspace root
pub const PRODUCTION_DIRS: &[&str] = &["player/core/src"];

/// A forbidden pattern found in production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the match
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Workspace root, two levels above this crate
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Code part of each production line, numbered from 1
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim_start().starts_with("#[cfg(test)]") {
            break;
        }
        let code_part = line.split("//").next().unwrap_or(line);
        if !code_part.trim().is_empty() {
            lines.push((idx + 1, code_part));
        }
    }
    lines
}

/// Scan one file's content
pub fn scan_content<F>(path: &Path, content: &str, is_violation: F) -> Vec<Violation>
where
    F: Fn(&str) -> bool,
{
    production_lines(content)
        .into_iter()
        .filter(|(_, code)| is_violation(code))
        .map(|(line, code)| Violation {
            path: path.to_path_buf(),
            line,
            text: code.trim().to_string(),
        })
        .collect()
}

/// Scan every `.rs` file under the production directories
pub fn scan_production<F>(is_violation: F) -> Vec<Violation>
where
    F: Fn(&str) -> bool,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let Ok(content) = fs::read_to_string(entry.path()) else {
                continue;
            };
            violations.extend(scan_content(entry.path(), &content, &is_violation));
        }
    }
    violations
}

/// `tokio::time::sleep(..)`, `thread::sleep(..)` and friends
#[must_use]
pub fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(")
}

/// `.unwrap()` or `.expect(..)`; `unwrap_or*` is fine
#[must_use]
pub fn is_panicking_unwrap(code: &str) -> bool {
    code.contains(".unwrap()") || code.contains(".expect(")
}

/// Print violations and panic when there are any
pub fn report(rule: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {rule}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_detection() {
        assert!(is_sleep_call("    tokio::time::sleep(Duration::from_millis(10)).await;"));
        assert!(is_sleep_call("std::thread::sleep(d);"));
        assert!(!is_sleep_call("tokio::time::sleep_until(deadline).await;"));
        assert!(!is_sleep_call("interval.tick().await;"));
    }

    #[test]
    fn test_unwrap_detection() {
        assert!(is_panicking_unwrap("let x = y.unwrap();"));
        assert!(is_panicking_unwrap("let x = y.expect(\"present\");"));
        assert!(!is_panicking_unwrap("let x = y.unwrap_or_default();"));
        assert!(!is_panicking_unwrap("let x = y.unwrap_or(0);"));
    }

    #[test]
    fn test_comments_and_test_modules_are_skipped() {
        let content = "\
fn run() {
    // tokio::time::sleep(d).await;
    let a = b; // c.unwrap()
}

#[cfg(test)]
mod tests {
    fn helper() { x.unwrap(); }
}
";
        let found = scan_content(Path::new("lib.rs"), content, |c| {
            is_sleep_call(c) || is_panicking_unwrap(c)
        });
        assert!(found.is_empty(), "{found:?}");
    }

    #[test]
    fn test_violation_reports_line_number() {
        let content = "fn a() {}\nfn b() { std::thread::sleep(d); }\n";
        let found = scan_content(Path::new("x.rs"), content, is_sleep_call);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 2);
        assert_eq!(found[0].to_string(), "x.rs:2 - fn b() { std::thread::sleep(d); }");
    }
}
