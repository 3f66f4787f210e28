//! Integration tests for arbiter
//!
//! These tests require the isolate binary to be installed and accessible.
//! Run with: cargo test -p arbiter --features integration-tests
//!
//! Tests that require root are marked `#[ignore]`. To include them:
//!    cargo test -p arbiter --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};

use arbiter::{Config, ExecuteRequest, Executor};

mod config_loading;
mod execution;
mod isolation;
mod meta_file_fixtures;
mod resource_limits;
mod sandbox_lifecycle;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Boxes each test config owns
const BOXES_PER_TEST: u32 = 4;

/// Next unclaimed box id; starts well above the embedded config's range
static NEXT_BOX: AtomicU32 = AtomicU32::new(100);

/// Claim a box range no other caller in this binary gets
fn next_box_range() -> std::ops::Range<u32> {
    let first = NEXT_BOX.fetch_add(BOXES_PER_TEST, Ordering::Relaxed);
    first..first + BOXES_PER_TEST
}

/// Embedded config on a box range no other test in this binary uses.
///
/// Tests run in parallel and `Executor::start` sweeps its whole range, so a
/// shared range would let one test clean up boxes another is running in.
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    let range = next_box_range();
    config.pool.first_box_id = range.start;
    config.pool.max_sandboxes = range.len() as u32;
    if config.cgroup {
        match arbiter::prepare_cgroup(&config.cg_root) {
            Ok(true) => {}              // cgroups ready
            _ => config.cgroup = false, // not available, fall back
        }
    }
    config
}

pub(crate) async fn test_executor() -> Executor {
    Executor::start(test_config()).await
}

#[test]
fn test_box_ranges_are_disjoint() {
    let ranges: Vec<_> = (0..8).map(|_| next_box_range()).collect();

    for (i, a) in ranges.iter().enumerate() {
        assert!(a.start >= 100);
        assert_eq!(a.len() as u32, BOXES_PER_TEST);
        for b in &ranges[i + 1..] {
            assert!(a.end <= b.start || b.end <= a.start, "{a:?} overlaps {b:?}");
        }
    }
}

pub(crate) fn request(language: &str, source_code: impl Into<String>) -> ExecuteRequest {
    ExecuteRequest {
        language: language.to_owned(),
        source_code: source_code.into(),
        stdin: None,
        expected_output: None,
    }
}
