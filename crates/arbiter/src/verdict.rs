//! Result evaluation
//!
//! Rules apply in order:
//!
//! 1. the run timed out: [`Verdict::Timeout`]
//! 2. compilation failed: [`Verdict::CompileError`]
//! 3. non-zero exit: [`Verdict::RuntimeError`]
//! 4. no expected output: [`Verdict::Correct`]
//! 5. stdout equals the expected output after trimming leading and trailing
//!    whitespace from both: [`Verdict::Correct`], otherwise
//!    [`Verdict::Incorrect`]
//!
//! Internal whitespace is significant, and substrings never match.

use crate::types::{ExecutionResult, Verdict};

pub fn evaluate(result: &ExecutionResult, expected: Option<&str>) -> Verdict {
    if result.timed_out {
        return Verdict::Timeout;
    }
    if result.compile_failed() {
        return Verdict::CompileError;
    }
    if result.exit_code != 0 {
        return Verdict::RuntimeError;
    }
    let Some(expected) = expected else {
        return Verdict::Correct;
    };

    if output_matches(&result.stdout, expected) {
        Verdict::Correct
    } else {
        Verdict::Incorrect
    }
}

fn output_matches(stdout: &[u8], expected: &str) -> bool {
    // Non-UTF-8 output can never equal a string
    match std::str::from_utf8(stdout) {
        Ok(stdout) => stdout.trim() == expected.trim(),
        Err(_) => false,
    }
}
