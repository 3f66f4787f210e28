use arbiter::{ErrorKind, ExecuteError, ExecuteRequest, Verdict};

use super::{fixture_source, request, test_executor};

#[tokio::test]
#[ignore = "requires root"]
async fn test_python_prints_without_expected_output() {
    let executor = test_executor().await;

    let response = executor
        .execute(request("python", "print('hi')"))
        .await
        .expect("Execution failed");

    assert_eq!(response.verdict, Verdict::Correct);
    assert_eq!(response.stdout, "hi\n");
    assert!(response.stderr.is_empty());
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_python_matches_trimmed_expected_output() {
    let executor = test_executor().await;

    let response = executor
        .execute(ExecuteRequest {
            expected_output: Some("hi".to_owned()),
            ..request("python", fixture_source("hello.py"))
        })
        .await
        .expect("Execution failed");

    assert_eq!(response.verdict, Verdict::Correct);
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_python_wrong_answer() {
    let executor = test_executor().await;

    let response = executor
        .execute(ExecuteRequest {
            expected_output: Some("bye".to_owned()),
            ..request("python", "print('hi')")
        })
        .await
        .expect("Execution failed");

    assert_eq!(response.verdict, Verdict::Incorrect);
    assert_eq!(response.stdout, "hi\n");
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_python_reads_stdin() {
    let executor = test_executor().await;

    let response = executor
        .execute(ExecuteRequest {
            stdin: Some("abc\ndef\n".to_owned()),
            expected_output: Some("ABC\nDEF".to_owned()),
            ..request("python", fixture_source("echo.py"))
        })
        .await
        .expect("Execution failed");

    assert_eq!(response.verdict, Verdict::Correct);
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_cpp_hello_world() {
    let executor = test_executor().await;

    let response = executor
        .execute(ExecuteRequest {
            expected_output: Some("Hello, World!".to_owned()),
            ..request("cpp", fixture_source("hello.cpp"))
        })
        .await
        .expect("Execution failed");

    assert_eq!(response.verdict, Verdict::Correct);
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_cpp_nonzero_exit_is_runtime_error() {
    let executor = test_executor().await;

    let (result, verdict) = executor
        .run(request("cpp", "int main(){return 1;}").into())
        .await
        .expect("Execution failed");

    assert_eq!(verdict, Verdict::RuntimeError);
    assert_eq!(result.exit_code, 1);
    assert!(!result.compile_failed());
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_cpp_invalid_source_is_compile_error() {
    let executor = test_executor().await;

    let response = executor
        .execute(request("cpp", "invalid syntax"))
        .await
        .expect("Execution failed");

    assert_eq!(response.verdict, Verdict::CompileError);
    assert!(!response.stderr.is_empty());
    assert!(response.stdout.is_empty());
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_c_sums_input() {
    let executor = test_executor().await;

    let response = executor
        .execute(ExecuteRequest {
            stdin: Some("2 40\n".to_owned()),
            expected_output: Some("42".to_owned()),
            ..request("c", fixture_source("sum.c"))
        })
        .await
        .expect("Execution failed");

    assert_eq!(response.verdict, Verdict::Correct);
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_c_segfault_is_runtime_error() {
    let executor = test_executor().await;

    let (result, verdict) = executor
        .run(request("c", fixture_source("segfault.c")).into())
        .await
        .expect("Execution failed");

    assert_eq!(verdict, Verdict::RuntimeError);
    assert_eq!(result.signal, Some(11));
    assert_eq!(result.exit_code, 128 + 11);
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_unregistered_language_never_provisions() {
    let executor = test_executor().await;

    let err = executor
        .execute(request("rb", "puts 'hi'"))
        .await
        .expect_err("rb is not registered");

    assert!(matches!(err, ExecuteError::UnsupportedLanguage(_)));
    assert_eq!(err.kind(), ErrorKind::UnsupportedLanguage);
    assert_eq!(executor.provisioner().ledger().acquired(), 0);
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_concurrent_requests_share_the_pool() {
    let executor = test_executor().await;

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .execute(ExecuteRequest {
                        expected_output: Some(i.to_string()),
                        ..request("python", format!("print({i})"))
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        let response = task.await.unwrap().expect("Execution failed");
        assert_eq!(response.verdict, Verdict::Correct);
    }

    let ledger = executor.provisioner().ledger();
    assert_eq!(ledger.acquired(), 8);
    assert_eq!(ledger.live(), 0);
}
