use std::path::Path;

use arbiter::Verdict;

use super::{fixture_source, request, test_executor};

#[tokio::test]
#[ignore = "requires root"]
async fn test_host_files_are_not_readable() {
    let executor = test_executor().await;

    let response = executor
        .execute(request("python", fixture_source("read_host_file.py")))
        .await
        .expect("Execution failed");

    assert_eq!(response.verdict, Verdict::RuntimeError);
    assert!(response.stdout.starts_with("denied"));
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_network_is_unreachable() {
    let executor = test_executor().await;

    let response = executor
        .execute(request("python", fixture_source("connect_out.py")))
        .await
        .expect("Execution failed");

    assert_eq!(response.verdict, Verdict::RuntimeError);
    assert_eq!(response.stdout.trim(), "unreachable");
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_writes_stay_inside_the_sandbox() {
    let escape = Path::new("/tmp/arbiter-escape");
    let _ = std::fs::remove_file(escape);
    let executor = test_executor().await;

    executor
        .execute(request("python", fixture_source("write_outside.py")))
        .await
        .expect("Execution failed");

    assert!(!escape.exists());
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_files_do_not_leak_between_requests() {
    let executor = test_executor().await;

    let write = "open('leftover.txt', 'w').write('secret')\nprint('ok')";
    let response = executor
        .execute(request("python", write))
        .await
        .expect("Execution failed");
    assert_eq!(response.verdict, Verdict::Correct);

    let read = "import os\nprint(os.path.exists('leftover.txt'))";
    let response = executor
        .execute(request("python", read))
        .await
        .expect("Execution failed");
    assert_eq!(response.stdout, "False\n");
}
