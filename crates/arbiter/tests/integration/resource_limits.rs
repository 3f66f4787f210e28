use std::time::{Duration, Instant};

use arbiter::{LimitExceeded, Verdict};

use super::{fixture_source, request, test_executor};

#[tokio::test]
#[ignore = "requires root"]
async fn test_cpu_bound_loop_times_out() {
    let executor = test_executor().await;

    let (result, verdict) = executor
        .run(request("python", fixture_source("infinite_loop.py")).into())
        .await
        .expect("Execution failed");

    assert_eq!(verdict, Verdict::Timeout);
    assert!(result.timed_out);
    assert!(matches!(
        result.limit_exceeded,
        LimitExceeded::CpuTime | LimitExceeded::WallTime
    ));
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_sleeping_program_hits_wall_clock() {
    let executor = test_executor().await;
    let started = Instant::now();

    let (result, verdict) = executor
        .run(request("python", fixture_source("sleep_forever.py")).into())
        .await
        .expect("Execution failed");

    assert_eq!(verdict, Verdict::Timeout);
    assert_eq!(result.stdout, b"started\n");
    // wall_time + extra_time + grace with room for init and cleanup
    assert!(started.elapsed() < Duration::from_secs(15));
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_memory_hog_is_stopped() {
    let executor = test_executor().await;

    let (result, verdict) = executor
        .run(request("cpp", fixture_source("memory_hog.cpp")).into())
        .await
        .expect("Execution failed");

    assert_eq!(verdict, Verdict::RuntimeError);
    assert_ne!(result.exit_code, 0);
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_fork_is_refused() {
    let executor = test_executor().await;

    let response = executor
        .execute(request("python", fixture_source("fork_bomb.py")))
        .await
        .expect("Execution failed");

    assert_eq!(response.verdict, Verdict::RuntimeError);
    assert_eq!(response.stdout.trim(), "fork refused");
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_output_is_capped() {
    let executor = test_executor().await;

    let (result, _) = executor
        .run(request("python", fixture_source("flood.py")).into())
        .await
        .expect("Execution failed");

    assert!(result.stdout.len() <= arbiter::Config::default().engine.max_output_bytes);
    assert!(!result.stdout.is_empty());
}
