use arbiter::{BoxPool, LanguageRegistry, Provisioner, Sandbox, SandboxError, sweep};

use super::test_config;

fn pool_and_registry() -> (BoxPool, LanguageRegistry) {
    let config = test_config();
    (BoxPool::from_config(&config), LanguageRegistry::from_config(&config))
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_acquire_write_and_release() {
    let (pool, registry) = pool_and_registry();
    let spec = registry.resolve("python").unwrap();

    let mut sandbox = pool.acquire(&spec).await.expect("Failed to acquire box");
    assert!(sandbox.is_alive());
    assert!(sandbox.workdir().is_dir());
    assert!(pool.box_ids().contains(&sandbox.id()));

    sandbox
        .write_file("test.txt", b"Hello, World!")
        .await
        .expect("Failed to write file");
    let on_host = std::fs::read(sandbox.workdir().join("test.txt")).unwrap();
    assert_eq!(on_host, b"Hello, World!");

    let workdir = sandbox.workdir().to_path_buf();
    pool.release(&mut sandbox).await;

    assert!(!sandbox.is_alive());
    assert!(!workdir.exists());
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_release_is_idempotent() {
    let (pool, registry) = pool_and_registry();
    let spec = registry.resolve("python").unwrap();

    let mut sandbox = pool.acquire(&spec).await.expect("Failed to acquire box");
    pool.release(&mut sandbox).await;
    pool.release(&mut sandbox).await;

    assert_eq!(pool.ledger().acquired(), 1);
    assert_eq!(pool.ledger().released(), 1);
    assert_eq!(pool.available(), pool.capacity() as usize);
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_released_box_refuses_work() {
    let (pool, registry) = pool_and_registry();
    let spec = registry.resolve("python").unwrap();

    let mut sandbox = pool.acquire(&spec).await.expect("Failed to acquire box");
    pool.release(&mut sandbox).await;

    let err = sandbox.write_file("late.txt", b"x").await.unwrap_err();
    assert!(matches!(err, SandboxError::Released));
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_live_boxes_get_distinct_ids() {
    let (pool, registry) = pool_and_registry();
    let spec = registry.resolve("python").unwrap();

    let mut first = pool.acquire(&spec).await.expect("Failed to acquire box");
    let mut second = pool.acquire(&spec).await.expect("Failed to acquire second box");
    assert_ne!(first.id(), second.id());
    assert_ne!(first.workdir(), second.workdir());

    pool.release(&mut first).await;
    pool.release(&mut second).await;
    assert_eq!(pool.ledger().live(), 0);
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_dropped_box_is_cleaned_up() {
    let (pool, registry) = pool_and_registry();
    let spec = registry.resolve("python").unwrap();

    let sandbox = pool.acquire(&spec).await.expect("Failed to acquire box");
    let workdir = sandbox.workdir().to_path_buf();
    drop(sandbox);

    // The drop fallback cleans up on a background thread
    for _ in 0..50 {
        if !workdir.exists() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    assert!(!workdir.exists());
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_sweep_covers_every_id() {
    let (pool, _) = pool_and_registry();

    let cleaned = sweep(&pool).await;

    assert_eq!(cleaned, pool.capacity());
}
