// tests/launchers.rs

use std::sync::Arc;
use std::time::{Duration, Instant};

use swan_exec::errors::ExecError;
use swan_exec::executor::{Executor, LocalConfig, LocalExecutor, TaskHandle, TaskState};
use swan_exec::workloads::{Launcher, Memcached, MemcachedConfig, Redis, RedisConfig};
use swan_exec_test_utils::fake_executor::{
    FakeExecutor, FakeOutcome, RecordingExecutor, StaticProbe,
};
use swan_exec_test_utils::{init_tracing, with_timeout};

#[test]
fn redis_default_command() {
    let redis = Redis::new(Arc::new(FakeExecutor::new()), RedisConfig::default());

    assert_eq!(
        redis.command(),
        "redis-server --port 6379 --bind 0.0.0.0 --maxmemory 512mb --protected-mode no"
    );
    assert_eq!(redis.name(), "Redis");
}

#[test]
fn redis_cluster_and_protected_mode_flags() {
    let cfg = RedisConfig {
        port: 7000,
        cluster_mode: true,
        protected_mode: true,
        ..RedisConfig::default()
    };
    let redis = Redis::new(Arc::new(FakeExecutor::new()), cfg);

    assert_eq!(
        redis.command(),
        "redis-server --port 7000 --bind 0.0.0.0 --maxmemory 512mb --cluster-enabled yes"
    );
}

#[test]
fn memcached_default_command() {
    let memcached = Memcached::new(Arc::new(FakeExecutor::new()), MemcachedConfig::default());

    assert_eq!(
        memcached.command(),
        "memcached -p 11211 -u root -t 4 -m 64 -c 1024 -l 127.0.0.1"
    );
    assert_eq!(memcached.name(), "Memcached");
}

#[tokio::test]
async fn ready_service_is_handed_back_running() {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new().with_address("10.1.2.3"));
    let probe = Arc::new(StaticProbe::new(true));

    let redis = Redis::new(exec.clone(), RedisConfig::default()).with_probe(probe.clone());
    let task = redis.launch().await.unwrap();

    assert_eq!(task.status(), TaskState::Running);
    assert_eq!(exec.executed(), vec![redis.command()]);
    assert_eq!(probe.addresses(), vec!["10.1.2.3:6379".to_string()]);
    assert_eq!(exec.handles()[0].stop_calls(), 0);
}

#[tokio::test]
async fn unready_service_is_stopped_and_reported() {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new());
    let probe = Arc::new(StaticProbe::new(false));

    let memcached =
        Memcached::new(exec.clone(), MemcachedConfig::default()).with_probe(probe.clone());
    let err = memcached.launch().await.unwrap_err();

    match err {
        ExecError::ReadinessTimeout {
            workload, address, ..
        } => {
            assert_eq!(workload, "Memcached");
            assert_eq!(address, "127.0.0.1:11211");
        }
        other => panic!("expected ReadinessTimeout, got {other:?}"),
    }

    let handles = exec.handles();
    let handle = &handles[0];
    assert_eq!(handle.stop_calls(), 1);
    assert_eq!(handle.status(), TaskState::Terminated);
}

#[tokio::test]
async fn stop_failure_does_not_mask_readiness_timeout() {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new().with_failing_stop());
    let probe = Arc::new(StaticProbe::new(false));

    let redis = Redis::new(exec.clone(), RedisConfig::default()).with_probe(probe);
    let err = redis.launch().await.unwrap_err();

    assert!(matches!(err, ExecError::ReadinessTimeout { .. }), "got {err:?}");
    assert_eq!(exec.handles()[0].stop_calls(), 1);
}

#[tokio::test]
async fn start_failure_skips_the_probe() {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new());
    exec.push_outcome(FakeOutcome::StartFailure("no such binary".to_string()));
    let probe = Arc::new(StaticProbe::new(true));

    let redis = Redis::new(exec.clone(), RedisConfig::default()).with_probe(probe.clone());
    let err = redis.launch().await.unwrap_err();

    assert!(matches!(err, ExecError::StartFailure { .. }), "got {err:?}");
    assert_eq!(probe.calls(), 0);
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn real_process_that_never_listens_times_out_and_is_stopped() {
    init_tracing();
    let root = tempfile::tempdir().unwrap();
    let local = LocalExecutor::new().with_config(LocalConfig {
        output_dir: root.path().to_path_buf(),
        ..LocalConfig::default()
    });
    let exec = Arc::new(RecordingExecutor::new(Arc::new(local)));

    // `#` turns the rendered flags into a shell comment.
    let cfg = MemcachedConfig {
        binary_path: "sleep 30 #".to_string(),
        port: free_port(),
        startup_timeout_seconds: 1,
        ..MemcachedConfig::default()
    };
    let memcached = Memcached::new(exec.clone(), cfg);

    let started = Instant::now();
    let err = with_timeout(memcached.launch()).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ExecError::ReadinessTimeout { .. }), "got {err:?}");
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");

    let handles = exec.handles();
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].status(), TaskState::Terminated);
    handles[0].erase_output().unwrap();
}

#[tokio::test]
async fn launchers_work_behind_a_trait_object() {
    init_tracing();
    let exec: Arc<dyn Executor> = Arc::new(FakeExecutor::new());
    let probe = Arc::new(StaticProbe::new(true));

    let redis = Redis::new(exec.clone(), RedisConfig::default()).with_probe(probe.clone());
    let memcached = Memcached::new(exec, MemcachedConfig::default()).with_probe(probe.clone());
    let launchers: [Box<dyn Launcher>; 2] = [Box::new(redis), Box::new(memcached)];

    for launcher in &launchers {
        let task = launcher.launch().await.unwrap();
        task.stop().await.unwrap();
    }
    assert_eq!(probe.calls(), 2);
}
