// tests/config_loading.rs

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use swan_exec::config::{ConfigFile, RawConfigFile, load_and_validate, load_or_default};
use swan_exec::errors::ExecError;
use swan_exec_test_utils::builders::ConfigFileBuilder;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn full_config_is_parsed() {
    let file = write_config(
        r#"
[local]
output_dir = "/var/tmp/swan"
start_check = "250ms"
stop_grace = "2s"

[isolation]
taskset = "0-3"
cgroups = ["cpu,cpuset:/swan/hp"]
pid_namespace = true

[kubernetes]
namespace = "bench"
pod_name_prefix = "hp"
launch_timeout = "1m"
cpu_limit = 2000

[redis]
port = 6380
max_memory = "1gb"
cluster_mode = true

[memcached]
threads = 8
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.local.output_dir, PathBuf::from("/var/tmp/swan"));
    assert_eq!(cfg.local.start_check, Duration::from_millis(250));
    assert_eq!(cfg.local.stop_grace, Duration::from_secs(2));

    assert_eq!(
        cfg.isolation.decorators().unwrap().decorate("sleep 1"),
        "unshare --fork --pid --mount-proc taskset -c 0-3 cgexec -g cpu,cpuset:/swan/hp sleep 1"
    );

    assert_eq!(cfg.kubernetes.namespace, "bench");
    assert_eq!(cfg.kubernetes.pod_name_prefix, "hp");
    assert_eq!(cfg.kubernetes.launch_timeout, Duration::from_secs(60));
    assert_eq!(cfg.kubernetes.cpu_limit, 2000);

    assert_eq!(cfg.redis.port, 6380);
    assert_eq!(cfg.redis.max_memory, "1gb");
    assert!(cfg.redis.cluster_mode);
    assert_eq!(cfg.redis.bind_address, "0.0.0.0");

    assert_eq!(cfg.memcached.threads, 8);
    assert_eq!(cfg.memcached.port, 11211);
}

#[test]
fn empty_file_yields_defaults() {
    let file = write_config("");
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.redis.port, 6379);
    assert_eq!(cfg.memcached.port, 11211);
    assert!(cfg.isolation.decorators().unwrap().is_empty());
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_or_default(dir.path().join("Swan.toml")).unwrap();

    assert_eq!(cfg.kubernetes.namespace, "default");
}

#[test]
fn missing_file_is_an_error_when_named_explicitly() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("nope.toml")).unwrap_err();

    assert!(matches!(err, ExecError::IoError(_)), "got {err:?}");
}

#[test]
fn malformed_toml_is_reported() {
    let file = write_config("[redis\nport = 1");
    let err = load_and_validate(file.path()).unwrap_err();

    assert!(matches!(err, ExecError::TomlError(_)), "got {err:?}");
}

#[test]
fn bad_duration_is_a_toml_error() {
    let file = write_config("[local]\nstop_grace = \"soon\"\n");
    let err = load_and_validate(file.path()).unwrap_err();

    assert!(matches!(err, ExecError::TomlError(_)), "got {err:?}");
}

#[test]
fn invalid_values_fail_validation() {
    let cases = [
        ConfigFileBuilder::new().with_taskset("3-1").raw(),
        ConfigFileBuilder::new().with_numa_nodes("x").raw(),
        ConfigFileBuilder::new().with_cgroup("cpu:relative").raw(),
        ConfigFileBuilder::new().with_redis_port(0).raw(),
        ConfigFileBuilder::new().with_memcached_threads(0).raw(),
    ];

    for raw in cases {
        let err = ConfigFile::try_from(raw.clone()).unwrap_err();
        assert!(
            matches!(err, ExecError::ConfigError(_)),
            "expected ConfigError for {raw:?}, got {err:?}"
        );
    }
}

#[test]
fn kubernetes_names_must_be_dns_labels() {
    let mut raw = RawConfigFile::default();
    raw.kubernetes.pod_name = Some("Not_A_Label".to_string());
    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(ExecError::ConfigError(_))
    ));

    let mut raw = RawConfigFile::default();
    raw.kubernetes.pod_name_prefix = "p".repeat(60);
    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(ExecError::ConfigError(_))
    ));

    let mut raw = RawConfigFile::default();
    raw.kubernetes.poll_interval = Duration::ZERO;
    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(ExecError::ConfigError(_))
    ));
}

#[test]
fn builder_produces_valid_isolation() {
    let cfg = ConfigFileBuilder::new()
        .with_numa_nodes("0")
        .with_pid_namespace()
        .build();

    assert_eq!(cfg.isolation.decorators().unwrap().len(), 2);
}
