//! Configuration loading and telemetry setup tests.

mod common;

use common::config_file;
use lattice_client::{ClientConfig, ConfigOverrides};
use std::path::Path;
use std::time::Duration;

#[test]
fn load_full_config_from_file() {
    let file = config_file(
        r#"
[connection]
endpoint = "http://10.0.0.5:2379"
auth_token = "tok"
connect_timeout_ms = 1500
request_timeout_ms = 2500

[callbacks]
thread_prefix = "orders"

[snapshot]
chunk_size = 4096

[telemetry]
log_level = "debug"
"#,
    );

    let config = ClientConfig::from_file(file.path()).unwrap();
    assert_eq!(config.connection.endpoint, "http://10.0.0.5:2379");
    assert_eq!(config.connection.auth_token.as_deref(), Some("tok"));
    assert_eq!(config.connection.connect_timeout(), Duration::from_millis(1500));
    assert_eq!(config.connection.request_timeout(), Duration::from_millis(2500));
    assert_eq!(config.callbacks.thread_name("kv"), "orders-kv");
    assert_eq!(config.snapshot.chunk_size, 4096);
    assert_eq!(config.telemetry.log_level, "debug");
}

#[test]
fn missing_file_names_the_path() {
    let err = ClientConfig::from_file(Path::new("/nonexistent/lattice-client.toml")).unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/lattice-client.toml"));
}

#[test]
fn malformed_toml_is_rejected() {
    let file = config_file("[connection\nendpoint = ");
    assert!(ClientConfig::from_file(file.path()).is_err());
}

#[test]
fn validation_rejects_bad_values() {
    let cases = [
        "[connection]\nconnect_timeout_ms = 0\n",
        "[connection]\nrequest_timeout_ms = 0\n",
        "[connection]\nauth_token = \"\"\n",
        "[callbacks]\nthread_prefix = \"\"\n",
        "[telemetry]\nlog_level = \"loud\"\n",
    ];
    for case in cases {
        assert!(ClientConfig::from_toml(case).is_err(), "accepted: {case}");
    }
}

#[test]
fn overrides_win_over_file_values() {
    let file = config_file("[telemetry]\nlog_level = \"warn\"\n");
    let mut config = ClientConfig::from_file(file.path()).unwrap();

    config.apply_overrides(&ConfigOverrides {
        log_level: Some("trace".to_string()),
        ..Default::default()
    });
    assert_eq!(config.telemetry.log_level, "trace");
    assert!(config.validate().is_ok());

    config.apply_overrides(&ConfigOverrides {
        endpoint: Some("etcd:2379".to_string()),
        ..Default::default()
    });
    assert!(config.validate().is_err());
}

#[cfg(feature = "telemetry")]
#[test]
fn tracing_installs_once() {
    use lattice_client::core::telemetry::init_tracing;

    assert!(init_tracing("debug").is_ok());
    assert!(init_tracing("debug").is_err());
}
