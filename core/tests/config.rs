use curtailment_core::{
    config::{AppConfig, DbConfig, Topology, DEFAULT_CACHE_TTL_SECS, DEFAULT_PORT},
    error::IngestError,
    provider::{pg_config, search_path_options, ConnectionProvider, TransportPolicy},
};
use std::collections::HashMap;
use std::path::PathBuf;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn base() -> HashMap<String, String> {
    env(&[
        ("DB_USERNAME", "curtail"),
        ("DB_PASSWORD", "s3cret"),
        ("DB_IP", "10.20.0.5"),
        ("DB_NAME", "wind"),
    ])
}

fn load(vars: &HashMap<String, String>) -> Result<DbConfig, IngestError> {
    DbConfig::from_lookup(|k| vars.get(k).cloned())
}

// ── Environment ──────────────────────────────────────────────────────────────

#[test]
fn minimal_environment_uses_defaults() {
    let config = load(&base()).unwrap();

    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.schema, "public");
    assert_eq!(
        config.topology().unwrap(),
        Topology::Tcp { host: "10.20.0.5".into(), port: DEFAULT_PORT }
    );
}

#[test]
fn missing_required_key_is_a_connection_error() {
    for key in ["DB_USERNAME", "DB_PASSWORD", "DB_NAME"] {
        let mut vars = base();
        vars.remove(key);
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, IngestError::Connection(ref m) if m.contains(key)), "{key}: {err}");
    }
}

#[test]
fn blank_value_counts_as_missing() {
    let mut vars = base();
    vars.insert("DB_PASSWORD".into(), "   ".into());

    assert!(matches!(load(&vars), Err(IngestError::Connection(_))));
}

#[test]
fn host_or_cloud_instance_is_required() {
    let mut vars = base();
    vars.remove("DB_IP");

    assert!(matches!(load(&vars), Err(IngestError::Connection(_))));
}

#[test]
fn malformed_port_is_rejected() {
    let mut vars = base();
    vars.insert("DB_PORT".into(), "fifty".into());

    assert!(matches!(load(&vars), Err(IngestError::Connection(_))));
}

#[test]
fn zero_pool_size_is_rejected() {
    let mut vars = base();
    vars.insert("DB_POOL_MAX".into(), "0".into());

    assert!(matches!(load(&vars), Err(IngestError::Connection(_))));
}

#[test]
fn cloud_instance_selects_the_socket_directory() {
    let mut vars = base();
    vars.insert("CLOUD_SQL_INSTANCE".into(), "proj:europe-west2:wind".into());

    let config = load(&vars).unwrap();

    assert_eq!(
        config.topology().unwrap(),
        Topology::CloudSocket { socket_dir: "/cloudsql/proj:europe-west2:wind".into() }
    );
}

#[test]
fn debug_output_hides_the_password() {
    let config = load(&base()).unwrap();

    let shown = format!("{config:?}");

    assert!(!shown.contains("s3cret"));
    assert!(shown.contains("<redacted>"));
}

#[test]
fn app_config_defaults() {
    let vars = base();

    let app = AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();

    assert_eq!(app.sql_dir, PathBuf::from("sql"));
    assert_eq!(app.cache_ttl_secs, DEFAULT_CACHE_TTL_SECS);
}

#[test]
fn app_config_reads_overrides() {
    let mut vars = base();
    vars.insert("SQL_DIR".into(), "/srv/queries".into());
    vars.insert("CACHE_TTL_SECS".into(), "60".into());

    let app = AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();

    assert_eq!(app.sql_dir, PathBuf::from("/srv/queries"));
    assert_eq!(app.cache_ttl_secs, 60);
}

#[test]
fn cache_ttl_beyond_duration_range_is_rejected() {
    for ttl in ["18446744073709551615", "9300000000000000"] {
        let mut vars = base();
        vars.insert("CACHE_TTL_SECS".into(), ttl.into());

        let result = AppConfig::from_lookup(|k| vars.get(k).cloned());

        assert!(matches!(result, Err(IngestError::Connection(_))), "{ttl}");
    }
}

#[test]
fn cache_ttl_converts_to_a_duration() {
    let app = AppConfig { cache_ttl_secs: 90, ..AppConfig::default_test() };

    assert_eq!(app.cache_ttl().unwrap(), chrono::Duration::seconds(90));
}

// ── Transport ────────────────────────────────────────────────────────────────

#[test]
fn transport_policy_follows_topology() {
    let socket = Topology::CloudSocket { socket_dir: "/cloudsql/x".into() };
    let local = Topology::Tcp { host: "localhost".into(), port: 5432 };
    let loopback = Topology::Tcp { host: "127.0.0.1".into(), port: 5432 };
    let remote = Topology::Tcp { host: "db.example.net".into(), port: 5432 };

    assert_eq!(TransportPolicy::for_topology(&socket), TransportPolicy::Disabled);
    assert_eq!(TransportPolicy::for_topology(&local), TransportPolicy::Optional);
    assert_eq!(TransportPolicy::for_topology(&loopback), TransportPolicy::Optional);
    assert_eq!(TransportPolicy::for_topology(&remote), TransportPolicy::Required);
}

#[test]
fn search_path_is_pinned_through_startup_options() {
    assert_eq!(search_path_options("public").unwrap(), "-c search_path=public");
    assert!(matches!(search_path_options("a;b"), Err(IngestError::Connection(_))));
    assert!(matches!(search_path_options("my schema"), Err(IngestError::Connection(_))));
}

#[test]
fn pg_config_carries_credentials_and_schema() {
    let config = DbConfig {
        schema: "curtailment".into(),
        ..DbConfig::default_test()
    };

    let (pg, policy) = pg_config(&config).unwrap();

    assert_eq!(policy, TransportPolicy::Optional);
    assert_eq!(pg.get_user(), Some("postgres"));
    assert_eq!(pg.get_dbname(), Some("wind_curtailment"));
    assert_eq!(pg.get_options(), Some("-c search_path=curtailment"));
    assert_eq!(pg.get_ports(), &[DEFAULT_PORT]);
}

#[test]
fn unreachable_server_fails_with_a_connection_error() {
    let config = DbConfig {
        port: 1,
        connect_timeout_secs: 1,
        ..DbConfig::default_test()
    };

    let result = ConnectionProvider::new(config).connect();

    assert!(matches!(result, Err(IngestError::Connection(_))));
}
