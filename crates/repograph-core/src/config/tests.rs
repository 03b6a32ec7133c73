use std::io::Write;

use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 27] = [
    "REPOGRAPH_CONFIG",
    "REPOGRAPH_SQLITE_PATH",
    "REPOGRAPH_CHECKOUT_ROOT",
    "REPOGRAPH_CLONE_DEPTH",
    "REPOGRAPH_GIT_TIMEOUT",
    "REPOGRAPH_CLEANUP_RETRIES",
    "REPOGRAPH_GITHUB_TOKEN",
    "REPOGRAPH_GITHUB_API_URL",
    "REPOGRAPH_GITLAB_TOKEN",
    "REPOGRAPH_GITLAB_API_URL",
    "REPOGRAPH_GITLAB_HOSTS",
    "REPOGRAPH_BITBUCKET_USERNAME",
    "REPOGRAPH_BITBUCKET_APP_PASSWORD",
    "REPOGRAPH_BITBUCKET_TOKEN",
    "REPOGRAPH_GRAPH_BACKEND",
    "REPOGRAPH_NEO4J_URL",
    "REPOGRAPH_NEO4J_DATABASE",
    "REPOGRAPH_NEO4J_USERNAME",
    "REPOGRAPH_NEO4J_PASSWORD",
    "REPOGRAPH_GRAPH_BATCH_SIZE",
    "REPOGRAPH_SEARCH_ENABLED",
    "REPOGRAPH_SEARCH_URL",
    "REPOGRAPH_SEARCH_TOKEN",
    "REPOGRAPH_MIRROR_DIR",
    "REPOGRAPH_SYNC_ENABLED",
    "REPOGRAPH_SYNC_INTERVAL",
    "REPOGRAPH_PROGRESS_RETENTION",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
#[serial]
fn defaults_when_file_missing() {
    clear_env();
    let config = Config::load(Path::new("/nonexistent/repograph.toml")).unwrap();
    assert_eq!(config.storage.sqlite_path, "./data/repograph.db");
    assert_eq!(config.checkout.clone_depth, 50);
    assert_eq!(config.checkout.cleanup_retries, 3);
    assert_eq!(config.graph.backend, GraphBackend::Memory);
    assert_eq!(config.graph.batch_size, 500);
    assert_eq!(config.pipeline.progress_retention_secs, 30);
    assert_eq!(
        config.pipeline.fatal_stages,
        vec![Stage::Checkout, Stage::Namespaces, Stage::Parse, Stage::Graph]
    );
    assert!(!config.search.enabled);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn parse_valid_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(
        f,
        r#"
[storage]
sqlite_path = "/var/lib/repograph/meta.db"

[checkout]
root_dir = "/var/cache/repograph"
clone_depth = 0

[vcs.gitlab]
token = "glpat-abc"
hosts = ["git.internal.example"]

[graph]
backend = "neo4j"
url = "http://neo4j:7474"
username = "neo4j"
password = "pw"

[pipeline]
fatal_stages = ["checkout", "parse", "search_notify"]

[sync]
interval_secs = 60
"#
    )
    .unwrap();

    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.storage.sqlite_path, "/var/lib/repograph/meta.db");
    assert_eq!(config.checkout.root_dir, PathBuf::from("/var/cache/repograph"));
    assert_eq!(config.checkout.clone_depth, 0);
    assert_eq!(config.checkout.git_timeout_secs, 300);
    assert_eq!(config.vcs.gitlab.hosts, vec!["git.internal.example"]);
    assert_eq!(config.vcs.gitlab.token.as_ref().unwrap().expose(), "glpat-abc");
    assert_eq!(config.graph.backend, GraphBackend::Neo4j);
    assert_eq!(
        config.pipeline.fatal_stages,
        vec![Stage::Checkout, Stage::Parse, Stage::SearchNotify]
    );
    assert_eq!(config.sync.interval_secs, 60);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn malformed_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[graph\nbackend = ").unwrap();
    clear_env();
    assert!(Config::load(&path).is_err());
}

#[test]
#[serial]
fn env_overrides() {
    clear_env();
    unsafe {
        std::env::set_var("REPOGRAPH_SQLITE_PATH", ":memory:");
        std::env::set_var("REPOGRAPH_GITHUB_TOKEN", "ghp_env");
        std::env::set_var("REPOGRAPH_GRAPH_BACKEND", "neo4j");
        std::env::set_var("REPOGRAPH_GRAPH_BATCH_SIZE", "100");
        std::env::set_var("REPOGRAPH_SYNC_INTERVAL", "not-a-number");
        std::env::set_var("REPOGRAPH_GITLAB_HOSTS", "a.example, b.example,");
        std::env::set_var("REPOGRAPH_MIRROR_DIR", "/srv/mirror");
    }

    let config = Config::load(Path::new("/nonexistent.toml")).unwrap();
    clear_env();

    assert_eq!(config.storage.sqlite_path, ":memory:");
    assert_eq!(config.vcs.github.token.as_ref().unwrap().expose(), "ghp_env");
    assert_eq!(config.graph.backend, GraphBackend::Neo4j);
    assert_eq!(config.graph.batch_size, 100);
    assert_eq!(config.sync.interval_secs, 300);
    assert_eq!(config.vcs.gitlab.hosts, vec!["a.example", "b.example"]);
    assert!(config.mirror.enabled);
    assert_eq!(config.mirror.target_dir, Some(PathBuf::from("/srv/mirror")));
}

#[test]
#[serial]
fn invalid_backend_env_is_ignored() {
    clear_env();
    unsafe { std::env::set_var("REPOGRAPH_GRAPH_BACKEND", "dgraph") };
    let config = Config::load(Path::new("/nonexistent.toml")).unwrap();
    clear_env();
    assert_eq!(config.graph.backend, GraphBackend::Memory);
}

#[test]
fn validate_rejects_inconsistent_settings() {
    let mut config = Config::default();
    config.search.enabled = true;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.mirror.enabled = true;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.graph.batch_size = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.pipeline.fatal_stages = vec![Stage::Graph];
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("checkout"));
}

#[test]
fn secrets_are_redacted_in_debug() {
    let mut config = Config::default();
    config.graph.password = Some(repograph_vcs::Secret::new("hunter2"));
    let dbg = format!("{config:?}");
    assert!(!dbg.contains("hunter2"));
}

#[test]
#[serial]
fn config_path_resolution_order() {
    clear_env();
    assert_eq!(
        resolve_config_path(Some(Path::new("/etc/rg.toml"))),
        PathBuf::from("/etc/rg.toml")
    );
    assert_eq!(resolve_config_path(None), PathBuf::from("config/default.toml"));
    unsafe { std::env::set_var("REPOGRAPH_CONFIG", "/opt/rg.toml") };
    assert_eq!(resolve_config_path(None), PathBuf::from("/opt/rg.toml"));
    clear_env();
}

#[test]
fn bundled_default_config_matches_defaults() {
    let shipped: Config = toml::from_str(include_str!("../../../../config/default.toml")).unwrap();
    let defaults = Config::default();
    assert_eq!(shipped.storage.sqlite_path, defaults.storage.sqlite_path);
    assert_eq!(shipped.checkout.clone_depth, defaults.checkout.clone_depth);
    assert_eq!(shipped.graph.backend, defaults.graph.backend);
    assert_eq!(shipped.graph.batch_size, defaults.graph.batch_size);
    assert_eq!(shipped.pipeline.fatal_stages, defaults.pipeline.fatal_stages);
    assert_eq!(shipped.sync.interval_secs, defaults.sync.interval_secs);
    shipped.validate().unwrap();
}
