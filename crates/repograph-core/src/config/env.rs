use std::path::PathBuf;

use repograph_vcs::Secret;

use super::{Config, GraphBackend};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_storage();
        self.apply_env_overrides_vcs();
        self.apply_env_overrides_services();
    }

    fn apply_env_overrides_storage(&mut self) {
        if let Ok(v) = std::env::var("REPOGRAPH_SQLITE_PATH") {
            self.storage.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("REPOGRAPH_CHECKOUT_ROOT") {
            self.checkout.root_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("REPOGRAPH_CLONE_DEPTH")
            && let Ok(depth) = v.parse::<u32>()
        {
            self.checkout.clone_depth = depth;
        }
        if let Ok(v) = std::env::var("REPOGRAPH_GIT_TIMEOUT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.checkout.git_timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("REPOGRAPH_CLEANUP_RETRIES")
            && let Ok(n) = v.parse::<u32>()
        {
            self.checkout.cleanup_retries = n;
        }
    }

    fn apply_env_overrides_vcs(&mut self) {
        if let Ok(v) = std::env::var("REPOGRAPH_GITHUB_TOKEN") {
            self.vcs.github.token = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("REPOGRAPH_GITHUB_API_URL") {
            self.vcs.github.api_url = Some(v);
        }
        if let Ok(v) = std::env::var("REPOGRAPH_GITLAB_TOKEN") {
            self.vcs.gitlab.token = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("REPOGRAPH_GITLAB_API_URL") {
            self.vcs.gitlab.api_url = Some(v);
        }
        if let Ok(v) = std::env::var("REPOGRAPH_GITLAB_HOSTS") {
            self.vcs.gitlab.hosts = split_list(&v);
        }
        if let Ok(v) = std::env::var("REPOGRAPH_BITBUCKET_USERNAME") {
            self.vcs.bitbucket.username = Some(v);
        }
        if let Ok(v) = std::env::var("REPOGRAPH_BITBUCKET_APP_PASSWORD") {
            self.vcs.bitbucket.password = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("REPOGRAPH_BITBUCKET_TOKEN") {
            self.vcs.bitbucket.token = Some(Secret::new(v));
        }
    }

    fn apply_env_overrides_services(&mut self) {
        if let Ok(v) = std::env::var("REPOGRAPH_GRAPH_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "memory" => self.graph.backend = GraphBackend::Memory,
                "neo4j" => self.graph.backend = GraphBackend::Neo4j,
                _ => tracing::warn!("ignoring invalid REPOGRAPH_GRAPH_BACKEND value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("REPOGRAPH_NEO4J_URL") {
            self.graph.url = v;
        }
        if let Ok(v) = std::env::var("REPOGRAPH_NEO4J_DATABASE") {
            self.graph.database = v;
        }
        if let Ok(v) = std::env::var("REPOGRAPH_NEO4J_USERNAME") {
            self.graph.username = Some(v);
        }
        if let Ok(v) = std::env::var("REPOGRAPH_NEO4J_PASSWORD") {
            self.graph.password = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("REPOGRAPH_GRAPH_BATCH_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.graph.batch_size = n;
        }
        if let Ok(v) = std::env::var("REPOGRAPH_SEARCH_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.search.enabled = enabled;
        }
        if let Ok(v) = std::env::var("REPOGRAPH_SEARCH_URL") {
            self.search.url = Some(v);
        }
        if let Ok(v) = std::env::var("REPOGRAPH_SEARCH_TOKEN") {
            self.search.token = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("REPOGRAPH_MIRROR_DIR") {
            self.mirror.target_dir = Some(PathBuf::from(v));
            self.mirror.enabled = true;
        }
        if let Ok(v) = std::env::var("REPOGRAPH_SYNC_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.sync.enabled = enabled;
        }
        if let Ok(v) = std::env::var("REPOGRAPH_SYNC_INTERVAL")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.sync.interval_secs = secs;
        }
        if let Ok(v) = std::env::var("REPOGRAPH_PROGRESS_RETENTION")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.pipeline.progress_retention_secs = secs;
        }
    }
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}
