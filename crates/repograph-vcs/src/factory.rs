use serde::{Deserialize, Serialize};

use crate::any::AnyVcsProvider;
use crate::bitbucket::BitbucketProvider;
use crate::credentials::{Credentials, Secret};
use crate::git::GitCli;
use crate::github::GitHubProvider;
use crate::gitlab::GitLabProvider;
use crate::local::LocalProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    GitHub,
    GitLab,
    Bitbucket,
    Local,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Bitbucket => "bitbucket",
            Self::Local => "local",
        })
    }
}

/// Per-host-family settings. `hosts` lists additional self-hosted hostnames that map to
/// this provider (GitHub Enterprise, self-managed GitLab).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    pub api_url: Option<String>,
    pub token: Option<Secret>,
    pub username: Option<String>,
    pub password: Option<Secret>,
    pub hosts: Vec<String>,
}

impl HostConfig {
    /// Username + password wins over a bare token.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            return Some(Credentials::Basic {
                username: username.clone(),
                password: password.clone(),
            });
        }
        self.token.clone().map(Credentials::Token)
    }

    fn matches(&self, host: &str, canonical: &str) -> bool {
        host.eq_ignore_ascii_case(canonical)
            || self.hosts.iter().any(|h| h.eq_ignore_ascii_case(host))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct VcsConfig {
    pub github: HostConfig,
    pub gitlab: HostConfig,
    pub bitbucket: HostConfig,
}

fn remote_host(remote_url: &str) -> Option<String> {
    let trimmed = remote_url.trim();
    if let Some(rest) = trimmed.strip_prefix("git@") {
        return rest.split_once(':').map(|(host, _)| host.to_owned());
    }
    let url = url::Url::parse(trimmed).ok()?;
    url.host_str().map(str::to_owned)
}

/// Classify a remote URL. Known hosts (plus configured self-hosted ones) win; local paths come
/// next; any other HTTPS or `.git` remote is treated as GitHub-compatible.
#[must_use]
pub fn detect_provider_kind(remote_url: &str, config: &VcsConfig) -> ProviderKind {
    let trimmed = remote_url.trim();
    if trimmed.starts_with("local://") || trimmed.starts_with("file://") || trimmed.starts_with('/')
    {
        return ProviderKind::Local;
    }
    if let Some(host) = remote_host(trimmed) {
        if config.github.matches(&host, "github.com") {
            return ProviderKind::GitHub;
        }
        if config.gitlab.matches(&host, "gitlab.com") {
            return ProviderKind::GitLab;
        }
        if config.bitbucket.matches(&host, "bitbucket.org") {
            return ProviderKind::Bitbucket;
        }
    }
    if trimmed.starts_with("https://") || trimmed.ends_with(".git") {
        tracing::warn!(
            url = %crate::redact::redact_credentials(trimmed),
            "unrecognized host, assuming GitHub-compatible API"
        );
        return ProviderKind::GitHub;
    }
    ProviderKind::Local
}

/// Builds the provider for a remote URL from static configuration.
#[derive(Debug, Clone, Default)]
pub struct ProviderFactory {
    config: VcsConfig,
    git: GitCli,
}

impl ProviderFactory {
    #[must_use]
    pub fn new(config: VcsConfig, git: GitCli) -> Self {
        Self { config, git }
    }

    #[must_use]
    pub fn config(&self) -> &VcsConfig {
        &self.config
    }

    #[must_use]
    pub fn provider_for(&self, remote_url: &str) -> AnyVcsProvider {
        let kind = detect_provider_kind(remote_url, &self.config);
        let host = remote_host(remote_url);
        let git = self.git.clone();
        match kind {
            ProviderKind::GitHub => {
                let cfg = &self.config.github;
                let mut p = GitHubProvider::new(cfg.credentials()).with_git(git);
                if let Some(api) = &cfg.api_url {
                    p = p.with_api_url(api);
                } else if let Some(h) = host.filter(|h| !h.eq_ignore_ascii_case("github.com")) {
                    p = p.with_api_url(GitHubProvider::enterprise_api_url(&h));
                }
                AnyVcsProvider::GitHub(p)
            }
            ProviderKind::GitLab => {
                let cfg = &self.config.gitlab;
                let mut p = GitLabProvider::new(cfg.credentials()).with_git(git);
                if let Some(api) = &cfg.api_url {
                    p = p.with_api_url(api);
                } else if let Some(h) = host.filter(|h| !h.eq_ignore_ascii_case("gitlab.com")) {
                    p = p.with_api_url(GitLabProvider::self_managed_api_url(&h));
                }
                AnyVcsProvider::GitLab(p)
            }
            ProviderKind::Bitbucket => {
                let cfg = &self.config.bitbucket;
                let mut p = BitbucketProvider::new(cfg.credentials()).with_git(git);
                if let Some(api) = &cfg.api_url {
                    p = p.with_api_url(api);
                }
                AnyVcsProvider::Bitbucket(p)
            }
            ProviderKind::Local => AnyVcsProvider::Local(LocalProvider::new(git)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::VcsProvider;

    #[test]
    fn detects_hosted_providers() {
        let cfg = VcsConfig::default();
        assert_eq!(
            detect_provider_kind("https://github.com/o/r.git", &cfg),
            ProviderKind::GitHub
        );
        assert_eq!(
            detect_provider_kind("git@gitlab.com:g/p.git", &cfg),
            ProviderKind::GitLab
        );
        assert_eq!(
            detect_provider_kind("https://bitbucket.org/w/r", &cfg),
            ProviderKind::Bitbucket
        );
    }

    #[test]
    fn detects_local_paths() {
        let cfg = VcsConfig::default();
        for url in ["local:///srv/a", "file:///srv/a", "/srv/a", "relative/dir"] {
            assert_eq!(detect_provider_kind(url, &cfg), ProviderKind::Local, "{url}");
        }
    }

    #[test]
    fn unknown_https_host_falls_back_to_github() {
        let cfg = VcsConfig::default();
        assert_eq!(
            detect_provider_kind("https://code.example.com/team/app", &cfg),
            ProviderKind::GitHub
        );
    }

    #[test]
    fn configured_self_hosted_gitlab() {
        let cfg = VcsConfig {
            gitlab: HostConfig {
                hosts: vec!["git.corp.example".into()],
                ..HostConfig::default()
            },
            ..VcsConfig::default()
        };
        assert_eq!(
            detect_provider_kind("https://git.corp.example/team/app.git", &cfg),
            ProviderKind::GitLab
        );
    }

    #[test]
    fn basic_credentials_preferred_over_token() {
        let cfg = HostConfig {
            token: Some(Secret::new("tok")),
            username: Some("bot".into()),
            password: Some(Secret::new("pw")),
            ..HostConfig::default()
        };
        assert!(matches!(cfg.credentials(), Some(Credentials::Basic { .. })));
        let token_only = HostConfig {
            token: Some(Secret::new("tok")),
            ..HostConfig::default()
        };
        assert!(matches!(token_only.credentials(), Some(Credentials::Token(_))));
    }

    #[test]
    fn factory_builds_matching_variant() {
        let factory = ProviderFactory::default();
        assert_eq!(factory.provider_for("https://github.com/o/r").name(), "github");
        assert_eq!(factory.provider_for("/srv/repos/app").name(), "local");
        assert_eq!(
            factory.provider_for("https://bitbucket.org/w/r").name(),
            "bitbucket"
        );
    }
}
