//! Version-control provider abstraction.
//!
//! Every hosting service (GitHub, GitLab, Bitbucket) and the filesystem-local variant implement
//! [`VcsProvider`]. [`ProviderFactory`] maps a remote URL to one of the closed set of variants in
//! [`AnyVcsProvider`]; clones and updates go through the `git` binary via [`git::GitCli`].

pub mod any;
pub mod bitbucket;
pub mod credentials;
pub mod error;
pub mod factory;
pub mod git;
pub mod github;
pub mod gitlab;
pub mod http;
pub mod local;
pub mod provider;
pub mod redact;
pub mod remote;
pub(crate) mod retry;
pub mod types;

pub use any::AnyVcsProvider;
pub use credentials::{Credentials, Secret};
pub use error::VcsError;
pub use factory::{HostConfig, ProviderFactory, ProviderKind, VcsConfig, detect_provider_kind};
pub use provider::VcsProvider;
pub use types::{Branch, CloneOptions, CommitInfo, RepoInfo};
