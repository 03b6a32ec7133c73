//! Code module ("namespace") detection for monorepos.
//!
//! Detection is a cascade; the first rule producing a non-empty set wins:
//!
//! 1. `pnpm-workspace.yaml` `packages:` globs
//! 2. `package.json` `workspaces` globs (flat list or `{ packages: [...] }`)
//! 3. immediate subdirectories of conventional containers (`apps/`, `packages/`, ...)
//! 4. every non-ignored top-level directory, or a single synthetic `root`

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::paths::{is_ignored_dir, normalize_rel, relative_posix};

pub const ROOT_NAMESPACE: &str = "root";

/// Top-level directories whose children are treated as modules.
pub const CONVENTIONAL_DIRS: &[&str] = &["apps", "packages", "services", "libs", "modules"];

const PNPM_WORKSPACE: &str = "pnpm-workspace.yaml";
const PACKAGE_JSON: &str = "package.json";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeNamespace {
    pub name: String,
    /// Repo-relative, `/`-separated; empty for the whole checkout.
    pub root_path: String,
}

impl CodeNamespace {
    pub fn new(name: impl Into<String>, root_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root_path: root_path.into(),
        }
    }

    /// Synthetic namespace covering the whole checkout.
    #[must_use]
    pub fn root() -> Self {
        Self::new(ROOT_NAMESPACE, "")
    }
}

#[derive(Deserialize, Default)]
struct PnpmWorkspace {
    #[serde(default)]
    packages: Vec<String>,
}

type Detector = fn(&Path) -> Result<Vec<CodeNamespace>>;

/// Infer the code modules of a checkout.
///
/// # Errors
///
/// Returns an error if `checkout` is not a directory or cannot be listed. Malformed manifests
/// are logged and fall through to the next rule.
pub fn detect_namespaces(checkout: &Path) -> Result<Vec<CodeNamespace>> {
    if !checkout.is_dir() {
        return Err(IndexError::NotADirectory(checkout.to_path_buf()));
    }

    let cascade: [(&str, Detector); 3] = [
        ("pnpm-workspace", from_pnpm_workspace),
        ("package-json-workspaces", from_package_json),
        ("conventional-dirs", from_conventional_dirs),
    ];
    for (rule, detect) in cascade {
        match detect(checkout) {
            Ok(found) if !found.is_empty() => {
                tracing::debug!(rule, count = found.len(), "namespaces detected");
                return Ok(found);
            }
            Ok(_) => {}
            Err(IndexError::Io(e)) => return Err(IndexError::Io(e)),
            Err(e) => tracing::warn!(rule, "namespace rule skipped: {e}"),
        }
    }

    let found = from_top_level_dirs(checkout)?;
    tracing::debug!(rule = "top-level", count = found.len(), "namespaces detected");
    Ok(found)
}

fn from_pnpm_workspace(checkout: &Path) -> Result<Vec<CodeNamespace>> {
    let path = checkout.join(PNPM_WORKSPACE);
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)?;
    let workspace: PnpmWorkspace = match serde_yaml::from_str(&content) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!("ignoring malformed {PNPM_WORKSPACE}: {e}");
            return Ok(Vec::new());
        }
    };
    resolve_workspace_globs(checkout, &workspace.packages)
}

fn from_package_json(checkout: &Path) -> Result<Vec<CodeNamespace>> {
    let Some(manifest) = read_manifest(checkout) else {
        return Ok(Vec::new());
    };
    let globs: Vec<String> = match manifest.get("workspaces") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        Some(serde_json::Value::Object(obj)) => obj
            .get("packages")
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    resolve_workspace_globs(checkout, &globs)
}

fn from_conventional_dirs(checkout: &Path) -> Result<Vec<CodeNamespace>> {
    let mut found = Vec::new();
    for container in CONVENTIONAL_DIRS {
        let dir = checkout.join(container);
        if !dir.is_dir() {
            continue;
        }
        for child in list_source_dirs(&dir)? {
            let rel = format!("{container}/{child}");
            found.push(CodeNamespace::new(rel.clone(), rel));
        }
    }
    Ok(finalize(found))
}

fn from_top_level_dirs(checkout: &Path) -> Result<Vec<CodeNamespace>> {
    let found: Vec<_> = list_source_dirs(checkout)?
        .into_iter()
        .map(|dir| CodeNamespace::new(dir.clone(), dir))
        .collect();
    if found.is_empty() {
        return Ok(vec![CodeNamespace::root()]);
    }
    Ok(finalize(found))
}

/// Names of immediate subdirectories that are neither hidden nor in the ignore set.
fn list_source_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || is_ignored_dir(&name) {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

fn read_manifest(dir: &Path) -> Option<serde_json::Map<String, serde_json::Value>> {
    let content = std::fs::read_to_string(dir.join(PACKAGE_JSON)).ok()?;
    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(serde_json::Value::Object(obj)) => Some(obj),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(path = %dir.join(PACKAGE_JSON).display(), "ignoring malformed manifest: {e}");
            None
        }
    }
}

fn manifest_name(dir: &Path) -> Option<String> {
    read_manifest(dir)?
        .get("name")
        .and_then(serde_json::Value::as_str)
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
}

/// Expand workspace globs relative to `checkout`. `!`-prefixed globs exclude matches.
fn resolve_workspace_globs(checkout: &Path, globs: &[String]) -> Result<Vec<CodeNamespace>> {
    let (negated, positive): (Vec<&String>, Vec<&String>) =
        globs.iter().partition(|g| g.trim().starts_with('!'));

    let mut excludes = Vec::with_capacity(negated.len());
    for raw in negated {
        let pattern = normalize_rel(raw.trim().trim_start_matches('!'));
        excludes.push(
            glob::Pattern::new(pattern).map_err(|source| IndexError::Pattern {
                pattern: raw.clone(),
                source,
            })?,
        );
    }

    let base = glob::Pattern::escape(&checkout.to_string_lossy());
    let mut found = Vec::new();
    for raw in positive {
        let pattern = normalize_rel(raw.trim());
        if pattern.is_empty() {
            continue;
        }
        let paths = glob::glob(&format!("{base}/{pattern}")).map_err(|source| {
            IndexError::Pattern {
                pattern: raw.clone(),
                source,
            }
        })?;
        for path in paths.flatten() {
            if !path.is_dir() {
                continue;
            }
            let Some(rel) = relative_posix(checkout, &path) else {
                continue;
            };
            if rel.is_empty()
                || rel.split('/').any(is_ignored_dir)
                || excludes.iter().any(|p| p.matches(&rel))
            {
                continue;
            }
            let name = manifest_name(&path).unwrap_or_else(|| rel.clone());
            found.push(CodeNamespace::new(name, rel));
        }
    }
    Ok(finalize(found))
}

/// De-duplicate by root path and order by name.
fn finalize(found: Vec<CodeNamespace>) -> Vec<CodeNamespace> {
    let mut by_root: BTreeMap<String, CodeNamespace> = BTreeMap::new();
    for ns in found {
        by_root.entry(ns.root_path.clone()).or_insert(ns);
    }
    let mut out: Vec<_> = by_root.into_values().collect();
    out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.root_path.cmp(&b.root_path)));
    out
}

/// Name of the namespace owning `path`: the one whose root is the longest segment-aligned
/// prefix of `path`. Falls back to the first namespace, then to [`ROOT_NAMESPACE`].
#[must_use]
pub fn resolve_file_namespace<'a>(path: &str, namespaces: &'a [CodeNamespace]) -> &'a str {
    let path = normalize_rel(path);
    namespaces
        .iter()
        .filter(|ns| {
            let root = normalize_rel(&ns.root_path);
            root.is_empty()
                || path == root
                || path
                    .strip_prefix(root)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
        .max_by_key(|ns| normalize_rel(&ns.root_path).len())
        .or_else(|| namespaces.first())
        .map_or(ROOT_NAMESPACE, |ns| ns.name.as_str())
}
