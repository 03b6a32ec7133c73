//! Path helpers shared by the module detector and the extractor.

use std::path::Path;

/// Directories never treated as source: dependency caches, build output, VCS metadata and
/// coverage artifacts.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "bower_components",
    "vendor",
    "dist",
    "build",
    "out",
    "target",
    "bin",
    "obj",
    "coverage",
    ".nyc_output",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".next",
    ".nuxt",
    ".turbo",
    ".cache",
    ".gradle",
    ".idea",
    ".vscode",
];

/// Generated or bundled files that would only add noise.
pub const IGNORED_FILE_SUFFIXES: &[&str] = &[
    ".min.js",
    ".min.mjs",
    ".bundle.js",
    ".chunk.js",
    ".pb.go",
    ".g.cs",
    ".designer.cs",
];

#[must_use]
pub fn is_ignored_dir(name: &str) -> bool {
    IGNORED_DIRS.contains(&name)
}

#[must_use]
pub fn is_ignored_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IGNORED_FILE_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// Repo-relative, `/`-separated form of `path`. Returns `None` if `path` is outside `root`.
#[must_use]
pub fn relative_posix(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(os) => Some(os.to_string_lossy()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Trim leading `./` and surrounding slashes so prefixes compare segment-wise.
#[must_use]
pub fn normalize_rel(path: &str) -> &str {
    let p = path.trim_start_matches("./").trim_matches('/');
    if p == "." { "" } else { p }
}
