//! Repository walk and line-pattern symbol extraction.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::ids::{content_hash, stable_symbol_id};
use crate::languages::{BlockStyle, Lang, detect_language};
use crate::namespaces::{CodeNamespace, resolve_file_namespace};
use crate::paths::{is_ignored_dir, is_ignored_file, relative_posix};
use crate::patterns::{KEYWORDS, nests_methods, patterns};

/// Files above this size are skipped.
pub const MAX_FILE_BYTES: u64 = 1024 * 1024;
/// Upper bound on lines scanned to find a declaration's end.
pub const SCAN_WINDOW: usize = 2000;
pub const MAX_SIGNATURE_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Enum,
    Type,
    Struct,
    Trait,
}

impl SymbolKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::Type => "type",
            Self::Struct => "struct",
            Self::Trait => "trait",
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIr {
    /// Repo-relative, `/`-separated.
    pub path: String,
    pub language: Lang,
    pub content_hash: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolIr {
    pub stable_id: String,
    pub file_path: String,
    pub namespace: String,
    pub kind: SymbolKind,
    pub name: String,
    /// 1-based, inclusive.
    pub start_line: u32,
    pub end_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    TooLarge,
    NotUtf8,
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOutput {
    pub files: Vec<FileIr>,
    pub symbols: Vec<SymbolIr>,
    pub skipped: Vec<SkippedFile>,
}

/// Walk `checkout` and extract files and symbols. Unreadable, oversized and non-UTF-8 files are
/// recorded in [`ParseOutput::skipped`] and never abort the walk.
///
/// # Errors
///
/// Returns [`IndexError::NotADirectory`] if `checkout` is not a directory.
pub fn parse_repository(
    repo_id: &str,
    checkout: &Path,
    namespaces: &[CodeNamespace],
) -> Result<ParseOutput> {
    if !checkout.is_dir() {
        return Err(IndexError::NotADirectory(checkout.to_path_buf()));
    }

    let walker = ignore::WalkBuilder::new(checkout)
        .hidden(true)
        .git_ignore(true)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                !is_ignored_dir(&name)
            } else {
                !is_ignored_file(&name)
            }
        })
        .build();

    let mut out = ParseOutput::default();
    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let Some(lang) = detect_language(entry.path()) else {
            continue;
        };
        let Some(rel) = relative_posix(checkout, entry.path()) else {
            continue;
        };

        let too_large = entry
            .metadata()
            .is_ok_and(|m| m.len() > MAX_FILE_BYTES);
        if too_large {
            tracing::debug!(path = %rel, "skipping oversized file");
            out.skipped.push(SkippedFile {
                path: rel,
                reason: SkipReason::TooLarge,
            });
            continue;
        }

        let bytes = match std::fs::read(entry.path()) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path = %rel, "failed to read file: {e}");
                out.skipped.push(SkippedFile {
                    path: rel,
                    reason: SkipReason::Unreadable,
                });
                continue;
            }
        };
        let hash = content_hash(&bytes);
        let Ok(source) = String::from_utf8(bytes) else {
            tracing::debug!(path = %rel, "skipping non-UTF-8 file");
            out.skipped.push(SkippedFile {
                path: rel,
                reason: SkipReason::NotUtf8,
            });
            continue;
        };

        let namespace = resolve_file_namespace(&rel, namespaces).to_owned();
        out.symbols
            .extend(extract_symbols(repo_id, &rel, &namespace, lang, &source));
        out.files.push(FileIr {
            path: rel,
            language: lang,
            content_hash: hash,
            namespace,
        });
    }

    tracing::debug!(
        repo_id,
        files = out.files.len(),
        symbols = out.symbols.len(),
        skipped = out.skipped.len(),
        "extraction finished"
    );
    Ok(out)
}

/// Extract declarations from one file's source.
#[must_use]
pub fn extract_symbols(
    repo_id: &str,
    file_path: &str,
    namespace: &str,
    lang: Lang,
    source: &str,
) -> Vec<SymbolIr> {
    let lines: Vec<&str> = source.lines().collect();
    let comment = lang.line_comment();
    let mut containers: Vec<(usize, usize)> = Vec::new();
    let mut symbols = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty()
            || trimmed.starts_with(comment)
            || trimmed.starts_with("/*")
            || trimmed.starts_with('*')
        {
            continue;
        }
        let inside = containers.iter().any(|&(s, e)| s < idx && idx <= e);

        for pattern in patterns(lang) {
            if pattern.member_only && !inside {
                continue;
            }
            let Some(caps) = pattern.regex.captures(line) else {
                continue;
            };
            let name = caps.name("name").map(|m| m.as_str());
            if name.is_some_and(|n| KEYWORDS.contains(&n))
                || caps
                    .name("ret")
                    .is_some_and(|r| KEYWORDS.contains(&r.as_str()))
            {
                continue;
            }

            let end = match lang.block_style() {
                BlockStyle::Brace => brace_block_end(&lines, idx, lang),
                BlockStyle::Indent => indent_block_end(&lines, idx, lang),
            };
            if pattern.container {
                containers.push((idx, end));
            }
            if let (Some(kind), Some(name)) = (pattern.kind, name) {
                let kind = if kind == SymbolKind::Function && inside && nests_methods(lang) {
                    SymbolKind::Method
                } else {
                    kind
                };
                let start_line = line_number(idx);
                symbols.push(SymbolIr {
                    stable_id: stable_symbol_id(repo_id, file_path, kind, name, start_line),
                    file_path: file_path.to_owned(),
                    namespace: namespace.to_owned(),
                    kind,
                    name: name.to_owned(),
                    start_line,
                    end_line: line_number(end),
                    signature: signature(trimmed),
                });
            }
            break;
        }
    }
    symbols
}

fn line_number(idx: usize) -> u32 {
    u32::try_from(idx + 1).unwrap_or(u32::MAX)
}

fn signature(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_SIGNATURE_CHARS).collect())
}

/// Characters of `line` outside string literals and before a `//` comment.
///
/// In Rust a `'` opens a char literal only when it closes right away (`'{'`, `'\n'`,
/// `'\u{7f}'`); otherwise it starts a lifetime or loop label and is dropped on its own.
fn code_chars(line: &str, lang: Lang) -> Vec<char> {
    let chars: Vec<char> = line.chars().collect();
    let mut out = Vec::with_capacity(chars.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' if lang == Lang::Rust => {
                if let Some(len) = rust_char_literal_len(&chars[i - 1..]) {
                    i += len - 1;
                }
            }
            '"' | '\'' | '`' => quote = Some(c),
            '/' if chars.get(i) == Some(&'/') => break,
            _ => out.push(c),
        }
    }
    out
}

/// Length of the Rust char literal at the start of `s` (which begins with `'`), if any.
fn rust_char_literal_len(s: &[char]) -> Option<usize> {
    match s.get(1)? {
        '\\' => s
            .iter()
            .enumerate()
            .skip(3)
            .take(10)
            .find(|&(_, &c)| c == '\'')
            .map(|(j, _)| j + 1),
        _ => (s.get(2) == Some(&'\'')).then_some(3),
    }
}

/// Line endings after which a declaration's header continues on the next line.
fn continues(line: &str) -> bool {
    let t = line.trim_end();
    ["(", ",", "=", "|", "&", "<", ":", "->", "=>", "extends", "implements", "where"]
        .iter()
        .any(|s| t.ends_with(s))
}

/// End index of a brace-delimited declaration starting at `start`.
///
/// Tracks `{`/`}` depth from the declaration line until it returns to zero after the first
/// opening brace. Declarations without a body (`;`-terminated, single-expression, aliases)
/// end on the last line of their header. Allman-style bodies opening on the next line are
/// followed.
fn brace_block_end(lines: &[&str], start: usize, lang: Lang) -> usize {
    let limit = lines.len().min(start + SCAN_WINDOW);
    let mut depth = 0usize;
    let mut parens = 0usize;
    let mut seen_open = false;

    for (i, line) in lines.iter().enumerate().take(limit).skip(start) {
        for c in code_chars(line, lang) {
            match c {
                '(' => parens += 1,
                ')' => parens = parens.saturating_sub(1),
                '{' => {
                    depth += 1;
                    seen_open = true;
                }
                '}' if seen_open => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return i;
                    }
                }
                ';' if !seen_open && parens == 0 => return i,
                _ => {}
            }
        }
        if !seen_open && parens == 0 && !continues(line) {
            let next_opens = lines[i + 1..limit]
                .iter()
                .map(|l| l.trim())
                .find(|l| !l.is_empty())
                .is_some_and(|l| l.starts_with('{'));
            if !next_opens {
                return i;
            }
        }
    }
    limit.saturating_sub(1).max(start)
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// End index of an indentation-delimited block: the last non-blank line before the first
/// non-blank line indented no deeper than the declaration. Header lines inside open brackets
/// belong to the declaration regardless of indentation.
fn indent_block_end(lines: &[&str], start: usize, lang: Lang) -> usize {
    let limit = lines.len().min(start + SCAN_WINDOW);
    let base = indent_width(lines[start]);
    let mut open: i32 = 0;
    let mut end = start;
    let mut in_header = true;

    for (i, line) in lines.iter().enumerate().take(limit).skip(start) {
        let trimmed = line.trim();
        if i > start {
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if !in_header && indent_width(line) <= base {
                break;
            }
            end = i;
        }
        if in_header {
            for c in code_chars(line, lang) {
                match c {
                    '(' | '[' | '{' => open += 1,
                    ')' | ']' | '}' => open -= 1,
                    _ => {}
                }
            }
            if open <= 0 {
                in_header = false;
            }
        }
    }
    end
}
