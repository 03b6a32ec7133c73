//! Language detection by file extension.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    TypeScript,
    JavaScript,
    Python,
    Go,
    Rust,
    Java,
    Kotlin,
    CSharp,
    Php,
    Swift,
    C,
    Cpp,
    Scala,
}

/// How a language delimits declaration bodies, which decides the end-line heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStyle {
    Brace,
    Indent,
}

impl Lang {
    /// Identifier stored on file nodes.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Java => "java",
            Self::Kotlin => "kotlin",
            Self::CSharp => "csharp",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Scala => "scala",
        }
    }

    #[must_use]
    pub fn block_style(self) -> BlockStyle {
        match self {
            Self::Python => BlockStyle::Indent,
            _ => BlockStyle::Brace,
        }
    }

    /// Prefix of a line comment, used to skip commented-out declarations.
    #[must_use]
    pub fn line_comment(self) -> &'static str {
        match self {
            Self::Python => "#",
            _ => "//",
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect language from file extension.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "ts" | "tsx" | "mts" | "cts" => Some(Lang::TypeScript),
        "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
        "py" | "pyi" => Some(Lang::Python),
        "go" => Some(Lang::Go),
        "rs" => Some(Lang::Rust),
        "java" => Some(Lang::Java),
        "kt" | "kts" => Some(Lang::Kotlin),
        "cs" => Some(Lang::CSharp),
        "php" => Some(Lang::Php),
        "swift" => Some(Lang::Swift),
        "c" | "h" => Some(Lang::C),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some(Lang::Cpp),
        "scala" | "sc" => Some(Lang::Scala),
        _ => None,
    }
}
