//! Per-language declaration pattern tables.
//!
//! Patterns are tried in table order against a single line; the first match wins. Every pattern
//! that yields a symbol exposes a `name` capture; member patterns may also expose `ret` (the
//! token before the name), which is checked against [`KEYWORDS`] to drop statements such as
//! `return foo(x) {`.

use std::sync::LazyLock;

use regex::Regex;

use crate::extractor::SymbolKind;
use crate::languages::Lang;

/// Words that can sit in a name or return-type position but never name a declaration.
pub(crate) const KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "else", "do", "try", "new", "throw",
    "function", "sizeof", "typeof", "delete", "await", "yield", "func", "var", "let", "const",
    "case", "default", "using", "lock", "foreach", "in", "is", "as", "goto", "with", "match",
];

pub(crate) struct DeclPattern {
    /// `None` for pure containers such as Rust `impl` or Swift `extension` blocks.
    pub kind: Option<SymbolKind>,
    pub regex: Regex,
    /// Declarations nested inside this block may be methods.
    pub container: bool,
    /// Only considered on lines inside a container block.
    pub member_only: bool,
}

fn decl(kind: SymbolKind, pattern: &str) -> DeclPattern {
    DeclPattern {
        kind: Some(kind),
        regex: Regex::new(pattern).expect("declaration regex is valid"),
        container: false,
        member_only: false,
    }
}

fn block(pattern: &str) -> DeclPattern {
    DeclPattern {
        kind: None,
        regex: Regex::new(pattern).expect("declaration regex is valid"),
        container: true,
        member_only: false,
    }
}

impl DeclPattern {
    fn container(mut self) -> Self {
        self.container = true;
        self
    }

    fn member(mut self) -> Self {
        self.member_only = true;
        self
    }
}

const JS_ID: &str = r"[A-Za-z_$][\w$]*";

static TS_JS: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        decl(
            SymbolKind::Class,
            &format!(r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?class\s+(?P<name>{JS_ID})"),
        )
        .container(),
        decl(
            SymbolKind::Interface,
            &format!(r"^\s*(?:export\s+)?(?:declare\s+)?interface\s+(?P<name>{JS_ID})"),
        ),
        decl(
            SymbolKind::Type,
            &format!(r"^\s*(?:export\s+)?(?:declare\s+)?type\s+(?P<name>{JS_ID})\s*(?:<[^=]*>)?\s*="),
        ),
        decl(
            SymbolKind::Enum,
            &format!(r"^\s*(?:export\s+)?(?:declare\s+)?(?:const\s+)?enum\s+(?P<name>{JS_ID})"),
        ),
        decl(
            SymbolKind::Function,
            &format!(r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>{JS_ID})"),
        ),
        decl(
            SymbolKind::Function,
            &format!(r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>{JS_ID})\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=]+)?=>|{JS_ID}\s*=>)"),
        ),
        decl(
            SymbolKind::Method,
            &format!(r"^\s+(?:(?:public|private|protected|static|readonly|async|override|abstract|get|set)\s+)*\*?(?P<name>#?{JS_ID})\s*(?:<[^()]*>)?\s*\([^;]*\)\s*(?::\s*[^{{;=]+)?\{{.*$"),
        )
        .member(),
        decl(
            SymbolKind::Method,
            &format!(r"^\s+(?:(?:public|private|protected|static|readonly|override)\s+)*(?P<name>#?{JS_ID})\s*(?::[^=]+)?=\s*(?:async\s+)?(?:\([^)]*\)|{JS_ID})\s*(?::[^=]+)?=>"),
        )
        .member(),
    ]
});

static PYTHON: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        decl(SymbolKind::Class, r"^[ \t]*class\s+(?P<name>\w+)").container(),
        decl(SymbolKind::Function, r"^[ \t]*(?:async\s+)?def\s+(?P<name>\w+)"),
    ]
});

static GO: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        decl(SymbolKind::Method, r"^func\s*\([^)]*\)\s*(?P<name>\w+)"),
        decl(SymbolKind::Function, r"^func\s+(?P<name>\w+)"),
        decl(
            SymbolKind::Struct,
            r"^type\s+(?P<name>\w+)(?:\[[^\]]*\])?\s+struct\b",
        ),
        decl(
            SymbolKind::Interface,
            r"^type\s+(?P<name>\w+)(?:\[[^\]]*\])?\s+interface\b",
        ),
        decl(
            SymbolKind::Type,
            r"^type\s+(?P<name>\w+)(?:\[[^\]]*\])?\s+=?\s*[\w.*\[\]]",
        ),
    ]
});

const RUST_VIS: &str = r"(?:pub(?:\([^)]*\))?\s+)?";

static RUST: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        block(r"^\s*(?:unsafe\s+)?impl\b"),
        decl(
            SymbolKind::Trait,
            &format!(r"^\s*{RUST_VIS}(?:unsafe\s+)?trait\s+(?P<name>\w+)"),
        )
        .container(),
        decl(SymbolKind::Struct, &format!(r"^\s*{RUST_VIS}struct\s+(?P<name>\w+)")),
        decl(SymbolKind::Enum, &format!(r"^\s*{RUST_VIS}enum\s+(?P<name>\w+)")),
        decl(SymbolKind::Type, &format!(r"^\s*{RUST_VIS}type\s+(?P<name>\w+)")),
        decl(
            SymbolKind::Function,
            &format!(r#"^\s*{RUST_VIS}(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+(?P<name>\w+)"#),
        ),
    ]
});

const JAVA_MODS: &str = r"(?:(?:public|private|protected|static|final|abstract|sealed|non-sealed|strictfp|synchronized|native|default)\s+)*";

static JAVA: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        decl(SymbolKind::Enum, &format!(r"^\s*{JAVA_MODS}enum\s+(?P<name>\w+)")).container(),
        decl(
            SymbolKind::Interface,
            &format!(r"^\s*{JAVA_MODS}@?interface\s+(?P<name>\w+)"),
        )
        .container(),
        decl(
            SymbolKind::Class,
            &format!(r"^\s*{JAVA_MODS}(?:class|record)\s+(?P<name>\w+)"),
        )
        .container(),
        decl(
            SymbolKind::Method,
            &format!(r"^\s+{JAVA_MODS}(?:<[^>]+>\s+)?(?P<ret>[\w.]+(?:<[^()]*>)?(?:\[\])*)\s+(?P<name>\w+)\s*\([^;]*\)\s*(?:throws\s+[\w.,\s]+)?(?:\{{.*)?$"),
        )
        .member(),
    ]
});

const KOTLIN_MODS: &str = r"(?:(?:public|private|internal|protected|open|abstract|sealed|data|inner|annotation|value|companion|override|suspend|inline|operator|infix|tailrec|external)\s+)*";

static KOTLIN: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        decl(
            SymbolKind::Enum,
            &format!(r"^\s*{KOTLIN_MODS}enum\s+class\s+(?P<name>\w+)"),
        )
        .container(),
        decl(
            SymbolKind::Interface,
            &format!(r"^\s*{KOTLIN_MODS}(?:fun\s+)?interface\s+(?P<name>\w+)"),
        )
        .container(),
        decl(
            SymbolKind::Class,
            &format!(r"^\s*{KOTLIN_MODS}(?:class|object)\s+(?P<name>\w+)"),
        )
        .container(),
        decl(
            SymbolKind::Function,
            &format!(r"^\s*{KOTLIN_MODS}fun\s+(?:<[^>]+>\s*)?(?:[\w.]+\.)?(?P<name>\w+)\s*\("),
        ),
        decl(
            SymbolKind::Type,
            &format!(r"^\s*{KOTLIN_MODS}typealias\s+(?P<name>\w+)"),
        ),
    ]
});

const CS_MODS: &str = r"(?:(?:public|private|protected|internal|static|abstract|sealed|partial|readonly|unsafe|new|virtual|override|async|extern|file|required)\s+)*";

static CSHARP: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        decl(
            SymbolKind::Interface,
            &format!(r"^\s*{CS_MODS}interface\s+(?P<name>\w+)"),
        )
        .container(),
        decl(SymbolKind::Enum, &format!(r"^\s*{CS_MODS}enum\s+(?P<name>\w+)")).container(),
        decl(
            SymbolKind::Struct,
            &format!(r"^\s*{CS_MODS}(?:record\s+)?struct\s+(?P<name>\w+)"),
        )
        .container(),
        decl(
            SymbolKind::Class,
            &format!(r"^\s*{CS_MODS}(?:class|record)\s+(?P<name>\w+)"),
        )
        .container(),
        decl(
            SymbolKind::Method,
            &format!(r"^\s+{CS_MODS}(?P<ret>[\w.]+(?:<[^()]*>)?(?:\[\])?\??)\s+(?P<name>\w+)\s*(?:<[^()]*>)?\s*\([^;]*\)\s*(?:where\s+[^{{]*)?(?:\{{.*|=>.*)?$"),
        )
        .member(),
    ]
});

static PHP: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        decl(SymbolKind::Interface, r"^\s*interface\s+(?P<name>\w+)").container(),
        decl(SymbolKind::Trait, r"^\s*trait\s+(?P<name>\w+)").container(),
        decl(SymbolKind::Enum, r"^\s*enum\s+(?P<name>\w+)").container(),
        decl(
            SymbolKind::Class,
            r"^\s*(?:(?:abstract|final|readonly)\s+)*class\s+(?P<name>\w+)",
        )
        .container(),
        decl(
            SymbolKind::Function,
            r"^\s*(?:(?:public|private|protected|static|abstract|final)\s+)*function\s+&?(?P<name>\w+)\s*\(",
        ),
    ]
});

const SWIFT_MODS: &str = r"(?:(?:@\w+|public|private|fileprivate|internal|open|final|static|class|override|mutating|nonmutating|convenience|required|indirect)\s+)*";

static SWIFT: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        decl(
            SymbolKind::Interface,
            &format!(r"^\s*{SWIFT_MODS}protocol\s+(?P<name>\w+)"),
        )
        .container(),
        block(&format!(r"^\s*{SWIFT_MODS}extension\s+\w+")),
        decl(SymbolKind::Struct, &format!(r"^\s*{SWIFT_MODS}struct\s+(?P<name>\w+)")).container(),
        decl(SymbolKind::Enum, &format!(r"^\s*{SWIFT_MODS}enum\s+(?P<name>\w+)")).container(),
        decl(SymbolKind::Function, &format!(r"^\s*{SWIFT_MODS}func\s+(?P<name>\w+)")),
        decl(
            SymbolKind::Class,
            &format!(r"^\s*{SWIFT_MODS}(?:class|actor)\s+(?P<name>\w+)"),
        )
        .container(),
        decl(
            SymbolKind::Type,
            &format!(r"^\s*{SWIFT_MODS}typealias\s+(?P<name>\w+)"),
        ),
    ]
});

static C: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        decl(
            SymbolKind::Struct,
            r"^\s*(?:typedef\s+)?struct\s+(?P<name>\w+)\s*(?:\{.*)?$",
        ),
        decl(
            SymbolKind::Enum,
            r"^\s*(?:typedef\s+)?enum\s+(?P<name>\w+)\s*(?:\{.*)?$",
        ),
        decl(
            SymbolKind::Function,
            r"^(?:(?:static|inline|extern|const|unsigned|signed|volatile)\s+)*(?P<ret>[A-Za-z_]\w*)[\w\s\*]*?[\s\*]+(?P<name>[A-Za-z_]\w*)\s*\([^;]*$",
        ),
    ]
});

static CPP: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        decl(
            SymbolKind::Class,
            r"^\s*(?:template\s*<[^>]*>\s*)?class\s+(?:[A-Z_]+\s+)?(?P<name>\w+)\s*(?:final\s*)?(?::[^;{]*)?(?:\{.*)?$",
        )
        .container(),
        decl(
            SymbolKind::Struct,
            r"^\s*(?:template\s*<[^>]*>\s*)?(?:typedef\s+)?struct\s+(?P<name>\w+)\s*(?::[^;{]*)?(?:\{.*)?$",
        )
        .container(),
        decl(
            SymbolKind::Enum,
            r"^\s*enum\s+(?:class\s+|struct\s+)?(?P<name>\w+)\s*(?::\s*\w+\s*)?(?:\{.*)?$",
        ),
        decl(
            SymbolKind::Function,
            r"^\s*(?:template\s*<[^>]*>\s*)?(?:(?:static|inline|virtual|explicit|constexpr|extern|friend|const|unsigned)\s+)*(?P<ret>[\w:<>,\*&~]+)[\w\s\*&:<>,]*?[\s\*&]+(?:\w+::)*(?P<name>~?\w+)\s*\([^;]*$",
        ),
    ]
});

const SCALA_MODS: &str = r"(?:(?:abstract|final|sealed|case|private|protected|implicit|override|inline|opaque|lazy)(?:\[[^\]]*\])?\s+)*";

static SCALA: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        decl(SymbolKind::Trait, &format!(r"^\s*{SCALA_MODS}trait\s+(?P<name>\w+)")).container(),
        decl(SymbolKind::Enum, &format!(r"^\s*{SCALA_MODS}enum\s+(?P<name>\w+)")).container(),
        decl(
            SymbolKind::Class,
            &format!(r"^\s*{SCALA_MODS}(?:class|object)\s+(?P<name>\w+)"),
        )
        .container(),
        decl(SymbolKind::Function, &format!(r"^\s*{SCALA_MODS}def\s+(?P<name>\w+)")),
        decl(SymbolKind::Type, &format!(r"^\s*{SCALA_MODS}type\s+(?P<name>\w+)")),
    ]
});

pub(crate) fn patterns(lang: Lang) -> &'static [DeclPattern] {
    match lang {
        Lang::TypeScript | Lang::JavaScript => &TS_JS,
        Lang::Python => &PYTHON,
        Lang::Go => &GO,
        Lang::Rust => &RUST,
        Lang::Java => &JAVA,
        Lang::Kotlin => &KOTLIN,
        Lang::CSharp => &CSHARP,
        Lang::Php => &PHP,
        Lang::Swift => &SWIFT,
        Lang::C => &C,
        Lang::Cpp => &CPP,
        Lang::Scala => &SCALA,
    }
}

/// Whether a function found inside a container block is reported as a method. Languages with
/// dedicated member patterns, or without nested containers, keep the declared kind.
pub(crate) fn nests_methods(lang: Lang) -> bool {
    !matches!(
        lang,
        Lang::TypeScript | Lang::JavaScript | Lang::Go | Lang::C
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Lang; 13] = [
        Lang::TypeScript,
        Lang::JavaScript,
        Lang::Python,
        Lang::Go,
        Lang::Rust,
        Lang::Java,
        Lang::Kotlin,
        Lang::CSharp,
        Lang::Php,
        Lang::Swift,
        Lang::C,
        Lang::Cpp,
        Lang::Scala,
    ];

    #[test]
    fn every_table_compiles_and_names_symbols() {
        for lang in ALL {
            let table = patterns(lang);
            assert!(!table.is_empty(), "{lang}");
            for p in table {
                if p.kind.is_some() {
                    assert!(
                        p.regex.capture_names().any(|n| n == Some("name")),
                        "{lang}: {}",
                        p.regex.as_str()
                    );
                }
            }
        }
    }

    fn first_match(lang: Lang, line: &str) -> Option<(Option<SymbolKind>, String)> {
        patterns(lang).iter().find_map(|p| {
            let caps = p.regex.captures(line)?;
            let name = caps.name("name").map(|m| m.as_str().to_owned()).unwrap_or_default();
            Some((p.kind, name))
        })
    }

    #[test]
    fn ts_declarations() {
        assert_eq!(
            first_match(Lang::TypeScript, "export default async function handler(req) {"),
            Some((Some(SymbolKind::Function), "handler".into()))
        );
        assert_eq!(
            first_match(Lang::TypeScript, "export const useThing = async (a: number) => {"),
            Some((Some(SymbolKind::Function), "useThing".into()))
        );
        assert_eq!(
            first_match(Lang::TypeScript, "export type Id = string;"),
            Some((Some(SymbolKind::Type), "Id".into()))
        );
    }

    #[test]
    fn go_method_before_function() {
        assert_eq!(
            first_match(Lang::Go, "func (s *Server) Start(ctx context.Context) error {"),
            Some((Some(SymbolKind::Method), "Start".into()))
        );
        assert_eq!(
            first_match(Lang::Go, "func main() {"),
            Some((Some(SymbolKind::Function), "main".into()))
        );
    }

    #[test]
    fn rust_impl_is_container_only() {
        assert_eq!(first_match(Lang::Rust, "impl<T> Foo<T> {"), Some((None, String::new())));
        assert_eq!(
            first_match(Lang::Rust, "pub(crate) async fn run(&self) -> Result<()> {"),
            Some((Some(SymbolKind::Function), "run".into()))
        );
    }

    #[test]
    fn c_prototype_is_not_a_definition() {
        assert!(first_match(Lang::C, "int add(int a, int b);").is_none());
        assert_eq!(
            first_match(Lang::C, "static int add(int a, int b) {"),
            Some((Some(SymbolKind::Function), "add".into()))
        );
    }
}
