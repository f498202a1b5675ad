//! Regex boundary detectors for common languages

use regex::Regex;
use std::sync::Arc;

use super::{BoundaryDetector, BoundaryKind, LineBoundary};

/// Names that look like calls or control flow, never definitions
const NOT_DEFINITIONS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "else", "function", "new", "sizeof",
    "match", "when",
];

/// Line-oriented detector driven by one container and one function regex
///
/// Each regex reports its name in the first non-empty capture group; a Go
/// style receiver may be captured in the group named `owner`.
pub struct RegexDetector {
    language: &'static str,
    container: Option<Regex>,
    function: Regex,
}

impl RegexDetector {
    /// Build a detector from pattern strings
    pub fn new(
        language: &'static str,
        container: Option<&str>,
        function: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            language,
            container: container.map(Regex::new).transpose()?,
            function: Regex::new(function)?,
        })
    }

    fn first_name(caps: &regex::Captures<'_>) -> Option<String> {
        let owner = caps.name("owner").map(|m| m.range());
        caps.iter()
            .skip(1)
            .flatten()
            .find(|m| Some(m.range()) != owner && !m.as_str().is_empty())
            .map(|m| m.as_str().to_string())
            .filter(|name| !NOT_DEFINITIONS.contains(&name.as_str()))
    }
}

impl BoundaryDetector for RegexDetector {
    fn language(&self) -> &'static str {
        self.language
    }

    fn detect(&self, line: &str) -> Option<LineBoundary> {
        if let Some(container) = &self.container
            && let Some(caps) = container.captures(line)
            && let Some(name) = Self::first_name(&caps)
        {
            return Some(LineBoundary {
                kind: BoundaryKind::Container,
                name,
                owner: None,
            });
        }
        let caps = self.function.captures(line)?;
        let name = Self::first_name(&caps)?;
        Some(LineBoundary {
            kind: BoundaryKind::Function,
            name,
            owner: caps.name("owner").map(|m| m.as_str().to_string()),
        })
    }
}

/// Built-in detectors and the extensions they serve
pub(crate) fn builtin_detectors() -> Vec<(&'static [&'static str], Arc<dyn BoundaryDetector>)> {
    let specs: [(&'static [&'static str], &'static str, &'static str, &'static str); 8] = [
        (
            &["py", "pyi"],
            "python",
            r"^\s*class\s+([A-Za-z_]\w*)\s*[:\(]",
            r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(",
        ),
        (
            &["js", "jsx", "mjs", "cjs", "ts", "tsx"],
            "javascript",
            r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)",
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)|^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>|^\s+(?:static\s+)?(?:async\s+)?([A-Za-z_$][\w$]*)\s*\([^)]*\)\s*\{\s*$",
        ),
        (
            &["rs"],
            "rust",
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|mod|impl(?:<[^>]*>)?)\s+(?:[\w:<>, ]+\s+for\s+)?([A-Za-z_]\w*)",
            r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_]\w*)"#,
        ),
        (
            &["go"],
            "go",
            r"^type\s+([A-Za-z_]\w*)\s+(?:struct|interface)",
            r"^func\s+(?:\(\s*\w*\s*\*?(?P<owner>[A-Za-z_]\w*)[^)]*\)\s*)?([A-Za-z_]\w*)\s*[\(\[]",
        ),
        (
            &["java", "cs", "scala"],
            "java",
            r"^\s*(?:(?:public|private|protected|abstract|final|static|sealed|partial|internal)\s+)*(?:class|interface|enum|record)\s+([A-Za-z_]\w*)",
            r"^\s*(?:(?:public|private|protected|static|final|abstract|synchronized|override|async|virtual|internal)\s+)+[\w<>\[\],.?\s]*?\s([A-Za-z_]\w*)\s*\(",
        ),
        (
            &["kt", "kts"],
            "kotlin",
            r"^\s*(?:(?:data|sealed|abstract|open|private|internal|public|enum)\s+)*(?:class|object|interface)\s+([A-Za-z_]\w*)",
            r"^\s*(?:(?:private|public|internal|protected|override|suspend|inline|open)\s+)*fun\s+(?:<[^>]*>\s*)?(?:[\w.]+\.)?([A-Za-z_]\w*)\s*\(",
        ),
        (
            &["rb"],
            "ruby",
            r"^\s*(?:class|module)\s+([A-Z]\w*)",
            r"^\s*def\s+(?:self\.)?([A-Za-z_]\w*[?!]?)",
        ),
        (
            &["c", "h", "cpp", "cc", "cxx", "hpp", "hh"],
            "c",
            r"^\s*(?:class|struct)\s+([A-Za-z_]\w*)\s*(?::[^{;]*)?\{?\s*$",
            r"^(?:[\w:*&<>]+\s+)+\**([A-Za-z_][\w:]*)\s*\([^;]*$",
        ),
    ];

    specs
        .into_iter()
        .map(|(extensions, language, container, function)| {
            let detector = RegexDetector::new(language, Some(container), function)
                .expect("built-in boundary patterns are valid regexes");
            (extensions, Arc::new(detector) as Arc<dyn BoundaryDetector>)
        })
        .collect()
}
