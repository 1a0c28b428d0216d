// SPDX-License-Identifier: MIT
//! Language detection by file extension.
//!
//! Unsupported extensions are excluded from analysis upstream; everything
//! here is pure lookup, no I/O.

use serde::{Deserialize, Serialize};

/// Languages the pipeline knows about. Only JavaScript and TypeScript get a
/// structural parse; the rest rely on textual pattern rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Java,
    Python,
    Php,
    CSharp,
    Sql,
    Go,
    Ruby,
    Swift,
    Kotlin,
    Rust,
    C,
    Cpp,
    Scala,
    Shell,
    Dart,
    R,
    Terraform,
    Dockerfile,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::Python => "python",
            Language::Php => "php",
            Language::CSharp => "csharp",
            Language::Sql => "sql",
            Language::Go => "go",
            Language::Ruby => "ruby",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Rust => "rust",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Scala => "scala",
            Language::Shell => "shell",
            Language::Dart => "dart",
            Language::R => "r",
            Language::Terraform => "terraform",
            Language::Dockerfile => "dockerfile",
        }
    }

    /// Human-readable name used in AI prompts.
    pub fn display_name(self) -> &'static str {
        match self {
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
            Language::Java => "Java",
            Language::Python => "Python",
            Language::Php => "PHP",
            Language::CSharp => "C#",
            Language::Sql => "SQL",
            Language::Go => "Go",
            Language::Ruby => "Ruby",
            Language::Swift => "Swift",
            Language::Kotlin => "Kotlin",
            Language::Rust => "Rust",
            Language::C => "C",
            Language::Cpp => "C++",
            Language::Scala => "Scala",
            Language::Shell => "Shell",
            Language::Dart => "Dart",
            Language::R => "R",
            Language::Terraform => "Terraform",
            Language::Dockerfile => "Dockerfile",
        }
    }

    /// Whether the structural (parse-tree) stage supports this language.
    pub fn has_structural_parser(self) -> bool {
        matches!(self, Language::JavaScript | Language::TypeScript)
    }
}

/// Detect the language of a file from its path. Returns `None` for
/// unsupported extensions (the file is excluded from analysis).
pub fn detect_language(path: &str) -> Option<Language> {
    // Dockerfile has no extension.
    let base = path.rsplit('/').next().unwrap_or(path);
    if base == "Dockerfile" || base.starts_with("Dockerfile.") {
        return Some(Language::Dockerfile);
    }

    let ext = file_extension(path)?;
    let lang = match ext.to_lowercase().as_str() {
        "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
        "ts" | "tsx" => Language::TypeScript,
        "java" => Language::Java,
        "py" | "pyw" | "pyi" => Language::Python,
        "php" | "phtml" | "php3" | "php4" | "php5" => Language::Php,
        "cs" | "csx" => Language::CSharp,
        "sql" => Language::Sql,
        "go" => Language::Go,
        "rb" | "rbw" | "rake" => Language::Ruby,
        "swift" => Language::Swift,
        "kt" | "kts" | "ktm" => Language::Kotlin,
        "rs" => Language::Rust,
        "c" | "h" => Language::C,
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" => Language::Cpp,
        "scala" | "sc" => Language::Scala,
        "sh" | "bash" | "zsh" => Language::Shell,
        "dart" => Language::Dart,
        "r" => Language::R,
        "tf" | "tfvars" => Language::Terraform,
        _ => return None,
    };
    Some(lang)
}

/// Whether a file is eligible for analysis at all.
pub fn is_supported(path: &str) -> bool {
    detect_language(path).is_some()
}

fn file_extension(path: &str) -> Option<&str> {
    let base = path.rsplit('/').next().unwrap_or(path);
    match base.rfind('.') {
        Some(idx) if idx + 1 < base.len() => Some(&base[idx + 1..]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_extensions() {
        assert_eq!(detect_language("src/index.ts"), Some(Language::TypeScript));
        assert_eq!(detect_language("app.jsx"), Some(Language::JavaScript));
        assert_eq!(detect_language("main.go"), Some(Language::Go));
        assert_eq!(detect_language("schema.SQL"), Some(Language::Sql));
        assert_eq!(detect_language("deploy/main.tf"), Some(Language::Terraform));
    }

    #[test]
    fn dockerfile_without_extension() {
        assert_eq!(detect_language("Dockerfile"), Some(Language::Dockerfile));
        assert_eq!(
            detect_language("docker/Dockerfile.prod"),
            Some(Language::Dockerfile)
        );
    }

    #[test]
    fn unknown_extensions_are_unsupported() {
        assert_eq!(detect_language("README.md"), None);
        assert_eq!(detect_language("noextension"), None);
        assert_eq!(detect_language("archive.tar.gz"), None);
        assert!(!is_supported("image.png"));
    }

    #[test]
    fn only_js_ts_have_structural_parsers() {
        assert!(Language::JavaScript.has_structural_parser());
        assert!(Language::TypeScript.has_structural_parser());
        assert!(!Language::Python.has_structural_parser());
        assert!(!Language::Go.has_structural_parser());
    }
}
