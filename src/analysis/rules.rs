// SPDX-License-Identifier: MIT
//! Security/pattern rule registry.
//!
//! Pure data: every rule is a regex matcher with a severity, category, stable
//! rule id, and optional CWE/OWASP mapping. Tables are keyed by detected
//! language — universal rules apply everywhere, language tables add on top.
//! Compiled once at startup into an immutable registry; no global mutable
//! state.
//!
//! The `regex` crate has no lookaround, so rules that need a "matches X but
//! not Y" shape carry a second `negate` pattern checked against the same
//! line.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::analysis::language::Language;
use crate::analysis::model::{Category, Severity};

// ─── Rule definition ──────────────────────────────────────────────────────────

/// Static definition of one pattern rule.
#[derive(Debug)]
pub struct RuleDef {
    /// Stable id used for policy disable/severity overrides.
    pub id: &'static str,
    pub name: &'static str,
    pub severity: Severity,
    pub category: Category,
    pub description: &'static str,
    pub suggested_fix: &'static str,
    pub cwe_id: Option<&'static str>,
    pub owasp_category: Option<&'static str>,
    pub pattern: &'static str,
    /// If set, a line matching `pattern` is still clean when this matches too.
    pub negate: Option<&'static str>,
}

/// A rule with its compiled regexes.
pub struct CompiledRule {
    pub def: &'static RuleDef,
    regex: Regex,
    negate: Option<Regex>,
}

impl CompiledRule {
    fn compile(def: &'static RuleDef) -> Self {
        // Table patterns are fixed at build time; a bad one is a programming
        // error caught by the registry test below.
        let regex = Regex::new(def.pattern).expect("rule table: invalid regex");
        let negate = def
            .negate
            .map(|p| Regex::new(p).expect("rule table: invalid negate regex"));
        Self { def, regex, negate }
    }

    /// Whether this rule flags the given line.
    pub fn matches(&self, line: &str) -> bool {
        if !self.regex.is_match(line) {
            return false;
        }
        match &self.negate {
            Some(neg) => !neg.is_match(line),
            None => true,
        }
    }
}

// ─── Universal rules (all languages) ──────────────────────────────────────────

const CWE_HARDCODED: Option<&str> = Some("CWE-798");
const OWASP_AUTH: Option<&str> = Some("A07:2021 – Identification and Authentication Failures");
const OWASP_CRYPTO: Option<&str> = Some("A02:2021 – Cryptographic Failures");
const OWASP_INJECTION: Option<&str> = Some("A03:2021 – Injection");
const OWASP_DESERIALIZATION: Option<&str> =
    Some("A08:2021 – Software and Data Integrity Failures");

static UNIVERSAL_RULES: &[RuleDef] = &[
    RuleDef {
        id: "hardcoded-password",
        name: "Hardcoded Password",
        severity: Severity::Critical,
        category: Category::Security,
        description: "Password is hardcoded in source code",
        suggested_fix: "Move password to environment variable or secure vault",
        cwe_id: CWE_HARDCODED,
        owasp_category: OWASP_AUTH,
        pattern: r#"(?i)password\s*[:=]\s*["'].+?["']"#,
        negate: None,
    },
    RuleDef {
        id: "hardcoded-api-key",
        name: "Hardcoded API Key",
        severity: Severity::Critical,
        category: Category::Security,
        description: "API key is hardcoded in source code",
        suggested_fix: "Move API key to environment variable or secure vault",
        cwe_id: CWE_HARDCODED,
        owasp_category: OWASP_AUTH,
        pattern: r#"(?i)api[_-]?key\s*[:=]\s*["'].+?["']"#,
        negate: None,
    },
    RuleDef {
        id: "hardcoded-secret",
        name: "Hardcoded Secret",
        severity: Severity::Critical,
        category: Category::Security,
        description: "Secret is hardcoded in source code",
        suggested_fix: "Move secret to environment variable or secure vault",
        cwe_id: CWE_HARDCODED,
        owasp_category: OWASP_AUTH,
        pattern: r#"(?i)secret\s*[:=]\s*["'].+?["']"#,
        negate: None,
    },
    RuleDef {
        id: "hardcoded-token",
        name: "Hardcoded Token",
        severity: Severity::Critical,
        category: Category::Security,
        description: "Token is hardcoded in source code",
        suggested_fix: "Move token to environment variable or secure vault",
        cwe_id: CWE_HARDCODED,
        owasp_category: OWASP_AUTH,
        pattern: r#"(?i)token\s*[:=]\s*["'].+?["']"#,
        negate: None,
    },
    RuleDef {
        id: "insecure-http",
        name: "Insecure HTTP Connection",
        severity: Severity::Medium,
        category: Category::Security,
        description: "HTTP connection is not encrypted",
        suggested_fix: "Use HTTPS instead of HTTP",
        cwe_id: Some("CWE-319"),
        owasp_category: OWASP_CRYPTO,
        pattern: r"(?i)http://",
        negate: Some(r"(?i)http://(localhost|127\.0\.0\.1)"),
    },
    RuleDef {
        id: "weak-hash-md5",
        name: "Weak Hash Algorithm (MD5)",
        severity: Severity::High,
        category: Category::Security,
        description: "MD5 is cryptographically broken",
        suggested_fix: "Use SHA-256 or stronger algorithms",
        cwe_id: Some("CWE-327"),
        owasp_category: OWASP_CRYPTO,
        pattern: r"(?i)\bmd5\s*\(",
        negate: None,
    },
    RuleDef {
        id: "weak-hash-sha1",
        name: "Weak Hash Algorithm (SHA1)",
        severity: Severity::High,
        category: Category::Security,
        description: "SHA1 is cryptographically broken",
        suggested_fix: "Use SHA-256 or stronger algorithms",
        cwe_id: Some("CWE-327"),
        owasp_category: OWASP_CRYPTO,
        pattern: r"(?i)\bsha1\s*\(",
        negate: None,
    },
    RuleDef {
        id: "secret-aws-key",
        name: "Possible AWS Access Key",
        severity: Severity::Critical,
        category: Category::Security,
        description: "String matches AWS access key format. Do not commit real keys.",
        suggested_fix: "Use environment variables or a secrets manager",
        cwe_id: CWE_HARDCODED,
        owasp_category: OWASP_AUTH,
        pattern: r"\bAKIA[A-Z0-9]{16}\b",
        negate: None,
    },
    RuleDef {
        id: "secret-github-token",
        name: "Possible GitHub Personal Access Token",
        severity: Severity::Critical,
        category: Category::Security,
        description: "String matches GitHub token format. Do not commit tokens.",
        suggested_fix: "Use CI secrets or environment variables",
        cwe_id: CWE_HARDCODED,
        owasp_category: OWASP_AUTH,
        pattern: r"\bghp_[a-zA-Z0-9]{36,}\b",
        negate: None,
    },
    RuleDef {
        id: "secret-jwt",
        name: "Possible JWT in source",
        severity: Severity::High,
        category: Category::Security,
        description: "JWT-like string in code. Tokens should not be hardcoded.",
        suggested_fix: "Issue and validate JWTs at runtime; do not store in code",
        cwe_id: CWE_HARDCODED,
        owasp_category: OWASP_AUTH,
        pattern: r"\beyJ[A-Za-z0-9_-]{20,}\.eyJ[A-Za-z0-9_-]{20,}\.[A-Za-z0-9_-]{10,}\b",
        negate: None,
    },
];

// ─── JavaScript / TypeScript ──────────────────────────────────────────────────

static JAVASCRIPT_RULES: &[RuleDef] = &[
    RuleDef {
        id: "js-sql-injection",
        name: "Potential SQL Injection",
        severity: Severity::High,
        category: Category::Security,
        description: "SQL query contains user input without parameterization",
        suggested_fix: "Use parameterized queries or prepared statements",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r#"(?i)query\s*\(\s*['"`].*?\$\{.*?\}.*?['"`]"#,
        negate: None,
    },
    RuleDef {
        id: "js-xss-innerhtml",
        name: "Potential XSS - innerHTML",
        severity: Severity::High,
        category: Category::Security,
        description: "innerHTML is set with user input without sanitization",
        suggested_fix: "Sanitize user input or use textContent",
        cwe_id: Some("CWE-79"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)innerHTML\s*=\s*.*\$\{",
        negate: None,
    },
    RuleDef {
        id: "js-xss-dangerously-set-innerhtml",
        name: "Potential XSS - dangerouslySetInnerHTML",
        severity: Severity::High,
        category: Category::Security,
        description: "dangerouslySetInnerHTML can lead to XSS attacks",
        suggested_fix: "Sanitize content or use safe alternatives",
        cwe_id: Some("CWE-79"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)dangerouslySetInnerHTML",
        negate: None,
    },
    RuleDef {
        id: "js-insecure-random",
        name: "Insecure Random Number Generation",
        severity: Severity::Medium,
        category: Category::Security,
        description: "Math.random() is not cryptographically secure",
        suggested_fix: "Use crypto.getRandomValues() or crypto.randomBytes()",
        cwe_id: Some("CWE-330"),
        owasp_category: OWASP_CRYPTO,
        pattern: r"Math\.random\(\)",
        negate: None,
    },
    RuleDef {
        id: "js-eval",
        name: "Use of eval()",
        severity: Severity::Critical,
        category: Category::Security,
        description: "eval() can execute arbitrary code",
        suggested_fix: "Use JSON.parse() or other safe alternatives",
        cwe_id: Some("CWE-95"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)\beval\s*\(",
        negate: None,
    },
];

// ─── Java ─────────────────────────────────────────────────────────────────────

static JAVA_RULES: &[RuleDef] = &[
    RuleDef {
        id: "java-sql-injection-concat",
        name: "Potential SQL Injection - String Concatenation",
        severity: Severity::Critical,
        category: Category::Security,
        description: "SQL query uses string concatenation instead of PreparedStatement",
        suggested_fix: "Use PreparedStatement with parameterized queries",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r#"(?i)Statement\s*\.\s*executeQuery\s*\(\s*["'].*?\+.*?["']"#,
        negate: None,
    },
    RuleDef {
        id: "java-sql-injection-execute",
        name: "Potential SQL Injection - execute()",
        severity: Severity::Critical,
        category: Category::Security,
        description: "SQL execute() uses string concatenation",
        suggested_fix: "Use PreparedStatement with parameterized queries",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r#"(?i)Statement\s*\.\s*execute\s*\(\s*["'].*?\+.*?["']"#,
        negate: None,
    },
    RuleDef {
        id: "java-xss-direct-output",
        name: "Potential XSS - Direct Output",
        severity: Severity::High,
        category: Category::Security,
        description: "User input is directly written to response without encoding",
        suggested_fix: "Use ESAPI.encoder().encodeForHTML() or similar",
        cwe_id: Some("CWE-79"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)response\.getWriter\(\)\.print\s*\(\s*.*request\.",
        negate: None,
    },
    RuleDef {
        id: "java-unsafe-deserialization",
        name: "Unsafe Deserialization",
        severity: Severity::Critical,
        category: Category::Security,
        description: "Deserialization can lead to remote code execution",
        suggested_fix: "Avoid deserialization or use safe alternatives (JSON, XML)",
        cwe_id: Some("CWE-502"),
        owasp_category: OWASP_DESERIALIZATION,
        pattern: r"(?i)ObjectInputStream|readObject\s*\(",
        negate: None,
    },
    RuleDef {
        id: "java-insecure-random",
        name: "Insecure Random Number Generation",
        severity: Severity::Medium,
        category: Category::Security,
        description: "java.util.Random is not cryptographically secure",
        suggested_fix: "Use java.security.SecureRandom instead",
        cwe_id: Some("CWE-330"),
        owasp_category: OWASP_CRYPTO,
        pattern: r"(?i)new\s+Random\s*\(",
        negate: None,
    },
];

// ─── Python ───────────────────────────────────────────────────────────────────

static PYTHON_RULES: &[RuleDef] = &[
    RuleDef {
        id: "py-sql-injection-format",
        name: "Potential SQL Injection - String Formatting",
        severity: Severity::Critical,
        category: Category::Security,
        description: "SQL query uses string formatting instead of parameterized queries",
        suggested_fix: "Use parameterized queries with ? or %s placeholders",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r#"(?i)execute\s*\(\s*["'].*?%s.*?["']"#,
        negate: None,
    },
    RuleDef {
        id: "py-command-injection-system",
        name: "Command Injection - os.system()",
        severity: Severity::Critical,
        category: Category::Security,
        description: "os.system() can execute arbitrary commands",
        suggested_fix: "Use subprocess with proper argument handling",
        cwe_id: Some("CWE-78"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)os\.system\s*\(",
        negate: None,
    },
    RuleDef {
        id: "py-unsafe-pickle",
        name: "Unsafe Deserialization - Pickle",
        severity: Severity::Critical,
        category: Category::Security,
        description: "pickle can execute arbitrary code during deserialization",
        suggested_fix: "Use JSON or other safe serialization formats",
        cwe_id: Some("CWE-502"),
        owasp_category: OWASP_DESERIALIZATION,
        pattern: r"(?i)pickle\.loads?\s*\(",
        negate: None,
    },
    RuleDef {
        id: "py-insecure-random",
        name: "Insecure Random Number Generation",
        severity: Severity::Medium,
        category: Category::Security,
        description: "random module is not cryptographically secure",
        suggested_fix: "Use secrets module for cryptographically secure random",
        cwe_id: Some("CWE-330"),
        owasp_category: OWASP_CRYPTO,
        pattern: r"(?i)random\.(random|randint|choice)\s*\(",
        negate: None,
    },
    RuleDef {
        id: "py-eval",
        name: "Use of eval()",
        severity: Severity::Critical,
        category: Category::Security,
        description: "eval() can execute arbitrary code",
        suggested_fix: "Use ast.literal_eval() or other safe alternatives",
        cwe_id: Some("CWE-95"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)\beval\s*\(",
        negate: None,
    },
];

// ─── PHP ──────────────────────────────────────────────────────────────────────

static PHP_RULES: &[RuleDef] = &[
    RuleDef {
        id: "php-sql-injection-mysql-query",
        name: "Potential SQL Injection - mysql_query()",
        severity: Severity::Critical,
        category: Category::Security,
        description: "mysql_query() with string concatenation is vulnerable",
        suggested_fix: "Use PDO or mysqli with prepared statements",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r#"(?i)mysql_query\s*\(\s*["'].*?\$.*?["']"#,
        negate: None,
    },
    RuleDef {
        id: "php-sql-injection-mysqli-query",
        name: "Potential SQL Injection - mysqli_query()",
        severity: Severity::Critical,
        category: Category::Security,
        description: "mysqli_query() with string concatenation is vulnerable",
        suggested_fix: "Use prepared statements with mysqli_prepare()",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r#"(?i)mysqli_query\s*\(\s*[^,]+,\s*["'].*?\$.*?["']"#,
        negate: None,
    },
    RuleDef {
        id: "php-xss-echo",
        name: "Potential XSS - Direct Output",
        severity: Severity::High,
        category: Category::Security,
        description: "User input is directly output without escaping",
        suggested_fix: "Use htmlspecialchars() or htmlentities()",
        cwe_id: Some("CWE-79"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)(echo|print)\s+\$_(GET|POST|REQUEST)\[",
        negate: None,
    },
    RuleDef {
        id: "php-file-inclusion",
        name: "File Inclusion Vulnerability",
        severity: Severity::Critical,
        category: Category::Security,
        description: "File inclusion with user input can lead to remote code execution",
        suggested_fix: "Validate and sanitize file paths, use whitelist",
        cwe_id: Some("CWE-98"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)(include|require)\s*\(\s*\$_(GET|POST|REQUEST)\[",
        negate: None,
    },
    RuleDef {
        id: "php-eval",
        name: "Use of eval()",
        severity: Severity::Critical,
        category: Category::Security,
        description: "eval() can execute arbitrary code",
        suggested_fix: "Avoid eval(), use safe alternatives",
        cwe_id: Some("CWE-95"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)\beval\s*\(",
        negate: None,
    },
];

// ─── C# ───────────────────────────────────────────────────────────────────────

static CSHARP_RULES: &[RuleDef] = &[
    RuleDef {
        id: "cs-sql-injection-concat",
        name: "Potential SQL Injection - String Concatenation",
        severity: Severity::Critical,
        category: Category::Security,
        description: "SQL query uses string concatenation instead of parameters",
        suggested_fix: "Use SqlParameter or parameterized queries",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r#"(?i)SqlCommand\s*\(\s*["'].*?\+.*?["']"#,
        negate: None,
    },
    RuleDef {
        id: "cs-xss-response-write",
        name: "Potential XSS - Response.Write()",
        severity: Severity::High,
        category: Category::Security,
        description: "User input is directly written to response without encoding",
        suggested_fix: "Use HttpUtility.HtmlEncode() or Razor encoding",
        cwe_id: Some("CWE-79"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)Response\.Write\s*\(\s*.*Request\.",
        negate: None,
    },
    RuleDef {
        id: "cs-unsafe-binaryformatter",
        name: "Unsafe Deserialization - BinaryFormatter",
        severity: Severity::Critical,
        category: Category::Security,
        description: "BinaryFormatter can lead to remote code execution",
        suggested_fix: "Use JsonSerializer or other safe serialization",
        cwe_id: Some("CWE-502"),
        owasp_category: OWASP_DESERIALIZATION,
        pattern: r"(?i)BinaryFormatter\.(Deserialize|Serialize)\s*\(",
        negate: None,
    },
    RuleDef {
        id: "cs-insecure-random",
        name: "Insecure Random Number Generation",
        severity: Severity::Medium,
        category: Category::Security,
        description: "System.Random is not cryptographically secure",
        suggested_fix: "Use System.Security.Cryptography.RandomNumberGenerator",
        cwe_id: Some("CWE-330"),
        owasp_category: OWASP_CRYPTO,
        pattern: r"(?i)new\s+Random\s*\(",
        negate: None,
    },
];

// ─── SQL ──────────────────────────────────────────────────────────────────────

static SQL_RULES: &[RuleDef] = &[
    RuleDef {
        id: "sql-injection-where-concat",
        name: "Potential SQL Injection - String Concatenation",
        severity: Severity::Critical,
        category: Category::Security,
        description: "SQL query uses string concatenation in WHERE clause",
        suggested_fix: "Use parameterized queries or stored procedures",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r#"(?i)WHERE\s+.*\s*=\s*['"]\s*\+"#,
        negate: None,
    },
    RuleDef {
        id: "sql-injection-exec",
        name: "Potential SQL Injection - EXEC()",
        severity: Severity::Critical,
        category: Category::Security,
        description: "EXEC() with string concatenation is vulnerable",
        suggested_fix: "Use parameterized queries or stored procedures",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)EXEC\s+\(.*\+",
        negate: None,
    },
    RuleDef {
        id: "sql-update-without-where",
        name: "Missing WHERE Clause in UPDATE",
        severity: Severity::Critical,
        category: Category::Security,
        description: "UPDATE statement without WHERE clause updates all rows",
        suggested_fix: "Always include WHERE clause in UPDATE statements",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)UPDATE\s+\w+\s+SET\s+",
        negate: Some(r"(?i)\bWHERE\b"),
    },
    RuleDef {
        id: "sql-delete-without-where",
        name: "Missing WHERE Clause in DELETE",
        severity: Severity::Critical,
        category: Category::Security,
        description: "DELETE statement without WHERE clause deletes all rows",
        suggested_fix: "Always include WHERE clause in DELETE statements",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)DELETE\s+FROM\s+\w+",
        negate: Some(r"(?i)\bWHERE\b"),
    },
    RuleDef {
        id: "sql-grant-all",
        name: "Excessive Privileges",
        severity: Severity::High,
        category: Category::Security,
        description: "GRANT ALL PRIVILEGES gives excessive permissions",
        suggested_fix: "Grant only necessary privileges (principle of least privilege)",
        cwe_id: Some("CWE-250"),
        owasp_category: Some("A01:2021 – Broken Access Control"),
        pattern: r"(?i)GRANT\s+ALL\s+PRIVILEGES",
        negate: None,
    },
];

// ─── Go ───────────────────────────────────────────────────────────────────────

static GO_RULES: &[RuleDef] = &[
    RuleDef {
        id: "go-sql-injection-concat",
        name: "Potential SQL Injection - String Concatenation",
        severity: Severity::Critical,
        category: Category::Security,
        description: "SQL query uses string concatenation instead of parameters",
        suggested_fix: "Use parameterized queries with ? placeholders",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r#"(?i)db\.Query\s*\(\s*["'].*?\+.*?["']"#,
        negate: None,
    },
    RuleDef {
        id: "go-sql-injection-sprintf",
        name: "Potential SQL Injection - fmt.Sprintf()",
        severity: Severity::Critical,
        category: Category::Security,
        description: "SQL query uses fmt.Sprintf() which can lead to injection",
        suggested_fix: "Use parameterized queries",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r#"(?i)fmt\.Sprintf\s*\(\s*["'].*?%s.*?["']"#,
        negate: None,
    },
    RuleDef {
        id: "go-command-injection",
        name: "Command Injection - exec.Command()",
        severity: Severity::High,
        category: Category::Security,
        description: "exec.Command() with string concatenation can be dangerous",
        suggested_fix: "Use exec.Command() with separate arguments, not string concatenation",
        cwe_id: Some("CWE-78"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)exec\.Command\s*\(\s*.*\+",
        negate: None,
    },
    RuleDef {
        id: "go-unsafe-pointer",
        name: "Use of unsafe.Pointer",
        severity: Severity::Medium,
        category: Category::Security,
        description: "unsafe.Pointer bypasses type safety",
        suggested_fix: "Avoid unsafe.Pointer unless absolutely necessary",
        cwe_id: Some("CWE-20"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)unsafe\.Pointer",
        negate: None,
    },
];

// ─── Ruby ─────────────────────────────────────────────────────────────────────

static RUBY_RULES: &[RuleDef] = &[
    RuleDef {
        id: "rb-sql-injection-where",
        name: "Potential SQL Injection - String Interpolation",
        severity: Severity::Critical,
        category: Category::Security,
        description: "SQL query uses string interpolation instead of parameters",
        suggested_fix: "Use parameterized queries with ? placeholders",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r#"(?i)\.where\s*\(\s*["'].*?#\{.*?\}.*?["']"#,
        negate: None,
    },
    RuleDef {
        id: "rb-sql-injection-execute",
        name: "Potential SQL Injection - execute()",
        severity: Severity::Critical,
        category: Category::Security,
        description: "SQL execute() uses string interpolation",
        suggested_fix: "Use parameterized queries",
        cwe_id: Some("CWE-89"),
        owasp_category: OWASP_INJECTION,
        pattern: r#"(?i)execute\s*\(\s*["'].*?#\{.*?\}.*?["']"#,
        negate: None,
    },
    RuleDef {
        id: "rb-xss-erb",
        name: "Potential XSS - ERB Template",
        severity: Severity::High,
        category: Category::Security,
        description: "ERB template outputs user input without escaping",
        suggested_fix: "Use <%=h %> or html_escape()",
        cwe_id: Some("CWE-79"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)<%=.*@.*%>",
        negate: None,
    },
    RuleDef {
        id: "rb-command-injection-system",
        name: "Command Injection - system()",
        severity: Severity::Critical,
        category: Category::Security,
        description: "system() with string interpolation can execute arbitrary commands",
        suggested_fix: "Use system() with separate arguments or Kernel.exec with array",
        cwe_id: Some("CWE-78"),
        owasp_category: OWASP_INJECTION,
        pattern: r#"(?i)system\s*\(\s*["'].*?#\{.*?\}.*?["']"#,
        negate: None,
    },
    RuleDef {
        id: "rb-command-injection-backticks",
        name: "Command Injection - Backticks",
        severity: Severity::Critical,
        category: Category::Security,
        description: "Backticks with string interpolation can execute arbitrary commands",
        suggested_fix: "Use system() or Kernel.exec with proper argument handling",
        cwe_id: Some("CWE-78"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)`\s*.*#\{.*?\}.*\s*`",
        negate: None,
    },
    RuleDef {
        id: "rb-eval",
        name: "Use of eval()",
        severity: Severity::Critical,
        category: Category::Security,
        description: "eval() can execute arbitrary code",
        suggested_fix: "Avoid eval(), use safe alternatives",
        cwe_id: Some("CWE-95"),
        owasp_category: OWASP_INJECTION,
        pattern: r"(?i)\beval\s*\(",
        negate: None,
    },
];

// ─── Registry ─────────────────────────────────────────────────────────────────

fn language_table(language: Language) -> &'static [RuleDef] {
    match language {
        Language::JavaScript | Language::TypeScript => JAVASCRIPT_RULES,
        Language::Java => JAVA_RULES,
        Language::Python => PYTHON_RULES,
        Language::Php => PHP_RULES,
        Language::CSharp => CSHARP_RULES,
        Language::Sql => SQL_RULES,
        Language::Go => GO_RULES,
        Language::Ruby => RUBY_RULES,
        // Everything else gets the universal table only.
        _ => &[],
    }
}

static REGISTRY: Lazy<HashMap<Language, Vec<CompiledRule>>> = Lazy::new(|| {
    let languages = [
        Language::JavaScript,
        Language::TypeScript,
        Language::Java,
        Language::Python,
        Language::Php,
        Language::CSharp,
        Language::Sql,
        Language::Go,
        Language::Ruby,
        Language::Swift,
        Language::Kotlin,
        Language::Rust,
        Language::C,
        Language::Cpp,
        Language::Scala,
        Language::Shell,
        Language::Dart,
        Language::R,
        Language::Terraform,
        Language::Dockerfile,
    ];
    languages
        .into_iter()
        .map(|lang| {
            let compiled = UNIVERSAL_RULES
                .iter()
                .chain(language_table(lang).iter())
                .map(CompiledRule::compile)
                .collect();
            (lang, compiled)
        })
        .collect()
});

/// The ordered rule set for a language: universal rules first, then
/// language-specific rules.
pub fn rules_for(language: Language) -> &'static [CompiledRule] {
    REGISTRY
        .get(&language)
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_patterns_compile() {
        // Forces every Lazy table to compile; a bad pattern panics here
        // instead of at first scan.
        for lang in [
            Language::JavaScript,
            Language::Java,
            Language::Python,
            Language::Php,
            Language::CSharp,
            Language::Sql,
            Language::Go,
            Language::Ruby,
            Language::Rust,
        ] {
            assert!(!rules_for(lang).is_empty());
        }
    }

    #[test]
    fn universal_rules_apply_to_every_language() {
        let rust_rules = rules_for(Language::Rust);
        assert_eq!(rust_rules.len(), UNIVERSAL_RULES.len());
        assert!(rust_rules.iter().any(|r| r.def.id == "hardcoded-password"));
    }

    #[test]
    fn hardcoded_password_matches() {
        let rules = rules_for(Language::JavaScript);
        let rule = rules
            .iter()
            .find(|r| r.def.id == "hardcoded-password")
            .unwrap();
        assert!(rule.matches(r#"password = "admin123""#));
        assert!(rule.matches(r#"PASSWORD: 'hunter2'"#));
        assert!(!rule.matches("const password = getPassword()"));
    }

    #[test]
    fn insecure_http_spares_localhost() {
        let rules = rules_for(Language::Go);
        let rule = rules.iter().find(|r| r.def.id == "insecure-http").unwrap();
        assert!(rule.matches(r#"url := "http://example.com/api""#));
        assert!(!rule.matches(r#"url := "http://localhost:8080""#));
        assert!(!rule.matches(r#"url := "http://127.0.0.1/health""#));
    }

    #[test]
    fn sql_missing_where_negate() {
        let rules = rules_for(Language::Sql);
        let update = rules
            .iter()
            .find(|r| r.def.id == "sql-update-without-where")
            .unwrap();
        assert!(update.matches("UPDATE users SET active = 0"));
        assert!(!update.matches("UPDATE users SET active = 0 WHERE id = 1"));

        let delete = rules
            .iter()
            .find(|r| r.def.id == "sql-delete-without-where")
            .unwrap();
        assert!(delete.matches("DELETE FROM sessions"));
        assert!(!delete.matches("DELETE FROM sessions WHERE expired = 1"));
    }

    #[test]
    fn language_specific_rules_are_appended() {
        let js = rules_for(Language::JavaScript);
        assert!(js.iter().any(|r| r.def.id == "js-eval"));
        assert!(js.len() > UNIVERSAL_RULES.len());

        let py = rules_for(Language::Python);
        assert!(py.iter().any(|r| r.def.id == "py-unsafe-pickle"));
        assert!(!py.iter().any(|r| r.def.id == "js-eval"));
    }
}
