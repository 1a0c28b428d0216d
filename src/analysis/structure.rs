// SPDX-License-Identifier: MIT
//! Structural parse for JavaScript/TypeScript using tree-sitter.
//!
//! Builds function/class/import inventories and per-function cyclomatic
//! complexity (base 1, +1 for each branch, loop, conditional, logical
//! operator, and catch clause in the function body). Languages without a
//! parser — and files that fail to parse — yield an empty structure; the
//! pattern stages never depend on a successful parse.

use tracing::debug;
use tree_sitter::Node;

use crate::analysis::language::Language;
use crate::analysis::model::{ClassInfo, CodeStructure, FunctionInfo};

/// Parse `code` and extract its structure. Never fails — any parse problem
/// returns `CodeStructure::default()`.
pub fn parse_structure(code: &str, language: Language, path: &str) -> CodeStructure {
    if !language.has_structural_parser() {
        return CodeStructure::default();
    }

    let ts_lang: tree_sitter::Language = match language {
        Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        Language::TypeScript => {
            if path.ends_with(".tsx") {
                tree_sitter_typescript::LANGUAGE_TSX.into()
            } else {
                tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
            }
        }
        _ => return CodeStructure::default(),
    };

    let mut parser = tree_sitter::Parser::new();
    if parser.set_language(&ts_lang).is_err() {
        debug!(path, "structural parser unavailable, using pattern matching only");
        return CodeStructure::default();
    }

    let Some(tree) = parser.parse(code.as_bytes(), None) else {
        debug!(path, "structural parse failed, using pattern matching only");
        return CodeStructure::default();
    };

    let mut structure = CodeStructure::default();
    collect(tree.root_node(), code.as_bytes(), &mut structure);
    structure.complexity = structure.functions.iter().map(|f| f.complexity).sum();
    structure
}

fn collect(node: Node, source: &[u8], out: &mut CodeStructure) {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" | "method_definition" => {
            out.functions.push(function_info(node, node_name(node, source)));
        }
        "arrow_function" | "function_expression" => {
            // Only inventory anonymous function forms when they are bound to
            // a name (`const f = () => …`); bare callbacks stay uncounted,
            // matching how the inventories are used downstream.
            if let Some(name) = binding_name(node, source) {
                out.functions.push(function_info(node, name));
            }
        }
        "class_declaration" => {
            out.classes.push(class_info(node, source));
        }
        "import_statement" => {
            out.import_count += 1;
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect(child, source, out);
    }
}

fn function_info(node: Node, name: String) -> FunctionInfo {
    FunctionInfo {
        name,
        line: node.start_position().row as u32 + 1,
        param_count: param_count(node),
        complexity: complexity(node),
    }
}

fn class_info(node: Node, source: &[u8]) -> ClassInfo {
    let method_count = node
        .child_by_field_name("body")
        .map(|body| {
            let mut cursor = body.walk();
            body.children(&mut cursor)
                .filter(|c| c.kind() == "method_definition")
                .count()
        })
        .unwrap_or(0);
    ClassInfo {
        name: node_name(node, source),
        line: node.start_position().row as u32 + 1,
        method_count,
    }
}

/// Name from the node's own `name` field, or `"anonymous"`.
fn node_name(node: Node, source: &[u8]) -> String {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok())
        .unwrap_or("anonymous")
        .to_string()
}

/// Name of the variable/property an anonymous function is assigned to.
fn binding_name(node: Node, source: &[u8]) -> Option<String> {
    let parent = node.parent()?;
    match parent.kind() {
        "variable_declarator" => parent
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(source).ok())
            .map(str::to_string),
        "assignment_expression" => parent
            .child_by_field_name("left")
            .and_then(|n| n.utf8_text(source).ok())
            .map(str::to_string),
        "pair" => parent
            .child_by_field_name("key")
            .and_then(|n| n.utf8_text(source).ok())
            .map(str::to_string),
        _ => None,
    }
}

fn param_count(node: Node) -> usize {
    if let Some(params) = node.child_by_field_name("parameters") {
        return params.named_child_count();
    }
    // Single-identifier arrow shorthand: `x => x + 1`.
    if node.child_by_field_name("parameter").is_some() {
        return 1;
    }
    0
}

/// Cyclomatic complexity of a function node: base 1, +1 per branch construct
/// anywhere in the subtree.
fn complexity(node: Node) -> u32 {
    1 + count_branches(node)
}

fn count_branches(node: Node) -> u32 {
    let mut count = 0;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        count += match child.kind() {
            "if_statement" | "for_statement" | "for_in_statement" | "while_statement"
            | "do_statement" | "switch_case" | "catch_clause" | "ternary_expression" => 1,
            "binary_expression" => {
                let is_logical = child
                    .child_by_field_name("operator")
                    .map(|op| matches!(op.kind(), "&&" | "||" | "??"))
                    .unwrap_or(false);
                u32::from(is_logical)
            }
            _ => 0,
        };
        count += count_branches(child);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventories_functions_and_classes() {
        let code = r#"
import fs from 'fs';

function add(a, b) {
  return a + b;
}

const mul = (a, b, c) => a * b * c;

class Calculator {
  reset() {}
  compute(x) { return x; }
}
"#;
        let s = parse_structure(code, Language::JavaScript, "calc.js");
        assert_eq!(s.import_count, 1);
        assert_eq!(s.classes.len(), 1);
        assert_eq!(s.classes[0].name, "Calculator");
        assert_eq!(s.classes[0].method_count, 2);

        let names: Vec<_> = s.functions.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"add"));
        assert!(names.contains(&"mul"));
        // Class methods are functions too.
        assert!(names.contains(&"reset"));

        let add = s.functions.iter().find(|f| f.name == "add").unwrap();
        assert_eq!(add.param_count, 2);
        assert_eq!(add.complexity, 1);
        let mul = s.functions.iter().find(|f| f.name == "mul").unwrap();
        assert_eq!(mul.param_count, 3);
    }

    #[test]
    fn complexity_counts_branches() {
        let code = r#"
function busy(x) {
  if (x > 0) {
    for (let i = 0; i < x; i++) {
      while (x--) {}
    }
  }
  try {
    return x > 1 ? x && 1 : 0;
  } catch (e) {
    return 0;
  }
}
"#;
        let s = parse_structure(code, Language::JavaScript, "busy.js");
        let f = s.functions.iter().find(|f| f.name == "busy").unwrap();
        // base 1 + if + for + while + ternary + && + catch = 7
        assert_eq!(f.complexity, 7);
    }

    #[test]
    fn typescript_parses() {
        let code = "export function greet(name: string): string { return `hi ${name}`; }";
        let s = parse_structure(code, Language::TypeScript, "greet.ts");
        assert_eq!(s.functions.len(), 1);
        assert_eq!(s.functions[0].param_count, 1);
    }

    #[test]
    fn unsupported_language_is_empty() {
        let s = parse_structure("def f():\n  pass\n", Language::Python, "f.py");
        assert!(s.functions.is_empty());
        assert_eq!(s.complexity, 0);
    }

    #[test]
    fn garbage_input_never_panics() {
        let s = parse_structure("}{((((", Language::JavaScript, "broken.js");
        // tree-sitter error-recovers; whatever it finds, this must not panic.
        let _ = s.functions.len();
    }
}
