//! Javadoc harvesting from `-sources.jar` files using tree-sitter.

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tree_sitter::{Node, Parser};

use crate::jar::Jar;
use crate::model::JavaClass;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JavadocIndex {
    /// binary class name -> doc
    pub classes: HashMap<String, String>,
    /// `Class#name(T1,T2)` -> doc
    pub methods: HashMap<String, String>,
    /// `Class#field` -> doc
    pub fields: HashMap<String, String>,
}

fn method_key(class: &str, name: &str, params: &[String]) -> String {
    format!("{class}#{name}({})", params.join(","))
}

impl JavadocIndex {
    pub fn from_sources_jar(path: &Path) -> Result<Self> {
        let jar = Jar::open(path)?;
        let mut index = Self::default();
        for (name, bytes) in jar.read_entries_with_suffix(".java")? {
            let source = String::from_utf8_lossy(&bytes);
            if let Err(err) = index.add_source(&source) {
                tracing::debug!(entry = %name, "no javadoc extracted: {err:#}");
            }
        }
        Ok(index)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.methods.is_empty() && self.fields.is_empty()
    }

    pub fn add_source(&mut self, source: &str) -> Result<()> {
        if source.trim().is_empty() {
            return Ok(());
        }

        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_java::LANGUAGE.into())
            .map_err(|e| anyhow::anyhow!("Failed to load Java grammar: {e}"))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("tree-sitter produced no tree"))?;
        let root = tree.root_node();
        let bytes = source.as_bytes();

        let mut package = String::new();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            match child.kind() {
                "package_declaration" => package = extract_package(&child, bytes),
                kind if is_type_declaration(kind) => {
                    let prefix = if package.is_empty() {
                        String::new()
                    } else {
                        format!("{package}.")
                    };
                    self.visit_type(&child, bytes, &prefix);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn visit_type(&mut self, node: &Node, source: &[u8], prefix: &str) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let class_name = format!("{prefix}{}", node_text(&name, source));
        if let Some(doc) = doc_comment(node, source) {
            self.classes.insert(class_name.clone(), doc);
        }

        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        self.visit_body(&body, source, &class_name);
    }

    fn visit_body(&mut self, body: &Node, source: &[u8], class_name: &str) {
        let nested_prefix = format!("{class_name}$");
        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            match child.kind() {
                kind if is_type_declaration(kind) => self.visit_type(&child, source, &nested_prefix),
                "method_declaration" | "constructor_declaration" => {
                    let Some(doc) = doc_comment(&child, source) else {
                        continue;
                    };
                    let name = if child.kind() == "constructor_declaration" {
                        "<init>".to_string()
                    } else {
                        match child.child_by_field_name("name") {
                            Some(n) => node_text(&n, source).to_string(),
                            None => continue,
                        }
                    };
                    let params = child
                        .child_by_field_name("parameters")
                        .map(|p| parameter_type_names(&p, source))
                        .unwrap_or_default();
                    self.methods.insert(method_key(class_name, &name, &params), doc);
                }
                "field_declaration" | "constant_declaration" => {
                    let Some(doc) = doc_comment(&child, source) else {
                        continue;
                    };
                    let mut inner = child.walk();
                    for decl in child.children_by_field_name("declarator", &mut inner) {
                        if let Some(n) = decl.child_by_field_name("name") {
                            self.fields
                                .insert(format!("{class_name}#{}", node_text(&n, source)), doc.clone());
                        }
                    }
                }
                "enum_constant" => {
                    if let (Some(doc), Some(n)) =
                        (doc_comment(&child, source), child.child_by_field_name("name"))
                    {
                        self.fields
                            .insert(format!("{class_name}#{}", node_text(&n, source)), doc);
                    }
                }
                "enum_body_declarations" => self.visit_body(&child, source, class_name),
                _ => {}
            }
        }
    }

    /// Copies docs onto the model. Methods match on name and simple parameter
    /// types, falling back to name and arity when that is unambiguous.
    pub fn apply(&self, class: &mut JavaClass) {
        class.visit_mut(&mut |c| {
            if c.javadoc.is_none() {
                c.javadoc = self.classes.get(&c.name).cloned();
            }
            for field in &mut c.fields {
                if field.javadoc.is_none() {
                    field.javadoc = self.fields.get(&format!("{}#{}", c.name, field.name)).cloned();
                }
            }
            for method in &mut c.methods {
                if method.javadoc.is_some() {
                    continue;
                }
                let key = method_key(&c.name, &method.name, &method.simple_param_types());
                method.javadoc = self
                    .methods
                    .get(&key)
                    .cloned()
                    .or_else(|| self.by_arity(&c.name, &method.name, method.params.len()));
            }
        });
    }

    fn by_arity(&self, class: &str, name: &str, arity: usize) -> Option<String> {
        let prefix = format!("{class}#{name}(");
        let mut hits = self.methods.iter().filter(|(k, _)| {
            k.strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(')'))
                .is_some_and(|params| {
                    let n = if params.is_empty() {
                        0
                    } else {
                        params.split(',').count()
                    };
                    n == arity
                })
        });
        let first = hits.next()?;
        if hits.next().is_some() {
            return None;
        }
        Some(first.1.clone())
    }
}

fn is_type_declaration(kind: &str) -> bool {
    matches!(
        kind,
        "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration"
    )
}

fn extract_package(node: &Node, source: &[u8]) -> String {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "scoped_identifier" || child.kind() == "identifier" {
            return node_text(&child, source).to_string();
        }
    }
    String::new()
}

fn parameter_type_names(params: &Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = params.walk();
    for child in params.named_children(&mut cursor) {
        match child.kind() {
            "formal_parameter" => {
                let mut ty = child
                    .child_by_field_name("type")
                    .map(|t| simple_type_name(node_text(&t, source)))
                    .unwrap_or_default();
                if let Some(dims) = child.child_by_field_name("dimensions") {
                    ty.push_str(&"[]".repeat(node_text(&dims, source).matches('[').count()));
                }
                names.push(ty);
            }
            "spread_parameter" => {
                let mut inner = child.walk();
                let ty = child
                    .named_children(&mut inner)
                    .find(|n| n.kind() != "modifiers" && n.kind() != "variable_declarator")
                    .map(|t| simple_type_name(node_text(&t, source)))
                    .unwrap_or_default();
                names.push(format!("{ty}[]"));
            }
            _ => {}
        }
    }
    names
}

/// `java.util.List<String>[]` -> `List[]`, `Map.Entry<K, V>` -> `Entry`.
fn simple_type_name(raw: &str) -> String {
    let dims = raw.matches("[]").count();
    let mut base = String::new();
    let mut depth = 0usize;
    for ch in raw.chars() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 && !ch.is_whitespace() && ch != '[' && ch != ']' => base.push(ch),
            _ => {}
        }
    }
    let base = base.rsplit('.').next().unwrap_or(&base).to_string();
    format!("{base}{}", "[]".repeat(dims))
}

fn doc_comment(node: &Node, source: &[u8]) -> Option<String> {
    let prev = node.prev_named_sibling()?;
    if prev.kind() != "block_comment" {
        return None;
    }
    let text = node_text(&prev, source);
    if !text.starts_with("/**") || text == "/**/" {
        return None;
    }
    let cleaned = clean_javadoc(text);
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

fn inline_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{@(?:code|link|linkplain|literal|value)\s+([^{}]*)\}").expect("valid regex")
    })
}

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</?p\s*/?>").expect("valid regex"))
}

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("valid regex"))
}

/// Strips comment markers, inline tags and HTML from a `/** ... */` block.
pub fn clean_javadoc(raw: &str) -> String {
    let body = raw
        .trim()
        .trim_start_matches("/**")
        .trim_end_matches("*/");

    let lines: Vec<&str> = body
        .lines()
        .map(|line| {
            let t = line.trim();
            let t = t.strip_prefix('*').unwrap_or(t);
            t.strip_prefix(' ').unwrap_or(t).trim_end()
        })
        .collect();
    let text = lines.join("\n");

    let text = inline_tag_re().replace_all(&text, |caps: &regex::Captures<'_>| {
        format!("``{}``", caps[1].trim())
    });
    let text = paragraph_re().replace_all(&text, "\n\n");
    let text = html_tag_re().replace_all(&text, "");
    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");

    let mut out = String::new();
    let mut blank_run = 0usize;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(line.trim_start());
    }
    out
}

fn node_text<'a>(node: &Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}
