//! Markup Module
//!
//! Turns component source text into the generic tag/text/attribute tree the
//! directive compiler consumes, and splits a component file into its template,
//! style and script sections.
//!
//! html5ever does the tokenizing. Two properties of HTML5 parsing do not suit
//! component templates, so the source is normalized first:
//! - tag and attribute names are lowercased (`<MyButton :textColor=..>`), so
//!   uppercase letters are escaped before parsing and restored afterwards;
//! - `<Foo />` is not self-closing for non-void elements, so self-closing tags
//!   are expanded to an explicit open/close pair.
//!
//! `<template>` is also renamed, because html5ever keeps template contents in a
//! separate document fragment.

use html5ever::parse_document;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::{Captures, Regex};
use std::collections::HashSet;
use tendril::TendrilSink;

use crate::error::{CompilerError, ERR_PARSE};

const TEMPLATE_TAG: &str = "kc-template";

lazy_static! {
    static ref VOID_ELEMENTS: HashSet<&'static str> = [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ]
    .into_iter()
    .collect();
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKUP TREE
// ═══════════════════════════════════════════════════════════════════════════════

/// One element of the generic markup tree. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MarkupNode {
    pub tag: String,
    /// Last non-empty, trimmed run of direct text content.
    pub text: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<MarkupNode>,
}

impl MarkupNode {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_child(mut self, child: MarkupNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleSource {
    Inline(String),
    /// `<link href="...">`, resolved relative to the component file.
    External(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScriptSource {
    pub main: bool,
    pub src: Option<String>,
    pub text: String,
}

/// The sections of one component source file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceDocument {
    /// First element inside the first `<template>`.
    pub template: Option<MarkupNode>,
    pub styles: Vec<StyleSource>,
    pub scripts: Vec<ScriptSource>,
}

impl SourceDocument {
    pub fn main_script(&self) -> Option<&ScriptSource> {
        self.scripts.iter().find(|script| script.main)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAME CASING
// ═══════════════════════════════════════════════════════════════════════════════

/// Prefix of every escaped name. Tag names must start with a letter, and no
/// unescaped name can start with it since escaping is applied to any name
/// containing `~`.
const CASE_PREFIX: &str = "z~";

/// `MyButton` → `z~~my~button`, `~` → `~~`. Survives html5ever's lowercasing.
/// Names with no uppercase letter and no `~` are returned unchanged.
fn escape_case(name: &str) -> String {
    if !name.chars().any(|ch| ch == '~' || ch.is_ascii_uppercase()) {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 6);
    out.push_str(CASE_PREFIX);
    for ch in name.chars() {
        if ch == '~' {
            out.push_str("~~");
        } else if ch.is_ascii_uppercase() {
            out.push('~');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn restore_case(name: &str) -> String {
    let Some(escaped) = name.strip_prefix(CASE_PREFIX) else {
        return name.to_string();
    };
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(ch) = chars.next() {
        if ch != '~' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('~') => out.push('~'),
            Some(next) => out.push(next.to_ascii_uppercase()),
            None => out.push('~'),
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// NORMALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Attribute run of a tag: quoted values may contain `>`.
const ATTRS: &str = r#"(?:"[^"]*"|'[^']*'|[^'">])*"#;

lazy_static! {
    /// Comments and raw-text elements are matched whole so their content is
    /// never treated as tags.
    static ref MARKUP_TOKEN_RE: Regex = Regex::new(&format!(
        r"(?is)(?P<raw><!--.*?(?:-->|$)|<script\b{a}>.*?(?:</script\s*>|$)|<style\b{a}>.*?(?:</style\s*>|$))|<(?P<close>/?)(?P<name>[a-z][^\s/>]*)(?P<attrs>{a})>",
        a = ATTRS
    ))
    .unwrap();

    static ref ATTR_NAME_RE: Regex = Regex::new(
        r#""[^"]*"|'[^']*'|(?P<name>[^\s"'=/>]+)(?P<value>\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?"#
    )
    .unwrap();
}

/// Escape every attribute name in a tag's attribute run. Values are kept.
fn escape_attribute_names(attrs: &str) -> String {
    ATTR_NAME_RE
        .replace_all(attrs, |caps: &Captures| match caps.name("name") {
            Some(name) => format!(
                "{}{}",
                escape_case(name.as_str()),
                caps.name("value").map_or("", |m| m.as_str())
            ),
            None => caps[0].to_string(),
        })
        .to_string()
}

/// Split a trailing self-closing `/` off an attribute run. A `/` ending an
/// unquoted value (`src=a/`) belongs to the value.
fn split_self_closing(attrs: &str) -> (&str, bool) {
    let trimmed = attrs.trim_end();
    let Some(body) = trimmed.strip_suffix('/') else {
        return (attrs, false);
    };
    let in_value = ATTR_NAME_RE
        .find_iter(attrs)
        .last()
        .is_some_and(|m| m.end() == trimmed.len());
    if in_value {
        (attrs, false)
    } else {
        (body, true)
    }
}

/// Escape name casing, expand self-closing non-void tags and rename
/// `<template>`. Attribute values, comments and raw-text elements are copied
/// untouched.
fn normalize_markup(source: &str) -> String {
    MARKUP_TOKEN_RE
        .replace_all(source, |caps: &Captures| {
            if let Some(raw) = caps.name("raw") {
                return raw.as_str().to_string();
            }

            let closing = &caps["close"];
            let name = &caps["name"];
            let lower = name.to_ascii_lowercase();
            let emitted = if lower == "template" {
                TEMPLATE_TAG.to_string()
            } else {
                escape_case(name)
            };

            let (attrs, self_closing) = split_self_closing(&caps["attrs"]);
            let attrs = escape_attribute_names(attrs);
            if self_closing && closing.is_empty() && !VOID_ELEMENTS.contains(lower.as_str()) {
                format!("<{}{}></{}>", emitted, attrs, emitted)
            } else {
                format!("<{}{}{}>", closing, emitted, attrs)
            }
        })
        .to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════════════════════

fn parse_dom(source: &str, file_path: &str) -> Result<RcDom, CompilerError> {
    let normalized = normalize_markup(source);
    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut normalized.as_bytes())
        .map_err(|e| {
            CompilerError::new(
                ERR_PARSE,
                &format!("Failed to parse markup: {}", e),
                file_path,
            )
        })
}

fn element_name(handle: &Handle) -> Option<String> {
    match &handle.data {
        NodeData::Element { name, .. } => Some(name.local.to_string()),
        _ => None,
    }
}

fn element_attr(handle: &Handle, attr: &str) -> Option<String> {
    match &handle.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| restore_case(&a.name.local) == attr)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

fn raw_text(handle: &Handle) -> String {
    let mut text = String::new();
    for child in handle.children.borrow().iter() {
        if let NodeData::Text { contents } = &child.data {
            text.push_str(&contents.borrow());
        }
    }
    text
}

fn to_markup(handle: &Handle) -> Option<MarkupNode> {
    let NodeData::Element { name, attrs, .. } = &handle.data else {
        return None;
    };

    let mut node = MarkupNode::new(&restore_case(&name.local));
    node.attributes = attrs
        .borrow()
        .iter()
        .map(|a| (restore_case(&a.name.local), a.value.to_string()))
        .collect();

    for child in handle.children.borrow().iter() {
        match &child.data {
            NodeData::Text { contents } => {
                let contents = contents.borrow();
                let trimmed = contents.trim();
                if !trimmed.is_empty() {
                    node.text = trimmed.to_string();
                }
            }
            NodeData::Element { .. } => node.children.extend(to_markup(child)),
            _ => {}
        }
    }

    Some(node)
}

/// Top-level elements with html5ever's implied `html`/`head`/`body` wrappers
/// flattened away.
fn top_level(handle: &Handle, out: &mut Vec<Handle>) {
    for child in handle.children.borrow().iter() {
        match element_name(child).as_deref() {
            Some("html") | Some("head") | Some("body") => top_level(child, out),
            Some(_) => out.push(child.clone()),
            None => {}
        }
    }
}

/// Parse a markup fragment into its top-level elements.
pub fn parse_markup(source: &str, file_path: &str) -> Result<Vec<MarkupNode>, CompilerError> {
    let dom = parse_dom(source, file_path)?;
    let mut handles = Vec::new();
    top_level(&dom.document, &mut handles);
    Ok(handles.iter().filter_map(to_markup).collect())
}

/// Split a component file into template, styles and scripts.
pub fn parse_source_document(
    source: &str,
    file_path: &str,
) -> Result<SourceDocument, CompilerError> {
    let dom = parse_dom(source, file_path)?;
    let mut handles = Vec::new();
    top_level(&dom.document, &mut handles);

    let mut document = SourceDocument::default();
    for handle in &handles {
        match element_name(handle).as_deref() {
            Some(TEMPLATE_TAG) if document.template.is_none() => {
                document.template = handle.children.borrow().iter().find_map(to_markup);
            }
            Some("style") => document.styles.push(StyleSource::Inline(raw_text(handle))),
            Some("link") => {
                if let Some(href) = element_attr(handle, "href") {
                    document.styles.push(StyleSource::External(href));
                }
            }
            Some("script") => document.scripts.push(ScriptSource {
                main: element_attr(handle, "main").is_some(),
                src: element_attr(handle, "src"),
                text: raw_text(handle),
            }),
            _ => {}
        }
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_escape_roundtrip() {
        assert_eq!(escape_case("MyButton"), "z~~my~button");
        assert_eq!(restore_case("z~~my~button"), "MyButton");
        assert_eq!(escape_case("div"), "div");
        assert_eq!(restore_case("div"), "div");
        assert_eq!(restore_case(&escape_case("a~B")), "a~B");
        assert_eq!(restore_case(&escape_case("z~x")), "z~x");
    }

    #[test]
    fn test_normalize_self_closing() {
        assert_eq!(
            normalize_markup(r#"<Card title="x" />"#),
            r#"<z~~card title="x" ></z~~card>"#
        );
        assert_eq!(normalize_markup("<img src=\"a.png\"/>"), "<img src=\"a.png\">");
    }

    #[test]
    fn test_normalize_quoted_values_and_unquoted_slash() {
        assert_eq!(
            normalize_markup(r#"<Row :when="{{ a > b }}" data-x='p/q'/><a href=x/>"#),
            r#"<z~~row :when="{{ a > b }}" data-x='p/q'></z~~row><a href=x/>"#
        );
        assert_eq!(
            normalize_markup("<!-- <Card/> --><Template><b>x</b></Template>"),
            "<!-- <Card/> --><kc-template><b>x</b></kc-template>"
        );
    }

    #[test]
    fn test_normalize_leaves_values_and_scripts_alone() {
        let src = r#"<div :textColor="{{ Theme.Main }}"></div><script main>if (a <B) {}</script>"#;
        let out = normalize_markup(src);
        assert!(out.contains(r#"z~:text~color="{{ Theme.Main }}""#));
        assert!(out.contains("if (a <B) {}"));
    }

    #[test]
    fn test_parse_markup_preserves_case() {
        let nodes = parse_markup(
            r#"<div><MyButton :textColor="{{c}}" v:if="{{ a > b }}">Go</MyButton></div>"#,
            "test.html",
        )
        .unwrap();
        assert_eq!(nodes.len(), 1);
        let button = &nodes[0].children[0];
        assert_eq!(button.tag, "MyButton");
        assert_eq!(button.attribute(":textColor"), Some("{{c}}"));
        assert_eq!(button.attribute("v:if"), Some("{{ a > b }}"));
        assert_eq!(button.text, "Go");
    }

    #[test]
    fn test_text_is_last_non_empty_chunk() {
        let nodes = parse_markup("<div> Hello <b>x</b> world </div>", "t.html").unwrap();
        assert_eq!(nodes[0].text, "world");
        assert_eq!(nodes[0].children[0].text, "x");
    }

    #[test]
    fn test_self_closing_component_does_not_swallow_siblings() {
        let nodes = parse_markup("<div><Icon /><span>a</span></div>", "t.html").unwrap();
        assert_eq!(nodes[0].children.len(), 2);
        assert_eq!(nodes[0].children[0].tag, "Icon");
        assert_eq!(nodes[0].children[1].tag, "span");
    }

    #[test]
    fn test_source_document_sections() {
        let src = r#"
<template>
  <div class="page"><label>{{ title }}</label></div>
</template>
<template><span>ignored</span></template>
<style>.page { color: red; }</style>
<link rel="stylesheet" href="./theme.css">
<script main>const title = 'Hi';</script>
<script src="./util.js"></script>
"#;
        let doc = parse_source_document(src, "page.html").unwrap();
        let template = doc.template.unwrap();
        assert_eq!(template.tag, "div");
        assert_eq!(template.attribute("class"), Some("page"));
        assert_eq!(template.children[0].text, "{{ title }}");

        assert_eq!(
            doc.styles,
            vec![
                StyleSource::Inline(".page { color: red; }".to_string()),
                StyleSource::External("./theme.css".to_string()),
            ]
        );
        assert_eq!(doc.scripts.len(), 2);
        assert!(doc.scripts[0].main);
        assert_eq!(doc.scripts[0].text, "const title = 'Hi';");
        assert_eq!(doc.scripts[1].src.as_deref(), Some("./util.js"));
    }
}
