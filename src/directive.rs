//! Directive extraction.
//!
//! The markup tree is copied into an arena of [`DirectiveNode`]s (parent and
//! children as [`NodeId`] lists) so lowering can unlink `v:else-if`/`v:else`
//! siblings without aliasing. Each node is then processed in a fixed order:
//!
//! 1. classify (component / layout / UI)
//! 2. conditional directive (`v:if`, `v:else-if`, `v:else`)
//! 3. loop directive (`v:for`)
//! 4. inline `style`, merged into the attributes
//! 5. static vs dynamic (`:name`) attributes
//! 6. `@click`
//! 7. text interpolation
//!
//! Every embedded expression goes through the context's expression table here,
//! so all handles of a template are allocated before lowering starts.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

use crate::color::normalize_declaration;
use crate::context::CompilationContext;
use crate::css_parser::parse_inline_style;
use crate::error::{CompilerError, CompilerWarning};
use crate::expression::{parse_expression, parse_loop, ExprHandle};
use crate::markup::MarkupNode;

pub const V_IF: &str = "v:if";
pub const V_ELSE_IF: &str = "v:else-if";
pub const V_ELSE: &str = "v:else";
pub const V_FOR: &str = "v:for";
pub const CLICK_ATTR: &str = "@click";
pub const STYLE_ATTR: &str = "style";
pub const LAYOUT_TAG: &str = "v-layout";

lazy_static! {
    static ref INTERPOLATION_RE: Regex = Regex::new(r"^\{\{([\s\S]*)\}\}$").unwrap();

    /// Elements the runtime renders natively.
    static ref BUILTIN_TAGS: HashSet<&'static str> = [
        "div", "label", "button", "img", "input", "textarea", "span", "text", "p", "a",
        "ul", "ol", "li", "scroll", "scroll-view", "list", "list-item", "switch", "slider",
        "view", "section", "header", "footer", "nav", "canvas", "video", "select", "option",
        "form", "br", "hr", "h1", "h2", "h3", "h4", "h5", "h6", LAYOUT_TAG,
    ]
    .into_iter()
    .collect();
}

/// Inner text of a value fully wrapped in `{{ }}`.
pub fn interpolation_inner(value: &str) -> Option<&str> {
    INTERPOLATION_RE
        .captures(value.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Directive values may be written with or without the `{{ }}` wrapper.
fn directive_expression(value: &str) -> &str {
    interpolation_inner(value).unwrap_or(value).trim()
}

pub fn is_builtin_tag(tag: &str) -> bool {
    BUILTIN_TAGS.contains(tag)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeKind {
    #[default]
    Ui,
    Layout,
    Component {
        name: String,
        path: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Branch {
    #[default]
    None,
    If,
    ElseIf,
    Else,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub handle: ExprHandle,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDescriptor {
    pub declarations: Vec<String>,
    pub iterable: ExprHandle,
}

#[derive(Debug, Clone, Default)]
pub struct DirectiveNode {
    pub tag: String,
    pub text: String,
    /// Raw attributes not yet consumed by extraction.
    pub attributes: Vec<(String, String)>,
    pub kind: NodeKind,
    pub static_attributes: BTreeMap<String, String>,
    pub dynamic_attributes: BTreeMap<String, ExprHandle>,
    pub branch: Branch,
    /// Set together with `Branch::If` / `Branch::ElseIf`.
    pub condition: Option<Condition>,
    pub loop_descriptor: Option<LoopDescriptor>,
    pub click: Option<ExprHandle>,
    pub text_expression: Option<ExprHandle>,
    /// Absorbed into a preceding `v:if` chain.
    pub chained: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl DirectiveNode {
    fn take_attribute(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|(key, _)| key == name)?;
        Some(self.attributes.remove(index).1)
    }

    fn set_attribute(&mut self, name: &str, value: String) {
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARENA
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct DirectiveTree {
    nodes: Vec<DirectiveNode>,
}

impl DirectiveTree {
    /// Nodes are allocated in pre-order, so the root is always `NodeId(0)`.
    pub fn from_markup(root: &MarkupNode) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.push(root, None);
        tree
    }

    fn push(&mut self, markup: &MarkupNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(DirectiveNode {
            tag: markup.tag.clone(),
            text: markup.text.clone(),
            attributes: markup.attributes.clone(),
            parent,
            ..Default::default()
        });
        for child in &markup.children {
            let child_id = self.push(child, Some(id));
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &DirectiveNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut DirectiveNode {
        &mut self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Unlink `id` from its parent. The node itself stays in the arena.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&child| child != id);
        }
    }

    /// Run directive extraction over every node, parents before children.
    pub fn extract_directives(&mut self, ctx: &mut CompilationContext) -> Result<(), CompilerError> {
        for node in self.nodes.iter_mut() {
            extract_node(node, ctx)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXTRACTION
// ═══════════════════════════════════════════════════════════════════════════════

fn extract_node(node: &mut DirectiveNode, ctx: &mut CompilationContext) -> Result<(), CompilerError> {
    classify(node, ctx);
    extract_condition(node, ctx)?;
    extract_loop(node, ctx)?;
    extract_style(node);
    partition_attributes(node, ctx)?;
    extract_click(node, ctx)?;
    extract_text(node, ctx)
}

fn extract(
    node: &DirectiveNode,
    ctx: &mut CompilationContext,
    expression: &str,
    raw: &str,
) -> Result<ExprHandle, CompilerError> {
    ctx.extract(expression)
        .map_err(|e| CompilerError::parse(&node.tag, raw, &e.message))
}

fn classify(node: &mut DirectiveNode, ctx: &mut CompilationContext) {
    node.kind = if let Some(path) = ctx.registry.path(&node.tag) {
        NodeKind::Component {
            name: node.tag.clone(),
            path: path.to_string(),
        }
    } else if node.tag == LAYOUT_TAG {
        NodeKind::Layout
    } else {
        if !is_builtin_tag(&node.tag) {
            ctx.warn(CompilerWarning::UnregisteredComponent {
                tag: node.tag.clone(),
            });
        }
        NodeKind::Ui
    };
}

fn extract_condition(node: &mut DirectiveNode, ctx: &mut CompilationContext) -> Result<(), CompilerError> {
    let mut found = Vec::new();
    for (directive, branch) in [
        (V_IF, Branch::If),
        (V_ELSE_IF, Branch::ElseIf),
        (V_ELSE, Branch::Else),
    ] {
        if let Some(value) = node.take_attribute(directive) {
            found.push((directive, branch, value));
        }
    }

    let mut found = found.into_iter();
    let Some((directive, branch, value)) = found.next() else {
        return Ok(());
    };
    if found.next().is_some() {
        ctx.warn(CompilerWarning::ConflictingDirectives {
            tag: node.tag.clone(),
            kept: directive.to_string(),
        });
    }

    if branch == Branch::Else {
        node.branch = Branch::Else;
        return Ok(());
    }

    let expression = directive_expression(&value);
    if expression.is_empty() {
        ctx.warn(CompilerWarning::EmptyDirective {
            tag: node.tag.clone(),
            directive: directive.to_string(),
        });
        return Ok(());
    }

    let handle = extract(node, ctx, expression, &value)?;
    node.branch = branch;
    node.condition = Some(Condition {
        handle,
        source: expression.to_string(),
    });
    Ok(())
}

fn extract_loop(node: &mut DirectiveNode, ctx: &mut CompilationContext) -> Result<(), CompilerError> {
    let Some(value) = node.take_attribute(V_FOR) else {
        return Ok(());
    };

    let head = parse_loop(directive_expression(&value))
        .map_err(|e| CompilerError::parse(&node.tag, &value, &e.message))?;
    let iterable = extract(node, ctx, &head.iterable, &value)?;
    node.loop_descriptor = Some(LoopDescriptor {
        declarations: head.declarations,
        iterable,
    });
    Ok(())
}

fn extract_style(node: &mut DirectiveNode) {
    let Some(style) = node.take_attribute(STYLE_ATTR) else {
        return;
    };
    for decl in parse_inline_style(&style) {
        let value = normalize_declaration(&decl.name, &decl.value);
        node.set_attribute(&decl.name, value);
    }
}

fn partition_attributes(node: &mut DirectiveNode, ctx: &mut CompilationContext) -> Result<(), CompilerError> {
    for (name, value) in std::mem::take(&mut node.attributes) {
        if name == CLICK_ATTR {
            node.attributes.push((name, value));
            continue;
        }

        let Some(binding) = name.strip_prefix(':') else {
            node.static_attributes.insert(name, value);
            continue;
        };
        match interpolation_inner(&value) {
            Some(inner) => {
                let handle = extract(node, ctx, inner.trim(), &value)?;
                node.dynamic_attributes.insert(binding.to_string(), handle);
            }
            None => log::debug!(
                "<{}> drops `{}`: a binding value must be wrapped in {{{{ }}}}",
                node.tag,
                name
            ),
        }
    }
    Ok(())
}

fn extract_click(node: &mut DirectiveNode, ctx: &mut CompilationContext) -> Result<(), CompilerError> {
    let Some(value) = node.take_attribute(CLICK_ATTR) else {
        return Ok(());
    };
    let expression = directive_expression(&value);
    if !expression.is_empty() {
        node.click = Some(extract(node, ctx, expression, &value)?);
    }
    Ok(())
}

/// Drop the first and last character: `'Hello'` → `Hello`.
fn strip_boundary_chars(raw: &str) -> String {
    let mut chars = raw.chars();
    chars.next();
    chars.next_back();
    chars.as_str().to_string()
}

fn extract_text(node: &mut DirectiveNode, ctx: &mut CompilationContext) -> Result<(), CompilerError> {
    let Some(inner) = interpolation_inner(&node.text).map(str::to_string) else {
        return Ok(());
    };

    let ast = parse_expression(&inner)
        .map_err(|e| CompilerError::parse(&node.tag, &node.text, &e.message))?;
    if ast.is_literal() {
        node.text = strip_boundary_chars(&inner);
    } else {
        node.text_expression = Some(ctx.expressions.insert(inner.trim(), ast));
        node.text.clear();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ComponentRegistry;

    fn extracted(markup: &MarkupNode, registry: ComponentRegistry) -> (DirectiveTree, CompilationContext) {
        let mut ctx = CompilationContext::new(registry);
        let mut tree = DirectiveTree::from_markup(markup);
        tree.extract_directives(&mut ctx).unwrap();
        (tree, ctx)
    }

    #[test]
    fn test_interpolation_inner() {
        assert_eq!(interpolation_inner("{{ a + b }}"), Some(" a + b "));
        assert_eq!(interpolation_inner("  {{a}} "), Some("a"));
        assert_eq!(interpolation_inner("a {{b}}"), None);
        assert_eq!(interpolation_inner("plain"), None);
    }

    #[test]
    fn test_arena_is_preorder() {
        let markup = MarkupNode::new("div")
            .with_child(MarkupNode::new("p").with_child(MarkupNode::new("span")))
            .with_child(MarkupNode::new("label"));
        let tree = DirectiveTree::from_markup(&markup);
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.node(tree.root()).tag, "div");
        let children = tree.children(tree.root()).to_vec();
        assert_eq!(tree.node(children[0]).tag, "p");
        assert_eq!(tree.node(children[1]).tag, "label");
        assert_eq!(tree.node(children[1]).parent, Some(tree.root()));
    }

    #[test]
    fn test_detach_unlinks_only() {
        let markup = MarkupNode::new("div")
            .with_child(MarkupNode::new("p"))
            .with_child(MarkupNode::new("span"));
        let mut tree = DirectiveTree::from_markup(&markup);
        let span = tree.children(tree.root())[1];
        tree.detach(span);
        assert_eq!(tree.children(tree.root()).len(), 1);
        assert_eq!(tree.node(span).parent, None);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_classification() {
        let mut registry = ComponentRegistry::new();
        registry.register("Card", "components/card.html");
        let markup = MarkupNode::new("v-layout")
            .with_child(MarkupNode::new("Card"))
            .with_child(MarkupNode::new("Mystery"))
            .with_child(MarkupNode::new("div"));
        let (tree, ctx) = extracted(&markup, registry);

        assert_eq!(tree.node(tree.root()).kind, NodeKind::Layout);
        let children = tree.children(tree.root()).to_vec();
        assert_eq!(
            tree.node(children[0]).kind,
            NodeKind::Component {
                name: "Card".into(),
                path: "components/card.html".into()
            }
        );
        assert_eq!(tree.node(children[1]).kind, NodeKind::Ui);
        assert_eq!(tree.node(children[2]).kind, NodeKind::Ui);
        assert_eq!(
            ctx.warnings,
            vec![CompilerWarning::UnregisteredComponent {
                tag: "Mystery".into()
            }]
        );
    }

    #[test]
    fn test_attribute_partition() {
        let markup = MarkupNode::new("div")
            .with_attr("class", "row")
            .with_attr(":src", "{{ item.url }}")
            .with_attr(":broken", "item.url")
            .with_attr("@click", "onTap(item)")
            .with_attr("v:if", "{{ visible }}");
        let (tree, ctx) = extracted(&markup, ComponentRegistry::new());
        let node = tree.node(tree.root());

        assert_eq!(node.static_attributes.len(), 1);
        assert_eq!(node.static_attributes["class"], "row");
        assert_eq!(node.dynamic_attributes.len(), 1);
        let src = node.dynamic_attributes["src"];
        assert_eq!(ctx.expressions.source(src), Some("item.url"));
        // the malformed binding is neither bound nor kept as static
        assert!(!node.static_attributes.contains_key(":broken"));
        assert!(!node.static_attributes.contains_key("broken"));
        assert!(node.click.is_some());
        assert!(node.attributes.is_empty());
        assert_eq!(node.branch, Branch::If);
        assert_eq!(node.condition.as_ref().unwrap().source, "visible");
    }

    #[test]
    fn test_inline_style_merges_with_color_normalization() {
        let markup = MarkupNode::new("div")
            .with_attr("style", "color: red; width: 10px; background-color: #fff")
            .with_attr("width", "5px");
        let (tree, _) = extracted(&markup, ComponentRegistry::new());
        let attrs = &tree.node(tree.root()).static_attributes;
        assert_eq!(attrs["color"], "rgb(255,0,0)");
        assert_eq!(attrs["width"], "10px");
        assert_eq!(attrs["background-color"], "#fff");
        assert!(!attrs.contains_key("style"));
    }

    #[test]
    fn test_text_literal_and_expression() {
        let markup = MarkupNode::new("div")
            .with_child(MarkupNode::new("label").with_text("{{'Hello'}}"))
            .with_child(MarkupNode::new("label").with_text("{{ count + 1 }}"))
            .with_child(MarkupNode::new("label").with_text("plain"))
            .with_child(MarkupNode::new("label").with_text("{{7}}"));
        let (tree, ctx) = extracted(&markup, ComponentRegistry::new());
        let children = tree.children(tree.root()).to_vec();

        assert_eq!(tree.node(children[0]).text, "Hello");
        assert!(tree.node(children[0]).text_expression.is_none());

        let counted = tree.node(children[1]);
        assert!(counted.text.is_empty());
        assert_eq!(
            ctx.expressions.source(counted.text_expression.unwrap()),
            Some("count + 1")
        );

        assert_eq!(tree.node(children[2]).text, "plain");
        // a one-character literal leaves nothing once both ends are stripped
        assert_eq!(tree.node(children[3]).text, "");
        assert_eq!(ctx.expressions.len(), 1);
    }

    #[test]
    fn test_loop_extraction() {
        let markup =
            MarkupNode::new("div").with_attr("v:for", "{{for (const [item, i] of store.items)}}");
        let (tree, ctx) = extracted(&markup, ComponentRegistry::new());
        let descriptor = tree.node(tree.root()).loop_descriptor.clone().unwrap();
        assert_eq!(descriptor.declarations, vec!["item", "i"]);
        assert_eq!(ctx.expressions.source(descriptor.iterable), Some("store.items"));
    }

    #[test]
    fn test_malformed_expression_is_fatal() {
        let markup = MarkupNode::new("div").with_child(MarkupNode::new("span").with_text("{{ a + }}"));
        let mut ctx = CompilationContext::default();
        let mut tree = DirectiveTree::from_markup(&markup);
        let err = tree.extract_directives(&mut ctx).unwrap_err();
        assert_eq!(err.code, crate::error::ERR_PARSE);
        assert!(err.message.contains("<span>"));
        assert!(err.message.contains("{{ a + }}"));
    }

    #[test]
    fn test_conflicting_and_empty_directives() {
        let markup = MarkupNode::new("div")
            .with_child(MarkupNode::new("p").with_attr("v:if", "{{a}}").with_attr("v:else", ""))
            .with_child(MarkupNode::new("p").with_attr("v:if", "{{ }}"));
        let (tree, ctx) = extracted(&markup, ComponentRegistry::new());
        let children = tree.children(tree.root()).to_vec();
        assert_eq!(tree.node(children[0]).branch, Branch::If);
        assert_eq!(tree.node(children[1]).branch, Branch::None);
        assert_eq!(ctx.warnings.len(), 2);
        assert!(tree.node(children[0]).static_attributes.is_empty());
    }
}
