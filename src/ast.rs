//! Typed AST emitted by the directive compiler and consumed by the native
//! runtime.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::expression::ExprHandle;

/// Snapshot of a lowered element: what the runtime needs to render one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeContent {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_expression: Option<ExprHandle>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub static_attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub dynamic_attributes: BTreeMap<String, ExprHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click: Option<ExprHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    #[serde(flatten)]
    pub content: NodeContent,
    pub children: Vec<AstNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentNode {
    pub component_name: String,
    pub path: String,
    #[serde(flatten)]
    pub content: NodeContent,
    pub children: Vec<AstNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IfNode {
    pub condition: ExprHandle,
    /// Condition as written in the template.
    pub expression: String,
    pub child: Box<AstNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate: Option<Box<AstNode>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForNode {
    pub declarations: Vec<String>,
    pub iterable: ExprHandle,
    pub child: Box<AstNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AstNode {
    Ui(ElementNode),
    Layout(ElementNode),
    Component(ComponentNode),
    If(IfNode),
    For(ForNode),
}

impl AstNode {
    /// Content of UI, Layout and Component nodes.
    pub fn content(&self) -> Option<&NodeContent> {
        match self {
            AstNode::Ui(el) | AstNode::Layout(el) => Some(&el.content),
            AstNode::Component(c) => Some(&c.content),
            AstNode::If(_) | AstNode::For(_) => None,
        }
    }

    pub fn children(&self) -> &[AstNode] {
        match self {
            AstNode::Ui(el) | AstNode::Layout(el) => &el.children,
            AstNode::Component(c) => &c.children,
            AstNode::If(_) | AstNode::For(_) => &[],
        }
    }

    pub fn as_if(&self) -> Option<&IfNode> {
        match self {
            AstNode::If(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_for(&self) -> Option<&ForNode> {
        match self {
            AstNode::For(node) => Some(node),
            _ => None,
        }
    }

    /// The alternate slot of the conditional this node represents: an If node
    /// itself, or the If wrapped by a For.
    pub(crate) fn alternate_slot(&mut self) -> Option<&mut Option<Box<AstNode>>> {
        match self {
            AstNode::If(node) => Some(&mut node.alternate),
            AstNode::For(node) => node.child.alternate_slot(),
            _ => None,
        }
    }
}
