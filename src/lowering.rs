//! Template lowering: directive tree → typed [`AstNode`].
//!
//! Lowering walks the arena produced by [`crate::directive`]. A `v:if` node
//! absorbs the `v:else-if` / `v:else` siblings that directly follow it and
//! folds them into a right-nested alternate chain. Looping nodes are wrapped
//! in a `For`; a looping conditional becomes `For { If }`.

use crate::ast::{AstNode, ComponentNode, ElementNode, ForNode, IfNode, NodeContent};
use crate::context::CompilationContext;
use crate::directive::{Branch, DirectiveTree, NodeId, NodeKind};
use crate::error::CompilerError;
use crate::markup::MarkupNode;

/// Compile one template root. `Ok(None)` means the root itself lowers to
/// nothing (a stray `v:else` at the top).
pub fn compile_template(
    root: &MarkupNode,
    ctx: &mut CompilationContext,
) -> Result<Option<AstNode>, CompilerError> {
    let mut tree = DirectiveTree::from_markup(root);
    tree.extract_directives(ctx)?;
    let root = tree.root();
    Ok(lower(&mut tree, root))
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE LOWERING
// ═══════════════════════════════════════════════════════════════════════════════

pub fn lower(tree: &mut DirectiveTree, id: NodeId) -> Option<AstNode> {
    let (branch, looped, chained) = {
        let node = tree.node(id);
        (node.branch, node.loop_descriptor.is_some(), node.chained)
    };

    match branch {
        Branch::ElseIf | Branch::Else if !chained => {
            log::debug!(
                "<{}> has no preceding v:if sibling; dropped",
                tree.node(id).tag
            );
            None
        }
        Branch::If | Branch::ElseIf if looped => {
            let conditional = lower_conditional(tree, id);
            Some(wrap_loop(tree, id, conditional))
        }
        Branch::If => Some(lower_if_chain(tree, id)),
        Branch::ElseIf => Some(lower_conditional(tree, id)),
        Branch::None | Branch::Else if looped => {
            let plain = lower_plain(tree, id);
            Some(wrap_loop(tree, id, plain))
        }
        Branch::None | Branch::Else => Some(lower_plain(tree, id)),
    }
}

fn lower_plain(tree: &mut DirectiveTree, id: NodeId) -> AstNode {
    let (content, kind) = {
        let node = tree.node(id);
        let content = NodeContent {
            tag: node.tag.clone(),
            text: (!node.text.is_empty()).then(|| node.text.clone()),
            text_expression: node.text_expression,
            static_attributes: node.static_attributes.clone(),
            dynamic_attributes: node.dynamic_attributes.clone(),
            click: node.click,
        };
        (content, node.kind.clone())
    };

    // Lowering a v:if child unlinks the siblings it absorbs, so the list is
    // re-read on every step.
    let mut children = Vec::new();
    let mut index = 0;
    while let Some(&child) = tree.children(id).get(index) {
        if let Some(lowered) = lower(tree, child) {
            children.push(lowered);
        }
        index += 1;
    }

    match kind {
        NodeKind::Ui => AstNode::Ui(ElementNode { content, children }),
        NodeKind::Layout => AstNode::Layout(ElementNode { content, children }),
        NodeKind::Component { name, path } => AstNode::Component(ComponentNode {
            component_name: name,
            path,
            content,
            children,
        }),
    }
}

fn lower_conditional(tree: &mut DirectiveTree, id: NodeId) -> AstNode {
    let condition = tree.node(id).condition.clone();
    let child = lower_plain(tree, id);
    match condition {
        Some(condition) => AstNode::If(IfNode {
            condition: condition.handle,
            expression: condition.source,
            child: Box::new(child),
            alternate: None,
        }),
        None => child,
    }
}

fn wrap_loop(tree: &DirectiveTree, id: NodeId, child: AstNode) -> AstNode {
    match tree.node(id).loop_descriptor.clone() {
        Some(descriptor) => AstNode::For(ForNode {
            declarations: descriptor.declarations,
            iterable: descriptor.iterable,
            child: Box::new(child),
        }),
        None => child,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONDITIONAL CHAINS
// ═══════════════════════════════════════════════════════════════════════════════

fn lower_if_chain(tree: &mut DirectiveTree, id: NodeId) -> AstNode {
    let siblings = branch_siblings(tree, id);
    for &sibling in &siblings {
        tree.detach(sibling);
        tree.node_mut(sibling).chained = true;
    }

    let mut head = lower_conditional(tree, id);

    let mut alternates = Vec::new();
    for sibling in siblings {
        let branch = tree.node(sibling).branch;
        if let Some(lowered) = lower(tree, sibling) {
            alternates.push((branch, lowered));
        }
    }

    if let Some(chain) = fold_alternates(alternates) {
        if let Some(slot) = head.alternate_slot() {
            *slot = Some(Box::new(chain));
        }
    }
    head
}

/// The `v:else-if` / `v:else` siblings directly after `id`, up to the next
/// `v:if` or plain element.
fn branch_siblings(tree: &DirectiveTree, id: NodeId) -> Vec<NodeId> {
    let Some(parent) = tree.node(id).parent else {
        return Vec::new();
    };
    let children = tree.children(parent);
    let Some(position) = children.iter().position(|&child| child == id) else {
        return Vec::new();
    };

    children[position + 1..]
        .iter()
        .copied()
        .take_while(|&sibling| matches!(tree.node(sibling).branch, Branch::ElseIf | Branch::Else))
        .collect()
}

/// Fold alternates right to left: the last `v:else` terminates the chain and
/// each `v:else-if` takes the chain built so far as its alternate.
fn fold_alternates(alternates: Vec<(Branch, AstNode)>) -> Option<AstNode> {
    let mut terminator = None;
    let mut else_ifs = Vec::new();
    for (branch, node) in alternates {
        match branch {
            Branch::Else => terminator = Some(node),
            _ => else_ifs.push(node),
        }
    }

    let mut chain = terminator;
    for mut node in else_ifs.into_iter().rev() {
        if let Some(slot) = node.alternate_slot() {
            *slot = chain.take().map(Box::new);
        }
        chain = Some(node);
    }
    chain
}
