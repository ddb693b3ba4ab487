use std::collections::BTreeSet;

use crate::ast::{AstNode, ComponentNode, ElementNode, ForNode, IfNode};

/// Read-only traversal over a compiled [`AstNode`] tree.
///
/// Implementers override `visit_*` to add behavior and call the matching
/// `walk_*` function to keep descending. Not calling it prunes the subtree.
pub trait AstVisitor {
    fn visit_node(&mut self, node: &AstNode) {
        walk_node(self, node);
    }

    fn visit_element(&mut self, element: &ElementNode) {
        walk_element(self, element);
    }

    fn visit_layout(&mut self, layout: &ElementNode) {
        walk_element(self, layout);
    }

    fn visit_component(&mut self, component: &ComponentNode) {
        walk_component(self, component);
    }

    fn visit_if(&mut self, node: &IfNode) {
        walk_if(self, node);
    }

    fn visit_for(&mut self, node: &ForNode) {
        walk_for(self, node);
    }
}

pub fn walk_node<V: AstVisitor + ?Sized>(visitor: &mut V, node: &AstNode) {
    match node {
        AstNode::Ui(el) => visitor.visit_element(el),
        AstNode::Layout(el) => visitor.visit_layout(el),
        AstNode::Component(c) => visitor.visit_component(c),
        AstNode::If(n) => visitor.visit_if(n),
        AstNode::For(n) => visitor.visit_for(n),
    }
}

pub fn walk_children<V: AstVisitor + ?Sized>(visitor: &mut V, children: &[AstNode]) {
    for child in children {
        visitor.visit_node(child);
    }
}

pub fn walk_element<V: AstVisitor + ?Sized>(visitor: &mut V, element: &ElementNode) {
    walk_children(visitor, &element.children);
}

pub fn walk_component<V: AstVisitor + ?Sized>(visitor: &mut V, component: &ComponentNode) {
    walk_children(visitor, &component.children);
}

pub fn walk_if<V: AstVisitor + ?Sized>(visitor: &mut V, node: &IfNode) {
    visitor.visit_node(&node.child);
    if let Some(alternate) = &node.alternate {
        visitor.visit_node(alternate);
    }
}

pub fn walk_for<V: AstVisitor + ?Sized>(visitor: &mut V, node: &ForNode) {
    visitor.visit_node(&node.child);
}

/// Names of every component instantiated anywhere in a tree, including inside
/// conditional alternates and loop bodies.
#[derive(Debug, Default)]
pub struct ComponentUsageCollector {
    pub used: BTreeSet<String>,
}

impl ComponentUsageCollector {
    pub fn collect(root: &AstNode) -> BTreeSet<String> {
        let mut collector = Self::default();
        collector.visit_node(root);
        collector.used
    }
}

impl AstVisitor for ComponentUsageCollector {
    fn visit_component(&mut self, component: &ComponentNode) {
        self.used.insert(component.component_name.clone());
        walk_component(self, component);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CompilationContext, ComponentRegistry};
    use crate::lowering::compile_template;
    use crate::markup::parse_markup;

    #[test]
    fn test_collects_nested_usages() {
        let mut registry = ComponentRegistry::new();
        registry.register("Header", "header.html");
        registry.register("Row", "row.html");
        registry.register("Empty", "empty.html");
        registry.register("Icon", "icon.html");

        let roots = parse_markup(
            r#"<div>
                <Header><Icon /></Header>
                <Row v:for="{{const r of rows}}" v:if="{{r.visible}}" />
                <Empty v:else />
            </div>"#,
            "test.html",
        )
        .unwrap();
        let mut ctx = CompilationContext::new(registry);
        let ast = compile_template(&roots[0], &mut ctx).unwrap().unwrap();

        let used: Vec<String> = ComponentUsageCollector::collect(&ast).into_iter().collect();
        // the looped v:if does not absorb the else, so Empty is never instantiated
        assert_eq!(used, vec!["Header", "Icon", "Row"]);
    }

    #[derive(Default)]
    struct DepthCounter {
        depth: usize,
        max: usize,
    }

    impl AstVisitor for DepthCounter {
        fn visit_element(&mut self, element: &ElementNode) {
            self.depth += 1;
            self.max = self.max.max(self.depth);
            walk_element(self, element);
            self.depth -= 1;
        }
    }

    #[test]
    fn test_walk_reaches_alternates() {
        let roots = parse_markup(
            r#"<div><p v:if="{{a}}"></p><p v:else><span><label></label></span></p></div>"#,
            "test.html",
        )
        .unwrap();
        let mut ctx = CompilationContext::default();
        let ast = compile_template(&roots[0], &mut ctx).unwrap().unwrap();
        let mut counter = DepthCounter::default();
        counter.visit_node(&ast);
        assert_eq!(counter.max, 4);
    }
}
