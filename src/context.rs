//! Per-build compilation state.
//!
//! One [`CompilationContext`] is created per build and threaded by `&mut`
//! through every lowering call. It owns the shared expression table, the
//! component registry and the warnings collected along the way.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::CompilerWarning;
use crate::expression::{parse_expression, ExprHandle, ExpressionError, ExpressionTable};

/// Name of the implicit entry component.
pub const ENTRY_COMPONENT: &str = "$enter";

/// Registered component name → source path, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ComponentRegistry {
    components: Vec<(String, String)>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the name is already taken; the first registration
    /// is kept.
    pub fn register(&mut self, name: &str, path: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.components.push((name.to_string(), path.to_string()));
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.iter().any(|(n, _)| n == name)
    }

    pub fn path(&self, name: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.components
            .iter()
            .map(|(n, p)| (n.as_str(), p.as_str()))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.components.iter().cloned().collect()
    }
}

#[derive(Debug, Default)]
pub struct CompilationContext {
    pub expressions: ExpressionTable,
    pub registry: ComponentRegistry,
    pub warnings: Vec<CompilerWarning>,
}

impl CompilationContext {
    pub fn new(registry: ComponentRegistry) -> Self {
        Self {
            expressions: ExpressionTable::new(),
            registry,
            warnings: Vec::new(),
        }
    }

    /// Parse `text` and append it to the expression table.
    pub fn extract(&mut self, text: &str) -> Result<ExprHandle, ExpressionError> {
        let ast = parse_expression(text)?;
        Ok(self.expressions.insert(text, ast))
    }

    pub fn warn(&mut self, warning: CompilerWarning) {
        warning.emit();
        self.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_keeps_first_registration() {
        let mut registry = ComponentRegistry::new();
        assert!(registry.register("Card", "components/card.html"));
        assert!(!registry.register("Card", "other/card.html"));
        assert_eq!(registry.path("Card"), Some("components/card.html"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_extract_allocates_fresh_handles() {
        let mut ctx = CompilationContext::default();
        let a = ctx.extract("count").unwrap();
        let b = ctx.extract("count").unwrap();
        assert_eq!(a, ExprHandle(0));
        assert_eq!(b, ExprHandle(1));
        assert!(ctx.extract("count +").is_err());
        assert_eq!(ctx.expressions.len(), 2);
    }
}
