//! # KC Native Compiler
//!
//! Build-time compiler for declarative UI components. A component file holds a
//! `<template>`, `<style>`/`<link>` sections and `<script>` sections; the
//! compiler turns it into artifacts a native rendering runtime consumes:
//!
//! - a typed instruction tree ([`ast::AstNode`]) with conditional chains and
//!   loops lowered from `v:if` / `v:else-if` / `v:else` / `v:for`;
//! - one build-wide [`expression::ExpressionTable`] indexed by
//!   [`expression::ExprHandle`];
//! - a resolved [`stylesheet::StyleSheet`] per component with CSS variables
//!   resolved through `own pool → unscoped pool → :root`;
//! - a component dependency report from [`graph::DependencyGraph`].
//!
//! ## Invariants
//!
//! 1. **Handles**: every extracted expression gets a fresh handle from a single
//!    counter. Identical text extracted twice yields two handles.
//! 2. **Conditional chains**: a `v:if` absorbs only the `v:else-if`/`v:else`
//!    siblings directly after it. Any other `v:else-if`/`v:else` lowers to
//!    nothing.
//! 3. **Variable scope**: media-scoped references stay variable-linked to the
//!    pool that resolved them; unscoped references are promoted to static
//!    values.
//! 4. **Cycles**: only direct two-node cycles between components are rejected.

#[cfg(feature = "napi")]
mod napi_bridge;

pub mod ast;
pub mod cache;
pub mod color;
pub mod config;
pub mod context;
pub mod css_parser;
pub mod directive;
pub mod error;
pub mod expression;
pub mod graph;
pub mod lowering;
pub mod markup;
pub mod project;
pub mod stylesheet;
pub mod visitor;


#[cfg(feature = "napi")]
pub use napi_bridge::{compile_project_native, parse_expression_native};

pub use ast::AstNode;
pub use config::{BuildOptions, ProjectConfig};
pub use context::{CompilationContext, ComponentRegistry, ENTRY_COMPONENT};
pub use error::{CompilerError, CompilerWarning};
pub use expression::{parse_expression, ExprHandle, ExpressionTable};
pub use graph::DependencyGraph;
pub use lowering::compile_template;
pub use markup::{parse_markup, parse_source_document, MarkupNode};
pub use project::{build_project, BuildOutput, FsProvider, Project, SourceProvider};
pub use stylesheet::StyleSheet;

#[cfg(test)]
pub(crate) mod test_support {
    pub fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}
