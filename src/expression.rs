//! Expression Extractor
//!
//! Embedded template expressions (`{{ count + 1 }}`, `:src="{{ item.url }}"`,
//! `@click="onTap(item)"`) are parsed with oxc and converted into a compact,
//! position-free tree ([`Expr`]). Every extraction appends one entry to the
//! build's [`ExpressionTable`] and hands back an [`ExprHandle`] pointing at it.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, ArrayExpressionElement, AssignmentTarget, BindingPattern, CallExpression,
    ChainElement, ComputedMemberExpression, Expression, ForStatementLeft, ObjectPropertyKind,
    PropertyKey, SimpleAssignmentTarget, Statement, StaticMemberExpression,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use oxc_syntax::operator::UpdateOperator;
use serde::Serialize;
use serde_json::Value;

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLES & TABLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable key of one entry in the [`ExpressionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ExprHandle(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionEntry {
    pub handle: ExprHandle,
    pub source: String,
    pub ast: Expr,
}

/// Append-only table of every expression extracted during one build.
///
/// Handles are allocated from a single counter: identical source text parsed
/// twice yields two entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionTable {
    entries: Vec<ExpressionEntry>,
}

impl ExpressionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: &str, ast: Expr) -> ExprHandle {
        let handle = ExprHandle(self.entries.len() as u32);
        self.entries.push(ExpressionEntry {
            handle,
            source: source.to_string(),
            ast,
        });
        handle
    }

    pub fn get(&self, handle: ExprHandle) -> Option<&Expr> {
        self.entries.get(handle.0 as usize).map(|entry| &entry.ast)
    }

    pub fn source(&self, handle: ExprHandle) -> Option<&str> {
        self.entries
            .get(handle.0 as usize)
            .map(|entry| entry.source.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExpressionEntry> {
        self.entries.iter()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPACT AST
// ═══════════════════════════════════════════════════════════════════════════════

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// ESTree-shaped expression tree without offsets, token kinds or false flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Expr {
    Identifier {
        name: String,
    },
    Literal {
        value: Value,
        raw: String,
    },
    ThisExpression,
    TemplateLiteral {
        quasis: Vec<String>,
        expressions: Vec<Expr>,
    },
    ArrayExpression {
        elements: Vec<Option<Expr>>,
    },
    ObjectExpression {
        properties: Vec<Expr>,
    },
    Property {
        key: Box<Expr>,
        value: Box<Expr>,
        #[serde(skip_serializing_if = "is_false")]
        computed: bool,
        #[serde(skip_serializing_if = "is_false")]
        shorthand: bool,
    },
    SpreadElement {
        argument: Box<Expr>,
    },
    UnaryExpression {
        operator: String,
        argument: Box<Expr>,
    },
    UpdateExpression {
        operator: String,
        #[serde(skip_serializing_if = "is_false")]
        prefix: bool,
        argument: Box<Expr>,
    },
    BinaryExpression {
        operator: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    LogicalExpression {
        operator: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    AssignmentExpression {
        operator: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    ConditionalExpression {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    SequenceExpression {
        expressions: Vec<Expr>,
    },
    CallExpression {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
        #[serde(skip_serializing_if = "is_false")]
        optional: bool,
    },
    NewExpression {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },
    MemberExpression {
        object: Box<Expr>,
        property: Box<Expr>,
        #[serde(skip_serializing_if = "is_false")]
        computed: bool,
        #[serde(skip_serializing_if = "is_false")]
        optional: bool,
    },
    ChainExpression {
        expression: Box<Expr>,
    },
    ArrowFunctionExpression {
        params: Vec<String>,
        body: Box<Expr>,
    },
    /// Syntax the runtime does not interpret structurally, kept as source text.
    Opaque {
        source: String,
    },
}

impl Expr {
    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal { .. })
    }
}

/// Destructured `for (... of ...)` head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopExpression {
    pub declarations: Vec<String>,
    /// Source text of the iterated collection, extracted separately.
    pub iterable: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionError {
    pub message: String,
}

impl ExpressionError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════════════════════

fn source_type() -> SourceType {
    SourceType::default().with_module(true)
}

/// Parse a single expression into its compact form.
pub fn parse_expression(text: &str) -> Result<Expr, ExpressionError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, text, source_type()).parse();
    if let Some(err) = ret.errors.first() {
        return Err(ExpressionError::new(err.to_string()));
    }

    match ret.program.body.first() {
        Some(Statement::ExpressionStatement(stmt)) => Ok(compact(&stmt.expression, text)),
        Some(_) => Err(ExpressionError::new("expected an expression")),
        // a lone string literal is parsed as a directive prologue
        None => match ret.program.directives.first() {
            Some(directive) => Ok(Expr::Literal {
                value: Value::String(directive.expression.value.to_string()),
                raw: directive.expression.span.source_text(text).to_string(),
            }),
            None => Err(ExpressionError::new("empty expression")),
        },
    }
}

/// Parse a loop head such as `for (const [item, index] of list)`.
///
/// The `for (...)` wrapper may be omitted (`const item of list`,
/// `[item, index] of list`, `item of list`).
pub fn parse_loop(text: &str) -> Result<LoopExpression, ExpressionError> {
    let trimmed = text.trim();
    let declared = ["const ", "let ", "var "]
        .iter()
        .any(|kw| trimmed.starts_with(kw));
    let statement = if trimmed.starts_with("for") {
        format!("{}{{}}", trimmed)
    } else if declared {
        format!("for ({}) {{}}", trimmed)
    } else {
        format!("for (const {}) {{}}", trimmed)
    };

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &statement, source_type()).parse();
    if let Some(err) = ret.errors.first() {
        return Err(ExpressionError::new(err.to_string()));
    }

    let Some(Statement::ForOfStatement(for_of)) = ret.program.body.first() else {
        return Err(ExpressionError::new(
            "expected a loop of the form `for (const [item, index] of list)`",
        ));
    };

    let mut declarations = Vec::new();
    if let ForStatementLeft::VariableDeclaration(decl) = &for_of.left {
        for declarator in &decl.declarations {
            collect_binding_names(&declarator.id, &mut declarations);
        }
    }
    if declarations.is_empty() {
        return Err(ExpressionError::new("loop declares no bindings"));
    }

    Ok(LoopExpression {
        declarations,
        iterable: for_of.right.span().source_text(&statement).to_string(),
    })
}

fn collect_binding_names(pattern: &BindingPattern, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for pattern in arr.elements.iter().flatten() {
                collect_binding_names(pattern, names);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        _ => {}
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPACTION
// ═══════════════════════════════════════════════════════════════════════════════

fn opaque(span: Span, src: &str) -> Expr {
    Expr::Opaque {
        source: span.source_text(src).to_string(),
    }
}

fn boxed(expr: &Expression, src: &str) -> Box<Expr> {
    Box::new(compact(expr, src))
}

fn compact(expr: &Expression, src: &str) -> Expr {
    match expr {
        Expression::Identifier(id) => Expr::Identifier {
            name: id.name.to_string(),
        },
        Expression::StringLiteral(lit) => Expr::Literal {
            value: Value::String(lit.value.to_string()),
            raw: lit.span.source_text(src).to_string(),
        },
        Expression::NumericLiteral(lit) => Expr::Literal {
            value: Value::from(lit.value),
            raw: lit.span.source_text(src).to_string(),
        },
        Expression::BooleanLiteral(lit) => Expr::Literal {
            value: Value::Bool(lit.value),
            raw: lit.span.source_text(src).to_string(),
        },
        Expression::NullLiteral(lit) => Expr::Literal {
            value: Value::Null,
            raw: lit.span.source_text(src).to_string(),
        },
        Expression::ThisExpression(_) => Expr::ThisExpression,
        Expression::TemplateLiteral(tpl) => Expr::TemplateLiteral {
            quasis: tpl.quasis.iter().map(|q| q.value.raw.to_string()).collect(),
            expressions: tpl.expressions.iter().map(|e| compact(e, src)).collect(),
        },
        Expression::ArrayExpression(arr) => Expr::ArrayExpression {
            elements: arr
                .elements
                .iter()
                .map(|elem| match elem {
                    ArrayExpressionElement::SpreadElement(spread) => Some(Expr::SpreadElement {
                        argument: boxed(&spread.argument, src),
                    }),
                    ArrayExpressionElement::Elision(_) => None,
                    other => other.as_expression().map(|e| compact(e, src)),
                })
                .collect(),
        },
        Expression::ObjectExpression(obj) => Expr::ObjectExpression {
            properties: obj
                .properties
                .iter()
                .map(|prop| match prop {
                    ObjectPropertyKind::ObjectProperty(p) => Expr::Property {
                        key: Box::new(compact_key(&p.key, src)),
                        value: boxed(&p.value, src),
                        computed: p.computed,
                        shorthand: p.shorthand,
                    },
                    ObjectPropertyKind::SpreadProperty(spread) => Expr::SpreadElement {
                        argument: boxed(&spread.argument, src),
                    },
                })
                .collect(),
        },
        Expression::UnaryExpression(unary) => Expr::UnaryExpression {
            operator: unary.operator.as_str().to_string(),
            argument: boxed(&unary.argument, src),
        },
        Expression::UpdateExpression(update) => Expr::UpdateExpression {
            operator: match update.operator {
                UpdateOperator::Increment => "++",
                UpdateOperator::Decrement => "--",
            }
            .to_string(),
            prefix: update.prefix,
            argument: Box::new(match &update.argument {
                SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => Expr::Identifier {
                    name: id.name.to_string(),
                },
                SimpleAssignmentTarget::StaticMemberExpression(member) => {
                    static_member(member, src)
                }
                SimpleAssignmentTarget::ComputedMemberExpression(member) => {
                    computed_member(member, src)
                }
                other => opaque(other.span(), src),
            }),
        },
        Expression::BinaryExpression(binary) => Expr::BinaryExpression {
            operator: binary.operator.as_str().to_string(),
            left: boxed(&binary.left, src),
            right: boxed(&binary.right, src),
        },
        Expression::LogicalExpression(logical) => Expr::LogicalExpression {
            operator: logical.operator.as_str().to_string(),
            left: boxed(&logical.left, src),
            right: boxed(&logical.right, src),
        },
        Expression::AssignmentExpression(assign) => Expr::AssignmentExpression {
            operator: assign.operator.as_str().to_string(),
            left: Box::new(match &assign.left {
                AssignmentTarget::AssignmentTargetIdentifier(id) => Expr::Identifier {
                    name: id.name.to_string(),
                },
                AssignmentTarget::StaticMemberExpression(member) => static_member(member, src),
                AssignmentTarget::ComputedMemberExpression(member) => computed_member(member, src),
                other => opaque(other.span(), src),
            }),
            right: boxed(&assign.right, src),
        },
        Expression::ConditionalExpression(cond) => Expr::ConditionalExpression {
            test: boxed(&cond.test, src),
            consequent: boxed(&cond.consequent, src),
            alternate: boxed(&cond.alternate, src),
        },
        Expression::SequenceExpression(seq) => Expr::SequenceExpression {
            expressions: seq.expressions.iter().map(|e| compact(e, src)).collect(),
        },
        Expression::ParenthesizedExpression(paren) => compact(&paren.expression, src),
        Expression::CallExpression(call) => call_expression(call, src),
        Expression::NewExpression(new) => Expr::NewExpression {
            callee: boxed(&new.callee, src),
            arguments: new.arguments.iter().map(|a| argument(a, src)).collect(),
        },
        Expression::StaticMemberExpression(member) => static_member(member, src),
        Expression::ComputedMemberExpression(member) => computed_member(member, src),
        Expression::ChainExpression(chain) => Expr::ChainExpression {
            expression: Box::new(match &chain.expression {
                ChainElement::CallExpression(call) => call_expression(call, src),
                ChainElement::StaticMemberExpression(member) => static_member(member, src),
                ChainElement::ComputedMemberExpression(member) => computed_member(member, src),
                other => opaque(other.span(), src),
            }),
        },
        Expression::ArrowFunctionExpression(arrow) => {
            let mut params = Vec::new();
            for param in &arrow.params.items {
                collect_binding_names(&param.pattern, &mut params);
            }
            let body = match arrow.body.statements.first() {
                Some(Statement::ExpressionStatement(stmt)) if arrow.expression => {
                    compact(&stmt.expression, src)
                }
                _ => opaque(arrow.body.span, src),
            };
            Expr::ArrowFunctionExpression {
                params,
                body: Box::new(body),
            }
        }
        other => opaque(other.span(), src),
    }
}

fn compact_key(key: &PropertyKey, src: &str) -> Expr {
    match key {
        PropertyKey::StaticIdentifier(id) => Expr::Identifier {
            name: id.name.to_string(),
        },
        other => match other.as_expression() {
            Some(expr) => compact(expr, src),
            None => opaque(other.span(), src),
        },
    }
}

fn argument(arg: &Argument, src: &str) -> Expr {
    match arg {
        Argument::SpreadElement(spread) => Expr::SpreadElement {
            argument: boxed(&spread.argument, src),
        },
        other => match other.as_expression() {
            Some(expr) => compact(expr, src),
            None => opaque(other.span(), src),
        },
    }
}

fn call_expression(call: &CallExpression, src: &str) -> Expr {
    Expr::CallExpression {
        callee: boxed(&call.callee, src),
        arguments: call.arguments.iter().map(|a| argument(a, src)).collect(),
        optional: call.optional,
    }
}

fn static_member(member: &StaticMemberExpression, src: &str) -> Expr {
    Expr::MemberExpression {
        object: boxed(&member.object, src),
        property: Box::new(Expr::Identifier {
            name: member.property.name.to_string(),
        }),
        computed: false,
        optional: member.optional,
    }
}

fn computed_member(member: &ComputedMemberExpression, src: &str) -> Expr {
    Expr::MemberExpression {
        object: boxed(&member.object, src),
        property: boxed(&member.expression, src),
        computed: true,
        optional: member.optional,
    }
}
