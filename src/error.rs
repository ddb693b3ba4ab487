//! Compiler diagnostics.
//!
//! Fatal conditions are [`CompilerError`] values carrying a stable code and the
//! guarantee the failed check protects. Non-fatal conditions are
//! [`CompilerWarning`]s: they are logged and collected into the build report
//! while compilation carries on with best-effort artifacts.

use serde::Serialize;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_CONFIG: &str = "KC-ERR-CONFIG";
pub const ERR_PARSE: &str = "KC-ERR-PARSE";
pub const ERR_CIRCULAR_DEPENDENCY: &str = "KC-ERR-CIRCULAR-DEPENDENCY";
pub const ERR_IO: &str = "KC-ERR-IO";
pub const ERR_SERIALIZE: &str = "KC-ERR-SERIALIZE";

pub fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_CONFIG => "Compilation only starts from a complete, well-formed project configuration.",
        ERR_PARSE => "Every embedded expression in a template is syntactically valid.",
        ERR_CIRCULAR_DEPENDENCY => "No two components use each other directly.",
        ERR_IO => "Every declared component source is readable and every artifact is persisted.",
        ERR_SERIALIZE => "Every artifact handed to the runtime is well-formed JSON.",
        _ => "Unknown guarantee.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("[{code}] {message}")]
pub struct CompilerError {
    pub code: String,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub context: Option<String>,
    pub hints: Vec<String>,
}

impl CompilerError {
    pub fn new(code: &str, message: &str, file: &str) -> Self {
        Self::with_details(code, message, file, None, vec![])
    }

    pub fn with_details(
        code: &str,
        message: &str,
        file: &str,
        context: Option<String>,
        hints: Vec<String>,
    ) -> Self {
        CompilerError {
            code: code.to_string(),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            file: file.to_string(),
            context,
            hints,
        }
    }

    pub fn config(message: &str, file: &str) -> Self {
        Self::new(ERR_CONFIG, message, file)
    }

    /// A malformed embedded expression, reported against the tag that owns it.
    pub fn parse(tag: &str, text: &str, reason: &str) -> Self {
        Self::with_details(
            ERR_PARSE,
            &format!("node <{}> text `{}` has a syntax problem: {}", tag, text, reason),
            "",
            Some(text.to_string()),
            vec![],
        )
    }

    pub fn circular_dependency(from: &str, to: &str) -> Self {
        Self::with_details(
            ERR_CIRCULAR_DEPENDENCY,
            &format!("`{}` and `{}` depend on each other", from, to),
            "",
            None,
            vec![format!("Remove the usage of <{}> from `{}` or the reverse.", from, to)],
        )
    }

    pub fn io(path: &str, err: &std::io::Error) -> Self {
        Self::new(ERR_IO, &format!("{}: {}", path, err), path)
    }

    pub fn serialize(what: &str, err: &serde_json::Error) -> Self {
        Self::new(ERR_SERIALIZE, &format!("failed to serialize {}: {}", what, err), what)
    }

    /// Attach the source file the error was raised in, unless one is already set.
    pub fn in_file(mut self, file: &str) -> Self {
        if self.file.is_empty() {
            self.file = file.to_string();
        }
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WARNINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CompilerWarning {
    #[error("<{tag}> is neither a registered component nor a built-in element; lowered as plain UI")]
    UnregisteredComponent { tag: String },

    #[error("{selector}{}: `{property}` references undefined variable `{variable}`; property dropped", media_suffix(.media))]
    UndefinedVariable {
        selector: String,
        media: Option<String>,
        property: String,
        variable: String,
    },

    #[error("component `{name}` is not reachable from the entry and will not be registered")]
    UnusedComponent { name: String },

    #[error("component `{name}` is declared more than once; keeping the first declaration")]
    DuplicateComponent { name: String },

    #[error("`{name}` is a built-in element name and cannot be used as a component name")]
    ReservedComponentName { name: String },

    #[error("<{tag}> carries several conditional directives; using `{kept}`")]
    ConflictingDirectives { tag: String, kept: String },

    #[error("<{tag}> has an empty `{directive}` expression; ignored")]
    EmptyDirective { tag: String, directive: String },

    #[error("{path} could not be read and was skipped: {reason}")]
    MissingAsset { path: String, reason: String },
}

fn media_suffix(media: &Option<String>) -> String {
    match media {
        Some(query) => format!(" (@media {})", query),
        None => String::new(),
    }
}

impl CompilerWarning {
    pub fn code(&self) -> &'static str {
        match self {
            CompilerWarning::UnregisteredComponent { .. } => "KC-WARN-UNREGISTERED-COMPONENT",
            CompilerWarning::UndefinedVariable { .. } => "KC-WARN-UNDEFINED-VARIABLE",
            CompilerWarning::UnusedComponent { .. } => "KC-WARN-UNUSED-COMPONENT",
            CompilerWarning::DuplicateComponent { .. } => "KC-WARN-DUPLICATE-COMPONENT",
            CompilerWarning::ReservedComponentName { .. } => "KC-WARN-RESERVED-NAME",
            CompilerWarning::ConflictingDirectives { .. } => "KC-WARN-CONFLICTING-DIRECTIVES",
            CompilerWarning::EmptyDirective { .. } => "KC-WARN-EMPTY-DIRECTIVE",
            CompilerWarning::MissingAsset { .. } => "KC-WARN-MISSING-ASSET",
        }
    }

    /// Log through the `log` facade at warning level.
    pub fn emit(&self) {
        log::warn!("[{}] {}", self.code(), self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_names_tag_and_text() {
        let err = CompilerError::parse("div", "{{ a + }}", "Unexpected token");
        assert_eq!(err.code, ERR_PARSE);
        assert!(err.message.contains("<div>"));
        assert!(err.message.contains("{{ a + }}"));
        assert_eq!(err.context.as_deref(), Some("{{ a + }}"));
        assert_eq!(err.guarantee, get_guarantee(ERR_PARSE));
    }

    #[test]
    fn test_in_file_keeps_existing_file() {
        let err = CompilerError::config("bad", "kc.config.json").in_file("other.html");
        assert_eq!(err.file, "kc.config.json");
        let err = CompilerError::parse("p", "x", "y").in_file("page.html");
        assert_eq!(err.file, "page.html");
    }

    #[test]
    fn test_warning_display_includes_media() {
        let w = CompilerWarning::UndefinedVariable {
            selector: ".b".into(),
            media: Some("screen".into()),
            property: "color".into(),
            variable: "--v".into(),
        };
        let text = w.to_string();
        assert!(text.contains("@media screen"));
        assert!(text.contains("--v"));
        assert_eq!(w.code(), "KC-WARN-UNDEFINED-VARIABLE");
    }
}
