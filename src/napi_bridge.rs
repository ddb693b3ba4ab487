//! Node bindings, built with `--features napi`.

use napi_derive::napi;
use std::path::Path;

use crate::config::BuildOptions;
use crate::error::CompilerError;
use crate::expression::parse_expression;
use crate::project::build_project;

fn to_napi(err: CompilerError) -> napi::Error {
    napi::Error::from_reason(err.to_string())
}

/// Build the project described by `config_path` and return the build report
/// (components, unused names, warnings).
#[napi]
pub fn compile_project_native(
    config_path: String,
    out_dir: Option<String>,
) -> napi::Result<serde_json::Value> {
    let options = BuildOptions {
        out_dir: out_dir.map(Into::into),
        write_artifacts: true,
    };
    let output = build_project(Path::new(&config_path), &options).map_err(to_napi)?;

    Ok(serde_json::json!({
        "components": output.components.iter().map(|c| &c.component_name).collect::<Vec<_>>(),
        "expressions": output.expressions.len(),
        "unused": output.unused,
        "warnings": output.warnings,
    }))
}

#[napi]
pub fn parse_expression_native(text: String) -> napi::Result<serde_json::Value> {
    let expr = parse_expression(&text).map_err(|e| napi::Error::from_reason(e.message))?;
    serde_json::to_value(expr).map_err(|e| napi::Error::from_reason(e.to_string()))
}
