use anyhow::Result;
use serde::Serialize;

use crate::models::{AnalysisResult, FixApplicationResult, FixSuggestion};

/// Everything one run produced, in the shape written with `--report json`.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub tool: &'static str,
    pub version: &'static str,
    pub analysis: &'a AnalysisResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<&'a [FixSuggestion]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_result: Option<&'a FixApplicationResult>,
}

pub fn render(
    analysis: &AnalysisResult,
    suggestions: Option<&[FixSuggestion]>,
    fix_result: Option<&FixApplicationResult>,
) -> Result<String> {
    let report = JsonReport {
        tool: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        analysis,
        suggestions,
        fix_result,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}
