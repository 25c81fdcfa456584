use std::fmt;

use serde::Serialize;

/// One of the four sequential steps of the generation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Synthesis,
    Materialization,
    Build,
    Render,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Synthesis => "synthesis",
            Stage::Materialization => "materialization",
            Stage::Build => "build",
            Stage::Render => "render",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Per-stage failure surfaced to the caller. Exactly one of these is
/// produced per failed run; the underlying cause chain is preserved.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("code generation failed: {0}")]
    Generation(#[source] anyhow::Error),

    #[error("scratch module could not be written: {0}")]
    Materialization(#[source] anyhow::Error),

    #[error("generated module failed to build: {0}")]
    Build(#[source] anyhow::Error),

    #[error("render engine failed: {0}")]
    Render(#[source] anyhow::Error),
}

impl PipelineError {
    /// The stage that produced the failure, if the run got that far.
    /// `EmptyPrompt` is rejected at the boundary before any stage runs.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::EmptyPrompt => None,
            PipelineError::Generation(_) => Some(Stage::Synthesis),
            PipelineError::Materialization(_) => Some(Stage::Materialization),
            PipelineError::Build(_) => Some(Stage::Build),
            PipelineError::Render(_) => Some(Stage::Render),
        }
    }
}

/// Machine-readable failure envelope for the external caller.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub stage: &'static str,
    pub summary: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

pub fn build_error_report(error: &PipelineError) -> ErrorReport {
    let stage = error.stage().map(|stage| stage.label()).unwrap_or("request");
    let mut causes = Vec::new();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    ErrorReport {
        stage,
        summary: error.to_string(),
        causes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn stage_labels_are_stable() {
        assert_eq!(Stage::Synthesis.label(), "synthesis");
        assert_eq!(Stage::Materialization.label(), "materialization");
        assert_eq!(Stage::Build.label(), "build");
        assert_eq!(Stage::Render.label(), "render");
    }

    #[test]
    fn report_carries_stage_and_cause_chain() {
        let inner = anyhow!("npx was not found on PATH").context("bundling failed");
        let error = PipelineError::Build(inner);
        let report = build_error_report(&error);
        assert_eq!(report.stage, "build");
        assert!(report.summary.contains("failed to build"));
        assert!(report
            .causes
            .iter()
            .any(|cause| cause.contains("npx was not found")));
    }

    #[test]
    fn empty_prompt_has_no_stage() {
        let report = build_error_report(&PipelineError::EmptyPrompt);
        assert_eq!(report.stage, "request");
        assert!(report.causes.is_empty());
    }

    #[test]
    fn report_serializes_snake_case_stage() {
        let error = PipelineError::Render(anyhow!("ffmpeg exited with status 1"));
        let json = serde_json::to_value(build_error_report(&error)).expect("report serializes");
        assert_eq!(json["stage"], "render");
    }
}
