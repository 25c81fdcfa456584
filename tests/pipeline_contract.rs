use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use tempfile::tempdir;

use reelgen::config::PipelineConfig;
use reelgen::engine::{BundleHandle, Codec, CompositionHandle, RenderEngine};
use reelgen::error::{build_error_report, PipelineError, Stage};
use reelgen::pipeline::PipelineOrchestrator;
use reelgen::synthesis::{GenerationCapability, InstructionStyle};

struct CannedGenerator {
    reply: String,
}

impl GenerationCapability for CannedGenerator {
    async fn generate(&self, _instruction: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}

struct UnreachableModel;

impl GenerationCapability for UnreachableModel {
    async fn generate(&self, _instruction: &str) -> Result<String> {
        bail!("generation API returned an error status")
    }
}

/// Behaves like a real engine for well-formed modules: the bundle step
/// rejects modules whose composition references an undeclared symbol,
/// the render step writes the output file.
struct StrictEngine;

impl StrictEngine {
    fn entry_is_declared(source: &str) -> bool {
        let Some(referenced) = source
            .split("component={")
            .nth(1)
            .and_then(|rest| rest.split('}').next())
        else {
            return false;
        };
        source.contains(&format!("function {referenced}"))
            || source.contains(&format!("const {referenced} ="))
    }
}

impl RenderEngine for StrictEngine {
    fn bundle(&self, entry_point: &Path) -> Result<BundleHandle> {
        let source = fs::read_to_string(entry_point)?;
        if !Self::entry_is_declared(&source) {
            bail!("bundling failed: composition references an undefined symbol");
        }
        Ok(BundleHandle {
            serve_dir: entry_point.with_extension("bundle"),
        })
    }

    fn resolve_composition(&self, bundle: &BundleHandle, id: &str) -> Result<CompositionHandle> {
        Ok(CompositionHandle {
            serve_dir: bundle.serve_dir.clone(),
            id: id.to_owned(),
        })
    }

    fn render(
        &self,
        _composition: &CompositionHandle,
        _codec: Codec,
        output_path: &Path,
        extra_params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        assert!(extra_params.is_empty(), "pipeline passes no extra params");
        fs::write(output_path, b"mp4")?;
        Ok(())
    }
}

/// Fails after a composition was successfully resolved.
struct CrashingRenderer;

impl RenderEngine for CrashingRenderer {
    fn bundle(&self, entry_point: &Path) -> Result<BundleHandle> {
        Ok(BundleHandle {
            serve_dir: entry_point.with_extension("bundle"),
        })
    }

    fn resolve_composition(&self, bundle: &BundleHandle, id: &str) -> Result<CompositionHandle> {
        Ok(CompositionHandle {
            serve_dir: bundle.serve_dir.clone(),
            id: id.to_owned(),
        })
    }

    fn render(
        &self,
        _composition: &CompositionHandle,
        _codec: Codec,
        _output_path: &Path,
        _extra_params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        bail!("encoder crashed after 12 frames")
    }
}

fn config_in(root: &Path) -> PipelineConfig {
    PipelineConfig {
        scratch_dir: root.join("temp"),
        output_dir: root.join("outputs"),
        ..PipelineConfig::default()
    }
}

fn scratch_is_empty(root: &Path) -> bool {
    let scratch = root.join("temp");
    if !scratch.exists() {
        return true;
    }
    fs::read_dir(scratch)
        .map(|entries| entries.count() == 0)
        .unwrap_or(false)
}

const GOOD_REPLY: &str = "```jsx\nexport default function GeneratedVideo() {\n  \
    const frame = useCurrentFrame();\n  \
    const glow = Math.sin(frame * 0.1);\n  \
    return <AbsoluteFill style={{ opacity: glow }} />;\n}\n```";

#[tokio::test]
async fn happy_path_returns_url_and_file_and_removes_scratch() {
    let dir = tempdir().expect("tempdir");
    let orchestrator = PipelineOrchestrator::new(
        &config_in(dir.path()),
        CannedGenerator {
            reply: GOOD_REPLY.to_owned(),
        },
        StrictEngine,
        InstructionStyle::Commercial,
    );

    let outcome = orchestrator
        .run("a bright sun rising over mountains")
        .await
        .expect("happy path succeeds");

    assert!(outcome.video_path.exists(), "URL must point at a real file");
    assert!(outcome.video_url.starts_with("http://localhost:4000/outputs/video-"));
    assert!(outcome.video_url.ends_with(".mp4"));
    assert!(scratch_is_empty(dir.path()), "scratch module must be gone");
}

#[tokio::test]
async fn prose_reply_fails_at_build_and_still_cleans_up() {
    let dir = tempdir().expect("tempdir");
    let orchestrator = PipelineOrchestrator::new(
        &config_in(dir.path()),
        CannedGenerator {
            reply: "Sorry, I can only describe the sunrise in words.".to_owned(),
        },
        StrictEngine,
        InstructionStyle::Commercial,
    );

    let error = orchestrator
        .run("a bright sun rising over mountains")
        .await
        .expect_err("prose reply cannot bundle");

    // Materialization succeeds with the fallback entry name; the broken
    // module is only detected at the bundling stage.
    assert_eq!(error.stage(), Some(Stage::Build));
    assert!(scratch_is_empty(dir.path()), "scratch module must be gone");
    assert!(
        fs::read_dir(dir.path().join("outputs"))
            .map(|entries| entries.count() == 0)
            .unwrap_or(true),
        "no partial result may be written"
    );
}

#[tokio::test]
async fn render_crash_maps_to_render_stage_and_cleans_up() {
    let dir = tempdir().expect("tempdir");
    let orchestrator = PipelineOrchestrator::new(
        &config_in(dir.path()),
        CannedGenerator {
            reply: GOOD_REPLY.to_owned(),
        },
        CrashingRenderer,
        InstructionStyle::Commercial,
    );

    let error = orchestrator
        .run("a bright sun rising over mountains")
        .await
        .expect_err("renderer crashes");

    assert_eq!(error.stage(), Some(Stage::Render));
    assert!(scratch_is_empty(dir.path()), "scratch module must be gone");

    let report = build_error_report(&error);
    assert_eq!(report.stage, "render");
    assert!(report
        .causes
        .iter()
        .any(|cause| cause.contains("encoder crashed")));
}

#[tokio::test]
async fn unreachable_model_maps_to_synthesis_stage() {
    let dir = tempdir().expect("tempdir");
    let orchestrator = PipelineOrchestrator::new(
        &config_in(dir.path()),
        UnreachableModel,
        StrictEngine,
        InstructionStyle::Commercial,
    );

    let error = orchestrator
        .run("a bright sun rising over mountains")
        .await
        .expect_err("model unreachable");

    assert_eq!(error.stage(), Some(Stage::Synthesis));
    assert!(matches!(error, PipelineError::Generation(_)));
    assert!(
        scratch_is_empty(dir.path()),
        "no scratch module may survive a synthesis failure"
    );
}

#[tokio::test]
async fn back_to_back_runs_do_not_collide() {
    let dir = tempdir().expect("tempdir");
    let orchestrator = PipelineOrchestrator::new(
        &config_in(dir.path()),
        CannedGenerator {
            reply: GOOD_REPLY.to_owned(),
        },
        StrictEngine,
        InstructionStyle::Commercial,
    );

    let first = orchestrator.run("sunrise").await.expect("first run");
    let second = orchestrator.run("sunset").await.expect("second run");

    assert_ne!(first.video_path, second.video_path);
    assert!(first.video_path.exists());
    assert!(second.video_path.exists());
}
