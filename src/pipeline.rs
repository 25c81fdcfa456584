use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::engine::{BuildRenderAdapter, RenderEngine, RenderedVideo};
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::materialize::ModuleMaterializer;
use crate::synthesis::{CodeSynthesizer, GenerationCapability, InstructionStyle};

/// Result of one successful run: the externally reachable URL plus the
/// on-disk location of the rendered file.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub video_url: String,
    #[serde(skip)]
    pub video_path: PathBuf,
}

/// Sequences the four stages of one generation run, maps each failure
/// to its stage, and guarantees the scratch module is gone before
/// returning, on every exit path.
pub struct PipelineOrchestrator<G, E> {
    synthesizer: CodeSynthesizer<G>,
    materializer: ModuleMaterializer,
    adapter: BuildRenderAdapter<E>,
    base_url: String,
    public_path_prefix: String,
}

impl<G: GenerationCapability, E: RenderEngine> PipelineOrchestrator<G, E> {
    pub fn new(config: &PipelineConfig, generator: G, engine: E, style: InstructionStyle) -> Self {
        Self {
            synthesizer: CodeSynthesizer::new(generator, style),
            materializer: ModuleMaterializer::new(config),
            adapter: BuildRenderAdapter::new(
                engine,
                config.output_dir.clone(),
                config.composition_id.clone(),
            ),
            base_url: config.base_url.clone(),
            public_path_prefix: config.public_path_prefix.clone(),
        }
    }

    pub async fn run(&self, prompt: &str) -> PipelineResult<GenerationOutcome> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(PipelineError::EmptyPrompt);
        }

        info!(stage = %Stage::Synthesis, "requesting component from the model");
        let source = self
            .synthesizer
            .synthesize(prompt)
            .await
            .map_err(PipelineError::Generation)?;

        info!(stage = %Stage::Materialization, "writing wrapped scratch module");
        // ScratchModule removes its file on drop, which covers both the
        // error path below and the success path.
        let module = self
            .materializer
            .materialize(&source)
            .map_err(PipelineError::Materialization)?;

        info!(stage = %Stage::Build, "bundling and resolving composition");
        let video = self.adapter.produce(&module)?;

        drop(module);
        Ok(GenerationOutcome {
            video_url: self.public_video_url(&video),
            video_path: video.path,
        })
    }

    /// Joins the configured base address with the rendered file's
    /// basename. Pure string computation, no I/O.
    fn public_video_url(&self, video: &RenderedVideo) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.public_path_prefix.trim_matches('/'),
            video.file_name
        )
    }
}
