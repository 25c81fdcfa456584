use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_COMPOSITION_ID: &str = "MyVideo";
pub const DEFAULT_BASE_URL: &str = "http://localhost:4000";

/// Upper bound communicated to the model; the wrapper composition never
/// exceeds it.
pub const MAX_FRAME_BUDGET: u32 = 900;

/// Settings recognized by the pipeline. Loaded from an optional JSON
/// file, then overridden per field by CLI flags in the binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Generation-model identifier passed to the remote API.
    pub model: String,
    /// Logical id of the single composition declared by the wrapper.
    pub composition_id: String,
    pub duration_in_frames: u32,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Base address joined with the rendered file's basename to form
    /// the externally reachable video URL.
    pub base_url: String,
    /// Public path segment under which rendered videos are served.
    pub public_path_prefix: String,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub render_timeout_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            composition_id: DEFAULT_COMPOSITION_ID.to_owned(),
            duration_in_frames: 600,
            fps: 30,
            width: 1920,
            height: 1080,
            base_url: DEFAULT_BASE_URL.to_owned(),
            public_path_prefix: "outputs".to_owned(),
            output_dir: PathBuf::from("outputs"),
            scratch_dir: PathBuf::from("temp"),
            render_timeout_seconds: 600,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed to decode config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            bail!("fps must be > 0");
        }
        if self.duration_in_frames == 0 {
            bail!("duration_in_frames must be > 0");
        }
        if self.duration_in_frames > MAX_FRAME_BUDGET {
            bail!(
                "duration_in_frames must not exceed the frame budget of {}",
                MAX_FRAME_BUDGET
            );
        }
        if self.width == 0 || self.height == 0 {
            bail!("resolution must be non-zero");
        }
        if self.composition_id.trim().is_empty() {
            bail!("composition_id must not be empty");
        }
        if self.model.trim().is_empty() {
            bail!("model must not be empty");
        }
        Url::parse(&self.base_url)
            .with_context(|| format!("base_url '{}' is not a valid URL", self.base_url))?;
        Ok(())
    }
}
