use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::materialize::ScratchModule;
use crate::naming;

/// Encoding codec accepted by the rendering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::H264 => "h264",
        }
    }
}

/// Opaque servable build output produced from one scratch module.
#[derive(Debug, Clone)]
pub struct BundleHandle {
    pub serve_dir: PathBuf,
}

/// One renderable entry resolved (not created) inside a bundle.
#[derive(Debug, Clone)]
pub struct CompositionHandle {
    pub serve_dir: PathBuf,
    pub id: String,
}

/// A rendered video file plus its basename, used downstream to build
/// the public URL.
#[derive(Debug, Clone)]
pub struct RenderedVideo {
    pub path: PathBuf,
    pub file_name: String,
}

/// Build/render capability consumed by the pipeline. The engine is an
/// opaque external service; bundling compiles a single entry module,
/// rendering is one blocking long-running call with no partial
/// progress.
pub trait RenderEngine {
    fn bundle(&self, entry_point: &Path) -> Result<BundleHandle>;
    fn resolve_composition(&self, bundle: &BundleHandle, id: &str) -> Result<CompositionHandle>;
    fn render(
        &self,
        composition: &CompositionHandle,
        codec: Codec,
        output_path: &Path,
        extra_params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()>;
}

/// Sequences bundle -> resolve -> render and splits the failure into
/// the build stage (bad generated code, missing composition) and the
/// render stage (engine failure after a valid composition resolved).
#[derive(Debug, Clone)]
pub struct BuildRenderAdapter<E> {
    engine: E,
    output_dir: PathBuf,
    composition_id: String,
}

impl<E: RenderEngine> BuildRenderAdapter<E> {
    pub fn new(engine: E, output_dir: PathBuf, composition_id: String) -> Self {
        Self {
            engine,
            output_dir,
            composition_id,
        }
    }

    pub fn produce(&self, module: &ScratchModule) -> Result<RenderedVideo, PipelineError> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| {
                format!(
                    "failed to create output directory {}",
                    self.output_dir.display()
                )
            })
            .map_err(PipelineError::Build)?;

        // First point where a malformed model reply is actually detected.
        let bundle = self
            .engine
            .bundle(module.path())
            .context("bundling the generated module failed")
            .map_err(PipelineError::Build)?;
        debug!(serve_dir = %bundle.serve_dir.display(), "bundled scratch module");

        // The bundle is scoped to this run, like the scratch module.
        let result = self.resolve_and_render(&bundle);
        release_bundle(&bundle);
        result
    }

    fn resolve_and_render(&self, bundle: &BundleHandle) -> Result<RenderedVideo, PipelineError> {
        let composition = self
            .engine
            .resolve_composition(bundle, &self.composition_id)
            .with_context(|| format!("composition '{}' could not be resolved", self.composition_id))
            .map_err(PipelineError::Build)?;

        let file_name = format!("video-{}.mp4", naming::unique_artifact_id());
        let output_path = self.output_dir.join(&file_name);
        self.engine
            .render(
                &composition,
                Codec::H264,
                &output_path,
                &serde_json::Map::new(),
            )
            .map_err(PipelineError::Render)?;
        info!(output = %output_path.display(), "render complete");

        Ok(RenderedVideo {
            path: output_path,
            file_name,
        })
    }
}

/// Best-effort removal of the servable bundle once the run is over; a
/// failure is logged and never overrides the run's outcome.
fn release_bundle(bundle: &BundleHandle) {
    match fs::remove_dir_all(&bundle.serve_dir) {
        Ok(()) => debug!(serve_dir = %bundle.serve_dir.display(), "released bundle"),
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => tracing::warn!(
            serve_dir = %bundle.serve_dir.display(),
            %error,
            "could not release bundle"
        ),
    }
}

/// Drives the headless Remotion CLI through subprocesses: `bundle`,
/// `compositions`, and `render`.
#[derive(Debug, Clone)]
pub struct RemotionCli {
    command: String,
    bundle_root: PathBuf,
    timeout: Duration,
}

impl RemotionCli {
    pub fn new(command: impl Into<String>, bundle_root: PathBuf, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            bundle_root,
            timeout,
        }
    }

    /// Checks that the external engine binary is reachable at all.
    pub fn preflight(&self) -> Result<String> {
        let output = run_with_timeout(
            &self.command,
            &["remotion".to_owned(), "versions".to_owned()],
            Duration::from_secs(60),
        )?;
        if !output.status.success() {
            bail!(
                "render engine preflight failed.\nstdout:\n{}\nstderr:\n{}",
                output.stdout,
                output.stderr
            );
        }
        Ok(output.stdout.trim().to_owned())
    }
}

impl RenderEngine for RemotionCli {
    fn bundle(&self, entry_point: &Path) -> Result<BundleHandle> {
        let serve_dir = self
            .bundle_root
            .join(format!("bundle-{}", naming::unique_artifact_id()));
        fs::create_dir_all(&self.bundle_root).with_context(|| {
            format!(
                "failed to create bundle directory {}",
                self.bundle_root.display()
            )
        })?;

        let args = vec![
            "remotion".to_owned(),
            "bundle".to_owned(),
            entry_point.display().to_string(),
            "--out-dir".to_owned(),
            serve_dir.display().to_string(),
        ];
        let output = run_with_timeout(&self.command, &args, self.timeout)?;
        if !output.status.success() {
            bail!(
                "bundling failed.\nstdout:\n{}\nstderr:\n{}",
                output.stdout,
                output.stderr
            );
        }
        Ok(BundleHandle { serve_dir })
    }

    fn resolve_composition(&self, bundle: &BundleHandle, id: &str) -> Result<CompositionHandle> {
        let args = vec![
            "remotion".to_owned(),
            "compositions".to_owned(),
            bundle.serve_dir.display().to_string(),
        ];
        let output = run_with_timeout(&self.command, &args, self.timeout)?;
        if !output.status.success() {
            bail!(
                "listing compositions failed.\nstdout:\n{}\nstderr:\n{}",
                output.stdout,
                output.stderr
            );
        }

        let found = output
            .stdout
            .lines()
            .any(|line| line.split_whitespace().next() == Some(id));
        if !found {
            bail!("bundle does not declare composition '{id}'");
        }
        Ok(CompositionHandle {
            serve_dir: bundle.serve_dir.clone(),
            id: id.to_owned(),
        })
    }

    fn render(
        &self,
        composition: &CompositionHandle,
        codec: Codec,
        output_path: &Path,
        extra_params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let mut args = vec![
            "remotion".to_owned(),
            "render".to_owned(),
            composition.serve_dir.display().to_string(),
            composition.id.clone(),
            output_path.display().to_string(),
            "--codec".to_owned(),
            codec.as_str().to_owned(),
        ];
        if !extra_params.is_empty() {
            let props = serde_json::to_string(extra_params)
                .context("failed to serialize render input props")?;
            args.push("--props".to_owned());
            args.push(props);
        }

        let output = run_with_timeout(&self.command, &args, self.timeout)?;
        if !output.status.success() {
            bail!(
                "render failed.\nstdout:\n{}\nstderr:\n{}",
                output.stdout,
                output.stderr
            );
        }
        if !output_path.exists() {
            bail!(
                "render exited successfully, but output file was not found: {}",
                output_path.display()
            );
        }
        Ok(())
    }
}

struct CommandOutput {
    status: std::process::ExitStatus,
    stdout: String,
    stderr: String,
}

fn run_with_timeout(command: &str, args: &[String], timeout: Duration) -> Result<CommandOutput> {
    let mut child = Command::new(command)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!(
                    "'{command}' was not found on PATH. Install the render engine and verify \
                     `{command} remotion versions` works before generating videos."
                )
            } else {
                anyhow!("failed to spawn render engine process: {error}")
            }
        })?;
    let started = Instant::now();

    loop {
        if child
            .try_wait()
            .context("failed while waiting for render engine process")?
            .is_some()
        {
            break;
        }

        if started.elapsed() > timeout {
            child
                .kill()
                .context("failed to kill timed-out render engine process")?;
            let _ = child.wait();
            bail!(
                "render engine command timed out after {} seconds",
                timeout.as_secs()
            );
        }

        thread::sleep(Duration::from_millis(100));
    }

    let output = child
        .wait_with_output()
        .context("failed to collect render engine output")?;
    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
