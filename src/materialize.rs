use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::naming;

/// Entry name referenced by the wrapper when the source declares
/// nothing discoverable.
pub const FALLBACK_ENTRY_SYMBOL: &str = "GeneratedVideo";

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*import\b[^\n]*\n?").expect("import regex should compile")
    })
}

fn default_export_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"export\s+default\s+").expect("export regex should compile"))
}

fn function_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"function\s+([A-Za-z_$][\w$]*)").expect("function regex should compile")
    })
}

fn const_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"const\s+([A-Za-z_$][\w$]*)\s*=").expect("const regex should compile")
    })
}

/// A transient wrapped-source file owned by exactly one pipeline run.
/// The file is removed when the handle drops, on success and failure
/// alike; a failed removal is logged as a warning and never escalated.
#[derive(Debug)]
pub struct ScratchModule {
    path: PathBuf,
    entry_symbol: String,
}

impl ScratchModule {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_symbol(&self) -> &str {
        &self.entry_symbol
    }
}

impl Drop for ScratchModule {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed scratch module"),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!(
                path = %self.path.display(),
                %error,
                "could not remove scratch module"
            ),
        }
    }
}

/// Embeds repaired model output into a complete renderable program and
/// persists it under the scratch directory.
#[derive(Debug, Clone)]
pub struct ModuleMaterializer {
    scratch_dir: PathBuf,
    composition_id: String,
    duration_in_frames: u32,
    fps: u32,
    width: u32,
    height: u32,
}

impl ModuleMaterializer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            scratch_dir: config.scratch_dir.clone(),
            composition_id: config.composition_id.clone(),
            duration_in_frames: config.duration_in_frames,
            fps: config.fps,
            width: config.width,
            height: config.height,
        }
    }

    /// Wraps the source and writes it to a uniquely named scratch file.
    /// Performs no syntax validation; structurally broken source stays
    /// broken and surfaces at the bundling stage.
    pub fn materialize(&self, source: &str) -> Result<ScratchModule> {
        let cleaned = strip_module_syntax(source);
        let entry_symbol = discover_entry_symbol(&cleaned)
            .unwrap_or_else(|| FALLBACK_ENTRY_SYMBOL.to_owned());
        let wrapped = self.wrap_component(&cleaned, &entry_symbol);

        fs::create_dir_all(&self.scratch_dir).with_context(|| {
            format!(
                "failed to create scratch directory {}",
                self.scratch_dir.display()
            )
        })?;
        let path = self
            .scratch_dir
            .join(format!("temp-{}.jsx", naming::unique_artifact_id()));
        fs::write(&path, &wrapped)
            .with_context(|| format!("failed to write scratch module {}", path.display()))?;
        debug!(path = %path.display(), entry = %entry_symbol, "materialized scratch module");

        Ok(ScratchModule { path, entry_symbol })
    }

    fn wrap_component(&self, cleaned: &str, entry_symbol: &str) -> String {
        format!(
            "import React from 'react';\n\
             import {{\n\
             \x20 Composition,\n\
             \x20 registerRoot,\n\
             \x20 useCurrentFrame,\n\
             \x20 useVideoConfig,\n\
             \x20 interpolate,\n\
             \x20 Easing,\n\
             \x20 spring,\n\
             \x20 interpolateColors,\n\
             \x20 Sequence,\n\
             \x20 AbsoluteFill,\n\
             \x20 continueRender,\n\
             \x20 delayRender,\n\
             \x20 Loop,\n\
             \x20 staticFile\n\
             }} from 'remotion';\n\
             \n\
             {cleaned}\n\
             \n\
             const GeneratedRoot = () => {{\n\
             \x20 return (\n\
             \x20   <>\n\
             \x20     <Composition\n\
             \x20       id=\"{id}\"\n\
             \x20       component={{{entry_symbol}}}\n\
             \x20       durationInFrames={{{duration}}}\n\
             \x20       fps={{{fps}}}\n\
             \x20       width={{{width}}}\n\
             \x20       height={{{height}}}\n\
             \x20     />\n\
             \x20   </>\n\
             \x20 );\n\
             }};\n\
             \n\
             registerRoot(GeneratedRoot);\n",
            id = self.composition_id,
            duration = self.duration_in_frames,
            fps = self.fps,
            width = self.width,
            height = self.height,
        )
    }
}

/// Drops import-style declarations and the default-export marker; the
/// wrapper supplies the binding environment and the program entry
/// itself.
fn strip_module_syntax(source: &str) -> String {
    let without_imports = import_re().replace_all(source, "");
    default_export_re()
        .replace_all(&without_imports, "")
        .trim()
        .to_owned()
}

/// Pattern-matches the synthesized entry symbol: first function
/// declaration, then first const declaration.
fn discover_entry_symbol(cleaned: &str) -> Option<String> {
    if let Some(captures) = function_decl_re().captures(cleaned) {
        return Some(captures[1].to_owned());
    }
    const_decl_re()
        .captures(cleaned)
        .map(|captures| captures[1].to_owned())
}
