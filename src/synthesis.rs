use std::future::Future;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::MAX_FRAME_BUDGET;
use crate::repair;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// The animation primitives the wrapper template binds for the
/// synthesized component. The instruction document promises exactly
/// this set, nothing more.
pub const ANIMATION_PRIMITIVES: [&str; 14] = [
    "Composition",
    "registerRoot",
    "useCurrentFrame",
    "useVideoConfig",
    "interpolate",
    "Easing",
    "spring",
    "interpolateColors",
    "Sequence",
    "AbsoluteFill",
    "continueRender",
    "delayRender",
    "Loop",
    "staticFile",
];

/// Remote generative-text capability: one blocking call per pipeline
/// run, no streaming, no retry.
pub trait GenerationCapability {
    fn generate(&self, instruction: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Visual register of the instruction document. One canonical template
/// with a selectable style replaces ad hoc full-text prompt variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InstructionStyle {
    /// Fast-paced promotional cut with snappy, overshooting motion.
    #[default]
    Commercial,
    /// Smooth fades and restrained, serif-leaning typography.
    Elegant,
    /// Sparse layouts, few scenes, generous hold times.
    Minimal,
    /// Monospace glitch aesthetics for tech subject matter.
    Technical,
}

impl InstructionStyle {
    fn guidance(&self) -> &'static str {
        match self {
            InstructionStyle::Commercial => {
                "Style: fast-paced TV-commercial energy. Each text segment lasts 1-3 seconds, \
                 animations are snappy with elastic/back easing overshoot, and the background \
                 changes between major sections."
            }
            InstructionStyle::Elegant => {
                "Style: luxurious and calm. Prefer slow fades, gold/ivory palettes, serif \
                 fonts, and long holds over rapid cuts."
            }
            InstructionStyle::Minimal => {
                "Style: minimal. Few scenes, a single accent color, large type centered on a \
                 flat background, no decorative particles."
            }
            InstructionStyle::Technical => {
                "Style: technical/cyber. Monospace fonts, glitch and typewriter effects, neon \
                 accents on a dark background."
            }
        }
    }
}

/// Builds the single instruction document sent to the model: fixed
/// rules, the selected style paragraph, and the verbatim user prompt.
pub fn build_instruction_document(prompt: &str, style: InstructionStyle) -> String {
    let primitives = ANIMATION_PRIMITIVES.join(", ");
    format!(
        "You are an expert motion-graphics developer. Write one self-contained React \
         animation component.\n\
         \n\
         RULES:\n\
         1. Return ONLY the component code. No markdown fences, no explanations.\n\
         2. NO import statements; the following bindings are already provided: {primitives}.\n\
         3. The component MUST be named GeneratedVideo and use a default export.\n\
         4. Use ONLY inline styles (style={{{{...}}}}).\n\
         5. Stay within {MAX_FRAME_BUDGET} frames total.\n\
         6. Every math call must be namespaced: Math.random(), Math.sin(), Math.floor(); \
            never bare random() or sin().\n\
         7. Wrap easing curves fully: Easing.out(Easing.back(1.7)), never a bare \
            Easing.back(1.7).\n\
         8. interpolate() output ranges must be plain numbers; build unit strings \
            afterwards.\n\
         9. Always clamp: {{{{ extrapolateLeft: 'clamp', extrapolateRight: 'clamp' }}}}.\n\
         10. Center all text with flexbox and keep it inside the frame with margins.\n\
         \n\
         {style_guidance}\n\
         \n\
         User's script to animate: {prompt}\n\
         \n\
         Generate the complete component code (NO imports, NO explanations, ONLY code):",
        style_guidance = style.guidance(),
    )
}

/// reqwest-backed caller of the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(http: Client, api_key: String, model: impl Into<String>) -> Self {
        Self {
            http,
            api_key,
            model: model.into(),
        }
    }
}

impl GenerationCapability for GeminiClient {
    async fn generate(&self, instruction: &str) -> Result<String> {
        let request_body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: instruction.to_owned(),
                }],
            }],
        };

        let url = format!("{GEMINI_API_BASE}/{}:generateContent", self.model);
        let response: GenerateContentResponse = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body)
            .send()
            .await
            .context("failed to call the generation API")?
            .error_for_status()
            .context("generation API returned an error status")?
            .json()
            .await
            .context("failed to decode the generation API response")?;

        let text = response
            .candidates
            .into_iter()
            .flat_map(|candidate| candidate.content.parts)
            .find_map(|part| part.text)
            .ok_or_else(|| anyhow!("generation API response had no text content"))?;
        Ok(text)
    }
}

/// Synthesizes a repaired animation component from a user prompt:
/// exactly one remote call, then fence stripping and the deterministic
/// repair table.
#[derive(Debug, Clone)]
pub struct CodeSynthesizer<G> {
    generator: G,
    style: InstructionStyle,
}

impl<G: GenerationCapability> CodeSynthesizer<G> {
    pub fn new(generator: G, style: InstructionStyle) -> Self {
        Self { generator, style }
    }

    pub async fn synthesize(&self, prompt: &str) -> Result<String> {
        let instruction = build_instruction_document(prompt, self.style);
        let reply = self.generator.generate(&instruction).await?;
        let stripped = repair::strip_code_fences(&reply);
        if stripped.is_empty() {
            bail!("model reply contained no code");
        }
        Ok(repair::apply_repairs(&stripped))
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize, Default)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}
