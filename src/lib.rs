//! reelgen: turns a free-text prompt into a rendered video by asking a
//! generative-text model for an animation component, repairing and
//! wrapping the reply into a renderable program, and driving a headless
//! render engine to produce an mp4.

pub mod config;
pub mod engine;
pub mod error;
pub mod materialize;
pub mod naming;
pub mod pipeline;
pub mod repair;
pub mod synthesis;
