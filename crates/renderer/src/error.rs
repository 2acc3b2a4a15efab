use page::PageError;

use crate::types::LensHandle;

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    /// No usable GPU adapter, device or shader pipeline.
    #[error("GPU unavailable: {0:#}")]
    Unsupported(#[from] anyhow::Error),
    #[error("capture target `{0}` matched no element")]
    CaptureTarget(String),
    #[error("unknown lens {0}")]
    UnknownLens(LensHandle),
    #[error("renderer has been destroyed")]
    Destroyed,
    #[error("patch {width}x{height} at ({x}, {y}) exceeds the {texture_width}x{texture_height} snapshot")]
    PatchBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        texture_width: u32,
        texture_height: u32,
    },
    #[error("no snapshot texture has been uploaded")]
    NoSnapshot,
    #[error("unknown mirror surface {0}")]
    UnknownMirror(u64),
    #[error("GPU readback failed: {0}")]
    Readback(String),
    #[error(transparent)]
    Page(#[from] PageError),
}
