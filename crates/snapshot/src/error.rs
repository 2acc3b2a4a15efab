use page::PageError;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("{0} capture is not available")]
    Unavailable(&'static str),
    #[error("failed to allocate a {width}x{height} raster")]
    Allocation { width: u32, height: u32 },
    #[error("rasterizer failed on node {node}: {reason}")]
    Rasterize { node: usize, reason: String },
    #[error(transparent)]
    Page(#[from] PageError),
}
