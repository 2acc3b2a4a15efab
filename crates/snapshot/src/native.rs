use image::RgbaImage;
use page::{NodeId, Page};

use crate::error::CaptureError;
use crate::scale::CaptureScale;

/// Zero-copy capture through a platform element-capture API.
///
/// No host exposes one yet, so this always reports the tier as unavailable
/// and the pipeline moves on.
pub fn native_capture(
    _page: &Page,
    _target: NodeId,
    _scale: &CaptureScale,
) -> Result<RgbaImage, CaptureError> {
    Err(CaptureError::Unavailable("native"))
}
