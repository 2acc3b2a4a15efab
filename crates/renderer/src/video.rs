//! Streams playing video frames into the still snapshot, one sub-rectangle
//! per video, composited over the captured pixels around it.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use page::{effective_z, NodeId, Page};

use crate::geometry::{CaptureSpace, PixelRect};
use crate::gpu::Compositor;

/// A video eligible for patching this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VideoRegion {
    pub node: NodeId,
    pub region: PixelRect,
}

/// Videos under `target` that can be patched now. Skips ignored or hidden
/// nodes, videos stacked above `top_lens_z`, videos without a current frame
/// and anything that maps to an empty texture region.
pub(crate) fn patchable_videos(
    page: &Page,
    target: NodeId,
    space: &CaptureSpace,
    top_lens_z: i32,
) -> Vec<VideoRegion> {
    page.descendants(target)
        .into_iter()
        .filter_map(|node| {
            let data = page.node(node).ok()?;
            let video = data.video.as_ref()?;
            if data.ignore || !page.is_visible(node) {
                return None;
            }
            if effective_z(page, node) > top_lens_z || !video.has_current_data() {
                return None;
            }
            let region = space.texture_region(&page.document_rect(node))?;
            Some(VideoRegion { node, region })
        })
        .collect()
}

/// Per-renderer video state: the retained still raster and a frame counter
/// for throttling.
#[derive(Debug, Default)]
pub(crate) struct VideoPatcher {
    still: Option<RgbaImage>,
    frames: u64,
}

impl VideoPatcher {
    /// Keeps the freshly captured raster as the backdrop for later patches.
    pub fn set_still(&mut self, image: RgbaImage) {
        self.still = Some(image);
    }

    pub fn clear(&mut self) {
        self.still = None;
    }

    /// Patches every eligible video; while scrolling only every other frame.
    /// Returns how many regions were uploaded.
    pub fn refresh(
        &mut self,
        page: &Page,
        target: NodeId,
        space: &CaptureSpace,
        top_lens_z: i32,
        scrolling: bool,
        compositor: &mut dyn Compositor,
    ) -> usize {
        let frame = self.frames;
        self.frames += 1;
        if scrolling && frame % 2 == 1 {
            return 0;
        }
        let Some(still) = self.still.as_ref() else {
            return 0;
        };
        let mut patched = 0;
        for VideoRegion { node, region } in patchable_videos(page, target, space, top_lens_z) {
            let Some(video) = page.node(node).ok().and_then(|data| data.video.as_ref()) else {
                continue;
            };
            let current = match video.current_frame() {
                Ok(current) => current,
                Err(err) => {
                    tracing::debug!(node = node.index(), error = %err, "video frame skipped");
                    continue;
                }
            };
            let scratch = composite(still, &region, &current);
            match compositor.patch_snapshot(region.x, region.y, &scratch) {
                Ok(()) => patched += 1,
                Err(err) => {
                    tracing::warn!(node = node.index(), error = %err, "video patch skipped")
                }
            }
        }
        if patched > 0 {
            tracing::trace!(patched, "video regions patched");
        }
        patched
    }
}

/// The still region under the video with the frame scaled over it.
fn composite(still: &RgbaImage, region: &PixelRect, frame: &RgbaImage) -> RgbaImage {
    let mut scratch =
        imageops::crop_imm(still, region.x, region.y, region.width, region.height).to_image();
    let scaled = if frame.dimensions() == (region.width, region.height) {
        frame.clone()
    } else {
        imageops::resize(frame, region.width, region.height, FilterType::Triangle)
    };
    imageops::overlay(&mut scratch, &scaled, 0, 0);
    scratch
}
