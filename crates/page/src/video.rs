use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use image::{Rgba as Pixel, RgbaImage};

use crate::color::Rgba;
use crate::error::PageError;

/// `HAVE_CURRENT_DATA`; below this a video has no decodable frame.
pub const HAVE_CURRENT_DATA: u8 = 2;

/// Supplies the frame a `<video>` element is currently showing.
pub trait FrameSource: Send + Sync {
    fn intrinsic_size(&self) -> (u32, u32);
    fn current_frame(&self) -> Result<RgbaImage, PageError>;
}

#[derive(Clone)]
pub struct VideoElement {
    pub ready_state: u8,
    source: Arc<dyn FrameSource>,
}

impl VideoElement {
    pub fn new(ready_state: u8, source: Arc<dyn FrameSource>) -> Self {
        Self {
            ready_state,
            source,
        }
    }

    pub fn has_current_data(&self) -> bool {
        self.ready_state >= HAVE_CURRENT_DATA
    }

    pub fn source(&self) -> &Arc<dyn FrameSource> {
        &self.source
    }

    pub fn current_frame(&self) -> Result<RgbaImage, PageError> {
        self.source.current_frame()
    }
}

impl fmt::Debug for VideoElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoElement")
            .field("ready_state", &self.ready_state)
            .field("size", &self.source.intrinsic_size())
            .finish()
    }
}

/// Always shows the same image.
pub struct StillFrame {
    frame: RgbaImage,
}

impl StillFrame {
    pub fn new(frame: RgbaImage) -> Self {
        Self { frame }
    }

    pub fn solid(width: u32, height: u32, color: Rgba) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, Pixel(color.to_u8())))
    }
}

impl FrameSource for StillFrame {
    fn intrinsic_size(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    fn current_frame(&self) -> Result<RgbaImage, PageError> {
        Ok(self.frame.clone())
    }
}

/// Moving vertical bars; advances one step per pulled frame.
pub struct TestPattern {
    width: u32,
    height: u32,
    colors: Vec<Rgba>,
    step: AtomicU32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, colors: Vec<Rgba>) -> Self {
        let colors = if colors.is_empty() {
            vec![Rgba::BLACK, Rgba::WHITE]
        } else {
            colors
        };
        Self {
            width,
            height,
            colors,
            step: AtomicU32::new(0),
        }
    }
}

impl FrameSource for TestPattern {
    fn intrinsic_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn current_frame(&self) -> Result<RgbaImage, PageError> {
        if self.width == 0 || self.height == 0 {
            return Err(PageError::FrameUnavailable("zero-sized pattern".into()));
        }
        let step = self.step.fetch_add(1, Ordering::Relaxed);
        let bar = (self.width / self.colors.len() as u32).max(1);
        let count = self.colors.len() as u32;
        Ok(RgbaImage::from_fn(self.width, self.height, |x, _| {
            let index = ((x + step) / bar) % count;
            Pixel(self.colors[index as usize].to_u8())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_gate() {
        let source: Arc<dyn FrameSource> = Arc::new(StillFrame::solid(2, 2, Rgba::WHITE));
        assert!(!VideoElement::new(1, source.clone()).has_current_data());
        assert!(VideoElement::new(2, source).has_current_data());
    }

    #[test]
    fn test_pattern_advances() {
        let pattern = TestPattern::new(4, 1, vec![Rgba::BLACK, Rgba::WHITE]);
        let first = pattern.current_frame().expect("frame");
        let second = pattern.current_frame().expect("frame");
        assert_eq!(first.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_ne!(first, second);
        assert!(TestPattern::new(0, 4, Vec::new()).current_frame().is_err());
    }
}
