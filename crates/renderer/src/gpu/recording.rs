use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use image::RgbaImage;

use crate::error::RendererError;
use crate::geometry::PixelRect;

use super::{Compositor, LensDraw, MirrorId};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Recorded {
    Draw(LensDraw),
    Clear(PixelRect),
    Mirror(MirrorId),
}

#[derive(Debug, Default)]
pub(crate) struct Journal {
    pub frames: Vec<Vec<Recorded>>,
    pub uploads: usize,
    pub allocations: usize,
    pub patches: Vec<(u32, u32, u32, u32)>,
    pub snapshot: Option<RgbaImage>,
    pub surface: (u32, u32),
    pub live_mirrors: BTreeSet<MirrorId>,
}

impl Journal {
    pub fn last_frame(&self) -> &[Recorded] {
        self.frames.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn last_draws(&self) -> Vec<LensDraw> {
        self.last_frame()
            .iter()
            .filter_map(|op| match op {
                Recorded::Draw(draw) => Some(*draw),
                _ => None,
            })
            .collect()
    }

    pub fn last_clears(&self) -> Vec<PixelRect> {
        self.last_frame()
            .iter()
            .filter_map(|op| match op {
                Recorded::Clear(region) => Some(*region),
                _ => None,
            })
            .collect()
    }
}

/// GPU-free compositor that records every call into a shared journal.
pub(crate) struct RecordingCompositor {
    journal: Arc<Mutex<Journal>>,
    max_texture_size: u32,
    current: Vec<Recorded>,
    next_mirror: u64,
}

impl RecordingCompositor {
    pub fn new(max_texture_size: u32) -> (Self, Arc<Mutex<Journal>>) {
        let journal = Arc::new(Mutex::new(Journal::default()));
        (
            Self {
                journal: Arc::clone(&journal),
                max_texture_size,
                current: Vec::new(),
                next_mirror: 0,
            },
            journal,
        )
    }

    fn journal(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.journal.lock().expect("journal poisoned")
    }
}

impl Compositor for RecordingCompositor {
    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.journal().surface = (width, height);
    }

    fn surface_size(&self) -> (u32, u32) {
        self.journal().surface
    }

    fn replace_snapshot(&mut self, image: &RgbaImage) -> Result<(), RendererError> {
        let mut journal = self.journal();
        let same = journal
            .snapshot
            .as_ref()
            .is_some_and(|current| current.dimensions() == image.dimensions());
        if !same {
            journal.allocations += 1;
        }
        journal.uploads += 1;
        journal.snapshot = Some(image.clone());
        Ok(())
    }

    fn patch_snapshot(&mut self, x: u32, y: u32, image: &RgbaImage) -> Result<(), RendererError> {
        let mut journal = self.journal();
        let snapshot = journal.snapshot.as_mut().ok_or(RendererError::NoSnapshot)?;
        let (width, height) = image.dimensions();
        if x + width > snapshot.width() || y + height > snapshot.height() {
            return Err(RendererError::PatchBounds {
                x,
                y,
                width,
                height,
                texture_width: snapshot.width(),
                texture_height: snapshot.height(),
            });
        }
        image::imageops::replace(snapshot, image, i64::from(x), i64::from(y));
        journal.patches.push((x, y, width, height));
        Ok(())
    }

    fn snapshot_dimensions(&self) -> Option<(u32, u32)> {
        self.journal().snapshot.as_ref().map(RgbaImage::dimensions)
    }

    fn begin_frame(&mut self) {
        self.current.clear();
    }

    fn draw_lens(&mut self, draw: &LensDraw) {
        self.current.push(Recorded::Draw(*draw));
    }

    fn copy_to_mirror(&mut self, mirror: MirrorId) {
        self.current.push(Recorded::Mirror(mirror));
    }

    fn clear_region(&mut self, region: PixelRect) {
        self.current.push(Recorded::Clear(region));
    }

    fn finish_frame(&mut self) -> Result<(), RendererError> {
        let frame = std::mem::take(&mut self.current);
        self.journal().frames.push(frame);
        Ok(())
    }

    fn allocate_mirror(&mut self) -> MirrorId {
        let id = MirrorId::new(self.next_mirror);
        self.next_mirror += 1;
        self.journal().live_mirrors.insert(id);
        id
    }

    fn release_mirror(&mut self, mirror: MirrorId) -> bool {
        self.journal().live_mirrors.remove(&mirror)
    }

    fn live_mirrors(&self) -> usize {
        self.journal().live_mirrors.len()
    }

    /// Mirrors read back as opaque white so tests can see where they land.
    fn read_mirror(&mut self, mirror: MirrorId) -> Result<RgbaImage, RendererError> {
        let journal = self.journal();
        if !journal.live_mirrors.contains(&mirror) {
            return Err(RendererError::UnknownMirror(mirror.id()));
        }
        let (width, height) = journal.surface;
        Ok(RgbaImage::from_pixel(
            width.max(1),
            height.max(1),
            image::Rgba([255, 255, 255, 255]),
        ))
    }

    fn read_overlay(&mut self) -> Result<RgbaImage, RendererError> {
        let (width, height) = self.journal().surface;
        Ok(RgbaImage::new(width.max(1), height.max(1)))
    }
}
