use image::{Rgba as Pixel, RgbaImage};

const TOP: [f32; 3] = [0.93, 0.95, 0.98];
const BOTTOM: [f32; 3] = [0.78, 0.82, 0.90];

/// Soft vertical gradient used when no tier produced an image.
pub fn placeholder(width: u32, height: u32) -> RgbaImage {
    let span = height.saturating_sub(1).max(1) as f32;
    RgbaImage::from_fn(width.max(1), height.max(1), |_, y| {
        let t = y as f32 / span;
        let channel = |index: usize| {
            let value = TOP[index] + (BOTTOM[index] - TOP[index]) * t;
            (value.clamp(0.0, 1.0) * 255.0).round() as u8
        };
        Pixel([channel(0), channel(1), channel(2), 255])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_opaque_gradient() {
        let image = placeholder(4, 10);
        assert_eq!(image.dimensions(), (4, 10));
        let top = image.get_pixel(0, 0).0;
        let bottom = image.get_pixel(0, 9).0;
        assert_eq!(top[3], 255);
        assert!(top[0] > bottom[0]);
    }
}
