use page::DeviceProfile;

/// Longest raster side allowed on memory-constrained mobile devices.
pub const MOBILE_MAX_DIMENSION: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureScale {
    /// Texture pixels per CSS pixel.
    pub scale: f32,
    pub width: u32,
    pub height: u32,
}

/// Chooses the raster size for a capture target of `css_width` x `css_height`.
///
/// The requested resolution is clamped so neither side exceeds
/// `max_texture_size`; constrained mobile devices additionally cap the longer
/// side at [`MOBILE_MAX_DIMENSION`].
pub fn capture_scale(
    css_width: f32,
    css_height: f32,
    resolution: f32,
    max_texture_size: u32,
    device: &DeviceProfile,
) -> CaptureScale {
    let css_width = css_width.max(1.0);
    let css_height = css_height.max(1.0);
    let max_texture = max_texture_size.max(1) as f32;
    let mut scale = resolution
        .max(f32::EPSILON)
        .min(max_texture / css_width)
        .min(max_texture / css_height);
    if device.is_memory_constrained() {
        let longest = css_width.max(css_height);
        scale = scale.min(MOBILE_MAX_DIMENSION as f32 / longest);
    }
    let limit = max_texture_size.max(1);
    let width = ((css_width * scale).round() as u32).clamp(1, limit);
    let height = ((css_height * scale).round() as u32).clamp(1, limit);
    CaptureScale {
        scale,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honours_requested_resolution_when_it_fits() {
        let scale = capture_scale(1000.0, 800.0, 2.0, 4096, &DeviceProfile::default());
        assert_eq!(scale.scale, 2.0);
        assert_eq!((scale.width, scale.height), (2000, 1600));
    }

    #[test]
    fn clamps_to_max_texture_size() {
        let scale = capture_scale(1200.0, 9000.0, 2.0, 4096, &DeviceProfile::default());
        assert!(scale.height <= 4096);
        assert!((scale.scale - 4096.0 / 9000.0).abs() < 1e-6);
        assert!((scale.width as f32 / scale.scale - 1200.0).abs() <= 1.0 / scale.scale);
    }

    #[test]
    fn mobile_cap_applies_only_when_constrained() {
        let phone = DeviceProfile {
            mobile: true,
            memory_gib: Some(2.0),
        };
        let scale = capture_scale(1000.0, 3000.0, 2.0, 16384, &phone);
        assert_eq!(scale.height, MOBILE_MAX_DIMENSION);
        let desktop = capture_scale(1000.0, 3000.0, 2.0, 16384, &DeviceProfile::default());
        assert_eq!(desktop.height, 6000);
    }

    #[test]
    fn degenerate_targets_still_get_a_pixel() {
        let scale = capture_scale(0.0, 0.0, 1.0, 4096, &DeviceProfile::default());
        assert_eq!((scale.width, scale.height), (1, 1));
    }
}
