// Letterbox coordinate mapping between viewport space and image pixel space.
// Rule: the image is fitted inside the container, aspect ratio preserved, centered.
// See DESIGN.md: Coordinate Mapper

use crate::types::*;

/// Scale and centering offsets of an image rendered inside a container.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f64,
    offset_x: f64,
    offset_y: f64,
    rendered_w: f64,
    rendered_h: f64,
}

impl Letterbox {
    fn fit(container: ContainerDimensions, image: ImageDimensions) -> Option<Self> {
        let (cw, ch) = (container.width, container.height);
        let (iw, ih) = (image.width as f64, image.height as f64);
        // NaN sizes fail these comparisons too.
        if !(cw > 0.0 && ch > 0.0 && iw > 0.0 && ih > 0.0) {
            return None;
        }

        let scale = (cw / iw).min(ch / ih);
        let rendered_w = iw * scale;
        let rendered_h = ih * scale;

        Some(Letterbox {
            scale,
            offset_x: (cw - rendered_w) / 2.0,
            offset_y: (ch - rendered_h) / 2.0,
            rendered_w,
            rendered_h,
        })
    }

    fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.offset_x
            && x <= self.offset_x + self.rendered_w
            && y >= self.offset_y
            && y <= self.offset_y + self.rendered_h
    }
}

/// Maps taps to image pixels and back for a `contain`-style image view.
///
/// Both inputs arrive from layout callbacks and are last-write-wins.
#[derive(Debug, Clone, Default)]
pub struct CoordinateMapper {
    container: ContainerDimensions,
    image: Option<ImageDimensions>,
}

impl CoordinateMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container(&self) -> ContainerDimensions {
        self.container
    }

    pub fn image(&self) -> Option<ImageDimensions> {
        self.image
    }

    pub fn set_container(&mut self, container: ContainerDimensions) {
        self.container = container;
    }

    pub fn set_image(&mut self, image: ImageDimensions) {
        self.image = Some(image);
    }

    pub fn clear_image(&mut self) {
        self.image = None;
    }

    /// Map a tap in container coordinates to image pixels.
    /// Returns `None` when sizes are unknown or the tap lands in the letterbox margin.
    pub fn map_tap_to_image_pixels(&self, tap_x: f64, tap_y: f64) -> Option<ImagePoint> {
        let image = self.image?;
        let fit = Letterbox::fit(self.container, image)?;

        if !fit.contains(tap_x, tap_y) {
            return None;
        }

        // A tap on the far edge rounds to `width`; keep the point inside the image.
        let px = ((tap_x - fit.offset_x) / fit.scale).round() as u32;
        let py = ((tap_y - fit.offset_y) / fit.scale).round() as u32;
        Some(ImagePoint::new(
            px.min(image.width - 1),
            py.min(image.height - 1),
        ))
    }

    /// Project an image pixel back into container coordinates for the marker overlay.
    pub fn map_image_pixels_to_screen(&self, px: u32, py: u32) -> Option<ScreenPoint> {
        let fit = Letterbox::fit(self.container, self.image?)?;
        Some(ScreenPoint::new(
            fit.offset_x + px as f64 * fit.scale,
            fit.offset_y + py as f64 * fit.scale,
        ))
    }
}
