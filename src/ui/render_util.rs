use super::{Arc, ImageBuffer, ImageFrame, RenderImage, Rgba};
use handpose_overlay::Surface;

pub(super) fn surface_to_image(surface: &Surface) -> Option<Arc<RenderImage>> {
    if surface.width() == 0 || surface.height() == 0 {
        return None;
    }

    let mut bgra = surface.pixels().to_vec();
    // GPUI expects BGRA; convert in place to avoid the async asset pipeline and flicker.
    for px in bgra.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(surface.width(), surface.height(), bgra)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}
