//! RGBA drawing surface and the landmark overlay painted on top of each video frame.

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use rayon::prelude::*;

use crate::{
    skeleton::HAND_CONNECTIONS,
    types::{Frame, Hand, Resolution},
};

pub const DEFAULT_LINE_THICKNESS: i32 = 3;
pub const DEFAULT_LANDMARK_RADIUS: i32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateMode {
    /// Draw only when `score > threshold`.
    Strict,
    /// Draw when `score >= threshold`.
    Inclusive,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConfidenceGate {
    pub threshold: f32,
    pub mode: GateMode,
}

impl ConfidenceGate {
    pub const fn strict(threshold: f32) -> Self {
        Self {
            threshold,
            mode: GateMode::Strict,
        }
    }

    pub const fn inclusive(threshold: f32) -> Self {
        Self {
            threshold,
            mode: GateMode::Inclusive,
        }
    }

    pub fn passes(&self, score: f32) -> bool {
        match self.mode {
            GateMode::Strict => score > self.threshold,
            GateMode::Inclusive => score >= self.threshold,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayStyle {
    pub tint: [u8; 4],
    pub connection_color: [u8; 4],
    pub landmark_color: [u8; 4],
    pub line_thickness: i32,
    pub landmark_radius: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            tint: [0, 0, 0, 77],
            connection_color: [0, 255, 136, 255],
            landmark_color: [255, 51, 102, 255],
            line_thickness: DEFAULT_LINE_THICKNESS,
            landmark_radius: DEFAULT_LANDMARK_RADIUS,
        }
    }
}

/// 2D raster canvas the video frame and overlay are composited onto.
#[derive(Clone, Debug, Default)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[idx..idx + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Resizes the canvas. Contents are cleared.
    pub fn resize(&mut self, resolution: Resolution) {
        self.width = resolution.width;
        self.height = resolution.height;
        self.pixels = vec![0u8; resolution.width as usize * resolution.height as usize * 4];
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|&b| b == 0)
    }

    /// Copies `frame` onto the surface, scaling it when the sizes differ.
    pub fn draw_frame(&mut self, frame: &Frame) -> Result<()> {
        let expected_len = (frame.width as usize)
            .saturating_mul(frame.height as usize)
            .saturating_mul(4);
        if frame.rgba.len() != expected_len {
            return Err(anyhow!(
                "frame buffer size mismatch: got {}, expected {}",
                frame.rgba.len(),
                expected_len
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Ok(());
        }

        if frame.width == self.width && frame.height == self.height {
            self.pixels.copy_from_slice(&frame.rgba);
            return Ok(());
        }

        let src = fir::images::Image::from_vec_u8(
            frame.width,
            frame.height,
            frame.rgba.clone(),
            fir::PixelType::U8x4,
        )?;
        let mut dst = fir::images::Image::new(self.width, self.height, fir::PixelType::U8x4);
        let options = fir::ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
        fir::Resizer::new()
            .resize(&src, &mut dst, Some(&options))
            .context("failed to scale frame onto surface")?;
        self.pixels = dst.into_vec();
        Ok(())
    }

    /// Blends `color` over the whole surface using its alpha channel.
    pub fn fill(&mut self, color: [u8; 4]) {
        if color[3] == 0 {
            return;
        }
        self.pixels
            .par_chunks_exact_mut(4)
            .for_each(|px| blend_into(px, color));
    }

    pub fn stroke_line(&mut self, p0: (f32, f32), p1: (f32, f32), color: [u8; 4], thickness: i32) {
        let (mut x0, mut y0) = (p0.0 as i32, p0.1 as i32);
        let (x1, y1) = (p1.0 as i32, p1.1 as i32);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let radius = (thickness.max(1) - 1) / 2;

        loop {
            self.put_pixel(x0, y0, color);
            for ox in -radius..=radius {
                for oy in -radius..=radius {
                    if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                        self.put_pixel(x0 + ox, y0 + oy, color);
                    }
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    pub fn fill_circle(&mut self, center: (f32, f32), radius: i32, color: [u8; 4]) {
        let (cx, cy) = (center.0 as i32, center.1 as i32);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn put_pixel(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if x < 0 || y < 0 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        if ux >= self.width || uy >= self.height {
            return;
        }
        let idx = (uy as usize * self.width as usize + ux as usize) * 4;
        blend_into(&mut self.pixels[idx..idx + 4], color);
    }
}

fn blend_into(dst: &mut [u8], color: [u8; 4]) {
    let alpha = color[3] as u32;
    if alpha == 255 {
        dst.copy_from_slice(&color);
        return;
    }
    let inv = 255 - alpha;
    for channel in 0..3 {
        dst[channel] = ((color[channel] as u32 * alpha + dst[channel] as u32 * inv + 127) / 255) as u8;
    }
    dst[3] = dst[3].max(color[3]);
}

#[derive(Clone, Debug)]
pub struct OverlayRenderer {
    style: OverlayStyle,
    gate: ConfidenceGate,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle, gate: ConfidenceGate) -> Self {
        Self { style, gate }
    }

    pub fn gate(&self) -> ConfidenceGate {
        self.gate
    }

    /// Paints tint, skeleton and landmark markers over a surface that already holds
    /// the current frame.
    pub fn render(&self, surface: &mut Surface, hands: &[Hand]) {
        surface.fill(self.style.tint);

        for hand in hands {
            for &(a, b) in HAND_CONNECTIONS {
                let (Some(pa), Some(pb)) = (hand.landmark(a), hand.landmark(b)) else {
                    continue;
                };
                if !self.gate.passes(pa.score) || !self.gate.passes(pb.score) {
                    continue;
                }
                surface.stroke_line(
                    (pa.x, pa.y),
                    (pb.x, pb.y),
                    self.style.connection_color,
                    self.style.line_thickness,
                );
            }

            for landmark in &hand.landmarks {
                if !self.gate.passes(landmark.score) {
                    continue;
                }
                surface.fill_circle(
                    (landmark.x, landmark.y),
                    self.style.landmark_radius,
                    self.style.landmark_color,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Handedness, Landmark};

    const BLACK: [u8; 4] = [0, 0, 0, 255];

    fn untinted(gate: ConfidenceGate) -> OverlayRenderer {
        OverlayRenderer::new(
            OverlayStyle {
                tint: [0, 0, 0, 0],
                ..OverlayStyle::default()
            },
            gate,
        )
    }

    fn single_point(score: f32) -> Hand {
        Hand {
            landmarks: vec![Landmark {
                x: 10.0,
                y: 10.0,
                score,
                joint: 0,
            }],
            score,
            handedness: Handedness::Unknown,
        }
    }

    fn black_surface() -> Surface {
        let mut surface = Surface::new(32, 32);
        surface.draw_frame(&Frame::solid(32, 32, BLACK)).unwrap();
        surface
    }

    fn marker_drawn(renderer: &OverlayRenderer, score: f32) -> bool {
        let mut surface = black_surface();
        renderer.render(&mut surface, &[single_point(score)]);
        surface.pixel(10, 10) != Some(BLACK)
    }

    #[test]
    fn strict_gate_excludes_the_threshold() {
        let renderer = untinted(ConfidenceGate::strict(0.5));
        assert!(!marker_drawn(&renderer, 0.49));
        assert!(!marker_drawn(&renderer, 0.5));
        assert!(marker_drawn(&renderer, 0.500_000_1));
    }

    #[test]
    fn inclusive_gate_includes_the_threshold() {
        let renderer = untinted(ConfidenceGate::inclusive(0.5));
        assert!(!marker_drawn(&renderer, 0.49));
        assert!(marker_drawn(&renderer, 0.5));
        assert!(marker_drawn(&renderer, 0.500_000_1));
    }

    #[test]
    fn connection_needs_both_endpoints() {
        let renderer = untinted(ConfidenceGate::strict(0.5));
        let hand = Hand {
            landmarks: vec![
                Landmark {
                    x: 2.0,
                    y: 16.0,
                    score: 0.9,
                    joint: 0,
                },
                Landmark {
                    x: 30.0,
                    y: 16.0,
                    score: 0.2,
                    joint: 1,
                },
            ],
            score: 0.9,
            handedness: Handedness::Left,
        };

        let mut surface = black_surface();
        renderer.render(&mut surface, &[hand.clone()]);
        // Midpoint of the segment, away from either marker.
        assert_eq!(surface.pixel(16, 16), Some(BLACK));

        let mut both = hand;
        both.landmarks[1].score = 0.9;
        let mut surface = black_surface();
        renderer.render(&mut surface, &[both]);
        assert_eq!(
            surface.pixel(16, 16),
            Some(OverlayStyle::default().connection_color)
        );
    }

    #[test]
    fn tint_blends_over_frame() {
        let renderer = OverlayRenderer::new(
            OverlayStyle {
                tint: [0, 0, 0, 128],
                ..OverlayStyle::default()
            },
            ConfidenceGate::strict(0.5),
        );
        let mut surface = Surface::new(4, 4);
        surface
            .draw_frame(&Frame::solid(4, 4, [200, 200, 200, 255]))
            .unwrap();
        renderer.render(&mut surface, &[]);
        let px = surface.pixel(0, 0).unwrap();
        assert!(px[0] > 90 && px[0] < 110, "unexpected tinted value {px:?}");
        assert_eq!(px[3], 255);
    }

    #[test]
    fn frames_are_scaled_to_surface() {
        let mut surface = Surface::new(8, 6);
        surface
            .draw_frame(&Frame::solid(16, 12, [10, 20, 30, 255]))
            .unwrap();
        assert_eq!(surface.pixels().len(), 8 * 6 * 4);
        assert_eq!(surface.pixel(3, 3), Some([10, 20, 30, 255]));
    }

    #[test]
    fn malformed_frame_is_rejected() {
        let mut surface = Surface::new(4, 4);
        let mut frame = Frame::solid(4, 4, BLACK);
        frame.rgba.truncate(10);
        assert!(surface.draw_frame(&frame).is_err());
    }

    #[test]
    fn drawing_outside_bounds_is_clipped() {
        let mut surface = Surface::new(4, 4);
        surface.fill_circle((-20.0, -20.0), 3, [255, 0, 0, 255]);
        surface.stroke_line((-10.0, 2.0), (50.0, 2.0), [255, 0, 0, 255], 1);
        assert_eq!(surface.pixel(0, 2), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(0, 0), Some([0, 0, 0, 0]));
    }
}
