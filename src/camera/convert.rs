use std::{convert::TryFrom, time::Instant};

use anyhow::{Result, anyhow, ensure};
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

/// Decodes a captured buffer into an RGBA frame stamped with the capture time.
pub fn frame_from_buffer(buffer: &Buffer) -> Result<Frame> {
    let resolution = buffer.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let rgba = to_rgba(buffer.source_frame_format(), buffer.buffer(), width, height)?;
    Ok(Frame {
        rgba,
        width,
        height,
        timestamp: Instant::now(),
    })
}

pub fn to_rgba(format: FrameFormat, data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    match format {
        FrameFormat::NV12 => {
            ensure_len("NV12", data, pixels + pixels / 2)?;
            let mut rgba = vec![0u8; pixels * 4];
            let image = YuvBiPlanarImage {
                y_plane: &data[..pixels],
                y_stride: width,
                uv_plane: &data[pixels..pixels + pixels / 2],
                uv_stride: width,
                width,
                height,
            };
            yuv_nv12_to_rgba(
                &image,
                &mut rgba,
                width * 4,
                YuvRange::Full,
                YuvStandardMatrix::Bt709,
                YuvConversionMode::Balanced,
            )
            .map_err(|err| anyhow!("NV12 to RGBA failed: {err:?}"))?;
            Ok(rgba)
        }
        FrameFormat::YUYV => {
            ensure_len("YUYV", data, pixels * 2)?;
            let mut rgba = vec![0u8; pixels * 4];
            let packed = YuvPackedImage {
                yuy: data,
                yuy_stride: width * 2,
                width,
                height,
            };
            yuyv422_to_rgba(
                &packed,
                &mut rgba,
                width * 4,
                YuvRange::Full,
                YuvStandardMatrix::Bt709,
            )
            .map_err(|err| anyhow!("YUYV422 to RGBA failed: {err:?}"))?;
            Ok(rgba)
        }
        FrameFormat::MJPEG => decode_mjpeg(data, pixels),
        FrameFormat::RAWRGB => expand_rgb(data, pixels, false),
        FrameFormat::RAWBGR => expand_rgb(data, pixels, true),
        FrameFormat::GRAY => {
            ensure_len("GRAY", data, pixels)?;
            let mut rgba = vec![0u8; pixels * 4];
            rgba.par_chunks_mut(4)
                .zip(data.par_iter().copied())
                .for_each(|(dst, value)| dst.copy_from_slice(&[value, value, value, 255]));
            Ok(rgba)
        }
    }
}

fn ensure_len(label: &str, data: &[u8], expected: usize) -> Result<()> {
    ensure!(
        data.len() >= expected,
        "{label} buffer too small: got {}, expected {expected}",
        data.len()
    );
    Ok(())
}

fn expand_rgb(data: &[u8], pixels: usize, swap_rb: bool) -> Result<Vec<u8>> {
    ensure_len(if swap_rb { "BGR" } else { "RGB" }, data, pixels * 3)?;
    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            let (r, b) = if swap_rb { (src[2], src[0]) } else { (src[0], src[2]) };
            dst.copy_from_slice(&[r, src[1], b, 255]);
        });
    Ok(rgba)
}

fn decode_mjpeg(data: &[u8], pixels: usize) -> Result<Vec<u8>> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let decoded_pixels = match decoder.info() {
        Some(info) => usize::try_from(info.width)
            .and_then(|w| usize::try_from(info.height).map(|h| w * h))
            .map_err(|_| anyhow!("MJPEG dimensions do not fit usize"))?,
        None => pixels,
    };
    ensure!(
        decoded_pixels == pixels,
        "MJPEG frame is {decoded_pixels} pixels but the stream reports {pixels}"
    );
    ensure_len("MJPEG", &rgba, pixels * 4)?;
    Ok(rgba)
}
