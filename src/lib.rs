// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Streaming decode sessions for software H.264 decode engines.
//!
//! A [`decoder::DecodeSession`] owns a [`backend::CodecEngine`] and drives it over
//! caller-supplied byte ranges, keeping track of the stream geometry and handing out
//! zero-copy [`decoder::Picture`]s as the engine produces them.

pub mod backend;
pub mod decoder;
pub mod utils;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Whether both dimensions are non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl From<(u32, u32)> for Resolution {
    fn from(value: (u32, u32)) -> Self {
        Self {
            width: value.0,
            height: value.1,
        }
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(value: Resolution) -> Self {
        (value.width, value.height)
    }
}

/// Returns the size of a 4:2:0 planar frame of `width`x`height`. This is the layout the engines
/// always produce, so the chroma planes are a quarter of the luma plane each.
pub fn i420_frame_size(width: usize, height: usize) -> usize {
    width * height * 3 / 2
}

/// Copies the `width`x`height` area starting at (`left`, `top`) of the I420 frame `src`, whose
/// luma plane is `stride` samples wide and `rows` samples high, into `dst` without any padding.
pub fn i420_copy(
    src: &[u8],
    mut dst: &mut [u8],
    stride: usize,
    rows: usize,
    (left, top): (usize, usize),
    (width, height): (usize, usize),
) {
    // Copy luma
    let mut luma = &src[top * stride + left..];
    for _ in 0..height {
        dst[..width].copy_from_slice(&luma[..width]);
        dst = &mut dst[width..];
        luma = &luma[stride.min(luma.len())..];
    }

    // Align width and height to 2 for U and V planes.
    let width = if width % 2 == 1 { width + 1 } else { width };
    let height = if height % 2 == 1 { height + 1 } else { height };

    // 1 sample per 4 pixels.
    let width = width / 2;
    let height = height / 2;
    let chroma_stride = stride / 2;
    let chroma_offset = (top / 2) * chroma_stride + left / 2;

    let u_start = stride * rows;
    let v_start = u_start + chroma_stride * (rows / 2);

    for plane_start in [u_start, v_start] {
        let mut chroma = &src[plane_start + chroma_offset..];
        for _ in 0..height {
            dst[..width].copy_from_slice(&chroma[..width]);
            dst = &mut dst[width..];
            chroma = &chroma[chroma_stride.min(chroma.len())..];
        }
    }
}

/// Returns the size required to store a cropped I420 frame of `width`x`height`, i.e. the minimum
/// size of the destination buffer passed to `i420_copy`.
pub fn i420_copy_size(width: usize, height: usize) -> usize {
    // U and V planes need to be aligned to 2.
    let uv_size = ((width + 1) / 2) * ((height + 1) / 2) * 2;

    width * height + uv_size
}
