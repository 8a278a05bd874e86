// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Stream geometry, i.e. what is needed to interpret the raw samples of a decoded picture.

use crate::backend::CodecEngine;
use crate::backend::EngineInfo;
use crate::decoder::Error;
use crate::decoder::Result;
use crate::i420_frame_size;
use crate::Resolution;

/// Visible area of a picture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Whether the rectangle lies within a picture of `resolution`.
    pub fn fits(&self, resolution: Resolution) -> bool {
        u64::from(self.left) + u64::from(self.width) <= u64::from(resolution.width)
            && u64::from(self.top) + u64::from(self.height) <= u64::from(resolution.height)
    }
}

/// Geometry of the stream as of the last activated headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamGeometry {
    pub profile: u32,
    /// Size of the decoded pictures, in samples.
    pub coded_resolution: Resolution,
    /// Whether the stream signals cropping. `crop` is meaningful either way.
    pub cropping_flag: bool,
    pub crop: CropRect,
    /// Whether the samples use the full range rather than the video range.
    pub video_range: bool,
    pub matrix_coefficients: u32,
    /// Pixel aspect ratio.
    pub par_width: u32,
    pub par_height: u32,
}

impl StreamGeometry {
    pub fn display_resolution(&self) -> Resolution {
        Resolution::from((self.crop.width, self.crop.height))
    }

    /// Size of a decoded picture, in bytes.
    pub fn picture_size(&self) -> usize {
        i420_frame_size(
            self.coded_resolution.width as usize,
            self.coded_resolution.height as usize,
        )
    }
}

impl From<EngineInfo> for StreamGeometry {
    fn from(info: EngineInfo) -> Self {
        let coded_resolution = Resolution::from((info.pic_width, info.pic_height));
        let crop = if info.cropping_flag {
            CropRect {
                left: info.crop_params.left_offset,
                top: info.crop_params.top_offset,
                width: info.crop_params.out_width,
                height: info.crop_params.out_height,
            }
        } else {
            CropRect {
                left: 0,
                top: 0,
                width: info.pic_width,
                height: info.pic_height,
            }
        };

        Self {
            profile: info.profile,
            coded_resolution,
            cropping_flag: info.cropping_flag,
            crop,
            video_range: info.video_range != 0,
            matrix_coefficients: info.matrix_coefficients,
            par_width: info.par_width,
            par_height: info.par_height,
        }
    }
}

/// Last geometry queried from the engine, along with the derived picture size.
///
/// The geometry is unknown until the first successful refresh, and becomes unknown again if a
/// refresh fails.
#[derive(Debug, Default)]
pub(crate) struct GeometryCache {
    geometry: Option<StreamGeometry>,
    picture_size: usize,
}

impl GeometryCache {
    /// Queries the current geometry from `engine`.
    pub(crate) fn refresh<E: CodecEngine + ?Sized>(&mut self, engine: &E) -> Result<()> {
        let info = match engine.info() {
            Ok(info) => info,
            Err(status) => {
                self.geometry = None;
                self.picture_size = 0;
                return Err(Error::StreamInfo(status));
            }
        };

        let geometry = StreamGeometry::from(info);
        if self.geometry.as_ref() != Some(&geometry) {
            log::debug!(
                "stream geometry changed: {}x{}, crop {:?}",
                geometry.coded_resolution.width,
                geometry.coded_resolution.height,
                geometry.crop
            );
        }

        self.picture_size = geometry.picture_size();
        self.geometry = Some(geometry);

        Ok(())
    }

    pub(crate) fn current(&self) -> Option<&StreamGeometry> {
        self.geometry.as_ref()
    }

    pub(crate) fn picture_size(&self) -> usize {
        self.picture_size
    }
}
