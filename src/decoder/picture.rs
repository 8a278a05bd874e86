// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decoded pictures.
//!
//! A [`Picture`] is a view into memory owned by the engine: it borrows the session that produced
//! it, so the session cannot be driven any further while the picture is alive. Use
//! [`Picture::to_owned_picture`] to keep the samples around for longer.

use bytes::Bytes;

use crate::backend::OutputPicture;
use crate::decoder::Error;
use crate::decoder::Result;
use crate::decoder::StreamGeometry;
use crate::i420_copy;
use crate::i420_copy_size;

/// A decoded picture in 4:2:0 planar layout.
#[derive(Debug, Clone, Copy)]
pub struct Picture<'a> {
    /// Geometry of the stream at the time the picture was output.
    pub geometry: StreamGeometry,
    /// Samples of the whole coded picture: the luma plane followed by the two chroma planes.
    pub data: &'a [u8],
    /// Identifier given to the input the picture was decoded from.
    pub pic_id: u32,
    pub is_idr_picture: bool,
    /// Number of macroblocks that had to be concealed.
    pub nbr_of_err_mbs: u32,
}

impl<'a> Picture<'a> {
    /// Builds a picture from the first `size` bytes of `data`.
    pub(crate) fn new(
        geometry: &StreamGeometry,
        size: usize,
        data: &'a [u8],
        output: &OutputPicture,
    ) -> Result<Self> {
        let data = data.get(..size).ok_or(Error::PictureBufferTooSmall {
            expected: size,
            actual: data.len(),
        })?;

        Ok(Self {
            geometry: *geometry,
            data,
            pic_id: output.pic_id,
            is_idr_picture: output.is_idr_picture,
            nbr_of_err_mbs: output.nbr_of_err_mbs,
        })
    }

    /// Returns the Y, U and V planes of the picture.
    pub fn planes(&self) -> (&'a [u8], &'a [u8], &'a [u8]) {
        let resolution = self.geometry.coded_resolution;
        let luma_size = resolution.width as usize * resolution.height as usize;
        let chroma_size = luma_size / 4;

        let (y, chroma) = self.data.split_at(luma_size.min(self.data.len()));
        let (u, v) = chroma.split_at(chroma_size.min(chroma.len()));

        (y, u, v)
    }

    /// Size of the buffer required by [`Picture::copy_cropped`].
    pub fn cropped_size(&self) -> usize {
        let crop = self.geometry.crop;
        i420_copy_size(crop.width as usize, crop.height as usize)
    }

    /// Copies the visible area of the picture into `dst`, as I420 without padding.
    ///
    /// The coded resolution must be even in both dimensions, so that the chroma planes cover the
    /// luma plane exactly.
    pub fn copy_cropped(&self, dst: &mut [u8]) -> Result<()> {
        let crop = self.geometry.crop;
        let resolution = self.geometry.coded_resolution;

        if resolution.width % 2 != 0 || resolution.height % 2 != 0 {
            return Err(Error::UnsupportedResolution(resolution));
        }

        let picture_size = self.geometry.picture_size();
        if self.data.len() < picture_size {
            return Err(Error::PictureBufferTooSmall {
                expected: picture_size,
                actual: self.data.len(),
            });
        }

        if !crop.fits(resolution) {
            return Err(Error::InvalidCrop(crop));
        }

        let expected = self.cropped_size();
        if dst.len() < expected {
            return Err(Error::DestinationTooSmall {
                expected,
                actual: dst.len(),
            });
        }

        i420_copy(
            self.data,
            dst,
            resolution.width as usize,
            resolution.height as usize,
            (crop.left as usize, crop.top as usize),
            (crop.width as usize, crop.height as usize),
        );

        Ok(())
    }

    /// CRC32 of the picture samples.
    pub fn crc32(&self) -> u32 {
        crc32fast::hash(self.data)
    }

    /// Copies the samples out of the engine memory.
    pub fn to_owned_picture(&self) -> OwnedPicture {
        OwnedPicture {
            geometry: self.geometry,
            data: Bytes::copy_from_slice(self.data),
            pic_id: self.pic_id,
            is_idr_picture: self.is_idr_picture,
            nbr_of_err_mbs: self.nbr_of_err_mbs,
        }
    }
}

/// A [`Picture`] whose samples have been copied out of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedPicture {
    pub geometry: StreamGeometry,
    pub data: Bytes,
    pub pic_id: u32,
    pub is_idr_picture: bool,
    pub nbr_of_err_mbs: u32,
}

impl OwnedPicture {
    /// Borrows the picture again, e.g. to use the plane and crop helpers.
    pub fn as_picture(&self) -> Picture<'_> {
        Picture {
            geometry: self.geometry,
            data: &self.data,
            pic_id: self.pic_id,
            is_idr_picture: self.is_idr_picture,
            nbr_of_err_mbs: self.nbr_of_err_mbs,
        }
    }
}
