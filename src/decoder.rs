// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

pub mod geometry;
pub mod picture;
pub mod session;

use std::str::FromStr;

use enumn::N;
use thiserror::Error;

use crate::Resolution;

pub use geometry::CropRect;
pub use geometry::StreamGeometry;
pub use picture::OwnedPicture;
pub use picture::Picture;
pub use session::DecodeSession;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to initialize the codec engine")]
    Init(#[source] anyhow::Error),
    #[error("can't get stream info, engine returned {0}")]
    StreamInfo(i32),
    #[error("engine returned unknown status {0}")]
    UnknownStatus(i32),
    #[error("engine cursor moved to {position}, past the end of the {len} input bytes")]
    CursorOutOfBounds { position: usize, len: usize },
    /// The engine output a picture before any stream headers. The picture, identified by
    /// `pic_id` when the engine released it, is dropped.
    #[error("picture {pic_id:?} ready after {consumed} bytes, but no stream headers have been seen yet")]
    GeometryUnknown { consumed: usize, pic_id: Option<u32> },
    #[error("picture buffer holds {actual} bytes, the stream geometry requires {expected}")]
    PictureBufferTooSmall { expected: usize, actual: usize },
    #[error("destination buffer holds {actual} bytes, {expected} are required")]
    DestinationTooSmall { expected: usize, actual: usize },
    #[error("crop rectangle {0:?} does not fit in the picture")]
    InvalidCrop(CropRect),
    #[error("cannot handle the 4:2:0 layout of a {0:?} picture")]
    UnsupportedResolution(Resolution),
}

/// Status codes returned by the engine, with their raw values.
///
/// Negative values are errors, except for [`Status::HdrsNotRdy`] which only means that the
/// engine has not seen enough headers to proceed yet.
#[derive(N, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    StrmProcessed = 1,
    PicRdy = 2,
    PicRdyBuffNotEmpty = 3,
    HdrsRdyBuffNotEmpty = 4,
    ParamErr = -1,
    StrmErr = -2,
    NotInitialized = -3,
    MemFail = -4,
    InitFail = -5,
    HdrsNotRdy = -6,
}

impl Status {
    /// Whether the engine stopped processing the current input on this status.
    pub fn stops_decoding(self) -> bool {
        (self as i32) < 0
    }

    /// Whether this status is an unrecoverable error for the current input.
    pub fn is_error(self) -> bool {
        self.stops_decoding() && self != Status::HdrsNotRdy
    }

    /// Whether a picture has been completed.
    pub fn is_picture_ready(self) -> bool {
        matches!(self, Status::PicRdy | Status::PicRdyBuffNotEmpty)
    }
}

impl TryFrom<i32> for Status {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        Status::n(value).ok_or(Error::UnknownStatus(value))
    }
}

/// How the engine conceals missing or corrupt intra-coded data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConcealmentMode {
    /// Fill the missing macroblocks with gray.
    #[default]
    Gray,
    /// Copy the missing macroblocks from the reference picture.
    Reference,
}

impl From<ConcealmentMode> for u32 {
    fn from(mode: ConcealmentMode) -> Self {
        match mode {
            ConcealmentMode::Gray => 0,
            ConcealmentMode::Reference => 1,
        }
    }
}

impl TryFrom<u32> for ConcealmentMode {
    type Error = &'static str;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(ConcealmentMode::Gray),
            1 => Ok(ConcealmentMode::Reference),
            _ => Err("unrecognized concealment method. Valid values: 0, 1"),
        }
    }
}

impl FromStr for ConcealmentMode {
    type Err = &'static str;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "gray" | "GRAY" => Ok(ConcealmentMode::Gray),
            "reference" | "REFERENCE" => Ok(ConcealmentMode::Reference),
            _ => Err("unrecognized concealment mode. Valid values: gray, reference"),
        }
    }
}

/// Result of a call to [`DecodeSession::decode`].
///
/// `consumed` is always the number of bytes of the submitted input the engine went through
/// during the call, and never exceeds its length.
#[derive(Debug)]
pub enum DecodeOutcome<'a> {
    /// No picture came out of this input. More input is needed.
    Pending { status: Status, consumed: usize },
    /// A picture is ready. Any input past `consumed` has not been looked at and should be
    /// submitted again.
    Picture {
        picture: Picture<'a>,
        /// Whether the engine reported `PIC_RDY_BUFF_NOT_EMPTY`.
        buffer_not_empty: bool,
        consumed: usize,
    },
    /// The engine hit an error. The caller may keep submitting data from the next access unit.
    Failed { status: Status, consumed: usize },
}

impl<'a> DecodeOutcome<'a> {
    /// Returns the status reported by the last engine call.
    pub fn status(&self) -> Status {
        match self {
            DecodeOutcome::Pending { status, .. } | DecodeOutcome::Failed { status, .. } => {
                *status
            }
            DecodeOutcome::Picture {
                buffer_not_empty: true,
                ..
            } => Status::PicRdyBuffNotEmpty,
            DecodeOutcome::Picture { .. } => Status::PicRdy,
        }
    }

    pub fn consumed(&self) -> usize {
        match self {
            DecodeOutcome::Pending { consumed, .. }
            | DecodeOutcome::Picture { consumed, .. }
            | DecodeOutcome::Failed { consumed, .. } => *consumed,
        }
    }

    pub fn picture(&self) -> Option<&Picture<'a>> {
        match self {
            DecodeOutcome::Picture { picture, .. } => Some(picture),
            _ => None,
        }
    }

    pub fn into_picture(self) -> Option<Picture<'a>> {
        match self {
            DecodeOutcome::Picture { picture, .. } => Some(picture),
            _ => None,
        }
    }
}
