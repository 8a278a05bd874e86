// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Interface to codec engines.
//!
//! An engine is the provider of the actual decoding: bitstream parsing, reconstruction and
//! reference management all happen behind the [`CodecEngine`] trait. The decode session only
//! submits input, interprets the raw status codes the engine returns, and reads back the
//! pictures the engine has produced.

pub mod dummy;

/// Options passed to the engine when it is initialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Output pictures in decoding order rather than reordering them for display. When set, the
    /// engine never holds pictures back and [`CodecEngine::next_picture`] in end-of-stream mode
    /// has nothing to drain.
    pub no_output_reordering: bool,
}

/// Version of the engine API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

/// One submission of input to [`CodecEngine::decode`].
#[derive(Debug, Clone, Copy)]
pub struct DecodeInput<'a> {
    /// The unconsumed part of the stream. The engine reads from its start.
    pub stream: &'a [u8],
    /// Caller-chosen identifier attached to the picture decoded from this input.
    pub pic_id: u32,
    /// Raw intra concealment method, as understood by the engine.
    pub intra_concealment_method: u32,
}

/// What the engine reports back from a [`CodecEngine::decode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeReturn {
    /// Raw status code. See [`crate::decoder::Status`] for the known values.
    pub status: i32,
    /// Position of the engine's stream cursor after the call, as an offset into
    /// [`DecodeInput::stream`].
    pub stream_position: usize,
}

/// Cropping parameters as reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropParams {
    pub left_offset: u32,
    pub out_width: u32,
    pub top_offset: u32,
    pub out_height: u32,
}

/// Stream information as reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineInfo {
    pub profile: u32,
    pub pic_width: u32,
    pub pic_height: u32,
    pub video_range: u32,
    pub matrix_coefficients: u32,
    pub par_width: u32,
    pub par_height: u32,
    pub cropping_flag: bool,
    pub crop_params: CropParams,
}

/// Identifies one of the engine's internal picture buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub usize);

/// A picture the engine has finished decoding. The samples stay in the engine and are read
/// through [`CodecEngine::picture_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPicture {
    pub buffer: BufferId,
    pub pic_id: u32,
    pub is_idr_picture: bool,
    pub nbr_of_err_mbs: u32,
}

/// A codec engine instance.
///
/// Dropping the engine releases it, along with all the picture memory it owns.
pub trait CodecEngine {
    /// Creates and initializes a new engine instance.
    fn init(config: &EngineConfig) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Returns the version of the API implemented by the engine.
    fn api_version(&self) -> ApiVersion;

    /// Decodes from the start of `input.stream` and reports where the engine stopped reading.
    ///
    /// The engine processes at most one unit of work per call: it stops after a picture has
    /// been completed, after new stream headers have been activated, or when the input runs
    /// out.
    fn decode(&mut self, input: DecodeInput) -> DecodeReturn;

    /// Returns the parameters of the active stream, or the raw status of the failure.
    fn info(&self) -> Result<EngineInfo, i32>;

    /// Returns the next picture ready for output, if any.
    ///
    /// With `end_of_stream` set, pictures held back for display reordering are released as
    /// well.
    fn next_picture(&mut self, end_of_stream: bool) -> Option<OutputPicture>;

    /// Returns the memory backing `buffer`.
    ///
    /// The buffer of a picture returned by [`CodecEngine::next_picture`] keeps its content until
    /// the next call to [`CodecEngine::decode`], which may reuse it. Pulling further pictures does
    /// not invalidate it, so all the pictures released while draining at the end of the stream
    /// can be read together.
    fn picture_data(&self, buffer: BufferId) -> &[u8];
}
