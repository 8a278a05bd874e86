// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This file contains a dummy engine whose only purpose is to let the decode session run so we
//! can test it in isolation.
//!
//! Instead of parsing the bitstream, the engine replays a script of [`Step`]s, one per call to
//! `decode`. Once the script is exhausted, every further call consumes all of its input and
//! reports that the stream has been processed.
//!
//! Picture memory is recycled the way a real engine recycles its picture pool: buffers of
//! pictures returned by `next_picture` are given back at the start of the next `decode`, and
//! reused for the pictures that follow. Buffers of pictures still held for reordering are never
//! reused.

use std::collections::VecDeque;

use crate::backend::ApiVersion;
use crate::backend::BufferId;
use crate::backend::CodecEngine;
use crate::backend::DecodeInput;
use crate::backend::DecodeReturn;
use crate::backend::EngineConfig;
use crate::backend::EngineInfo;
use crate::backend::OutputPicture;
use crate::decoder::Status;
use crate::i420_frame_size;

/// How far a step moves the engine's stream cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Consume the whole submitted input.
    All,
    /// Move the cursor by that many bytes, even past the end of the input.
    Bytes(usize),
}

/// What a step does to the engine's pictures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    None,
    /// A picture is completed and can be output right away.
    Ready { is_idr: bool, err_mbs: u32 },
    /// A picture is completed but held back until the end of the stream.
    Held { display_order: u32 },
}

/// One scripted call to `decode`.
#[derive(Debug, Clone)]
pub struct Step {
    status: i32,
    advance: Advance,
    info: Option<Result<EngineInfo, i32>>,
    output: Output,
    buffer_len: Option<usize>,
}

impl Step {
    /// Report `status` without touching the stream state.
    pub fn status(status: Status, advance: Advance) -> Self {
        Self::raw(status as i32, advance)
    }

    /// Report a raw status code, which may be outside of [`Status`].
    pub fn raw(status: i32, advance: Advance) -> Self {
        Self {
            status,
            advance,
            info: None,
            output: Output::None,
            buffer_len: None,
        }
    }

    /// Activate new stream headers described by `info`.
    pub fn headers(info: EngineInfo, advance: Advance) -> Self {
        Self {
            info: Some(Ok(info)),
            ..Self::status(Status::HdrsRdyBuffNotEmpty, advance)
        }
    }

    /// Signal new headers that cannot be queried afterwards: `info` will fail with `status`.
    pub fn broken_headers(status: Status, advance: Advance) -> Self {
        Self {
            info: Some(Err(status as i32)),
            ..Self::status(Status::HdrsRdyBuffNotEmpty, advance)
        }
    }

    /// Complete a picture that is immediately available for output.
    pub fn picture(advance: Advance) -> Self {
        Self {
            output: Output::Ready {
                is_idr: false,
                err_mbs: 0,
            },
            ..Self::status(Status::PicRdy, advance)
        }
    }

    /// Complete a picture that is held back for reordering until the end of the stream, where it
    /// is output according to `display_order`.
    pub fn held_picture(display_order: u32, advance: Advance) -> Self {
        Self {
            output: Output::Held { display_order },
            ..Self::status(Status::PicRdy, advance)
        }
    }

    /// Mark the completed picture as an IDR picture.
    pub fn idr(mut self) -> Self {
        if let Output::Ready { is_idr, .. } = &mut self.output {
            *is_idr = true;
        }
        self
    }

    /// Mark `count` macroblocks of the completed picture as concealed.
    pub fn concealed(mut self, count: u32) -> Self {
        if let Output::Ready { err_mbs, .. } = &mut self.output {
            *err_mbs = count;
        }
        self
    }

    /// Report that input remains after the picture, i.e. `PIC_RDY_BUFF_NOT_EMPTY`.
    pub fn buffer_not_empty(mut self) -> Self {
        if self.status == Status::PicRdy as i32 {
            self.status = Status::PicRdyBuffNotEmpty as i32;
        }
        self
    }

    /// Allocate the picture buffer with `len` bytes instead of the size of a full frame.
    pub fn buffer_len(mut self, len: usize) -> Self {
        self.buffer_len = Some(len);
        self
    }
}

/// Dummy engine that can be used to exercise a decode session.
pub struct DummyEngine {
    config: EngineConfig,
    script: VecDeque<Step>,
    info: Result<EngineInfo, i32>,
    /// Picture memory, indexed by `BufferId`.
    buffers: Vec<Vec<u8>>,
    /// Buffers that can be reused for new pictures.
    free: Vec<BufferId>,
    /// Buffers of pictures returned by `next_picture` since the last call to `decode`.
    released: Vec<BufferId>,
    ready: VecDeque<OutputPicture>,
    held: Vec<(u32, OutputPicture)>,
    decode_calls: usize,
}

impl DummyEngine {
    /// Creates an engine that will replay `script`.
    pub fn with_script<I: IntoIterator<Item = Step>>(config: EngineConfig, script: I) -> Self {
        Self {
            config,
            script: script.into_iter().collect(),
            info: Err(Status::HdrsNotRdy as i32),
            buffers: Default::default(),
            free: Default::default(),
            released: Default::default(),
            ready: Default::default(),
            held: Default::default(),
            decode_calls: 0,
        }
    }

    /// Number of times `decode` has been called.
    pub fn decode_calls(&self) -> usize {
        self.decode_calls
    }

    /// Number of scripted steps that have not been played yet.
    pub fn remaining_steps(&self) -> usize {
        self.script.len()
    }

    /// Number of picture buffers allocated so far.
    pub fn allocated_buffers(&self) -> usize {
        self.buffers.len()
    }

    fn new_picture(&mut self, input: &DecodeInput, step: &Step) -> OutputPicture {
        let frame_size = match self.info {
            Ok(info) => i420_frame_size(info.pic_width as usize, info.pic_height as usize),
            Err(_) => 0,
        };
        let len = step.buffer_len.unwrap_or(frame_size);
        // Fill the samples with the picture id so tests can tell pictures apart.
        let buffer = match self.free.pop() {
            Some(buffer) => {
                let memory = &mut self.buffers[buffer.0];
                memory.clear();
                memory.resize(len, input.pic_id as u8);
                buffer
            }
            None => {
                self.buffers.push(vec![input.pic_id as u8; len]);
                BufferId(self.buffers.len() - 1)
            }
        };

        let (is_idr_picture, nbr_of_err_mbs) = match step.output {
            Output::Ready { is_idr, err_mbs } => (is_idr, err_mbs),
            _ => (false, 0),
        };

        OutputPicture {
            buffer,
            pic_id: input.pic_id,
            is_idr_picture,
            nbr_of_err_mbs,
        }
    }
}

impl CodecEngine for DummyEngine {
    fn init(config: &EngineConfig) -> anyhow::Result<Self> {
        Ok(Self::with_script(*config, []))
    }

    fn api_version(&self) -> ApiVersion {
        ApiVersion { major: 2, minor: 0 }
    }

    fn decode(&mut self, input: DecodeInput) -> DecodeReturn {
        self.decode_calls += 1;
        self.free.append(&mut self.released);

        let step = match self.script.pop_front() {
            Some(step) => step,
            None => {
                return DecodeReturn {
                    status: Status::StrmProcessed as i32,
                    stream_position: input.stream.len(),
                }
            }
        };

        if let Some(info) = step.info {
            self.info = info;
        }

        match step.output {
            Output::None => (),
            Output::Ready { .. } => {
                let picture = self.new_picture(&input, &step);
                self.ready.push_back(picture);
            }
            Output::Held { display_order } => {
                let picture = self.new_picture(&input, &step);
                if self.config.no_output_reordering {
                    self.ready.push_back(picture);
                } else {
                    self.held.push((display_order, picture));
                }
            }
        }

        let stream_position = match step.advance {
            Advance::All => input.stream.len(),
            Advance::Bytes(n) => n,
        };

        DecodeReturn {
            status: step.status,
            stream_position,
        }
    }

    fn info(&self) -> Result<EngineInfo, i32> {
        self.info
    }

    fn next_picture(&mut self, end_of_stream: bool) -> Option<OutputPicture> {
        let picture = match self.ready.pop_front() {
            Some(picture) => picture,
            None if end_of_stream => {
                let next = self
                    .held
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, (order, _))| *order)
                    .map(|(index, _)| index)?;
                self.held.remove(next).1
            }
            None => return None,
        };

        self.released.push(picture.buffer);
        Some(picture)
    }

    fn picture_data(&self, buffer: BufferId) -> &[u8] {
        self.buffers
            .get(buffer.0)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
