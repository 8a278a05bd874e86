// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Utility functions used by several parts of this crate.
//!
//! This module is for anything that doesn't fit into the other top-level modules. Try not to add
//! new code here unless it really doesn't belong anywhere else.

use crate::backend::CodecEngine;
use crate::decoder::ConcealmentMode;
use crate::decoder::DecodeOutcome;
use crate::decoder::DecodeSession;
use crate::decoder::Picture;

/// Iterator over the NAL units of an Annex B byte stream. Each item starts with its start code.
pub struct NalIterator<'a> {
    stream: &'a [u8],
    pos: usize,
}

impl<'a> NalIterator<'a> {
    pub fn new(stream: &'a [u8]) -> Self {
        Self { stream, pos: 0 }
    }

    fn find_start_code(&self, offset: usize) -> Option<usize> {
        self.stream
            .get(offset..)?
            .windows(3)
            .position(|window| window == [0x00, 0x00, 0x01])
            .map(|position| offset + position)
    }
}

impl<'a> Iterator for NalIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let mut start = self.find_start_code(self.pos)?;

        // If the preceding byte is 00, then we actually have a four byte SC,
        // i.e. 00 00 00 01 Where the first 00 is the "zero_byte()"
        if start > self.pos && self.stream[start - 1] == 0x00 {
            start -= 1;
        }

        let end = match self.find_start_code(start + 3) {
            Some(mut next) => {
                if self.stream[next - 1] == 0x00 {
                    next -= 1;
                }
                next
            }
            None => self.stream.len(),
        };

        self.pos = end;
        Some(&self.stream[start..end])
    }
}

/// Simple decoding loop that plays the stream once from start to finish.
///
/// Each item of `stream_iter` is decoded with its index as picture id, resubmitting what the
/// engine did not consume until the item is exhausted. Items the engine fails on are skipped
/// after logging. Once the stream has ended, the pictures still held by the engine are flushed.
pub fn simple_playback_loop<E, R, I>(
    session: &mut DecodeSession<E>,
    stream_iter: I,
    concealment: ConcealmentMode,
    on_new_picture: &mut dyn FnMut(Picture),
) -> anyhow::Result<()>
where
    E: CodecEngine,
    R: AsRef<[u8]>,
    I: Iterator<Item = R>,
{
    for (frame_num, packet) in stream_iter.enumerate() {
        let pic_id = frame_num as u32;
        let mut bitstream = packet.as_ref();

        while !bitstream.is_empty() {
            let outcome = session.decode(bitstream, pic_id, concealment)?;
            let consumed = outcome.consumed();

            match outcome {
                DecodeOutcome::Picture { picture, .. } => on_new_picture(picture),
                DecodeOutcome::Pending { .. } if consumed > 0 => (),
                DecodeOutcome::Pending { .. } => break,
                DecodeOutcome::Failed { status, .. } => {
                    log::warn!("skipping the rest of unit {}: {:?}", frame_num, status);
                    break;
                }
            }

            bitstream = &bitstream[consumed..];
        }
    }

    for picture in session.flush()? {
        on_new_picture(picture);
    }

    Ok(())
}
