// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decode sessions.
//!
//! A [`DecodeSession`] drives a [`CodecEngine`] over a stream. Input is submitted through
//! [`DecodeSession::decode`], which keeps feeding the engine until a picture comes out, the input
//! runs out, or the engine fails. Pictures the engine held back for reordering are retrieved with
//! [`DecodeSession::flush`] once the stream has ended.

use crate::backend::ApiVersion;
use crate::backend::CodecEngine;
use crate::backend::DecodeInput;
use crate::backend::EngineConfig;
use crate::backend::OutputPicture;
use crate::decoder::geometry::GeometryCache;
use crate::decoder::ConcealmentMode;
use crate::decoder::DecodeOutcome;
use crate::decoder::Error;
use crate::decoder::Picture;
use crate::decoder::Result;
use crate::decoder::Status;
use crate::decoder::StreamGeometry;

/// Decoding state of one stream.
///
/// The engine is released when the session is dropped.
pub struct DecodeSession<E: CodecEngine> {
    engine: E,
    geometry: GeometryCache,
}

impl<E: CodecEngine> DecodeSession<E> {
    /// Initializes a new engine with `config` and creates a session around it.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let engine = E::init(config).map_err(Error::Init)?;
        Ok(Self::from_engine(engine))
    }

    /// Creates a session around an already initialized `engine`.
    pub fn from_engine(engine: E) -> Self {
        let version = engine.api_version();
        log::debug!(
            "created decode session, engine API version {}.{}",
            version.major,
            version.minor
        );

        Self {
            engine,
            geometry: Default::default(),
        }
    }

    pub fn api_version(&self) -> ApiVersion {
        self.engine.api_version()
    }

    /// Returns the geometry of the stream, or `None` if no headers have been seen yet.
    pub fn geometry(&self) -> Option<&StreamGeometry> {
        self.geometry.current()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Decodes `bitstream`, stopping at the first picture that becomes ready.
    ///
    /// `pic_id` is attached to the pictures decoded from this input. If a picture is returned,
    /// the input past [`DecodeOutcome::consumed`] has not been processed and must be submitted
    /// again.
    ///
    /// Errors are reserved to conditions that leave the session unable to interpret pictures:
    /// stream errors reported by the engine are returned as [`DecodeOutcome::Failed`].
    pub fn decode(
        &mut self,
        bitstream: &[u8],
        pic_id: u32,
        concealment: ConcealmentMode,
    ) -> Result<DecodeOutcome<'_>> {
        let mut consumed = 0;
        let mut status = Status::Ok;

        while consumed < bitstream.len() {
            let remaining = &bitstream[consumed..];
            let ret = self.engine.decode(DecodeInput {
                stream: remaining,
                pic_id,
                intra_concealment_method: concealment.into(),
            });

            if ret.stream_position > remaining.len() {
                return Err(Error::CursorOutOfBounds {
                    position: consumed + ret.stream_position,
                    len: bitstream.len(),
                });
            }
            let advance = ret.stream_position;
            consumed += advance;
            status = Status::try_from(ret.status)?;

            match status {
                Status::PicRdy | Status::PicRdyBuffNotEmpty => {
                    return self.output_picture(status, consumed);
                }
                Status::HdrsRdyBuffNotEmpty => {
                    // Pictures after this point may use the new headers.
                    self.geometry.refresh(&self.engine)?;
                }
                status if status.is_error() => {
                    log::debug!("engine returned {:?} after {} bytes", status, consumed);
                    return Ok(DecodeOutcome::Failed { status, consumed });
                }
                status if status.stops_decoding() => break,
                _ if advance == 0 => {
                    log::warn!(
                        "engine made no progress with {} bytes left ({:?})",
                        remaining.len(),
                        status
                    );
                    break;
                }
                _ => (),
            }
        }

        Ok(DecodeOutcome::Pending { status, consumed })
    }

    /// Retrieves the pictures the engine still holds, in output order.
    ///
    /// Must be called once the stream has ended. Returns no pictures if the stream headers have
    /// never been decoded.
    pub fn flush(&mut self) -> Result<Vec<Picture<'_>>> {
        if self.geometry.current().is_none() {
            log::warn!("flush requested before any stream headers were decoded");
            return Ok(vec![]);
        }

        let mut outputs = vec![];
        while let Some(output) = self.engine.next_picture(true) {
            outputs.push(output);
        }
        log::debug!("flushed {} pictures", outputs.len());

        let this = &*self;
        outputs
            .iter()
            .map(move |output| this.build_picture(output))
            .collect()
    }

    /// Pulls the picture the engine just reported as ready.
    fn output_picture(&mut self, status: Status, consumed: usize) -> Result<DecodeOutcome<'_>> {
        if self.geometry.current().is_none() {
            // Pull the picture anyway so the next one is not mistaken for it.
            let pic_id = self.engine.next_picture(false).map(|output| output.pic_id);
            return Err(Error::GeometryUnknown { consumed, pic_id });
        }

        let output = match self.engine.next_picture(false) {
            Some(output) => output,
            None => {
                // The picture is held for reordering and will come out later.
                log::debug!("picture ready but not released by the engine yet");
                return Ok(DecodeOutcome::Pending { status, consumed });
            }
        };

        Ok(DecodeOutcome::Picture {
            picture: self.build_picture(&output)?,
            buffer_not_empty: status == Status::PicRdyBuffNotEmpty,
            consumed,
        })
    }

    fn build_picture(&self, output: &OutputPicture) -> Result<Picture<'_>> {
        let geometry = self
            .geometry
            .current()
            .ok_or(Error::GeometryUnknown {
                consumed: 0,
                pic_id: Some(output.pic_id),
            })?;

        Picture::new(
            geometry,
            self.geometry.picture_size(),
            self.engine.picture_data(output.buffer),
            output,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::backend::dummy::Advance;
    use crate::backend::dummy::DummyEngine;
    use crate::backend::dummy::Step;
    use crate::backend::BufferId;
    use crate::backend::CropParams;
    use crate::backend::DecodeReturn;
    use crate::backend::EngineInfo;
    use crate::Resolution;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn info(width: u32, height: u32) -> EngineInfo {
        EngineInfo {
            pic_width: width,
            pic_height: height,
            ..Default::default()
        }
    }

    fn session(script: Vec<Step>) -> DecodeSession<DummyEngine> {
        init_logger();
        DecodeSession::from_engine(DummyEngine::with_script(Default::default(), script))
    }

    #[test]
    fn empty_input() {
        let mut session = session(vec![Step::picture(Advance::All)]);

        let outcome = session.decode(&[], 0, Default::default()).unwrap();

        assert!(matches!(
            outcome,
            DecodeOutcome::Pending {
                status: Status::Ok,
                consumed: 0
            }
        ));
        assert_eq!(session.engine().decode_calls(), 0);
    }

    #[test]
    fn headers_then_picture() {
        let mut session = session(vec![
            Step::headers(info(320, 240), Advance::Bytes(20)),
            Step::picture(Advance::Bytes(80)).idr(),
        ]);
        let stream = [0u8; 100];

        let outcome = session.decode(&stream, 42, Default::default()).unwrap();

        assert_eq!(outcome.status(), Status::PicRdy);
        assert_eq!(outcome.consumed(), 100);
        let picture = outcome.into_picture().unwrap();
        assert_eq!(picture.data.len(), 320 * 240 * 3 / 2);
        assert_eq!(picture.pic_id, 42);
        assert!(picture.is_idr_picture);
        assert_eq!(picture.geometry.coded_resolution, Resolution::from((320, 240)));
        assert_eq!(
            picture.geometry.display_resolution(),
            Resolution::from((320, 240))
        );
        assert_eq!(session.engine().decode_calls(), 2);
    }

    #[test]
    fn partial_access_unit() {
        let mut session = session(vec![Step::status(Status::StrmProcessed, Advance::All)]);

        let outcome = session.decode(&[0u8; 37], 0, Default::default()).unwrap();

        assert!(matches!(
            outcome,
            DecodeOutcome::Pending {
                status: Status::StrmProcessed,
                consumed: 37
            }
        ));
    }

    #[test]
    fn stream_error_stops_immediately() {
        let mut session = session(vec![
            Step::status(Status::StrmErr, Advance::Bytes(10)),
            Step::picture(Advance::All),
        ]);

        let outcome = session.decode(&[0u8; 64], 0, Default::default()).unwrap();

        assert!(matches!(
            outcome,
            DecodeOutcome::Failed {
                status: Status::StrmErr,
                consumed: 10
            }
        ));
        assert_eq!(session.engine().decode_calls(), 1);
        assert_eq!(session.engine().remaining_steps(), 1);

        // The session does not reset itself, the caller can go on with the next unit.
        let outcome = session.decode(&[0u8; 64], 1, Default::default()).unwrap();
        assert!(matches!(outcome, DecodeOutcome::Failed { .. }));
    }

    #[test]
    fn headers_not_ready_is_not_an_error() {
        let mut session = session(vec![Step::status(Status::HdrsNotRdy, Advance::Bytes(8))]);

        let outcome = session.decode(&[0u8; 64], 0, Default::default()).unwrap();

        assert!(matches!(
            outcome,
            DecodeOutcome::Pending {
                status: Status::HdrsNotRdy,
                consumed: 8
            }
        ));
    }

    #[test]
    fn picture_leaves_remaining_input() {
        let mut session = session(vec![
            Step::headers(info(16, 16), Advance::Bytes(4)),
            Step::picture(Advance::Bytes(6)).buffer_not_empty(),
        ]);
        let stream = [0u8; 30];

        let outcome = session.decode(&stream, 0, Default::default()).unwrap();

        assert_eq!(outcome.status(), Status::PicRdyBuffNotEmpty);
        assert_eq!(outcome.consumed(), 10);
        assert!(matches!(
            outcome,
            DecodeOutcome::Picture {
                buffer_not_empty: true,
                ..
            }
        ));

        // The rest is processed by the next call.
        let outcome = session.decode(&stream[10..], 1, Default::default()).unwrap();
        assert_eq!(outcome.consumed(), 20);
        assert!(outcome.picture().is_none());
    }

    #[test]
    fn geometry_change_within_one_call() {
        let mut session = session(vec![
            Step::headers(info(16, 16), Advance::Bytes(4)),
            Step::picture(Advance::Bytes(4)),
            Step::headers(info(32, 16), Advance::Bytes(4)),
            Step::picture(Advance::Bytes(4)),
        ]);
        let stream = [0u8; 16];

        let first = session.decode(&stream, 0, Default::default()).unwrap();
        assert_eq!(first.consumed(), 8);
        assert_eq!(first.picture().unwrap().data.len(), 16 * 16 * 3 / 2);

        let second = session.decode(&stream[8..], 1, Default::default()).unwrap();
        assert_eq!(second.consumed(), 8);
        let picture = second.into_picture().unwrap();
        assert_eq!(picture.data.len(), 32 * 16 * 3 / 2);
        assert_eq!(picture.geometry.coded_resolution, Resolution::from((32, 16)));
        assert_eq!(
            session.geometry().map(|g| g.coded_resolution),
            Some(Resolution::from((32, 16)))
        );
    }

    #[test]
    fn cropping() {
        let mut session = session(vec![
            Step::headers(
                EngineInfo {
                    cropping_flag: true,
                    crop_params: CropParams {
                        left_offset: 0,
                        out_width: 1920,
                        top_offset: 0,
                        out_height: 1080,
                    },
                    ..info(1920, 1088)
                },
                Advance::Bytes(4),
            ),
            Step::picture(Advance::All),
        ]);

        let outcome = session.decode(&[0u8; 8], 0, Default::default()).unwrap();
        let picture = outcome.into_picture().unwrap();

        assert_eq!(picture.data.len(), 1920 * 1088 * 3 / 2);
        assert_eq!(
            picture.geometry.display_resolution(),
            Resolution::from((1920, 1080))
        );
    }

    #[test]
    fn broken_headers_are_fatal() {
        let mut session = session(vec![
            Step::broken_headers(Status::StrmErr, Advance::Bytes(4)),
            Step::picture(Advance::All),
        ]);

        let result = session.decode(&[0u8; 8], 0, Default::default());

        assert!(matches!(result, Err(Error::StreamInfo(-2))));
        assert_eq!(session.engine().decode_calls(), 1);
        assert!(session.geometry().is_none());
    }

    #[test]
    fn picture_before_headers() {
        let mut session = session(vec![Step::picture(Advance::Bytes(5))]);

        let result = session.decode(&[0u8; 8], 0, Default::default());

        assert!(matches!(
            result,
            Err(Error::GeometryUnknown {
                consumed: 5,
                pic_id: Some(0)
            })
        ));
    }

    #[test]
    fn picture_before_headers_is_not_output_later() {
        let mut session = session(vec![
            Step::picture(Advance::Bytes(1)),
            Step::headers(info(16, 16), Advance::Bytes(1)),
            Step::picture(Advance::Bytes(1)),
        ]);

        let result = session.decode(&[0u8; 1], 7, Default::default());
        assert!(matches!(
            result,
            Err(Error::GeometryUnknown {
                consumed: 1,
                pic_id: Some(7)
            })
        ));

        let outcome = session.decode(&[0u8; 2], 8, Default::default()).unwrap();
        assert_eq!(outcome.consumed(), 2);
        let picture = outcome.into_picture().unwrap();
        assert_eq!(picture.pic_id, 8);
        assert_eq!(picture.data.len(), 16 * 16 * 3 / 2);
        assert!(picture.data.iter().all(|&b| b == 8));

        // Nothing left behind for the flush either.
        assert!(session.flush().unwrap().is_empty());
    }

    #[test]
    fn cursor_past_input() {
        let mut session = session(vec![Step::status(Status::StrmProcessed, Advance::Bytes(9))]);

        let result = session.decode(&[0u8; 8], 0, Default::default());

        assert!(matches!(
            result,
            Err(Error::CursorOutOfBounds {
                position: 9,
                len: 8
            })
        ));
    }

    #[test]
    fn unknown_status() {
        let mut session = session(vec![Step::raw(-255, Advance::All)]);

        let result = session.decode(&[0u8; 8], 0, Default::default());

        assert!(matches!(result, Err(Error::UnknownStatus(-255))));
    }

    #[test]
    fn stalled_engine() {
        let mut session = session(vec![
            Step::status(Status::StrmProcessed, Advance::Bytes(3)),
            Step::status(Status::StrmProcessed, Advance::Bytes(0)),
            Step::picture(Advance::All),
        ]);

        let outcome = session.decode(&[0u8; 8], 0, Default::default()).unwrap();

        assert!(matches!(
            outcome,
            DecodeOutcome::Pending {
                status: Status::StrmProcessed,
                consumed: 3
            }
        ));
        assert_eq!(session.engine().decode_calls(), 2);
    }

    #[test]
    fn headers_without_progress_continue() {
        let mut session = session(vec![
            Step::headers(info(16, 16), Advance::Bytes(0)),
            Step::picture(Advance::All),
        ]);

        let outcome = session.decode(&[0u8; 8], 0, Default::default()).unwrap();

        assert_eq!(outcome.consumed(), 8);
        assert!(outcome.picture().is_some());
    }

    #[test]
    fn picture_held_for_reordering() {
        let mut session = session(vec![
            Step::headers(info(16, 16), Advance::Bytes(2)),
            Step::held_picture(0, Advance::Bytes(2)),
        ]);

        let outcome = session.decode(&[0u8; 8], 0, Default::default()).unwrap();

        assert!(matches!(
            outcome,
            DecodeOutcome::Pending {
                status: Status::PicRdy,
                consumed: 4
            }
        ));
        assert_eq!(session.flush().unwrap().len(), 1);
    }

    #[test]
    fn flush_in_display_order() {
        let mut session = session(vec![
            Step::headers(info(16, 16), Advance::Bytes(0)),
            Step::held_picture(2, Advance::All),
            Step::held_picture(1, Advance::All),
        ]);
        for pic_id in [10, 11] {
            let outcome = session.decode(&[0u8; 4], pic_id, Default::default()).unwrap();
            assert!(outcome.picture().is_none());
        }

        let pictures = session.flush().unwrap();

        assert_eq!(
            pictures.iter().map(|p| p.pic_id).collect::<Vec<_>>(),
            vec![11, 10]
        );
        for picture in &pictures {
            assert_eq!(picture.data.len(), 16 * 16 * 3 / 2);
            assert!(picture.data.iter().all(|&b| b as u32 == picture.pic_id));
        }

        assert!(session.flush().unwrap().is_empty());
    }

    #[test]
    fn flushed_pictures_survive_buffer_reuse() {
        let mut session = session(vec![
            Step::headers(info(16, 16), Advance::Bytes(0)),
            Step::picture(Advance::All),
            Step::held_picture(1, Advance::All),
            Step::held_picture(0, Advance::All),
        ]);
        let outcome = session.decode(&[0u8; 4], 5, Default::default()).unwrap();
        assert_eq!(outcome.picture().map(|p| p.pic_id), Some(5));
        for pic_id in [6, 7] {
            let outcome = session.decode(&[0u8; 4], pic_id, Default::default()).unwrap();
            assert!(outcome.picture().is_none());
        }
        // The first held picture went into the buffer released by picture 5.
        assert_eq!(session.engine().allocated_buffers(), 2);

        let pictures = session.flush().unwrap();

        assert_eq!(
            pictures.iter().map(|p| p.pic_id).collect::<Vec<_>>(),
            vec![7, 6]
        );
        assert_ne!(pictures[0].data.as_ptr(), pictures[1].data.as_ptr());
        for picture in &pictures {
            assert!(picture.data.iter().all(|&b| b as u32 == picture.pic_id));
        }
    }

    #[test]
    fn odd_geometry_is_not_copied() {
        let mut session = session(vec![
            Step::headers(info(1, 1), Advance::Bytes(0)),
            Step::picture(Advance::All),
        ]);

        let outcome = session.decode(&[0u8; 4], 0, Default::default()).unwrap();
        let picture = outcome.into_picture().unwrap();
        assert_eq!(picture.data.len(), 1);

        let mut dst = vec![0; picture.cropped_size()];
        assert!(matches!(
            picture.copy_cropped(&mut dst),
            Err(Error::UnsupportedResolution(_))
        ));
    }

    #[test]
    fn flush_without_headers() {
        let mut session = session(vec![]);

        assert!(session.flush().unwrap().is_empty());
    }

    #[test]
    fn no_output_reordering() {
        init_logger();
        let config = EngineConfig {
            no_output_reordering: true,
        };
        let mut session = DecodeSession::from_engine(DummyEngine::with_script(
            config,
            [
                Step::headers(info(16, 16), Advance::Bytes(0)),
                Step::held_picture(0, Advance::All),
            ],
        ));

        let outcome = session.decode(&[0u8; 4], 3, Default::default()).unwrap();

        assert_eq!(outcome.picture().map(|p| p.pic_id), Some(3));
        assert!(session.flush().unwrap().is_empty());
    }

    #[test]
    fn short_picture_buffer() {
        let mut session = session(vec![
            Step::headers(info(16, 16), Advance::Bytes(0)),
            Step::picture(Advance::All).buffer_len(100),
        ]);

        let result = session.decode(&[0u8; 4], 0, Default::default());

        assert!(matches!(
            result,
            Err(Error::PictureBufferTooSmall {
                expected: 384,
                actual: 100
            })
        ));
    }

    #[test]
    fn concealment_is_passed_to_engine() {
        struct Recorder(Vec<u32>);

        impl CodecEngine for Recorder {
            fn init(_: &EngineConfig) -> anyhow::Result<Self> {
                Ok(Recorder(vec![]))
            }

            fn api_version(&self) -> ApiVersion {
                Default::default()
            }

            fn decode(&mut self, input: DecodeInput) -> DecodeReturn {
                self.0.push(input.intra_concealment_method);
                DecodeReturn {
                    status: Status::StrmProcessed as i32,
                    stream_position: input.stream.len(),
                }
            }

            fn info(&self) -> std::result::Result<EngineInfo, i32> {
                Err(Status::HdrsNotRdy as i32)
            }

            fn next_picture(&mut self, _: bool) -> Option<OutputPicture> {
                None
            }

            fn picture_data(&self, _: BufferId) -> &[u8] {
                &[]
            }
        }

        let mut session = DecodeSession::<Recorder>::new(&Default::default()).unwrap();
        session
            .decode(&[0; 4], 0, ConcealmentMode::Reference)
            .unwrap();
        session.decode(&[0; 4], 1, ConcealmentMode::Gray).unwrap();

        assert_eq!(session.engine().0, vec![1, 0]);
    }

    /// Engine that counts how many instances are alive.
    struct Counted(Rc<Cell<usize>>);

    thread_local! {
        static ALIVE: Rc<Cell<usize>> = Rc::new(Cell::new(0));
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.set(self.0.get() - 1);
        }
    }

    impl CodecEngine for Counted {
        fn init(config: &EngineConfig) -> anyhow::Result<Self> {
            let alive = ALIVE.with(Rc::clone);
            alive.set(alive.get() + 1);
            let engine = Counted(alive);
            if config.no_output_reordering {
                // The engine is dropped on the way out.
                anyhow::bail!("reordering cannot be disabled");
            }
            Ok(engine)
        }

        fn api_version(&self) -> ApiVersion {
            ApiVersion { major: 1, minor: 2 }
        }

        fn decode(&mut self, input: DecodeInput) -> DecodeReturn {
            DecodeReturn {
                status: Status::StrmProcessed as i32,
                stream_position: input.stream.len(),
            }
        }

        fn info(&self) -> std::result::Result<EngineInfo, i32> {
            Err(Status::HdrsNotRdy as i32)
        }

        fn next_picture(&mut self, _: bool) -> Option<OutputPicture> {
            None
        }

        fn picture_data(&self, _: BufferId) -> &[u8] {
            &[]
        }
    }

    #[test]
    fn engine_is_released() {
        let alive = ALIVE.with(Rc::clone);

        let session = DecodeSession::<Counted>::new(&Default::default()).unwrap();
        assert_eq!(session.api_version(), ApiVersion { major: 1, minor: 2 });
        assert_eq!(alive.get(), 1);
        drop(session);
        assert_eq!(alive.get(), 0);

        let result = DecodeSession::<Counted>::new(&EngineConfig {
            no_output_reordering: true,
        });
        assert!(matches!(result, Err(Error::Init(_))));
        assert_eq!(alive.get(), 0);
    }
}
