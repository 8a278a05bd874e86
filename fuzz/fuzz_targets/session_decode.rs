#![no_main]

use h264_session::backend::dummy::Advance;
use h264_session::backend::dummy::DummyEngine;
use h264_session::backend::dummy::Step;
use h264_session::backend::EngineInfo;
use h264_session::decoder::DecodeSession;
use h264_session::utils::NalIterator;
use libfuzzer_sys::fuzz_target;

// The first bytes script the engine, three bytes per step, the rest is the stream.
fuzz_target!(|data: &[u8]| {
    let (script, stream) = data.split_at(data.len().min(48));

    let steps = script.chunks_exact(3).map(|step| {
        let advance = match step[1] {
            0xff => Advance::All,
            n => Advance::Bytes(n as usize),
        };
        match step[0] % 4 {
            0 => Step::raw(step[2] as i8 as i32, advance),
            1 => Step::headers(
                EngineInfo {
                    pic_width: u32::from(step[2] % 40),
                    pic_height: u32::from(step[2] % 7),
                    ..Default::default()
                },
                advance,
            ),
            2 => Step::picture(advance),
            _ => Step::held_picture(u32::from(step[2]), advance),
        }
    });
    let mut session =
        DecodeSession::from_engine(DummyEngine::with_script(Default::default(), steps));

    for (pic_id, unit) in NalIterator::new(stream).enumerate() {
        if let Ok(outcome) = session.decode(unit, pic_id as u32, Default::default()) {
            assert!(outcome.consumed() <= unit.len());
            if let Some(picture) = outcome.picture() {
                assert_eq!(picture.data.len(), picture.geometry.picture_size());
                let mut visible = vec![0; picture.cropped_size()];
                let _ = picture.copy_cropped(&mut visible);
            }
        }
    }

    if let Ok(pictures) = session.flush() {
        for picture in pictures {
            assert_eq!(picture.data.len(), picture.geometry.picture_size());
        }
    }
});
