// Mixer module - the code that runs inside the hardware callback.
// Resamples one sound to the output rate and writes or mixes it into the
// callback's target buffer.

use crate::platform::{FillStatus, GenerateRequest};
use crate::sound::{Sound, SoundState};

/// Result of one generate call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MixOutcome {
    /// Frames actually written. The platform truncates playback to this.
    pub frames: usize,
    pub status: FillStatus,
}

impl MixOutcome {
    fn skipped() -> Self {
        Self {
            frames: 0,
            status: FillStatus::Skipped,
        }
    }
}

pub fn greatest_common_divisor(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// `source_rate / output_rate` kept as a reduced fraction so sample indices
/// are computed exactly.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResampleFactor {
    numerator: u32,
    denominator: u32,
}

impl ResampleFactor {
    /// Both rates must be non-zero.
    pub fn new(source_rate: u32, output_rate: u32) -> Self {
        debug_assert!(source_rate > 0 && output_rate > 0);
        let gcd = greatest_common_divisor(source_rate, output_rate).max(1);
        Self {
            numerator: source_rate / gcd,
            denominator: output_rate / gcd,
        }
    }

    pub fn numerator(&self) -> u32 {
        self.numerator
    }

    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    pub fn is_unity(&self) -> bool {
        self.numerator == self.denominator
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// `floor(factor * output_index)`: the nearest earlier source frame.
    pub fn source_index(&self, output_index: usize) -> usize {
        self.source_index_at(0, output_index)
    }

    /// `floor(source_frames / factor)`: output frames addressable from
    /// `source_frames` source frames.
    pub fn output_frames(&self, source_frames: usize) -> usize {
        self.output_frames_at(0, source_frames)
    }

    /// Source frame for `output_index` when the read position already sits
    /// `phase / denominator` of a frame past the cursor.
    pub fn source_index_at(&self, phase: u64, output_index: usize) -> usize {
        ((phase + output_index as u64 * self.numerator as u64) / self.denominator as u64) as usize
    }

    /// Output frames addressable from `source_frames` starting at `phase`.
    pub fn output_frames_at(&self, phase: u64, source_frames: usize) -> usize {
        let span = source_frames as u64 * self.denominator as u64;
        if span <= phase {
            return 0;
        }
        ((span - phase) / self.numerator as u64) as usize
    }

    /// Moves the read position past `frames` output frames. Returns the
    /// whole source frames consumed and the new phase.
    pub fn step(&self, phase: u64, frames: usize) -> (usize, u64) {
        let position = phase + frames as u64 * self.numerator as u64;
        let denominator = self.denominator as u64;
        ((position / denominator) as usize, position % denominator)
    }
}

/// Saturates to the signed 16-bit range.
pub fn clip_to_s16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Fills `request` from the sound's buffer queue.
///
/// Never blocks. Produces nothing if the sound has left `Playing` or its
/// buffers are locked by someone else. Walks the queue from its head,
/// picking `floor(factor * i)` for output frame `i` (no interpolation), and
/// advances each buffer's read offset by the source bytes it used. The
/// fractional part of the read position is kept in the queue, so a request
/// split over several calls reads the same frames as one large call. A
/// buffer whose remainder cannot yield one more output frame is dropped.
pub fn generate_audio(sound: &Sound, request: GenerateRequest<'_>) -> MixOutcome {
    if sound.state() != SoundState::Playing {
        return MixOutcome::skipped();
    }
    let Some(mut buffers) = sound.try_lock_buffers() else {
        return MixOutcome::skipped();
    };
    let GenerateRequest {
        target,
        frames: requested,
        mix,
        stereo,
        output_rate,
    } = request;
    if output_rate == 0 {
        return MixOutcome::skipped();
    }

    let info = sound.codec_info();
    let factor = ResampleFactor::new(info.sample_rate, output_rate);
    let frame_bytes = info.frame_bytes();
    let out_channels = if stereo { 2 } else { 1 };
    let requested = requested.min(target.len() / out_channels);

    let mut phase = buffers.phase(factor.denominator());
    let mut produced = 0;
    while produced < requested {
        let Some(buffer) = buffers.head_mut() else {
            break;
        };

        let available = factor.output_frames_at(phase, buffer.remaining_len() / frame_bytes);
        if available == 0 {
            buffer.exhaust();
            phase = 0;
            continue;
        }

        let frames = available.min(requested - produced);
        upload(
            buffer.remaining(),
            info.channels,
            &factor,
            phase,
            &mut target[produced * out_channels..(produced + frames) * out_channels],
            mix,
            stereo,
        );

        let (consumed, next_phase) = factor.step(phase, frames);
        buffer.advance(consumed * frame_bytes);
        phase = next_phase;
        // partial frame lost
        if factor.output_frames_at(phase, buffer.remaining_len() / frame_bytes) == 0 {
            buffer.exhaust();
            phase = 0;
        }
        produced += frames;
    }
    buffers.set_phase(phase, factor.denominator());

    let status = if produced == requested {
        FillStatus::Complete
    } else if sound.is_done() {
        FillStatus::Ended
    } else {
        log::trace!("{} starved after {} frames", sound.id(), produced);
        FillStatus::Starved
    };

    MixOutcome {
        frames: produced,
        status,
    }
}

fn read_sample(source: &[u8], index: usize) -> i32 {
    let at = index * 2;
    i16::from_ne_bytes([source[at], source[at + 1]]) as i32
}

fn write_sample(slot: &mut i16, value: i32, mix: bool) {
    let value = if mix { *slot as i32 + value } else { value };
    *slot = clip_to_s16(value);
}

fn upload(
    source: &[u8],
    source_channels: u16,
    factor: &ResampleFactor,
    phase: u64,
    target: &mut [i16],
    mix: bool,
    stereo: bool,
) {
    if stereo {
        for (i, frame) in target.chunks_exact_mut(2).enumerate() {
            let index = factor.source_index_at(phase, i);
            let (left, right) = if source_channels == 2 {
                (read_sample(source, index * 2), read_sample(source, index * 2 + 1))
            } else {
                let sample = read_sample(source, index);
                (sample, sample)
            };
            write_sample(&mut frame[0], left, mix);
            write_sample(&mut frame[1], right, mix);
        }
    } else {
        for (i, slot) in target.iter_mut().enumerate() {
            let index = factor.source_index_at(phase, i);
            let sample = if source_channels == 2 {
                (read_sample(source, index * 2) + read_sample(source, index * 2 + 1)) / 2
            } else {
                read_sample(source, index)
            };
            write_sample(slot, sample, mix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PcmCodec;
    use crate::sound::SoundBuffer;

    fn sound(rate: u32, channels: u16, done: bool, buffers: &[&[i16]]) -> Sound {
        let codec = if done {
            PcmCodec::finished(rate, channels)
        } else {
            PcmCodec::new(rate, channels)
        };
        let sound = Sound::new("test", codec).unwrap();
        for samples in buffers {
            sound.push_buffer(SoundBuffer::from_samples(samples));
        }
        sound
    }

    fn request(
        target: &mut [i16],
        frames: usize,
        mix: bool,
        stereo: bool,
        rate: u32,
    ) -> GenerateRequest<'_> {
        GenerateRequest {
            target,
            frames,
            mix,
            stereo,
            output_rate: rate,
        }
    }

    fn ramp(len: usize) -> Vec<i16> {
        (0..len as i16).collect()
    }

    #[test]
    fn test_gcd() {
        assert_eq!(greatest_common_divisor(44100, 22050), 22050);
        assert_eq!(greatest_common_divisor(48000, 44100), 300);
        assert_eq!(greatest_common_divisor(7, 5), 1);
        assert_eq!(greatest_common_divisor(8000, 8000), 8000);
    }

    #[test]
    fn test_gcd_divides_both_rates() {
        let rates = [8000, 11025, 16000, 22050, 32000, 44100, 48000, 96000];
        for &source in &rates {
            for &output in &rates {
                let gcd = greatest_common_divisor(source, output);
                assert_eq!(source % gcd, 0);
                assert_eq!(output % gcd, 0);

                let factor = ResampleFactor::new(source, output);
                let exact = source as f64 / output as f64;
                assert!((factor.as_f64() - exact).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_equal_rates_give_unity_factor() {
        let factor = ResampleFactor::new(44100, 44100);
        assert!(factor.is_unity());
        assert_eq!(factor.as_f64(), 1.0);
        assert_eq!(factor.source_index(123), 123);
        assert_eq!(factor.output_frames(123), 123);
    }

    #[test]
    fn test_clip_to_s16() {
        assert_eq!(clip_to_s16(0), 0);
        assert_eq!(clip_to_s16(32767), 32767);
        assert_eq!(clip_to_s16(-32768), -32768);
        assert_eq!(clip_to_s16(i32::MAX), 32767);
        assert_eq!(clip_to_s16(i32::MIN), -32768);
        assert_eq!(clip_to_s16(40000), 32767);
        for value in [-32768, -1, 0, 1, 1234, 32767] {
            let once = clip_to_s16(value);
            assert_eq!(once as i32, value);
            assert_eq!(clip_to_s16(once as i32), once);
        }
    }

    #[test]
    fn test_same_rate_copies_verbatim() {
        let data = ramp(64);
        let sound = sound(44100, 1, true, &[&data]);
        let mut target = vec![0i16; 64];

        let outcome = generate_audio(&sound, request(&mut target, 64, false, false, 44100));

        assert_eq!(outcome.frames, 64);
        assert_eq!(outcome.status, FillStatus::Complete);
        assert_eq!(target, data);
    }

    #[test]
    fn test_upsample_22050_to_44100() {
        let data = ramp(200);
        let sound = sound(22050, 1, true, &[&data]);
        let factor = ResampleFactor::new(22050, 44100);
        assert_eq!(factor.as_f64(), 0.5);

        let mut target = vec![0i16; 100];
        let outcome = generate_audio(&sound, request(&mut target, 100, false, false, 44100));

        assert_eq!(outcome.frames, 100);
        // 50 source frames consumed, each repeated twice
        let buffers = sound.try_lock_buffers().unwrap();
        assert_eq!(buffers.head().unwrap().read_offset(), 50 * 2);
        drop(buffers);
        assert_eq!(&target[..6], &[0, 0, 1, 1, 2, 2]);
        assert_eq!(target[99], 49);
    }

    #[test]
    fn test_downsample_picks_earlier_samples() {
        let data = ramp(10);
        let sound = sound(88200, 1, true, &[&data]);
        let mut target = vec![0i16; 5];

        let outcome = generate_audio(&sound, request(&mut target, 5, false, false, 44100));

        assert_eq!(outcome.frames, 5);
        assert_eq!(target, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_mix_adds_and_clips() {
        let sound = sound(44100, 1, true, &[&[10000, -10000, 5]]);
        let mut target = vec![30000i16, -30000, 7];

        generate_audio(&sound, request(&mut target, 3, true, false, 44100));

        assert_eq!(target, vec![32767, -32768, 12]);
    }

    #[test]
    fn test_overwrite_ignores_existing_data() {
        let sound = sound(44100, 1, true, &[&[1, 2]]);
        let mut target = vec![500i16, 500];

        generate_audio(&sound, request(&mut target, 2, false, false, 44100));

        assert_eq!(target, vec![1, 2]);
    }

    #[test]
    fn test_stereo_upload_keeps_frames_aligned() {
        let sound = sound(22050, 2, true, &[&[1, -1, 2, -2, 3, -3]]);
        let mut target = vec![0i16; 8];

        let outcome = generate_audio(&sound, request(&mut target, 4, false, true, 44100));

        assert_eq!(outcome.frames, 4);
        assert_eq!(target, vec![1, -1, 1, -1, 2, -2, 2, -2]);
    }

    #[test]
    fn test_mono_source_into_stereo_target() {
        let sound = sound(44100, 1, true, &[&[4, 5]]);
        let mut target = vec![0i16; 4];

        generate_audio(&sound, request(&mut target, 2, false, true, 44100));

        assert_eq!(target, vec![4, 4, 5, 5]);
    }

    #[test]
    fn test_stereo_source_into_mono_target() {
        let sound = sound(44100, 2, true, &[&[100, 300, -50, -150]]);
        let mut target = vec![0i16; 2];

        generate_audio(&sound, request(&mut target, 2, false, false, 44100));

        assert_eq!(target, vec![200, -100]);
    }

    #[test]
    fn test_walks_across_buffers() {
        let sound = sound(44100, 1, true, &[&ramp(10), &[10, 11, 12, 13, 14, 15]]);
        let mut target = vec![0i16; 15];

        let outcome = generate_audio(&sound, request(&mut target, 15, false, false, 44100));

        assert_eq!(outcome.frames, 15);
        assert_eq!(target, ramp(15));
        assert_eq!(sound.remaining_bytes(), 2);
    }

    #[test]
    fn test_partial_frame_is_dropped() {
        // At factor 2 a buffer with 3 frames yields one output frame, the
        // third frame can't make another one and is lost.
        let sound = sound(88200, 1, true, &[&[1, 2, 3], &[7, 8]]);
        let mut target = vec![0i16; 2];

        let outcome = generate_audio(&sound, request(&mut target, 2, false, false, 44100));

        assert_eq!(outcome.frames, 2);
        assert_eq!(target, vec![1, 7]);
        assert_eq!(sound.remaining_bytes(), 0);
    }

    #[test]
    fn test_trailing_odd_byte_is_dropped() {
        let sound = sound(44100, 1, false, &[]);
        sound.push_buffer(SoundBuffer::new(vec![1, 0, 9]));
        let mut target = vec![0i16; 4];

        let outcome = generate_audio(&sound, request(&mut target, 4, false, false, 44100));

        assert_eq!(outcome.frames, 1);
        assert_eq!(sound.remaining_bytes(), 0);
    }

    #[test]
    fn test_starved_when_decoder_is_behind() {
        let sound = sound(44100, 1, false, &[&[1, 2, 3]]);
        let mut target = vec![0i16; 8];

        let outcome = generate_audio(&sound, request(&mut target, 8, false, false, 44100));

        assert_eq!(outcome.frames, 3);
        assert_eq!(outcome.status, FillStatus::Starved);
    }

    #[test]
    fn test_ended_when_decoder_is_done() {
        let sound = sound(44100, 1, true, &[&[1, 2, 3]]);
        let mut target = vec![0i16; 8];

        let outcome = generate_audio(&sound, request(&mut target, 8, false, false, 44100));

        assert_eq!(outcome.frames, 3);
        assert_eq!(outcome.status, FillStatus::Ended);

        let outcome = generate_audio(&sound, request(&mut target, 8, false, false, 44100));
        assert_eq!(outcome.frames, 0);
        assert_eq!(outcome.status, FillStatus::Ended);
    }

    #[test]
    fn test_skips_while_locked() {
        let sound = sound(44100, 1, true, &[&[1, 2, 3]]);
        let guard = sound.try_lock_buffers().unwrap();
        let mut target = vec![9i16; 3];

        let outcome = generate_audio(&sound, request(&mut target, 3, false, false, 44100));

        assert_eq!(outcome, MixOutcome::skipped());
        assert_eq!(target, vec![9, 9, 9]);
        drop(guard);
        assert_eq!(sound.remaining_bytes(), 6);
    }

    #[test]
    fn test_skips_after_leaving_playing() {
        let sound = sound(44100, 1, true, &[&[1, 2, 3]]);
        sound.mark_ended();
        let mut target = vec![0i16; 3];

        let outcome = generate_audio(&sound, request(&mut target, 3, false, false, 44100));

        assert_eq!(outcome.status, FillStatus::Skipped);
        assert_eq!(sound.remaining_bytes(), 6);
        assert!(!sound.is_locked());
    }

    #[test]
    fn test_factor_follows_output_rate_per_call() {
        let sound = sound(22050, 1, true, &[&ramp(100)]);
        let mut target = vec![0i16; 4];

        generate_audio(&sound, request(&mut target, 4, false, false, 44100));
        assert_eq!(target, vec![0, 0, 1, 1]);

        generate_audio(&sound, request(&mut target, 4, false, false, 22050));
        assert_eq!(target, vec![2, 3, 4, 5]);
    }

    fn render_in_blocks(sound: &Sound, total: usize, block: usize, rate: u32) -> Vec<i16> {
        let mut output = vec![0i16; total];
        for chunk in output.chunks_mut(block) {
            let frames = chunk.len();
            let outcome = generate_audio(sound, request(chunk, frames, false, false, rate));
            assert_eq!(outcome.frames, frames);
        }
        output
    }

    #[test]
    fn test_small_blocks_keep_playback_speed() {
        let data = ramp(200);
        let whole = sound(22050, 1, true, &[&data]);
        let split = sound(22050, 1, true, &[&data]);

        let expected = render_in_blocks(&whole, 100, 100, 44100);
        let actual = render_in_blocks(&split, 100, 5, 44100);

        assert_eq!(actual, expected);
        assert_eq!(&actual[..6], &[0, 0, 1, 1, 2, 2]);
        let buffers = split.try_lock_buffers().unwrap();
        assert_eq!(buffers.head().unwrap().read_offset(), 50 * 2);
    }

    #[test]
    fn test_uneven_ratio_matches_single_call() {
        let data = ramp(500);
        let whole = sound(48000, 1, true, &[&data]);
        let split = sound(48000, 1, true, &[&data]);

        let expected = render_in_blocks(&whole, 441, 441, 44100);
        let actual = render_in_blocks(&split, 441, 7, 44100);

        assert_eq!(actual, expected);
        assert_eq!(whole.remaining_bytes(), split.remaining_bytes());
        assert_eq!(split.remaining_bytes(), 20 * 2);
    }

    #[test]
    fn test_rewind_clears_fractional_position() {
        let sound = sound(22050, 1, true, &[&ramp(10)]);
        let mut target = vec![0i16; 3];

        generate_audio(&sound, request(&mut target, 3, false, false, 44100));
        assert_eq!(target, vec![0, 0, 1]);

        assert!(sound.rewind());
        generate_audio(&sound, request(&mut target, 3, false, false, 44100));
        assert_eq!(target, vec![0, 0, 1]);
    }
}
