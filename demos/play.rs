use anyhow::Result;
use softmix::{
    AudioManager, AudioOutput, LoadOptions, MixerDesc, PcmCodec, SoftwarePlatform, Sound,
    load_audio_file,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FRAME: Duration = Duration::from_millis(16);

/// One second of a sine tone at 22050 Hz, so the mixer has to resample.
fn tone(name: &str, frequency: f32) -> Result<Sound> {
    let rate = 22050;
    let samples: Vec<i16> = (0..rate)
        .map(|i| {
            let t = i as f32 / rate as f32;
            ((t * frequency * std::f32::consts::TAU).sin() * 8000.0) as i16
        })
        .collect();

    let sound = Sound::new(name, PcmCodec::finished(rate, 1))?;
    for chunk in samples.chunks(4096) {
        sound.push_samples(chunk);
    }
    Ok(sound)
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let desc = MixerDesc::new();
    let platform = Arc::new(SoftwarePlatform::new(&desc)?);
    let mut output = AudioOutput::new(desc.clone(), platform.clone())?;
    let mut manager = AudioManager::new(desc.clone(), platform)?;

    let args: Vec<String> = std::env::args().collect();
    if let Some(path) = args.get(1) {
        log::info!("Loading {}", path);
        let options = LoadOptions::new()
            .target_sample_rate(desc.output_sample_rate)
            .max_duration(Duration::from_secs(30));
        let sound = load_audio_file(path, &options)?.into_sound(path.as_str(), desc.buffer_frames)?;
        manager.play(Arc::new(sound), 0)?;
    } else {
        manager.play(Arc::new(tone("low", 220.0)?), 2)?;
        manager.play(Arc::new(tone("high", 440.0)?), 0)?;
    }

    output.start()?;

    let started = Instant::now();
    let mut last = Instant::now();
    while !manager.is_empty() {
        std::thread::sleep(FRAME);
        let now = Instant::now();
        manager.update(now - last);
        last = now;

        for event in manager.poll_events() {
            log::info!("{:?}", event);
        }

        if started.elapsed() > Duration::from_secs(2) && manager.is_playing("high") {
            manager.stop("high");
        }
    }

    log::info!(
        "Done: {} frames rendered, {} underruns",
        output.frames_processed(),
        output.underruns()
    );
    output.stop();

    Ok(())
}
