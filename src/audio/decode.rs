use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{PulseError, Result};

pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Which part of the source to load and at what rate.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// Seconds to skip at the beginning of the source
    pub start: f32,
    /// Maximum seconds to keep after `start`
    pub duration: Option<f32>,
    /// Resample to this rate; `None` keeps the native rate
    pub sample_rate: Option<u32>,
}

fn unavailable(path: &Path, what: impl std::fmt::Display) -> PulseError {
    PulseError::SourceUnavailable(format!("{}: {}", path.display(), what))
}

/// Decode `path` to mono f32 samples, trimmed and resampled per `options`.
pub fn decode_audio(path: &Path, options: &LoadOptions) -> Result<AudioData> {
    let file = std::fs::File::open(path).map_err(|e| unavailable(path, e))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| unavailable(path, format!("failed to probe audio format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| unavailable(path, "no audio tracks found"))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let native_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| unavailable(path, "unknown sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| unavailable(path, format!("failed to create decoder: {}", e)))?;

    let skip = (options.start.max(0.0) as f64 * native_rate as f64) as usize;
    let keep = options
        .duration
        .map(|d| (d.max(0.0) as f64 * native_rate as f64) as usize);

    let mut seen = 0usize;
    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        if keep.is_some_and(|k| all_samples.len() >= k) {
            break;
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(unavailable(path, e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(unavailable(path, e)),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        // Downmix to mono, dropping everything before `start`
        for frame_samples in sample_buf.samples().chunks(channels) {
            if seen >= skip {
                all_samples.push(frame_samples.iter().sum::<f32>() / channels as f32);
            }
            seen += 1;
        }
    }

    if let Some(k) = keep {
        all_samples.truncate(k);
    }

    log::info!(
        "Decoded audio: {} samples, {}Hz, {:.1}s",
        all_samples.len(),
        native_rate,
        all_samples.len() as f32 / native_rate as f32
    );

    match options.sample_rate {
        Some(target) if target != native_rate => {
            let samples = resample(&all_samples, native_rate, target)
                .map_err(|e| unavailable(path, format!("resampling failed: {}", e)))?;
            log::info!("Resampled {}Hz -> {}Hz ({} samples)", native_rate, target, samples.len());
            Ok(AudioData {
                samples,
                sample_rate: target,
            })
        }
        _ => Ok(AudioData {
            samples: all_samples,
            sample_rate: native_rate,
        }),
    }
}

/// Resample mono f32 audio between arbitrary rates using rubato.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> anyhow::Result<Vec<f32>> {
    use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

    if samples.is_empty() || from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        1.0, // fixed ratio
        params,
        samples.len(),
        1, // mono
    )?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * ratio).round() as usize;

    let input = vec![samples.to_vec()];
    let mut output = resampler.process(&input, None)?.into_iter().next().unwrap_or_default();

    // Flush the filter tail so the end of the signal is not lost to the delay
    let tail = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
    output.extend(tail.into_iter().next().unwrap_or_default());

    let mut resampled: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
    // Clips shorter than the filter delay come out short
    resampled.resize(expected, 0.0);
    Ok(resampled)
}
