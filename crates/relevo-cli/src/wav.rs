//! WAV file reading and writing for the offline commands.
//!
//! The render contract is mono, so multi-channel input is mixed down by
//! averaging and output is always written as one channel.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavWriter};

/// Read a WAV file as mono f32 samples plus its sample rate.
///
/// Float samples pass through; integer samples scale by their bit depth.
/// Multi-channel files are averaged down to mono.
pub fn read_wav(path: &Path) -> anyhow::Result<(Vec<f32>, u32)> {
    let reader = WavReader::open(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let mono = if channels > 1 {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    Ok((mono, spec.sample_rate))
}

/// Write mono samples to a WAV file.
///
/// A bit depth of 32 writes IEEE float; 16 or 24 write PCM with clamping.
pub fn write_wav(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
    bits_per_sample: u16,
) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample,
        sample_format: if bits_per_sample == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };
    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| anyhow::anyhow!("cannot write {}: {}", path.display(), e))?;

    if bits_per_sample == 32 {
        for &sample in samples {
            writer.write_sample(sample)?;
        }
    } else {
        let max_val = (1i32 << (bits_per_sample - 1)) as f32;
        for &sample in samples {
            let int_sample = (sample * max_val).clamp(-max_val, max_val - 1.0) as i32;
            writer.write_sample(int_sample)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
