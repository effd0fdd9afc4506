//! # Audio Payload Decoding
//!
//! Parses a complete WAV payload into 32-bit float samples at the 16 kHz
//! mono format Whisper expects. The engine consumes sample buffers directly,
//! so payloads are decoded in memory and never touch the filesystem.
//!
//! ## Accepted input:
//! - RIFF/WAVE container
//! - 16-bit integer PCM or 32-bit IEEE float samples
//! - any channel count (downmixed to mono by averaging)
//! - any sample rate (linearly resampled to 16 kHz)

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};

/// Sample rate the inference engine operates at.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;

struct WavFormat {
    audio_format: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Decode an audio payload into 16 kHz mono f32 samples.
///
/// Any payload that cannot be interpreted yields an error message describing
/// the first problem found; the caller maps this to a decode failure.
pub fn decode_audio(bytes: &[u8]) -> Result<Vec<f32>, String> {
    if bytes.is_empty() {
        return Err("audio payload is empty".to_string());
    }

    let (format, data) = parse_container(bytes)?;
    let interleaved = samples_to_float(&format, data)?;
    let mono = downmix(&interleaved, format.channels as usize);

    if format.sample_rate == TARGET_SAMPLE_RATE {
        Ok(mono)
    } else {
        Ok(resample(&mono, format.sample_rate, TARGET_SAMPLE_RATE))
    }
}

/// Walk the RIFF chunk list and pull out the fmt and data chunks.
fn parse_container(bytes: &[u8]) -> Result<(WavFormat, &[u8]), String> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err("not a RIFF/WAVE container".to_string());
    }

    let mut cursor = Cursor::new(bytes);
    cursor
        .seek(SeekFrom::Start(12))
        .map_err(|e| format!("truncated container: {}", e))?;

    let mut format: Option<WavFormat> = None;
    let mut data: Option<&[u8]> = None;

    loop {
        let mut chunk_id = [0u8; 4];
        if cursor.read_exact(&mut chunk_id).is_err() {
            break;
        }
        let chunk_size = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| format!("truncated chunk header: {}", e))? as u64;
        let chunk_start = cursor.position();

        match &chunk_id {
            b"fmt " => {
                if chunk_size < 16 {
                    return Err("fmt chunk too short".to_string());
                }
                let audio_format = cursor.read_u16::<LittleEndian>().map_err(|e| e.to_string())?;
                let channels = cursor.read_u16::<LittleEndian>().map_err(|e| e.to_string())?;
                let sample_rate = cursor.read_u32::<LittleEndian>().map_err(|e| e.to_string())?;
                let _byte_rate = cursor.read_u32::<LittleEndian>().map_err(|e| e.to_string())?;
                let _block_align = cursor.read_u16::<LittleEndian>().map_err(|e| e.to_string())?;
                let bits_per_sample = cursor.read_u16::<LittleEndian>().map_err(|e| e.to_string())?;

                if channels == 0 {
                    return Err("WAV header declares zero channels".to_string());
                }
                if sample_rate == 0 {
                    return Err("WAV header declares zero sample rate".to_string());
                }

                format = Some(WavFormat {
                    audio_format,
                    channels,
                    sample_rate,
                    bits_per_sample,
                });
            }
            b"data" => {
                let start = chunk_start as usize;
                let end = start
                    .checked_add(chunk_size as usize)
                    .filter(|&e| e <= bytes.len())
                    .ok_or_else(|| "data chunk exceeds payload".to_string())?;
                data = Some(&bytes[start..end]);
            }
            _ => {}
        }

        // Chunks are word-aligned; odd sizes carry a pad byte.
        let padded = chunk_size + (chunk_size & 1);
        cursor
            .seek(SeekFrom::Start(chunk_start + padded))
            .map_err(|e| format!("truncated chunk: {}", e))?;
    }

    let format = format.ok_or_else(|| "missing fmt chunk".to_string())?;
    let data = data.ok_or_else(|| "missing data chunk".to_string())?;
    Ok((format, data))
}

/// Convert raw sample bytes to f32 in [-1.0, 1.0], still interleaved.
fn samples_to_float(format: &WavFormat, data: &[u8]) -> Result<Vec<f32>, String> {
    match (format.audio_format, format.bits_per_sample) {
        (FORMAT_PCM, 16) => {
            if data.len() % 2 != 0 {
                return Err("16-bit PCM data has odd length".to_string());
            }
            let mut cursor = Cursor::new(data);
            let mut samples = Vec::with_capacity(data.len() / 2);
            while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
                samples.push(sample as f32 / 32768.0);
            }
            Ok(samples)
        }
        (FORMAT_IEEE_FLOAT, 32) => {
            if data.len() % 4 != 0 {
                return Err("32-bit float data length is not a multiple of 4".to_string());
            }
            let mut cursor = Cursor::new(data);
            let mut samples = Vec::with_capacity(data.len() / 4);
            while let Ok(sample) = cursor.read_f32::<LittleEndian>() {
                samples.push(sample);
            }
            Ok(samples)
        }
        (fmt, bits) => Err(format!(
            "unsupported WAV encoding: format {} with {} bits per sample",
            fmt, bits
        )),
    }
}

/// Average interleaved channels down to mono.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampler. Speech transcription is tolerant of the
/// quality loss versus a windowed-sinc design.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx.min(samples.len() - 1)];
        let b = samples.get(idx + 1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }

    out
}
