//! Génération de fichiers audio de test

use std::fs;
use std::path::Path;

pub const SAMPLE_RATE: u32 = 44100;
/// Taille des blocs FLAC écrits (code 0xC de l'en-tête de trame)
const FLAC_BLOCK_SIZE: usize = 4096;

/// Bruit de fond faible et clics au tempo demandé, le premier à 0,25 s, en 16 bits
pub fn click_samples(bpm: f32, seconds: f32) -> Vec<i16> {
    let len = (seconds * SAMPLE_RATE as f32) as usize;
    let mut state = 0x1234_5678_u32;
    let mut noise = move || {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
    };
    let mut samples: Vec<f32> = (0..len).map(|_| 0.001 * noise()).collect();
    let click_len = (0.02 * SAMPLE_RATE as f32) as usize;
    let mut t = 0.25f32;
    while t < seconds {
        let start = (t * SAMPLE_RATE as f32) as usize;
        for i in 0..click_len.min(len.saturating_sub(start)) {
            let decay = (-(i as f32) / (0.005 * SAMPLE_RATE as f32)).exp();
            samples[start + i] += 0.9 * decay * noise();
        }
        t += 60.0 / bpm;
    }
    samples
        .into_iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Écrit un WAV mono 16 bits contenant des clics au tempo demandé.
///
/// Le décodeur identifie le format par son contenu : un WAV nommé `.flac`
/// est donc accepté.
pub fn write_click_track(path: &Path, bpm: f32, seconds: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for s in click_samples(bpm, seconds) {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}

/// Écrit un vrai FLAC mono 16 bits à 44,1 kHz, en sous-trames VERBATIM
pub fn write_flac_click_track(path: &Path, bpm: f32, seconds: f32) {
    fs::write(path, encode_flac(&click_samples(bpm, seconds))).unwrap();
}

pub fn encode_flac(samples: &[i16]) -> Vec<u8> {
    let mut out = b"fLaC".to_vec();

    // STREAMINFO, seul bloc de métadonnées
    out.push(0x80);
    out.extend_from_slice(&34u32.to_be_bytes()[1..]);
    out.extend_from_slice(&(FLAC_BLOCK_SIZE as u16).to_be_bytes());
    out.extend_from_slice(&(FLAC_BLOCK_SIZE as u16).to_be_bytes());
    out.extend_from_slice(&[0; 6]);
    let packed = (u64::from(SAMPLE_RATE) << 44) | (15u64 << 36) | samples.len() as u64;
    out.extend_from_slice(&packed.to_be_bytes());
    out.extend_from_slice(&[0; 16]);

    for (number, block) in samples.chunks(FLAC_BLOCK_SIZE).enumerate() {
        let mut frame = vec![0xff, 0xf8];
        let full = block.len() == FLAC_BLOCK_SIZE;
        frame.push(if full { 0xc9 } else { 0x79 });
        frame.push(0x08);
        frame.extend_from_slice(&utf8_number(number as u32));
        if !full {
            frame.extend_from_slice(&(block.len() as u16 - 1).to_be_bytes());
        }
        frame.push(crc8(&frame));

        frame.push(0x02);
        for s in block {
            frame.extend_from_slice(&s.to_be_bytes());
        }
        frame.extend_from_slice(&crc16(&frame).to_be_bytes());
        out.extend_from_slice(&frame);
    }
    out
}

fn utf8_number(n: u32) -> Vec<u8> {
    match n {
        0..=0x7f => vec![n as u8],
        0x80..=0x7ff => vec![0xc0 | (n >> 6) as u8, 0x80 | (n & 0x3f) as u8],
        _ => vec![
            0xe0 | (n >> 12) as u8,
            0x80 | ((n >> 6) & 0x3f) as u8,
            0x80 | (n & 0x3f) as u8,
        ],
    }
}

fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |crc, &b| {
        (0..8).fold(crc ^ b, |c, _| if c & 0x80 != 0 { (c << 1) ^ 0x07 } else { c << 1 })
    })
}

fn crc16(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |crc, &b| {
        (0..8).fold(crc ^ (u16::from(b) << 8), |c, _| {
            if c & 0x8000 != 0 {
                (c << 1) ^ 0x8005
            } else {
                c << 1
            }
        })
    })
}
