use anyhow::{bail, Context, Result};
use rubato::{FftFixedIn, Resampler};
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

const RESAMPLE_CHUNK: usize = 1024;

/// Décode la première piste audio du fichier, la réduit en mono (moyenne des
/// canaux) et la rééchantillonne à `target_sr`.
pub fn decode_to_mono(path: &Path, target_sr: u32) -> Result<Vec<f32>> {
    let file = File::open(path).with_context(|| format!("impossible d'ouvrir {:?}", path))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("format audio non reconnu")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("aucune piste audio décodable")?;
    let track_id = track.id;
    let source_sr = track
        .codec_params
        .sample_rate
        .context("fréquence d'échantillonnage inconnue")?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("codec non pris en charge")?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("lecture du flux impossible"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!(path = ?path, "paquet ignoré : {}", msg);
                continue;
            }
            Err(e) => return Err(e).context("erreur de décodage"),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        mono.extend(
            buf.samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    if mono.is_empty() {
        bail!("aucun échantillon décodé");
    }
    debug!(
        path = ?path,
        source_sr,
        samples = mono.len(),
        "fichier décodé"
    );

    if source_sr != target_sr {
        mono = resample(&mono, source_sr, target_sr)?;
    }
    Ok(mono)
}

/// Rééchantillonne un unique canal audio à la fréquence cible
pub fn resample(samples: &[f32], source_sr: u32, target_sr: u32) -> Result<Vec<f32>> {
    let mut resampler =
        FftFixedIn::<f32>::new(source_sr as usize, target_sr as usize, RESAMPLE_CHUNK, 2, 1)
            .context("initialisation du rééchantillonneur impossible")?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as u64 * target_sr as u64 / source_sr as u64) as usize;
    let mut output = vec![vec![0.0f32; resampler.output_frames_max()]; 1];
    let mut resampled = Vec::with_capacity(expected + delay);

    let mut chunks = samples.chunks_exact(RESAMPLE_CHUNK);
    for chunk in &mut chunks {
        let (_, out_len) = resampler
            .process_into_buffer(&[chunk], &mut output, None)
            .context("erreur lors du rééchantillonnage")?;
        resampled.extend_from_slice(&output[0][..out_len]);
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let (_, out_len) = resampler
            .process_partial_into_buffer(Some(&[rest][..]), &mut output, None)
            .context("erreur lors du rééchantillonnage")?;
        resampled.extend_from_slice(&output[0][..out_len]);
    }
    // Vidange du retard interne du filtre
    while resampled.len() < expected + delay {
        let (_, out_len) = resampler
            .process_partial_into_buffer(None::<&[&[f32]]>, &mut output, None)
            .context("erreur lors du rééchantillonnage")?;
        if out_len == 0 {
            break;
        }
        resampled.extend_from_slice(&output[0][..out_len]);
    }

    Ok(resampled.into_iter().skip(delay).take(expected).collect())
}
