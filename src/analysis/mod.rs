//! Capacité d'analyse rythmique : décodage, fonctions d'onset, tempo et
//! suivi de battements.

pub mod acf;
pub mod decoder;
pub mod estimator;
pub mod odf;
pub mod tracker;

use rustfft::{Fft, FftPlanner};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::error::AnalysisError;
use acf::AcfAnalyzer;
use estimator::TempoEstimator;
use odf::OdfGenerator;
use tracker::{agreement, BeatTracker};

/// Durée d'une fenêtre d'autocorrélation
const ACF_WINDOW_SECONDS: f32 = 6.0;
/// Tolérance de l'accord entre deux suites de battements
const AGREEMENT_TOLERANCE_S: f32 = 0.07;

/// État global de la bibliothèque d'analyse, initialisé une fois par processus
pub struct AnalysisContext {
    planner: Mutex<FftPlanner<f32>>,
}

static CONTEXT: OnceLock<AnalysisContext> = OnceLock::new();

/// Accès à l'état global ; l'initialise au premier appel
pub fn context() -> &'static AnalysisContext {
    CONTEXT.get_or_init(|| {
        debug!("initialisation du contexte d'analyse");
        AnalysisContext {
            planner: Mutex::new(FftPlanner::new()),
        }
    })
}

impl AnalysisContext {
    pub fn plan_forward(&self, len: usize) -> Arc<dyn Fft<f32>> {
        self.planner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .plan_fft_forward(len)
    }

    pub fn plan_inverse(&self, len: usize) -> Arc<dyn Fft<f32>> {
        self.planner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .plan_fft_inverse(len)
    }
}

/// Sortie brute de l'extracteur rythmique
#[derive(Debug, Clone, PartialEq)]
pub struct RhythmOutput {
    pub bpm: f32,
    /// Instants des battements, en secondes
    pub beats: Vec<f32>,
    pub confidence: f32,
    /// Estimations de tempo intermédiaires
    pub estimates: Vec<f32>,
    /// Durées entre battements consécutifs, en secondes
    pub intervals: Vec<f32>,
}

/// Capacité externe d'extraction rythmique, vue comme une boîte noire
pub trait RhythmExtractor: Send + Sync {
    /// Analyse un signal mono échantillonné à `sample_rate`
    fn extract(&self, samples: &[f32], sample_rate: u32) -> Result<RhythmOutput, AnalysisError>;

    /// Nom de la méthode, pour la journalisation
    fn method(&self) -> &str;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Method {
    MultiFeature,
    Degara,
}

impl Method {
    fn parse(name: &str) -> Result<Self, AnalysisError> {
        match name {
            "multifeature" => Ok(Method::MultiFeature),
            "degara" => Ok(Method::Degara),
            other => Err(AnalysisError::UnknownMethod(other.to_string())),
        }
    }
}

/// Extracteur intégré.
///
/// `multifeature` suit les battements sur trois ODF et retient la suite la
/// plus en accord avec les autres ; la confiance est cet accord moyen, dans
/// [0, 1]. `degara` n'utilise que le flux spectral et renvoie une confiance
/// nulle.
pub struct MultiFeatureExtractor {
    method: String,
    frame_size: usize,
    hop_size: usize,
    min_bpm: f32,
    max_bpm: f32,
    tracker: BeatTracker,
}

impl MultiFeatureExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            method: config.method.clone(),
            frame_size: config.frame_size,
            hop_size: config.hop_size,
            min_bpm: config.min_bpm,
            max_bpm: config.max_bpm,
            tracker: BeatTracker::default(),
        }
    }

    /// Tempo d'une ODF : autocorrélation sur fenêtres glissantes, médiane des estimations
    fn estimate_tempo(&self, curve: &[f32], odf_sample_rate: f32, needed: usize) -> Option<f32> {
        let window = ((ACF_WINDOW_SECONDS * odf_sample_rate) as usize).max(needed);
        let hop = (odf_sample_rate as usize).max(1);
        let acf_analyzer = AcfAnalyzer::new(window);
        let mut estimator = TempoEstimator::new(self.min_bpm, self.max_bpm);

        let mut tempo = None;
        for window_start in (0..curve.len()).step_by(hop) {
            let window_end = (window_start + window).min(curve.len());
            if window_end - window_start < needed.min(window / 2).max(1) {
                break;
            }
            let acf = acf_analyzer.analyze(&curve[window_start..window_end]);
            if let Some(bpm) = estimator.estimate(&acf, odf_sample_rate) {
                tempo = Some(bpm);
            }
        }
        tempo
    }
}

impl RhythmExtractor for MultiFeatureExtractor {
    fn extract(&self, samples: &[f32], sample_rate: u32) -> Result<RhythmOutput, AnalysisError> {
        let method = Method::parse(&self.method)?;

        let odf_gen = OdfGenerator::new(self.frame_size, self.hop_size);
        let odf_sample_rate = sample_rate as f32 / self.hop_size as f32;
        let (_, max_lag) = TempoEstimator::new(self.min_bpm, self.max_bpm).lag_range(odf_sample_rate);
        let needed = max_lag.checked_mul(2).and_then(|n| n.checked_add(1));

        let onsets = odf_gen.generate(samples);
        let got = onsets.spectral_flux.len();
        let needed = match needed {
            Some(needed) if got >= needed => needed,
            needed => {
                return Err(AnalysisError::TooShort {
                    got,
                    needed: needed.unwrap_or(usize::MAX),
                })
            }
        };

        let curves = match method {
            Method::MultiFeature => vec![onsets.spectral_flux, onsets.energy_flux, onsets.hfc],
            Method::Degara => vec![onsets.spectral_flux],
        };

        let mut estimates = Vec::new();
        let mut candidates: Vec<Vec<f32>> = Vec::new();
        for curve in curves.iter().filter_map(|c| normalize(c)) {
            let Some(tempo) = self.estimate_tempo(&curve, odf_sample_rate, needed) else {
                continue;
            };
            let period = odf_sample_rate * 60.0 / tempo;
            let beats = self
                .tracker
                .track(&curve, period)
                .into_iter()
                .map(|frame| odf_gen.frame_time(frame, sample_rate))
                .collect();
            estimates.push(tempo);
            candidates.push(beats);
        }
        if estimates.is_empty() {
            return Err(AnalysisError::TempoNotFound);
        }

        let (beats, confidence) = match method {
            Method::Degara => (candidates.swap_remove(0), 0.0),
            Method::MultiFeature => select_by_agreement(candidates),
        };
        let intervals: Vec<f32> = beats.windows(2).map(|w| w[1] - w[0]).collect();
        let bpm = match median(&intervals) {
            Some(interval) if interval > 0.0 => 60.0 / interval,
            _ => median(&estimates).ok_or(AnalysisError::TempoNotFound)?,
        };

        debug!(
            method = %self.method,
            bpm,
            beats = beats.len(),
            confidence,
            "analyse rythmique terminée"
        );

        Ok(RhythmOutput {
            bpm,
            beats,
            confidence,
            estimates,
            intervals,
        })
    }

    fn method(&self) -> &str {
        &self.method
    }
}

/// Normalise une ODF par son écart-type ; `None` si la courbe est plate
fn normalize(curve: &[f32]) -> Option<Vec<f32>> {
    let n = curve.len() as f32;
    let mean = curve.iter().sum::<f32>() / n;
    let std = (curve.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n).sqrt();
    if !(std > f32::EPSILON) {
        return None;
    }
    Some(curve.iter().map(|v| v / std).collect())
}

/// Retient la suite la plus en accord avec les autres ; renvoie aussi cet accord moyen
fn select_by_agreement(mut candidates: Vec<Vec<f32>>) -> (Vec<f32>, f32) {
    if candidates.len() == 1 {
        return (candidates.swap_remove(0), 0.0);
    }
    let scores: Vec<f32> = (0..candidates.len())
        .map(|i| {
            let total: f32 = (0..candidates.len())
                .filter(|&j| j != i)
                .map(|j| agreement(&candidates[i], &candidates[j], AGREEMENT_TOLERANCE_S))
                .sum();
            total / (candidates.len() - 1) as f32
        })
        .collect();
    let best = (0..scores.len())
        .max_by(|&a, &b| scores[a].total_cmp(&scores[b]))
        .unwrap_or(0);
    let confidence = scores[best];
    (candidates.swap_remove(best), confidence)
}

pub(crate) fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    Some(sorted[sorted.len() / 2])
}


#[cfg(test)]
mod tests {
    use super::test_signals::click_track;
    use super::*;
    use crate::model::RhythmAnalysisResult;

    fn extractor(method: &str) -> MultiFeatureExtractor {
        MultiFeatureExtractor::new(&ExtractionConfig {
            method: method.to_string(),
            ..ExtractionConfig::default()
        })
    }

    #[test]
    fn click_track_at_120_bpm() {
        let samples = click_track(120.0, 10.0, 44100);
        let out = extractor("multifeature").extract(&samples, 44100).unwrap();

        assert!((out.bpm - 120.0).abs() < 5.0, "bpm = {}", out.bpm);
        assert!(out.beats.len() >= 12, "{} battements", out.beats.len());
        assert_eq!(out.intervals.len(), out.beats.len() - 1);
        assert!(out.beats.windows(2).all(|w| w[0] <= w[1]));
        for (w, interval) in out.beats.windows(2).zip(&out.intervals) {
            assert!((w[1] - w[0] - interval).abs() < 1e-4);
        }
        let mean_interval = out.intervals.iter().sum::<f32>() / out.intervals.len() as f32;
        assert!((mean_interval - 0.5).abs() < 0.03, "intervalle moyen = {mean_interval}");
        assert!(out.confidence > 0.5 && out.confidence <= 1.0);
        assert_eq!(out.estimates.len(), 3);
        assert!(RhythmAnalysisResult::from_output(out).is_ok());
    }

    #[test]
    fn beats_land_on_clicks() {
        let samples = click_track(100.0, 10.0, 44100);
        let out = extractor("multifeature").extract(&samples, 44100).unwrap();
        // Chaque battement est à moins d'une demi-fenêtre d'un clic
        for beat in &out.beats {
            let phase = (beat - 0.25).rem_euclid(0.6);
            let distance = phase.min(0.6 - phase);
            assert!(distance < 0.05, "battement {beat} loin des clics");
        }
    }

    #[test]
    fn degara_has_zero_confidence() {
        let samples = click_track(120.0, 8.0, 44100);
        let degara = extractor("degara");
        assert_eq!(degara.method(), "degara");
        let out = degara.extract(&samples, 44100).unwrap();
        assert_eq!(out.confidence, 0.0);
        assert_eq!(out.estimates.len(), 1);
        assert!(!out.beats.is_empty());
    }

    #[test]
    fn unknown_method_is_rejected() {
        let samples = click_track(120.0, 8.0, 44100);
        let err = extractor("percival").extract(&samples, 44100).unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownMethod(m) if m == "percival"));
    }

    #[test]
    fn short_signal_is_rejected() {
        let samples = click_track(120.0, 1.0, 44100);
        let err = extractor("multifeature").extract(&samples, 44100).unwrap_err();
        assert!(matches!(err, AnalysisError::TooShort { .. }));
    }

    #[test]
    fn unreachable_tempo_range_is_too_short() {
        let extractor = MultiFeatureExtractor::new(&ExtractionConfig {
            min_bpm: 1e-30,
            max_bpm: 100.0,
            ..ExtractionConfig::default()
        });
        let err = extractor.extract(&vec![0.0; 44100], 44100).unwrap_err();
        assert!(matches!(err, AnalysisError::TooShort { needed: usize::MAX, .. }));
    }

    #[test]
    fn silence_has_no_tempo() {
        let samples = vec![0.0f32; 44100 * 8];
        let err = extractor("multifeature").extract(&samples, 44100).unwrap_err();
        assert!(matches!(err, AnalysisError::TempoNotFound));
    }

    #[test]
    fn agreement_selection() {
        let a = vec![0.5, 1.0, 1.5, 2.0];
        let b = vec![0.51, 1.0, 1.52, 2.01];
        let c = vec![0.75, 1.25, 1.75];
        let (chosen, confidence) = select_by_agreement(vec![c.clone(), a.clone(), b]);
        assert_ne!(chosen, c);
        assert!((confidence - 0.5).abs() < 1e-6);
        let (single, confidence) = select_by_agreement(vec![a.clone()]);
        assert_eq!(single, a);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn context_is_shared() {
        assert!(std::ptr::eq(context(), context()));
    }
}
