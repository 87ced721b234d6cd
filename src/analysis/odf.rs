use num_complex::Complex;

use super::context;

/// Fonctions de détection d'onsets calculées sur une même STFT
#[derive(Debug, Clone, Default)]
pub struct OnsetFeatures {
    /// Flux spectral logarithmique, agrégé par la médiane
    pub spectral_flux: Vec<f32>,
    /// Différence positive de l'énergie logarithmique
    pub energy_flux: Vec<f32>,
    /// Différence positive du contenu haute fréquence (HFC)
    pub hfc: Vec<f32>,
}

/// Paramètres pour la génération des ODF
pub struct OdfGenerator {
    pub frame_size: usize,
    pub hop_size: usize,
}

const LOG_FLOOR: f32 = 1e-10;

impl OdfGenerator {
    pub fn new(frame_size: usize, hop_size: usize) -> Self {
        Self {
            frame_size,
            hop_size,
        }
    }

    /// Nombre de trames entières contenues dans `num_samples` échantillons
    pub fn num_frames(&self, num_samples: usize) -> usize {
        if num_samples < self.frame_size || self.hop_size == 0 {
            return 0;
        }
        (num_samples - self.frame_size) / self.hop_size + 1
    }

    /// Instant (en secondes) associé à une trame : le centre de sa fenêtre
    pub fn frame_time(&self, frame: usize, sample_rate: u32) -> f32 {
        (frame * self.hop_size + self.frame_size / 2) as f32 / sample_rate as f32
    }

    /// Génère les trois ODF en un seul passage de STFT.
    /// La première trame n'a pas de prédécesseur et vaut zéro.
    pub fn generate(&self, samples: &[f32]) -> OnsetFeatures {
        let num_frames = self.num_frames(samples.len());
        let mut features = OnsetFeatures {
            spectral_flux: Vec::with_capacity(num_frames),
            energy_flux: Vec::with_capacity(num_frames),
            hfc: Vec::with_capacity(num_frames),
        };
        if num_frames == 0 {
            return features;
        }

        let fft = context().plan_forward(self.frame_size);
        let bins = self.frame_size / 2 + 1;

        // Fenêtre de Hann
        let window: Vec<f32> = (0..self.frame_size)
            .map(|i| {
                let t = i as f32 / (self.frame_size - 1).max(1) as f32;
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
            })
            .collect();

        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.frame_size];
        let mut magnitudes = vec![0.0f32; bins];
        let mut prev_log_magnitudes: Option<Vec<f32>> = None;
        let mut prev_log_energy = 0.0f32;
        let mut prev_log_hfc = 0.0f32;
        let mut spectral_diffs = vec![0.0f32; bins];

        for frame_idx in 0..num_frames {
            let start = frame_idx * self.hop_size;
            let frame = &samples[start..start + self.frame_size];

            for ((slot, s), w) in buffer.iter_mut().zip(frame).zip(&window) {
                *slot = Complex::new(s * w, 0.0);
            }
            fft.process(&mut buffer);

            let mut energy = 0.0f32;
            let mut hfc = 0.0f32;
            for (k, (mag, c)) in magnitudes.iter_mut().zip(&buffer[..bins]).enumerate() {
                let power = c.re * c.re + c.im * c.im;
                *mag = power.sqrt();
                energy += power;
                hfc += k as f32 * power;
            }
            let log_magnitudes: Vec<f32> = magnitudes.iter().map(|m| (m + LOG_FLOOR).ln()).collect();
            let log_energy = (energy / self.frame_size as f32 + LOG_FLOOR).ln();
            let log_hfc = (hfc / self.frame_size as f32 + LOG_FLOOR).ln();

            match &prev_log_magnitudes {
                Some(prev) => {
                    // Redressement demi-onde puis médiane sur les bins
                    for ((diff, current), previous) in
                        spectral_diffs.iter_mut().zip(&log_magnitudes).zip(prev)
                    {
                        *diff = (current - previous).max(0.0);
                    }
                    spectral_diffs.sort_by(f32::total_cmp);
                    features.spectral_flux.push(spectral_diffs[bins / 2]);
                    features.energy_flux.push((log_energy - prev_log_energy).max(0.0));
                    features.hfc.push((log_hfc - prev_log_hfc).max(0.0));
                }
                None => {
                    features.spectral_flux.push(0.0);
                    features.energy_flux.push(0.0);
                    features.hfc.push(0.0);
                }
            }

            prev_log_magnitudes = Some(log_magnitudes);
            prev_log_energy = log_energy;
            prev_log_hfc = log_hfc;
        }

        features
    }
}
