use super::median;

/// Tempo de référence du poids a priori (log-normal, un octave d'écart-type)
const PRIOR_CENTER_BPM: f32 = 120.0;
/// Seuil minimal du pic d'autocorrélation normalisée
const MIN_PEAK: f32 = 0.1;

/// Estimateur de tempo avec stabilisation
pub struct TempoEstimator {
    pub min_bpm: f32,
    pub max_bpm: f32,
    pub history: Vec<f32>,
    pub history_size: usize,
}

impl TempoEstimator {
    pub fn new(min_bpm: f32, max_bpm: f32) -> Self {
        Self {
            min_bpm,
            max_bpm,
            history: Vec::new(),
            history_size: 10,
        }
    }

    /// Plage de lags (en trames d'ODF) couverte par `[min_bpm, max_bpm]`
    pub fn lag_range(&self, odf_sample_rate: f32) -> (usize, usize) {
        let min_lag = (60.0 / self.max_bpm * odf_sample_rate).floor().max(1.0) as usize;
        let max_lag = (60.0 / self.min_bpm * odf_sample_rate).ceil() as usize;
        (min_lag, max_lag)
    }

    /// Estime le tempo à partir d'une autocorrélation normalisée ; renvoie la
    /// médiane des dernières estimations.
    pub fn estimate(&mut self, acf: &[f32], odf_sample_rate: f32) -> Option<f32> {
        let (min_lag, max_lag) = self.lag_range(odf_sample_rate);
        if max_lag >= acf.len().saturating_sub(1) || min_lag >= max_lag {
            return None;
        }

        let weighted = |lag: usize| {
            let bpm = odf_sample_rate * 60.0 / lag as f32;
            let octaves = (bpm / PRIOR_CENTER_BPM).log2();
            acf[lag] * (-0.5 * octaves * octaves).exp()
        };
        let peak_lag = (min_lag..=max_lag).max_by(|&a, &b| weighted(a).total_cmp(&weighted(b)))?;
        if acf[peak_lag] < MIN_PEAK {
            return None;
        }

        // Interpolation parabolique autour du pic
        let (left, center, right) = (acf[peak_lag - 1], acf[peak_lag], acf[peak_lag + 1]);
        let denom = left - 2.0 * center + right;
        let offset = if denom.abs() > f32::EPSILON {
            (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let bpm = odf_sample_rate * 60.0 / (peak_lag as f32 + offset);

        self.history.push(bpm);
        if self.history.len() > self.history_size {
            self.history.remove(0);
        }
        median(&self.history)
    }
}
