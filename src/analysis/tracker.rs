/// Suivi de battements par programmation dynamique : chaque trame cumule son
/// score d'onset et le meilleur score d'un prédécesseur situé environ une
/// période plus tôt, pénalisé par l'écart logarithmique à la période.
pub struct BeatTracker {
    pub tightness: f32,
}

impl Default for BeatTracker {
    fn default() -> Self {
        Self { tightness: 100.0 }
    }
}

impl BeatTracker {
    /// Renvoie les indices de trames des battements, en ordre croissant.
    pub fn track(&self, odf: &[f32], period: f32) -> Vec<usize> {
        let n = odf.len();
        if n < 3 || !(period.is_finite() && period >= 2.0) {
            return Vec::new();
        }
        let min_back = (period / 2.0).round() as usize;
        let max_back = (period * 2.0).round() as usize;

        let mut score = vec![0.0f32; n];
        let mut backlink: Vec<Option<usize>> = vec![None; n];
        for t in 0..n {
            let mut best: Option<(usize, f32)> = None;
            if t >= min_back {
                for tau in t.saturating_sub(max_back)..=t - min_back {
                    let deviation = ((t - tau) as f32 / period).ln();
                    let candidate = score[tau] - self.tightness * deviation * deviation;
                    if best.map_or(true, |(_, b)| candidate > b) {
                        best = Some((tau, candidate));
                    }
                }
            }
            match best {
                Some((tau, s)) => {
                    score[t] = odf[t] + s;
                    backlink[t] = Some(tau);
                }
                None => score[t] = odf[t],
            }
        }

        let mut beats = vec![last_beat(&score)];
        while let Some(prev) = backlink[beats[beats.len() - 1]] {
            beats.push(prev);
        }
        beats.reverse();
        trim_weak(odf, beats)
    }
}

/// Dernier maximum local du score cumulé qui dépasse la moitié de la médiane
/// des maxima locaux
fn last_beat(score: &[f32]) -> usize {
    let maxima: Vec<usize> = (1..score.len() - 1)
        .filter(|&i| score[i] > score[i - 1] && score[i] >= score[i + 1])
        .collect();
    if maxima.is_empty() {
        return (0..score.len())
            .max_by(|&a, &b| score[a].total_cmp(&score[b]))
            .unwrap_or(0);
    }
    let mut values: Vec<f32> = maxima.iter().map(|&i| score[i]).collect();
    values.sort_by(f32::total_cmp);
    let threshold = 0.5 * values[values.len() / 2];
    maxima
        .iter()
        .rev()
        .copied()
        .find(|&i| score[i] >= threshold)
        .unwrap_or(maxima[maxima.len() - 1])
}

/// Retire en tête et en queue les battements dont l'onset est inférieur à la
/// moitié de la moyenne quadratique des onsets aux battements
fn trim_weak(odf: &[f32], mut beats: Vec<usize>) -> Vec<usize> {
    if beats.is_empty() {
        return beats;
    }
    let rms = (beats.iter().map(|&b| odf[b] * odf[b]).sum::<f32>() / beats.len() as f32).sqrt();
    if rms <= f32::EPSILON {
        return Vec::new();
    }
    let threshold = 0.5 * rms;
    let first = beats.iter().position(|&b| odf[b] >= threshold);
    let last = beats.iter().rposition(|&b| odf[b] >= threshold);
    match (first, last) {
        (Some(first), Some(last)) => beats.drain(first..=last).collect(),
        _ => Vec::new(),
    }
}

/// Accord entre deux suites de battements (F-mesure avec une tolérance en secondes)
pub fn agreement(a: &[f32], b: &[f32], tolerance: f32) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut matched = 0usize;
    let mut j = 0usize;
    for &beat in a {
        while j < b.len() && b[j] < beat - tolerance {
            j += 1;
        }
        if j < b.len() && (b[j] - beat).abs() <= tolerance {
            matched += 1;
            j += 1;
        }
    }
    2.0 * matched as f32 / (a.len() + b.len()) as f32
}
