use num_complex::Complex;

use super::context;

/// Analyseur d'autocorrélation utilisant le théorème de Wiener-Khinchin
pub struct AcfAnalyzer {
    pub window_size: usize,
}

impl AcfAnalyzer {
    pub fn new(window_size: usize) -> Self {
        Self { window_size }
    }

    /// Autocorrélation à court terme des `window_size` dernières valeurs,
    /// centrée puis normalisée par la valeur au lag 0.
    pub fn analyze(&self, odf_buffer: &[f32]) -> Vec<f32> {
        let start = odf_buffer.len().saturating_sub(self.window_size);
        let window = &odf_buffer[start..];
        if window.is_empty() {
            return Vec::new();
        }
        let mean = window.iter().sum::<f32>() / window.len() as f32;

        // Zero-padding pour obtenir une corrélation linéaire
        let fft_len = (window.len() * 2).next_power_of_two();
        let fft = context().plan_forward(fft_len);
        let ifft = context().plan_inverse(fft_len);

        let mut buffer: Vec<Complex<f32>> = window
            .iter()
            .map(|&s| Complex::new(s - mean, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(fft_len)
            .collect();

        fft.process(&mut buffer);
        for c in buffer.iter_mut() {
            *c = Complex::new(c.norm_sqr(), 0.0);
        }
        ifft.process(&mut buffer);

        let zero_lag = buffer[0].re;
        if zero_lag <= f32::EPSILON {
            return vec![0.0; window.len()];
        }
        buffer
            .iter()
            .take(window.len())
            .map(|c| c.re / zero_lag)
            .collect()
    }
}
