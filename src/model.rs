use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::path::{Path, PathBuf};

use crate::analysis::RhythmOutput;
use crate::error::{AnalysisError, ExtractionError};

/// Tolérance sur `beats_intervals[i] == beats[i + 1] - beats[i]`
pub const INTERVAL_TOLERANCE: f32 = 1e-4;

/// Fichier audio d'entrée, en lecture seule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioAsset {
    pub path: PathBuf,
}

impl AudioAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Chemin du JSON voisin : l'extension est remplacée par `suffix`
    /// (`a/track1.flac` -> `a/track1.beats.json`)
    pub fn sidecar_path(&self, suffix: &str) -> PathBuf {
        self.path.with_extension(suffix)
    }
}

/// Résultat sérialisé dans le JSON ; l'ordre des champs fixe l'ordre des clés
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RhythmAnalysisResult {
    pub bpm: f32,
    pub beats_confidence: f32,
    pub beats: Vec<f32>,
    pub beats_intervals: Vec<f32>,
}

impl RhythmAnalysisResult {
    /// Construit le résultat depuis la sortie de l'extracteur.
    /// Les estimations intermédiaires (`estimates`) ne sont pas conservées.
    pub fn from_output(output: RhythmOutput) -> Result<Self, AnalysisError> {
        let RhythmOutput {
            bpm,
            beats,
            confidence,
            estimates: _,
            intervals,
        } = output;

        let result = Self {
            bpm,
            beats_confidence: confidence,
            beats,
            beats_intervals: intervals,
        };
        result.validate()?;
        Ok(result)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.bpm.is_finite() || !self.beats_confidence.is_finite() {
            return Err(AnalysisError::InvalidOutput(format!(
                "valeurs non finies (bpm={}, confiance={})",
                self.bpm, self.beats_confidence
            )));
        }
        if let Some(i) = self.beats.iter().position(|b| !b.is_finite()) {
            return Err(AnalysisError::InvalidOutput(format!(
                "battement non fini à l'indice {i}"
            )));
        }
        if let Some(i) = self.beats.windows(2).position(|w| w[0] > w[1]) {
            return Err(AnalysisError::InvalidOutput(format!(
                "battements non croissants à l'indice {i}"
            )));
        }
        let expected = self.beats.len().saturating_sub(1);
        if self.beats_intervals.len() != expected {
            return Err(AnalysisError::InvalidOutput(format!(
                "{} intervalles pour {} battements",
                self.beats_intervals.len(),
                self.beats.len()
            )));
        }
        for (i, (w, interval)) in self.beats.windows(2).zip(&self.beats_intervals).enumerate() {
            // Rejette aussi un intervalle NaN
            if !(((w[1] - w[0]) - interval).abs() <= INTERVAL_TOLERANCE) {
                return Err(AnalysisError::InvalidOutput(format!(
                    "intervalle {i} incohérent : {interval} au lieu de {}",
                    w[1] - w[0]
                )));
            }
        }
        Ok(())
    }

    /// JSON lisible, indenté sur quatre espaces
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        Ok(buf)
    }

    /// Écrit le JSON à `path`, en écrasant un éventuel fichier existant
    pub fn write_to(&self, path: &Path) -> Result<(), ExtractionError> {
        let json = self.to_json_pretty()?;
        std::fs::write(path, json).map_err(|source| ExtractionError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
