use clap::ValueEnum;
use std::time::Duration;

/// Méthode d'extraction par défaut, transmise telle quelle à l'extracteur
pub const DEFAULT_METHOD: &str = "multifeature";

#[derive(Clone, Debug)]
pub struct ExtractionConfig {
    pub target_sr: u32,
    pub frame_size: usize,
    pub hop_size: usize,
    pub min_bpm: f32,
    pub max_bpm: f32,
    pub method: String,
    /// Extension des fichiers recherchés en mode lot (sans le point)
    pub extension: String,
    /// Suffixe remplaçant l'extension pour le fichier JSON produit
    pub sidecar_suffix: String,
    pub failure_policy: FailurePolicy,
    pub jobs: usize,
    pub timeout: Option<Duration>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            target_sr: 44100,
            frame_size: 2048,
            hop_size: 512,
            min_bpm: 40.0,
            max_bpm: 208.0,
            method: DEFAULT_METHOD.to_string(),
            extension: "flac".to_string(),
            sidecar_suffix: "beats.json".to_string(),
            failure_policy: FailurePolicy::FailFast,
            jobs: 1,
            timeout: None,
        }
    }
}

/// Comportement du mode lot face à l'échec d'un fichier
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, ValueEnum)]
pub enum FailurePolicy {
    /// Le premier échec interrompt tout le lot
    #[default]
    FailFast,
    /// Les échecs sont journalisés puis résumés en fin de lot
    KeepGoing,
}
