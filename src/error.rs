use std::path::PathBuf;
use thiserror::Error;

/// Échecs de la capacité d'analyse rythmique
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("signal trop court : {got} trames d'ODF, {needed} nécessaires")]
    TooShort { got: usize, needed: usize },
    #[error("méthode d'extraction inconnue : {0}")]
    UnknownMethod(String),
    #[error("tempo non trouvé")]
    TempoNotFound,
    #[error("résultat d'analyse invalide : {0}")]
    InvalidOutput(String),
    #[error("analyse interrompue")]
    Interrupted,
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("erreur de décodage de {path:?} : {message}")]
    Decode { path: PathBuf, message: String },
    #[error("erreur d'analyse de {path:?}")]
    Analysis {
        path: PathBuf,
        #[source]
        source: AnalysisError,
    },
    #[error("erreur d'écriture de {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("erreur de sérialisation JSON")]
    Serialize(#[from] serde_json::Error),
    #[error("délai dépassé ({seconds:.1} s) pour {path:?}")]
    Timeout { path: PathBuf, seconds: f32 },
    #[error("erreur de parcours de {path:?} : {message}")]
    Discovery { path: PathBuf, message: String },
    #[error("création du pool de threads impossible")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl ExtractionError {
    /// Chemin du fichier concerné par l'erreur, s'il est connu
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ExtractionError::Decode { path, .. }
            | ExtractionError::Analysis { path, .. }
            | ExtractionError::Write { path, .. }
            | ExtractionError::Timeout { path, .. }
            | ExtractionError::Discovery { path, .. } => Some(path),
            ExtractionError::Serialize(_) | ExtractionError::ThreadPool(_) => None,
        }
    }

    /// Message complet, causes comprises
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(" : ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}
