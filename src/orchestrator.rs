//! Orchestration de l'extraction : découverte des fichiers, analyse et
//! écriture d'un JSON par fichier.
//!
//! L'ordre de découverte est celui du parcours du système de fichiers ; il
//! n'est pas trié et peut varier d'une plateforme à l'autre.

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::analysis::{decoder, MultiFeatureExtractor, RhythmExtractor};
use crate::config::{ExtractionConfig, FailurePolicy};
use crate::error::{AnalysisError, ExtractionError};
use crate::model::{AudioAsset, RhythmAnalysisResult};

/// Bilan d'un traitement par lot
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Fichiers JSON écrits
    pub written: Vec<PathBuf>,
    /// Échecs rencontrés en mode `KeepGoing`
    pub failures: Vec<ExtractionError>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Orchestrator {
    config: ExtractionConfig,
    extractor: Arc<dyn RhythmExtractor>,
}

impl Orchestrator {
    /// Orchestrateur utilisant l'extracteur intégré
    pub fn new(config: ExtractionConfig) -> Self {
        let extractor = Arc::new(MultiFeatureExtractor::new(&config));
        Self { config, extractor }
    }

    pub fn with_extractor(config: ExtractionConfig, extractor: Arc<dyn RhythmExtractor>) -> Self {
        Self { config, extractor }
    }

    /// Parcourt `root` récursivement et produit, au fil de l'eau, les fichiers
    /// dont l'extension est celle configurée.
    pub fn discover(
        &self,
        root: &Path,
    ) -> Result<impl Iterator<Item = Result<AudioAsset, ExtractionError>> + Send, ExtractionError> {
        let metadata = std::fs::metadata(root).map_err(|e| ExtractionError::Discovery {
            path: root.to_path_buf(),
            message: e.to_string(),
        })?;
        if !metadata.is_dir() {
            return Err(ExtractionError::Discovery {
                path: root.to_path_buf(),
                message: "ce n'est pas un répertoire".to_string(),
            });
        }

        let extension = self.config.extension.clone();
        Ok(WalkDir::new(root)
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    let path = entry.path();
                    let matches = path.extension().map_or(false, |ext| ext == extension.as_str())
                        && path.is_file();
                    matches.then(|| Ok(AudioAsset::new(entry.into_path())))
                }
                Err(e) => Some(Err(ExtractionError::Discovery {
                    path: e.path().map(Path::to_path_buf).unwrap_or_default(),
                    message: e.to_string(),
                })),
            }))
    }

    /// Mode fichier unique : analyse `input` et écrit exactement à `output`
    pub fn run_single(&self, input: &Path, output: &Path) -> Result<RhythmAnalysisResult, ExtractionError> {
        self.extract_and_persist(&AudioAsset::new(input), output)
    }

    /// Mode lot : un JSON voisin par fichier découvert sous `root`
    pub fn run_batch(&self, root: &Path) -> Result<BatchReport, ExtractionError> {
        let assets = self.discover(root)?;
        let process = |asset: Result<AudioAsset, ExtractionError>| {
            asset.and_then(|asset| self.persist_sidecar(&asset))
        };

        let outcomes: Vec<Result<PathBuf, ExtractionError>> = if self.config.jobs <= 1 {
            match self.config.failure_policy {
                FailurePolicy::FailFast => {
                    let written: Vec<PathBuf> = assets.map(process).collect::<Result<_, _>>()?;
                    written.into_iter().map(Ok).collect()
                }
                FailurePolicy::KeepGoing => assets.map(process).collect(),
            }
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.jobs)
                .thread_name(|i| format!("beat-worker-{i}"))
                .build()?;
            match self.config.failure_policy {
                FailurePolicy::FailFast => {
                    let written: Vec<PathBuf> = pool.install(|| {
                        assets
                            .par_bridge()
                            .map(process)
                            .collect::<Result<_, ExtractionError>>()
                    })?;
                    written.into_iter().map(Ok).collect()
                }
                FailurePolicy::KeepGoing => {
                    pool.install(|| assets.par_bridge().map(process).collect())
                }
            }
        };

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(path) => report.written.push(path),
                Err(err) => {
                    warn!(path = ?err.path(), "échec ignoré : {}", err.report());
                    report.failures.push(err);
                }
            }
        }
        info!(
            root = ?root,
            written = report.written.len(),
            failed = report.failures.len(),
            "lot terminé"
        );
        Ok(report)
    }

    fn persist_sidecar(&self, asset: &AudioAsset) -> Result<PathBuf, ExtractionError> {
        let output = asset.sidecar_path(&self.config.sidecar_suffix);
        self.extract_and_persist(asset, &output)?;
        Ok(output)
    }

    /// Décode, analyse puis écrit le résultat à `output` (écrasé s'il existe)
    pub fn extract_and_persist(
        &self,
        asset: &AudioAsset,
        output: &Path,
    ) -> Result<RhythmAnalysisResult, ExtractionError> {
        let result = self.analyze(asset)?;
        result.write_to(output)?;
        info!(
            input = ?asset.path,
            output = ?output,
            method = self.extractor.method(),
            bpm = result.bpm,
            beats = result.beats.len(),
            "battements écrits"
        );
        Ok(result)
    }

    /// Décodage et analyse, bornés par le délai configuré. Un fichier hors
    /// délai n'est jamais écrit : l'écriture n'a lieu qu'ici, après réception.
    fn analyze(&self, asset: &AudioAsset) -> Result<RhythmAnalysisResult, ExtractionError> {
        let target_sr = self.config.target_sr;
        let Some(timeout) = self.config.timeout else {
            return analyze_asset(self.extractor.as_ref(), &asset.path, target_sr);
        };

        let (tx, rx) = mpsc::channel();
        let extractor = Arc::clone(&self.extractor);
        let path = asset.path.clone();
        let spawned = thread::Builder::new()
            .name("beat-analysis".to_string())
            .spawn(move || {
                let _ = tx.send(analyze_asset(extractor.as_ref(), &path, target_sr));
            });
        if let Err(e) = spawned {
            warn!("thread d'analyse indisponible ({}), analyse sans délai", e);
            return analyze_asset(self.extractor.as_ref(), &asset.path, target_sr);
        }

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ExtractionError::Timeout {
                path: asset.path.clone(),
                seconds: timeout.as_secs_f32(),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(ExtractionError::Analysis {
                path: asset.path.clone(),
                source: AnalysisError::Interrupted,
            }),
        }
    }
}

fn analyze_asset(
    extractor: &dyn RhythmExtractor,
    path: &Path,
    target_sr: u32,
) -> Result<RhythmAnalysisResult, ExtractionError> {
    let samples = decoder::decode_to_mono(path, target_sr).map_err(|e| ExtractionError::Decode {
        path: path.to_path_buf(),
        message: format!("{e:#}"),
    })?;
    let output = extractor
        .extract(&samples, target_sr)
        .map_err(|source| ExtractionError::Analysis {
            path: path.to_path_buf(),
            source,
        })?;
    RhythmAnalysisResult::from_output(output).map_err(|source| ExtractionError::Analysis {
        path: path.to_path_buf(),
        source,
    })
}
