use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use beat_extract::{ExtractionConfig, FailurePolicy, Orchestrator};

/// Tempo minimal accepté en ligne de commande
const MIN_BPM_FLOOR: f32 = 1.0;

/// Détecte les battements et le tempo de fichiers audio et les écrit en JSON.
///
/// Avec un seul argument, parcourt le répertoire et écrit un JSON à côté de
/// chaque fichier audio. Avec deux, analyse le fichier donné et écrit le JSON
/// au chemin de sortie indiqué.
#[derive(Parser, Debug)]
#[command(name = "extract-beats", author, version, about, long_about = None)]
struct Args {
    /// Répertoire racine (mode lot) ou fichier audio (mode fichier unique)
    input: PathBuf,
    /// Chemin du JSON de sortie (mode fichier unique)
    output: Option<PathBuf>,
    /// Extension des fichiers audio recherchés en mode lot
    #[arg(long, default_value = "flac")]
    extension: String,
    /// Suffixe du JSON écrit à côté de chaque fichier
    #[arg(long, default_value = "beats.json")]
    suffix: String,
    /// Méthode d'extraction rythmique
    #[arg(long, default_value = beat_extract::config::DEFAULT_METHOD)]
    method: String,
    /// Continue après un échec et affiche un bilan à la fin
    #[arg(long)]
    keep_going: bool,
    /// Nombre de fichiers analysés en parallèle
    #[arg(long, short = 'j', default_value_t = 1)]
    jobs: usize,
    /// Délai maximal d'analyse par fichier, en secondes
    #[arg(long)]
    timeout: Option<f64>,
    #[arg(long, default_value_t = 40.0)]
    min_bpm: f32,
    #[arg(long, default_value_t = 208.0)]
    max_bpm: f32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let tempo_range_ok = args.min_bpm.is_finite()
        && args.max_bpm.is_finite()
        && args.min_bpm >= MIN_BPM_FLOOR
        && args.min_bpm < args.max_bpm;
    if !tempo_range_ok {
        bail!("plage de tempo invalide : {} - {}", args.min_bpm, args.max_bpm);
    }
    let timeout = args
        .timeout
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("délai invalide")?;

    let config = ExtractionConfig {
        min_bpm: args.min_bpm,
        max_bpm: args.max_bpm,
        method: args.method,
        extension: args.extension,
        sidecar_suffix: args.suffix,
        failure_policy: if args.keep_going {
            FailurePolicy::KeepGoing
        } else {
            FailurePolicy::FailFast
        },
        jobs: args.jobs.max(1),
        timeout,
        ..ExtractionConfig::default()
    };

    beat_extract::init();
    let orchestrator = Orchestrator::new(config);

    match args.output {
        Some(output) => {
            orchestrator.run_single(&args.input, &output)?;
        }
        None => {
            let report = orchestrator.run_batch(&args.input)?;
            if !report.is_success() {
                let failed = report.failures.len();
                let total = failed + report.written.len();
                for failure in report.failures {
                    eprintln!("  {:#}", anyhow::Error::from(failure));
                }
                bail!("{failed} fichier(s) en échec sur {total}");
            }
            info!(written = report.written.len(), "terminé");
        }
    }

    Ok(())
}
