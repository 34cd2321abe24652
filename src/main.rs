use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use fingerprinter::{
    telemetry, EngineConfig, MicrophoneSource, Mode, RawPcmSource, Recognizer, RepositoryStore,
    RunOutcome, SampleSource, StopTrigger, WavFileSource,
};

/// Identify a song fragment or add one to the repository.
#[derive(Parser)]
#[command(name = "fingerprinter", version)]
#[command(about = "landmark audio fingerprinting: add songs and match fragments")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// repository file (default: songs.json)
    #[arg(short, long, global = true)]
    repository: Option<PathBuf>,

    /// JSON config file; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// start from an empty repository if the file does not exist
    #[arg(long, global = true)]
    init: bool,

    /// read the fragment from a WAV file instead of the microphone
    #[arg(long, global = true, conflicts_with = "raw")]
    wav: Option<PathBuf>,

    /// read the fragment from a raw PCM file laid out like the capture format
    #[arg(long, global = true)]
    raw: Option<PathBuf>,

    /// stop listening after this many seconds instead of waiting for ENTER
    #[arg(short, long, global = true)]
    duration: Option<f32>,

    /// peak quantization; larger values match more loosely
    #[arg(long, global = true)]
    fuzz: Option<usize>,

    /// debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// add the captured fragment under a song title
    Add {
        /// song title; multiple words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// report the best matching song for the captured fragment
    Match,
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(repository) = &self.repository {
            config.storage.repository = repository.clone();
        }
        if self.init {
            config.storage.allow_missing_repository = true;
        }
        if let Some(duration) = self.duration {
            config.capture.duration_secs = Some(duration);
        }
        if let Some(fuzz) = self.fuzz {
            config.hasher.fuzz_factor = fuzz;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn mode(&self) -> Result<Mode> {
        match &self.command {
            Command::Add { title } => {
                let song_id = title.join(" ").trim().to_string();
                if song_id.is_empty() {
                    bail!("song title must not be empty");
                }
                Ok(Mode::Add { song_id })
            }
            Command::Match => Ok(Mode::Match),
        }
    }

    fn source(&self, config: &EngineConfig) -> Result<Box<dyn SampleSource>> {
        let source: Box<dyn SampleSource> = match (&self.wav, &self.raw) {
            (Some(path), _) => Box::new(WavFileSource::new(path)),
            (None, Some(path)) => Box::new(RawPcmSource::new(path, &config.capture)?),
            (None, None) => Box::new(MicrophoneSource::new(
                config.capture.clone(),
                StopTrigger::from_config(&config.capture),
            )),
        };
        Ok(source)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let config = cli.engine_config()?;
    let mode = cli.mode()?;
    let mut source = cli.source(&config)?;

    let store = RepositoryStore::new(
        config.storage.repository.clone(),
        config.storage.allow_missing_repository,
    );
    let index = store
        .load()
        .with_context(|| format!("failed to load {}", store.path().display()))?;

    let mut recognizer = Recognizer::new(&config, index)?;
    let outcome = recognizer.run(&mode, source.as_mut())?;

    if let RunOutcome::Added { song_id, keypoints } = &outcome {
        store
            .save(recognizer.index())
            .with_context(|| format!("failed to save {}", store.path().display()))?;
        info!(song = %song_id, keypoints, "repository updated");
    }
    println!("{outcome}");

    Ok(())
}
