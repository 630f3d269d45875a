//! One generation run from document to placed layer
//!
//! Ties the host collaborators to the orchestrator and the progress monitor:
//! read the key, export the canvas, clear any stale output, then run the
//! orchestrator and the monitor side by side on the current task. The monitor
//! places the layer once it observes success.

use std::path::PathBuf;
use std::sync::Arc;

use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

use crate::api::{self, ImageClient};
use crate::clock::{Clock, TokioClock};
use crate::config::Config;
use crate::events::EventEmitter;
use crate::generate::{BackoffPolicy, GenerateOptions, Orchestrator};
use crate::host::{DocumentSource, FileKeyStore, KeyStore, LayerSink, OUTPUT_LAYER_NAME, WorkFolder};
use crate::progress::{CompletionSignal, ProgressMonitor};

pub const UPSCALE_PROMPT: &str = "Upscale and restore detail. Keep content identical. Preserve color and tone. \
Reduce artifacts. No new objects. Natural sharpness only. Maintain the aspect ratio of the input image. \
KEEP COLOR AND PROPORTIONS IDENTICAL!";

pub const RESTORE_PROMPT: &str = "Take this existing image and make it look like it was shot with an expensive, \
professional, modern camera. If it's an old black and white image make it colored accurately. The outputed image \
should have impeccable depth of field and have a professional look, while maintaining all of the detail and \
recognizable attributes of the initial image";

pub const MISSING_KEY: &str = "Enter your OpenAI API key first.";

/// What to ask the model for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Upscale,
    Restore,
    Custom(String),
}

impl Mode {
    pub fn prompt(&self) -> &str {
        match self {
            Mode::Upscale => UPSCALE_PROMPT,
            Mode::Restore => RESTORE_PROMPT,
            Mode::Custom(prompt) => prompt,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Upscale => "Upscale",
            Mode::Restore => "Restore",
            Mode::Custom(_) => "Custom",
        }
    }
}

/// A configured generation session
pub struct Session {
    config: Config,
    folder: WorkFolder,
    keys: Arc<dyn KeyStore>,
    clock: Arc<dyn Clock>,
    client: Option<Arc<dyn ImageClient>>,
    events: EventEmitter,
}

impl Session {
    /// Open the configured work folder with the default key store and clock
    pub fn new(config: Config) -> Result<Self> {
        let folder = WorkFolder::open(config.work_dir())?;
        Ok(Self::with_folder(config, folder))
    }

    pub fn with_folder(config: Config, folder: WorkFolder) -> Self {
        debug!(work_dir = ?folder.path(), "Session::with_folder: called");
        let keys = FileKeyStore::new(folder.key_path()).with_env_fallback(config.api.api_key_env.clone());
        Self {
            config,
            folder,
            keys: Arc::new(keys),
            clock: Arc::new(TokioClock::new()),
            client: None,
            events: EventEmitter::detached(),
        }
    }

    pub fn with_key_store(mut self, keys: Arc<dyn KeyStore>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use this client instead of building one from the API config
    pub fn with_client(mut self, client: Arc<dyn ImageClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn folder(&self) -> &WorkFolder {
        &self.folder
    }

    /// Run one generation and place the result through `sink`
    ///
    /// Every outcome is also reported as a terminal event.
    pub async fn run(&self, mode: &Mode, document: &dyn DocumentSource, sink: &dyn LayerSink) -> Result<PathBuf> {
        info!(mode = mode.label(), document = %document.name(), "Session::run: called");
        match self.run_inner(mode, document, sink).await {
            Ok(path) => {
                self.events
                    .status(format!("Done. New layer {} added.", OUTPUT_LAYER_NAME), false);
                self.events.completed(&path, OUTPUT_LAYER_NAME);
                Ok(path)
            }
            Err(e) => {
                warn!(error = %e, "Session::run: failed");
                self.events.failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_inner(&self, mode: &Mode, document: &dyn DocumentSource, sink: &dyn LayerSink) -> Result<PathBuf> {
        let key = self.keys.get()?.ok_or_else(|| eyre!(MISSING_KEY))?;

        self.events.status("Exporting canvas to input.png ...", false);
        let png = document.export(&self.folder)?;

        // A stale output would satisfy the monitor before the new run finishes
        self.folder.clear_output()?;

        let client = match &self.client {
            Some(client) => client.clone(),
            None => api::create_client(&self.config.api, &key)?,
        };
        let orchestrator = Orchestrator::new(
            client,
            Arc::new(self.folder.clone()),
            self.clock.clone(),
            BackoffPolicy::from(&self.config.retry),
            GenerateOptions::from_config(&self.config),
            self.events.clone(),
        );

        self.events.status(
            format!(
                "Generating {} image. This usually takes up to {} seconds.",
                mode.label().to_lowercase(),
                self.config.progress.estimated_duration().as_secs()
            ),
            false,
        );
        self.events.status("Generating with high quality ...", false);

        let signal = CompletionSignal::new();
        let writer = signal.clone();
        let generation = async move {
            let outcome = orchestrator.generate(Arc::from(png), mode.prompt()).await;
            writer.record(&outcome);
            outcome
        };

        let mut monitor = ProgressMonitor::from_config(&self.config.progress);
        let mut placed = None;
        let watching = monitor.watch(
            self.clock.as_ref(),
            || signal.poll(),
            || {
                self.events.status("Placing new layer ...", false);
                placed = Some(sink.place(&self.folder.output_path(), OUTPUT_LAYER_NAME));
            },
            &self.events,
        );

        let (outcome, watched) = tokio::join!(generation, watching);
        debug!(?outcome, percent = monitor.state().percent, "Session::run_inner: generation finished");
        watched?;

        match placed {
            Some(result) => result.context("Failed to place output layer"),
            None => Err(eyre!("Generation finished without placing a layer")),
        }
    }
}
