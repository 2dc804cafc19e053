//! Application state for the screening server

use std::sync::Arc;

use crate::config::ScreenConfig;
use crate::error::Result;
use crate::processing::{Dispatcher, EngineLoader, JobStore, ProcessingPipeline};
use crate::providers::{
    EngineFactory, FfmpegConverter, FormatConverter, Lexicon, TermMatcher, WhisperCliFactory,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: ScreenConfig,
    /// Job records
    store: Arc<JobStore>,
    /// Shared transcription engine
    loader: Arc<EngineLoader>,
    /// Upload admission
    dispatcher: Dispatcher,
}

impl AppState {
    /// Create state backed by ffmpeg, the whisper CLI and the configured lexicon
    pub fn new(config: ScreenConfig) -> Result<Self> {
        tracing::info!("Initializing screening state...");

        let lexicon = Lexicon::from_config(&config.lexicon)?;
        tracing::info!("Lexicon loaded ({} terms)", lexicon.len());

        let converter = Arc::new(FfmpegConverter::new(config.converter.clone()));
        let factory = Arc::new(WhisperCliFactory::new(
            config.engine.clone(),
            config.converter.ffmpeg_path.clone(),
        ));
        tracing::info!(
            "Engine '{}' (model {}) will load on first job",
            config.engine.command,
            config.engine.model
        );

        Ok(Self::with_components(
            config,
            factory,
            converter,
            Arc::new(lexicon),
        ))
    }

    /// Create state around explicit collaborators
    pub fn with_components(
        config: ScreenConfig,
        factory: Arc<dyn EngineFactory>,
        converter: Arc<dyn FormatConverter>,
        matcher: Arc<dyn TermMatcher>,
    ) -> Self {
        let store = Arc::new(JobStore::new());
        let loader = Arc::new(EngineLoader::new(factory, config.processing.engine_wait()));
        let pipeline = Arc::new(ProcessingPipeline::new(
            Arc::clone(&store),
            Arc::clone(&loader),
            converter,
            matcher,
            config.processing.deadline(),
            config.processing.scan_check_interval,
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            pipeline,
            config.server.max_upload_size,
            config.processing.retention(),
            config.processing.upload_dir(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                loader,
                dispatcher,
            }),
        }
    }

    pub fn config(&self) -> &ScreenConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    pub fn loader(&self) -> &EngineLoader {
        &self.inner.loader
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Whether the engine has been built
    pub fn model_loaded(&self) -> bool {
        self.inner.loader.is_ready()
    }
}
