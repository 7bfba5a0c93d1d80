use crate::config::ConverterConfig;
use crate::engines::ConvertOptions;
use crate::error::{ConversionFailed, EngineError};
use crate::format::Format;
use crate::locator::ToolLocator;
use crate::router::{Dispatcher, Engines};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Entry point for conversions. Cheap to clone; clones share the tool
/// cache and engine handles.
#[derive(Clone)]
pub struct Converter {
    locator: Arc<ToolLocator>,
    dispatcher: Arc<Dispatcher>,
}

impl Converter {
    pub fn new(config: ConverterConfig) -> Self {
        let locator = Arc::new(ToolLocator::new(config.tool_paths.clone()));
        Self::with_locator(locator, &config)
    }

    /// Production engines on top of an existing locator.
    pub fn with_locator(locator: Arc<ToolLocator>, config: &ConverterConfig) -> Self {
        let engines = Engines::new(locator.clone(), &config.timeouts);
        Self::with_engines(locator, engines)
    }

    pub fn with_engines(locator: Arc<ToolLocator>, engines: Engines) -> Self {
        Self {
            locator,
            dispatcher: Arc::new(Dispatcher::new(engines)),
        }
    }

    pub fn locator(&self) -> &ToolLocator {
        &self.locator
    }

    pub fn engines(&self) -> &Engines {
        self.dispatcher.engines()
    }

    /// Convert `input` to `target` inside `output_dir`.
    ///
    /// The output is named after the input's stem; its suffix is whatever
    /// the backend actually wrote. `output_dir` is created if missing.
    pub async fn convert(
        &self,
        input: impl AsRef<Path>,
        target: &str,
        output_dir: impl AsRef<Path>,
        options: &ConvertOptions,
    ) -> Result<PathBuf, ConversionFailed> {
        let input = input.as_ref().to_path_buf();
        if !tokio::fs::metadata(&input)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Err(ConversionFailed::new(format!(
                "{} not found",
                input.display()
            )));
        }

        let target = Format::parse(target)?;
        let output_dir = output_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(EngineError::from)?;

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let output = output_dir.join(format!("{}.{}", stem, target.extension()));

        let dispatcher = self.dispatcher.clone();
        let options = options.clone();
        let source = input.clone();
        let task = tokio::spawn(async move {
            dispatcher
                .dispatch(&source, target, &output, &options)
                .await
        });

        match task.await {
            Ok(Ok(path)) => {
                info!("Converted {} → {}", input.display(), path.display());
                Ok(path)
            }
            Ok(Err(err)) => {
                error!("Converting {} to {} failed: {}", input.display(), target, err);
                Err(err.into())
            }
            Err(join) => {
                error!("Conversion task for {} aborted: {}", input.display(), join);
                Err(ConversionFailed::new(format!(
                    "internal error while converting {}: {}",
                    input.display(),
                    join
                )))
            }
        }
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(ConverterConfig::default())
    }
}
