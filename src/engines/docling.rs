use super::{ConvertEngine, EngineType, Job, Quality};
use crate::error::{EngineError, Result};
use crate::format::Format;
use crate::locator::{Tool, ToolLocator};
use crate::process;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// A verified handle to the docling command line.
#[derive(Debug, Clone)]
struct DoclingClient {
    program: PathBuf,
    version: String,
}

impl DoclingClient {
    async fn connect(locator: &ToolLocator) -> Result<Self> {
        let program = locator.locate(Tool::Docling)?;
        let output = process::run("Docling", &program, ["--version"], VERSION_PROBE_TIMEOUT)
            .await?
            .ensure_success("Docling")?;
        let version = output.stdout.lines().next().unwrap_or("unknown").trim().to_string();
        info!("Docling ready ({})", version);
        Ok(Self { program, version })
    }

    fn args(&self, input: &Path, target: Format, out_dir: &Path, quality: Quality, ocr: bool) -> Vec<String> {
        let export = match target {
            Format::Html => "html",
            _ => "md",
        };
        let mut args = vec![
            input.to_string_lossy().into_owned(),
            "--to".to_string(),
            export.to_string(),
            "--output".to_string(),
            out_dir.to_string_lossy().into_owned(),
        ];
        args.push(if ocr { "--ocr" } else { "--no-ocr" }.to_string());
        if quality == Quality::Low {
            args.push("--no-tables".to_string());
        }
        args
    }
}

/// AI-assisted document parser; exports Markdown or HTML from page documents.
pub struct DoclingEngine {
    locator: Arc<ToolLocator>,
    timeout: Duration,
    client: OnceCell<DoclingClient>,
}

impl DoclingEngine {
    pub fn new(locator: Arc<ToolLocator>, timeout: Duration) -> Self {
        Self {
            locator,
            timeout,
            client: OnceCell::new(),
        }
    }

    /// Build the client on first use; concurrent callers share one probe.
    async fn client(&self) -> Result<&DoclingClient> {
        self.client
            .get_or_try_init(|| DoclingClient::connect(&self.locator))
            .await
    }
}

#[async_trait]
impl ConvertEngine for DoclingEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::DocumentParser
    }

    async fn is_available(&self) -> bool {
        self.locator.is_available(Tool::Docling)
    }

    async fn convert(&self, job: &Job<'_>) -> Result<PathBuf> {
        if !matches!(job.target, Format::Markdown | Format::Html) {
            return Err(EngineError::unsupported(job.input.display(), job.target));
        }
        let client = self.client().await?;
        let output_path = job.output_path();
        let parent = output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let stage = tempfile::Builder::new()
            .prefix(".docmill-parse")
            .tempdir_in(parent)?;

        info!(
            "Parsing {} to {} using Docling {}",
            job.input.display(),
            job.target,
            client.version
        );
        let args = client.args(
            job.input,
            job.target,
            stage.path(),
            job.options.quality,
            job.options.ocr,
        );
        process::run("Docling", &client.program, &args, self.timeout)
            .await?
            .ensure_success("Docling")?;

        let export_ext = if job.target == Format::Html { "html" } else { "md" };
        let produced = stage
            .path()
            .join(format!("{}.{}", job.input_stem(), export_ext));
        if !produced.exists() {
            return Err(EngineError::backend("Docling", "no export was produced"));
        }
        tokio::fs::rename(&produced, &output_path).await?;
        Ok(output_path)
    }
}
