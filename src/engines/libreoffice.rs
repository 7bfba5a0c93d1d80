use super::{ConvertEngine, EngineType, Job, Quality};
use crate::config::ToolTimeouts;
use crate::error::{EngineError, Result};
use crate::locator::{Tool, ToolLocator};
use crate::process;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Flags that keep soffice from showing UI, crash dialogs or lock prompts.
const HEADLESS_FLAGS: &[&str] = &[
    "--headless",
    "--invisible",
    "--nocrashreport",
    "--nodefault",
    "--nofirststartwizard",
    "--nolockcheck",
    "--nologo",
    "--norestore",
];

pub struct LibreOfficeEngine {
    locator: Arc<ToolLocator>,
    timeouts: ToolTimeouts,
}

impl LibreOfficeEngine {
    pub fn new(locator: Arc<ToolLocator>, timeouts: ToolTimeouts) -> Self {
        Self { locator, timeouts }
    }

    fn timeout_for(&self, quality: Quality) -> std::time::Duration {
        if quality == Quality::High {
            self.timeouts.office_high
        } else {
            self.timeouts.office
        }
    }

    /// Run soffice into `output_dir`, returning its stderr.
    async fn run_soffice(&self, job: &Job<'_>, output_dir: &Path) -> Result<String> {
        let soffice = self.locator.locate(Tool::Soffice)?;
        let mut args: Vec<String> = HEADLESS_FLAGS.iter().map(|f| f.to_string()).collect();
        args.push("--convert-to".to_string());
        args.push(job.target.extension().to_string());
        args.push("--outdir".to_string());
        args.push(output_dir.to_string_lossy().into_owned());
        args.push(job.input.to_string_lossy().into_owned());

        let output = process::run(
            "LibreOffice",
            &soffice,
            &args,
            self.timeout_for(job.options.quality),
        )
        .await?;

        // soffice exits 0 on some failures; the produced file decides.
        if !output.status.success() {
            info!("LibreOffice exited with {}", output.status);
        }
        Ok(output.stderr)
    }
}

#[async_trait]
impl ConvertEngine for LibreOfficeEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::Office
    }

    async fn is_available(&self) -> bool {
        self.locator.is_available(Tool::Soffice)
    }

    async fn convert(&self, job: &Job<'_>) -> Result<PathBuf> {
        let output_path = job.output_path();
        let parent = output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        // soffice names its output after the input; stage it in a private
        // directory so a timed-out run leaves nothing in the output directory.
        let stage = tempfile::Builder::new()
            .prefix(".docmill-office")
            .tempdir_in(parent)?;

        info!(
            "Converting {} to {} using LibreOffice",
            job.input.display(),
            job.target
        );
        let stderr = self.run_soffice(job, stage.path()).await?;

        let expected = stage
            .path()
            .join(format!("{}.{}", job.input_stem(), job.target.extension()));

        if !expected.exists() {
            return Err(EngineError::backend(
                "LibreOffice",
                format!(
                    "no {} output was produced for {} {}",
                    job.target,
                    job.input.display(),
                    stderr.trim()
                ),
            ));
        }

        tokio::fs::rename(&expected, &output_path).await?;
        Ok(output_path)
    }
}
