use super::{ConvertEngine, EngineType, Job, Quality};
use crate::config::ToolTimeouts;
use crate::error::{EngineError, Result};
use crate::format::Format;
use crate::locator::{Tool, ToolLocator};
use crate::process;
use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{debug, info};

/// Decoders tried in order on markup input; the last one never fails.
#[derive(Debug, Clone, Copy)]
enum Decoder {
    Utf8Sig,
    Utf16,
    Utf16Le,
    Utf16Be,
    Utf8,
    Latin1,
}

const DECODERS: &[Decoder] = &[
    Decoder::Utf8Sig,
    Decoder::Utf16,
    Decoder::Utf16Le,
    Decoder::Utf16Be,
    Decoder::Utf8,
    Decoder::Latin1,
];

impl Decoder {
    fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Decoder::Utf8Sig => strict(UTF_8, bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)),
            Decoder::Utf16 => {
                if let Some(rest) = bytes.strip_prefix(b"\xFF\xFE") {
                    strict(UTF_16LE, rest)
                } else if let Some(rest) = bytes.strip_prefix(b"\xFE\xFF") {
                    strict(UTF_16BE, rest)
                } else {
                    strict(UTF_16LE, bytes)
                }
            }
            Decoder::Utf16Le => strict(UTF_16LE, bytes),
            Decoder::Utf16Be => strict(UTF_16BE, bytes),
            Decoder::Utf8 => strict(UTF_8, bytes),
            Decoder::Latin1 => Some(
                WINDOWS_1252
                    .decode_without_bom_handling(bytes)
                    .0
                    .into_owned(),
            ),
        }
    }
}

fn strict(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|s| s.into_owned())
}

/// Decode markup bytes with the first encoding that reads them cleanly and
/// drop any byte-order marks left in the text.
pub fn decode_markup(bytes: &[u8]) -> Result<String> {
    for decoder in DECODERS {
        if let Some(text) = decoder.decode(bytes) {
            debug!("Markup decoded as {:?}", decoder);
            return Ok(text.replace('\u{feff}', "").replace("ÿþ", ""));
        }
    }
    Err(EngineError::backend(
        "markup decoder",
        "could not decode markup file with any known encoding",
    ))
}

/// Pandoc writer name for a target format.
fn writer_for(target: Format) -> Option<&'static str> {
    match target {
        Format::Markdown => Some("markdown"),
        Format::Html => Some("html"),
        Format::Docx => Some("docx"),
        Format::Pptx => Some("pptx"),
        Format::Odt => Some("odt"),
        Format::Rtf => Some("rtf"),
        Format::Txt => Some("plain"),
        Format::Epub => Some("epub"),
        _ => None,
    }
}

pub struct PandocEngine {
    locator: Arc<ToolLocator>,
    timeouts: ToolTimeouts,
}

impl PandocEngine {
    pub fn new(locator: Arc<ToolLocator>, timeouts: ToolTimeouts) -> Self {
        Self { locator, timeouts }
    }

    fn timeout_for(&self, quality: Quality) -> std::time::Duration {
        if quality == Quality::High {
            self.timeouts.markup_high
        } else {
            self.timeouts.markup
        }
    }

    /// Write a re-encoded UTF-8 copy of a markup or text input.
    async fn cleaned_copy(&self, input: &Path, stem: &str) -> Result<Option<TempPath>> {
        let needs_repair = matches!(Format::from_path(input), Ok(Format::Markdown | Format::Txt));
        if !needs_repair {
            return Ok(None);
        }

        let bytes = tokio::fs::read(input).await?;
        let text = decode_markup(&bytes)?;
        let suffix = input
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let copy = tempfile::Builder::new()
            .prefix(&format!("{}_clean", stem))
            .suffix(&suffix)
            .tempfile()?
            .into_temp_path();
        tokio::fs::write(&copy, text).await?;
        Ok(Some(copy))
    }
}

#[async_trait]
impl ConvertEngine for PandocEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::Markup
    }

    async fn is_available(&self) -> bool {
        self.locator.is_available(Tool::Pandoc)
    }

    async fn convert(&self, job: &Job<'_>) -> Result<PathBuf> {
        let pandoc = self.locator.locate(Tool::Pandoc)?;
        let writer = writer_for(job.target)
            .ok_or_else(|| EngineError::unsupported(job.input.display(), job.target))?;

        let cleaned = self.cleaned_copy(job.input, job.input_stem()).await?;
        let source = cleaned.as_deref().unwrap_or(job.input);
        let output_path = job.output_path();
        let parent = output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        // Pandoc writes into a staging directory; only a finished file is
        // moved to the output path.
        let stage = tempfile::Builder::new()
            .prefix(".docmill-markup")
            .tempdir_in(parent)?;
        let staged = stage.path().join(
            output_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("output")),
        );

        let args = pandoc_args(source, job.input.parent(), writer, &staged, job.target, job.options.quality);
        info!(
            "Converting {} to {} using Pandoc",
            job.input.display(),
            job.target
        );
        process::run("Pandoc", &pandoc, &args, self.timeout_for(job.options.quality))
            .await?
            .ensure_success("Pandoc")?;

        if !staged.exists() {
            return Err(EngineError::backend("Pandoc", "output file was not created"));
        }
        tokio::fs::rename(&staged, &output_path).await?;
        Ok(output_path)
    }
}

/// Command line for one pandoc run.
fn pandoc_args(
    source: &Path,
    resource_dir: Option<&Path>,
    writer: &str,
    output: &Path,
    target: Format,
    quality: Quality,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        source.to_string_lossy().into_owned(),
        "-t".to_string(),
        writer.to_string(),
        "-o".to_string(),
        output.to_string_lossy().into_owned(),
    ];
    if let Some(dir) = resource_dir.filter(|p| !p.as_os_str().is_empty()) {
        // Relative image links resolve against the original location.
        args.push(format!("--resource-path={}", dir.display()));
    }
    match quality {
        Quality::High => {
            args.extend(["--standalone", "--toc", "--number-sections"].map(String::from));
        }
        Quality::Low => args.push("--no-highlight".to_string()),
        Quality::Medium => {}
    }
    if target == Format::Html && quality != Quality::High {
        args.push("--standalone".to_string());
    }
    args
}
