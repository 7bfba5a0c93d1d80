mod chromium;
mod docling;
mod epub;
mod image;
mod image_pdf;
mod libreoffice;
mod pandoc;
mod raster;
mod svg;

pub use self::epub::EpubEngine;
pub use self::image::ImageEngine;
pub use chromium::ChromiumEngine;
pub use docling::DoclingEngine;
pub use image_pdf::ImagePdfEngine;
pub use libreoffice::LibreOfficeEngine;
pub use pandoc::{decode_markup, PandocEngine};
pub use raster::RasterEngine;
pub use svg::SvgEngine;

use crate::error::{EngineError, Result};
use crate::format::Format;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Coarse speed/fidelity tier shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl Quality {
    /// Map the numeric tier (1-3); anything else is medium.
    pub fn from_level(level: u8) -> Self {
        match level {
            1 => Quality::Low,
            3 => Quality::High,
            _ => Quality::Medium,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Quality::Low => 1,
            Quality::Medium => 2,
            Quality::High => 3,
        }
    }

    /// Accepts `low|medium|high` or `1|2|3`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" | "fast" | "1" => Some(Quality::Low),
            "medium" | "balanced" | "2" => Some(Quality::Medium),
            "high" | "best" | "3" => Some(Quality::High),
            _ => None,
        }
    }

    /// Resolution density for rasterizing and page export.
    pub fn dpi(self) -> u32 {
        match self {
            Quality::Low => 72,
            Quality::Medium => 150,
            Quality::High => 300,
        }
    }

    /// Lossy encoder quality factor (JPEG, HEIC).
    pub fn encoder_quality(self) -> u8 {
        match self {
            Quality::Low => 60,
            Quality::Medium => 85,
            Quality::High => 95,
        }
    }
}

/// Conversion options passed to engines
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    pub quality: Quality,
    /// Run OCR on scanned pages (document parser only)
    pub ocr: bool,
    /// Keep backgrounds and page geometry where the backend allows it
    pub preserve_layout: bool,
}

impl ConvertOptions {
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_ocr(mut self, ocr: bool) -> Self {
        self.ocr = ocr;
        self
    }
}

/// One hop of a conversion.
#[derive(Debug, Clone, Copy)]
pub struct Job<'a> {
    pub input: &'a Path,
    /// Requested output path; the engine corrects its suffix to what it wrote.
    pub output: &'a Path,
    pub target: Format,
    pub options: &'a ConvertOptions,
}

impl<'a> Job<'a> {
    pub fn new(input: &'a Path, output: &'a Path, target: Format, options: &'a ConvertOptions) -> Self {
        Self {
            input,
            output,
            target,
            options,
        }
    }

    /// Requested output path with the suffix of `self.target`.
    pub fn output_path(&self) -> PathBuf {
        self.output.with_extension(self.target.extension())
    }

    pub fn input_stem(&self) -> &str {
        self.input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EngineType {
    Office,
    Markup,
    DocumentParser,
    Image,
    ImagePage,
    Vector,
    Ebook,
    Rasterizer,
    PageRenderer,
}

/// Trait that all conversion engines must implement
#[async_trait]
pub trait ConvertEngine: Send + Sync {
    fn engine_type(&self) -> EngineType;

    /// Whether the backend's tool or library can be used right now.
    async fn is_available(&self) -> bool;

    /// Convert `job.input` to `job.target`, returning the written path.
    async fn convert(&self, job: &Job<'_>) -> Result<PathBuf>;
}

/// Run CPU-bound library work off the async worker threads.
pub(crate) async fn blocking<F, T>(backend: &str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| EngineError::backend(backend, format!("worker task failed: {}", e)))?
}
