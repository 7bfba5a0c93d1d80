//! First-page rasterization of PDF documents through PDFium.
//!
//! PDFium keeps thread-local state, so every render binds and runs inside
//! `spawn_blocking`; only the library location is cached.

use super::image::encode_raster;
use super::{blocking, ConvertEngine, EngineType, Job};
use crate::error::{EngineError, Result};
use crate::locator::{Tool, ToolLocator};
use ::image::DynamicImage;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

fn render_first_page(library: &Path, input: &Path, dpi: u32) -> Result<DynamicImage> {
    let bindings = Pdfium::bind_to_library(library)
        .map_err(|e| EngineError::unavailable("PDFium", format!("could not load {}: {}", library.display(), e)))?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium
        .load_pdf_from_file(input, None)
        .map_err(|e| EngineError::backend("PDFium", format!("could not open {}: {:?}", input.display(), e)))?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Err(EngineError::backend(
            "PDFium",
            format!("{} has no renderable pages", input.display()),
        ));
    }

    let page = pages
        .get(0)
        .map_err(|e| EngineError::backend("PDFium", format!("{:?}", e)))?;
    let config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .render_form_data(true)
        .render_annotations(true);
    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| EngineError::backend("PDFium", format!("render failed: {:?}", e)))?;

    let image = bitmap.as_image();
    debug!("Rendered first page at {} dpi → {}x{} px", dpi, image.width(), image.height());
    Ok(image)
}

/// Renders the first page of a PDF into a raster image.
pub struct RasterEngine {
    locator: Arc<ToolLocator>,
}

impl RasterEngine {
    pub fn new(locator: Arc<ToolLocator>) -> Self {
        Self { locator }
    }
}

#[async_trait]
impl ConvertEngine for RasterEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::Rasterizer
    }

    async fn is_available(&self) -> bool {
        self.locator.is_available(Tool::Pdfium)
    }

    async fn convert(&self, job: &Job<'_>) -> Result<PathBuf> {
        if !job.target.is_raster_image() {
            return Err(EngineError::unsupported(job.input.display(), job.target));
        }
        let library = self.locator.locate(Tool::Pdfium)?;

        info!(
            "Rasterizing first page of {} to {}",
            job.input.display(),
            job.target
        );
        let input = job.input.to_path_buf();
        let output_path = job.output_path();
        let output = output_path.clone();
        let target = job.target;
        let quality = job.options.quality;

        blocking("PDFium", move || {
            let image = render_first_page(&library, &input, quality.dpi())?;
            encode_raster(&image, target, quality, &output)
        })
        .await?;
        Ok(output_path)
    }
}
