use super::image::{flatten_alpha, RasterCodec};
use super::{blocking, ConvertEngine, EngineType, Job, Quality};
use crate::error::{EngineError, Result};
use crate::format::Format;
use crate::locator::ToolLocator;
use ::image::codecs::jpeg::JpegEncoder;
use ::image::{DynamicImage, RgbImage};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Page size in points for an image shown at `dpi`.
fn page_size(width_px: u32, height_px: u32, dpi: u32) -> (f32, f32) {
    let dpi = dpi as f32;
    (width_px as f32 * 72.0 / dpi, height_px as f32 * 72.0 / dpi)
}

/// Write a single-page PDF whose page is exactly `rgb` at the tier's DPI.
pub(crate) fn write_image_pdf(rgb: &RgbImage, quality: Quality, path: &Path) -> Result<()> {
    let failed = |e: lopdf::Error| EngineError::backend("PDF writer", e);

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.encoder_quality())
        .encode_image(rgb)
        .map_err(|e| EngineError::backend("image encoder", e))?;

    let (width, height) = page_size(rgb.width(), rgb.height(), quality.dpi());
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => rgb.width() as i64,
            "Height" => rgb.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![width.into(), 0.into(), 0.into(), height.into(), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().map_err(failed)?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf)?;
    std::fs::write(path, buf)?;
    Ok(())
}

/// Places a raster image on a PDF page sized by the quality tier's DPI.
pub struct ImagePdfEngine {
    codec: RasterCodec,
}

impl ImagePdfEngine {
    pub fn new(locator: Arc<ToolLocator>, timeout: Duration) -> Self {
        Self {
            codec: RasterCodec::new(locator, timeout),
        }
    }
}

#[async_trait]
impl ConvertEngine for ImagePdfEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::ImagePage
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn convert(&self, job: &Job<'_>) -> Result<PathBuf> {
        if job.target != Format::Pdf {
            return Err(EngineError::unsupported(job.input.display(), job.target));
        }
        info!("Placing {} on a PDF page", job.input.display());

        let img = self.codec.load(job.input).await?;
        let output_path = job.output_path();
        let path = output_path.clone();
        let quality = job.options.quality;
        blocking("PDF writer", move || {
            let rgb = match img {
                DynamicImage::ImageRgb8(rgb) => rgb,
                other => flatten_alpha(&other),
            };
            write_image_pdf(&rgb, quality, &path)
        })
        .await?;
        Ok(output_path)
    }
}
