use super::image::{encode_raster, flatten_alpha};
use super::image_pdf::write_image_pdf;
use super::{blocking, ConvertEngine, EngineType, Job, Quality};
use crate::error::{EngineError, Result};
use crate::format::Format;
use ::image::{DynamicImage, RgbaImage};
use async_trait::async_trait;
use resvg::{tiny_skia, usvg};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// CSS pixels per inch; SVG user units are rendered at this density.
const SVG_DPI: f32 = 96.0;

fn render_svg(input: &Path, quality: Quality) -> Result<RgbaImage> {
    let data = std::fs::read(input)?;

    let mut opt = usvg::Options {
        resources_dir: input.parent().map(Path::to_path_buf),
        ..usvg::Options::default()
    };
    opt.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_data(&data, &opt)
        .map_err(|e| EngineError::backend("SVG renderer", format!("could not parse {}: {}", input.display(), e)))?;

    let scale = quality.dpi() as f32 / SVG_DPI;
    let size = tree
        .size()
        .to_int_size()
        .scale_by(scale)
        .ok_or_else(|| EngineError::backend("SVG renderer", "drawing has no area"))?;
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| EngineError::backend("SVG renderer", "could not allocate the canvas"))?;

    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );
    debug!("Rendered {} at {}x{} px", input.display(), size.width(), size.height());

    // tiny-skia stores premultiplied RGBA
    let mut out = RgbaImage::new(pixmap.width(), pixmap.height());
    for (src, dst) in pixmap.pixels().iter().zip(out.pixels_mut()) {
        let c = src.demultiply();
        *dst = ::image::Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    Ok(out)
}

/// Direct vector renderer for SVG input (PDF, PNG, JPG targets).
#[derive(Default)]
pub struct SvgEngine;

impl SvgEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConvertEngine for SvgEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::Vector
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn convert(&self, job: &Job<'_>) -> Result<PathBuf> {
        if !matches!(job.target, Format::Pdf | Format::Png | Format::Jpg) {
            return Err(EngineError::unsupported(job.input.display(), job.target));
        }
        info!("Rendering {} to {} with resvg", job.input.display(), job.target);

        let input = job.input.to_path_buf();
        let output_path = job.output_path();
        let output = output_path.clone();
        let target = job.target;
        let quality = job.options.quality;

        blocking("SVG renderer", move || {
            let rgba = render_svg(&input, quality)?;
            match target {
                Format::Pdf => write_image_pdf(&flatten_alpha(&DynamicImage::ImageRgba8(rgba)), quality, &output),
                _ => encode_raster(&DynamicImage::ImageRgba8(rgba), target, quality, &output),
            }
        })
        .await?;
        Ok(output_path)
    }
}
