use super::{blocking, ConvertEngine, EngineType, Job, Quality};
use crate::error::{EngineError, Result};
use crate::format::Format;
use crate::locator::{Tool, ToolLocator};
use crate::process;
use ::image::codecs::gif::GifEncoder;
use ::image::codecs::jpeg::JpegEncoder;
use ::image::codecs::png::{CompressionType, FilterType, PngEncoder};
use ::image::{DynamicImage, Frame, Rgb, RgbImage};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Encoder parameters derived from the quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    /// JPEG/HEIC quality factor
    pub quality: u8,
    pub png_compression: PngLevel,
    /// GIF quantizer speed, 1 (best) to 30 (fastest)
    pub gif_speed: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PngLevel {
    Fast,
    Default,
    Best,
}

impl EncodeSettings {
    pub fn for_quality(quality: Quality) -> Self {
        match quality {
            Quality::Low => Self {
                quality: 60,
                png_compression: PngLevel::Fast,
                gif_speed: 30,
            },
            Quality::Medium => Self {
                quality: 85,
                png_compression: PngLevel::Default,
                gif_speed: 10,
            },
            Quality::High => Self {
                quality: 95,
                png_compression: PngLevel::Best,
                gif_speed: 1,
            },
        }
    }
}

/// Drop the alpha channel by compositing onto white.
pub(crate) fn flatten_alpha(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let alpha = src[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        *dst = Rgb([blend(src[0]), blend(src[1]), blend(src[2])]);
    }
    out
}

/// Write `img` as JPEG, PNG or GIF with tier-specific encoder settings.
///
/// The image is encoded in memory first; `path` is only created once the
/// encoder has succeeded.
pub(crate) fn encode_raster(img: &DynamicImage, target: Format, quality: Quality, path: &Path) -> Result<()> {
    let settings = EncodeSettings::for_quality(quality);
    let mut buf = Vec::new();
    let failed = |e: ::image::ImageError| EngineError::backend("image encoder", e);

    match target {
        Format::Jpg => {
            let rgb = flatten_alpha(img);
            JpegEncoder::new_with_quality(&mut buf, settings.quality)
                .encode_image(&rgb)
                .map_err(failed)?;
        }
        Format::Png => {
            let compression = match settings.png_compression {
                PngLevel::Fast => CompressionType::Fast,
                PngLevel::Default => CompressionType::Default,
                PngLevel::Best => CompressionType::Best,
            };
            let encoder = PngEncoder::new_with_quality(&mut buf, compression, FilterType::Adaptive);
            img.write_with_encoder(encoder).map_err(failed)?;
        }
        Format::Gif => {
            // The encoder quantizes each frame down to a 256-colour palette.
            let mut encoder = GifEncoder::new_with_speed(&mut buf, settings.gif_speed);
            encoder
                .encode_frame(Frame::new(img.to_rgba8()))
                .map_err(failed)?;
        }
        other => {
            return Err(EngineError::unsupported("raster image", other));
        }
    }
    std::fs::write(path, &buf)?;
    Ok(())
}

/// Raster decoding/encoding shared by the image-family engines, with HEIC
/// bridged through libheif's command line tools.
#[derive(Clone)]
pub(crate) struct RasterCodec {
    locator: Arc<ToolLocator>,
    timeout: Duration,
}

impl RasterCodec {
    pub(crate) fn new(locator: Arc<ToolLocator>, timeout: Duration) -> Self {
        Self { locator, timeout }
    }

    pub(crate) async fn load(&self, path: &Path) -> Result<DynamicImage> {
        if Format::from_path(path)? != Format::Heic {
            let path = path.to_path_buf();
            return blocking("image decoder", move || {
                ::image::open(&path).map_err(|e| EngineError::backend("image decoder", e))
            })
            .await;
        }

        let heif_convert = self.locator.locate(Tool::HeifConvert)?;
        let decoded = tempfile::Builder::new()
            .prefix("docmill-heic")
            .suffix(".png")
            .tempfile()?
            .into_temp_path();
        process::run("heif-convert", &heif_convert, [path.as_os_str(), decoded.as_os_str()], self.timeout)
            .await?
            .ensure_success("heif-convert")?;

        let decoded_path = decoded.to_path_buf();
        let img = blocking("image decoder", move || {
            ::image::open(&decoded_path).map_err(|e| EngineError::backend("image decoder", e))
        })
        .await?;
        drop(decoded);
        Ok(img)
    }

    /// Write `img` to `output`, which must already carry the target suffix.
    pub(crate) async fn save(&self, img: DynamicImage, target: Format, quality: Quality, output: &Path) -> Result<()> {
        if target != Format::Heic {
            let output = output.to_path_buf();
            return blocking("image encoder", move || encode_raster(&img, target, quality, &output)).await;
        }

        let heif_enc = self.locator.locate(Tool::HeifEnc)?;
        let staged = tempfile::Builder::new()
            .prefix("docmill-heic")
            .suffix(".png")
            .tempfile()?
            .into_temp_path();
        let staged_path = staged.to_path_buf();
        blocking("image encoder", move || {
            let rgb = DynamicImage::ImageRgb8(flatten_alpha(&img));
            encode_raster(&rgb, Format::Png, Quality::Low, &staged_path)
        })
        .await?;

        // heif-enc writes next to the output and is moved into place only
        // after it exits cleanly.
        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let encoded = tempfile::Builder::new()
            .prefix(".docmill-heic")
            .suffix(".heic")
            .tempfile_in(parent)?
            .into_temp_path();

        let q = EncodeSettings::for_quality(quality).quality.to_string();
        let args: [&OsStr; 5] = [
            OsStr::new("-q"),
            OsStr::new(&q),
            OsStr::new("-o"),
            encoded.as_os_str(),
            staged.as_os_str(),
        ];
        process::run("heif-enc", &heif_enc, args, self.timeout)
            .await?
            .ensure_success("heif-enc")?;
        encoded.persist(output).map_err(|e| EngineError::Io(e.error))?;
        Ok(())
    }
}

/// Converts between raster formats (JPG, PNG, GIF, HEIC).
pub struct ImageEngine {
    codec: RasterCodec,
}

impl ImageEngine {
    pub fn new(locator: Arc<ToolLocator>, timeout: Duration) -> Self {
        Self {
            codec: RasterCodec::new(locator, timeout),
        }
    }
}

#[async_trait]
impl ConvertEngine for ImageEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::Image
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn convert(&self, job: &Job<'_>) -> Result<PathBuf> {
        if !job.target.is_raster_image() {
            return Err(EngineError::unsupported(job.input.display(), job.target));
        }
        info!(
            "Converting {} to {} using the image codecs",
            job.input.display(),
            job.target
        );
        let img = self.codec.load(job.input).await?;
        let output_path = job.output_path();
        self.codec
            .save(img, job.target, job.options.quality, &output_path)
            .await?;
        Ok(output_path)
    }
}
