//! Closed set of formats the converter understands, plus the advisory
//! compatibility matrix.

use crate::error::EngineError;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Pdf,
    Doc,
    Docx,
    Ppt,
    Pptx,
    Odt,
    Ods,
    Odp,
    Odg,
    Rtf,
    Txt,
    Html,
    Markdown,
    Xls,
    Xlsx,
    Csv,
    Epub,
    Jpg,
    Png,
    Gif,
    Heic,
    Svg,
}

pub const ALL_FORMATS: &[Format] = &[
    Format::Pdf,
    Format::Doc,
    Format::Docx,
    Format::Ppt,
    Format::Pptx,
    Format::Odt,
    Format::Ods,
    Format::Odp,
    Format::Odg,
    Format::Rtf,
    Format::Txt,
    Format::Html,
    Format::Markdown,
    Format::Xls,
    Format::Xlsx,
    Format::Csv,
    Format::Epub,
    Format::Jpg,
    Format::Png,
    Format::Gif,
    Format::Heic,
    Format::Svg,
];

impl Format {
    /// Normalize a user-supplied format name or file extension.
    ///
    /// Accepts any case and an optional leading dot; resolves `md`, `jpeg`,
    /// `heif` and `htm` to their canonical variants.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let name = raw.trim().trim_start_matches('.').to_lowercase();
        let format = match name.as_str() {
            "pdf" => Format::Pdf,
            "doc" => Format::Doc,
            "docx" => Format::Docx,
            "ppt" => Format::Ppt,
            "pptx" => Format::Pptx,
            "odt" => Format::Odt,
            "ods" => Format::Ods,
            "odp" => Format::Odp,
            "odg" => Format::Odg,
            "rtf" => Format::Rtf,
            "txt" => Format::Txt,
            "html" | "htm" => Format::Html,
            "md" | "markdown" => Format::Markdown,
            "xls" => Format::Xls,
            "xlsx" => Format::Xlsx,
            "csv" => Format::Csv,
            "epub" => Format::Epub,
            "jpg" | "jpeg" => Format::Jpg,
            "png" => Format::Png,
            "gif" => Format::Gif,
            "heic" | "heif" => Format::Heic,
            "svg" => Format::Svg,
            _ => return Err(EngineError::UnsupportedFormat(raw.to_string())),
        };
        Ok(format)
    }

    /// Detect the format of a file from its extension.
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                EngineError::UnsupportedFormat(format!("{} has no extension", path.display()))
            })?;
        Self::parse(ext)
    }

    /// Canonical name, as accepted by `parse` and used by the office suite.
    pub fn name(self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Doc => "doc",
            Format::Docx => "docx",
            Format::Ppt => "ppt",
            Format::Pptx => "pptx",
            Format::Odt => "odt",
            Format::Ods => "ods",
            Format::Odp => "odp",
            Format::Odg => "odg",
            Format::Rtf => "rtf",
            Format::Txt => "txt",
            Format::Html => "html",
            Format::Markdown => "markdown",
            Format::Xls => "xls",
            Format::Xlsx => "xlsx",
            Format::Csv => "csv",
            Format::Epub => "epub",
            Format::Jpg => "jpg",
            Format::Png => "png",
            Format::Gif => "gif",
            Format::Heic => "heic",
            Format::Svg => "svg",
        }
    }

    /// File suffix written for this format.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Markdown => "md",
            other => other.name(),
        }
    }

    pub fn is_raster_image(self) -> bool {
        matches!(self, Format::Jpg | Format::Png | Format::Gif | Format::Heic)
    }

    pub fn is_vector(self) -> bool {
        self == Format::Svg
    }

    pub fn is_ebook(self) -> bool {
        self == Format::Epub
    }

    pub fn is_page_document(self) -> bool {
        self == Format::Pdf
    }

    pub fn is_markup(self) -> bool {
        self == Format::Markdown
    }

    /// Targets the document parser produces from a page document.
    pub fn is_parse_target(self) -> bool {
        matches!(self, Format::Docx | Format::Markdown | Format::Html)
    }

    /// Raster targets reached by rendering a page document first.
    pub fn is_rasterizable_target(self) -> bool {
        matches!(self, Format::Jpg | Format::Png)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::parse(s)
    }
}

/// Advisory table of expected input/output pairs.
///
/// Routing never consults this; see [`crate::router::select`].
pub mod matrix {
    use super::Format::{self, *};

    pub fn targets(input: Format) -> &'static [Format] {
        match input {
            Pdf => &[Docx, Pptx, Html, Markdown, Odt, Ods, Odp, Jpg, Png],
            Docx => &[Pdf, Pptx, Html, Markdown, Odt, Txt, Rtf, Jpg, Png],
            Pptx => &[Pdf, Docx, Html, Odt, Odp, Jpg, Png],
            Odt => &[Pdf, Docx, Pptx, Html, Txt, Rtf, Jpg, Png],
            Ods => &[Pdf, Xlsx, Xls, Csv, Html, Jpg, Png],
            Odp => &[Pdf, Pptx, Html, Jpg, Png],
            Odg => &[Pdf, Svg, Png, Jpg],
            Html => &[Pdf, Docx, Pptx, Markdown, Txt, Jpg, Png],
            Markdown => &[Pdf, Docx, Pptx, Html, Txt, Jpg, Png],
            Txt => &[Pdf, Docx, Html, Markdown, Rtf, Jpg, Png],
            Rtf => &[Pdf, Docx, Odt, Txt, Html, Jpg, Png],
            Xlsx => &[Pdf, Ods, Xls, Csv, Html, Jpg, Png],
            Xls => &[Pdf, Xlsx, Ods, Csv, Html, Jpg, Png],
            Epub => &[Pdf, Html, Txt, Jpg, Png],
            Jpg => &[Pdf, Png, Heic, Gif],
            Png => &[Pdf, Jpg, Heic, Gif],
            Gif => &[Pdf, Png, Jpg, Heic],
            Heic => &[Jpg, Png, Pdf, Gif],
            Svg => &[Pdf, Png, Jpg],
            Doc | Ppt | Csv => &[],
        }
    }

    pub fn supports(input: Format, output: Format) -> bool {
        targets(input).contains(&output)
    }

    /// Short, human-facing list of suggested targets for an input.
    pub fn recommended_targets(input: Format) -> Vec<Format> {
        match input {
            Pdf => vec![Docx, Html, Markdown],
            Docx => vec![Pdf, Html, Odt],
            Pptx => vec![Pdf, Html],
            Jpg | Png => vec![Pdf],
            Html => vec![Pdf, Docx],
            Markdown => vec![Pdf, Docx, Html],
            _ => vec![Pdf],
        }
    }
}
