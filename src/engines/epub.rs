//! EPUB reading: spine items are concatenated in reading order and written
//! as one HTML page or as plain text.

use super::{blocking, ConvertEngine, EngineType, Job};
use crate::error::{EngineError, Result};
use crate::format::Format;
use ::epub::doc::EpubDoc;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ENVELOPE_HEAD: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body>";
const ENVELOPE_TAIL: &str = "</body></html>";

/// Markup of every spine item, in reading order.
fn read_spine(path: &Path) -> Result<Vec<String>> {
    let mut doc = EpubDoc::new(path)
        .map_err(|e| EngineError::backend("EPUB reader", format!("could not open {}: {}", path.display(), e)))?;

    let mut items = Vec::new();
    loop {
        if let Some((content, _mime)) = doc.get_current_str() {
            items.push(content);
        }
        if !doc.go_next() {
            break;
        }
    }
    debug!("Read {} spine items from {}", items.len(), path.display());
    Ok(items)
}

/// Inner markup of the item's `<body>`, or the whole item if it has none.
fn body_markup(item: &str) -> String {
    let document = Html::parse_document(item);
    match Selector::parse("body") {
        Ok(body) => document
            .select(&body)
            .next()
            .map(|el| el.inner_html())
            .unwrap_or_else(|| item.to_string()),
        Err(_) => item.to_string(),
    }
}

/// Text nodes of the item, tags dropped by the HTML parser.
fn body_text(item: &str) -> String {
    let document = Html::parse_document(item);
    let root = Selector::parse("body")
        .ok()
        .and_then(|body| document.select(&body).next())
        .unwrap_or_else(|| document.root_element());
    root.text().collect::<String>().trim().to_string()
}

/// Wrap already concatenated markup in a minimal standalone page.
pub(crate) fn html_envelope(items: &[String]) -> String {
    let mut page = String::from(ENVELOPE_HEAD);
    for item in items {
        page.push('\n');
        page.push_str(&body_markup(item));
    }
    page.push('\n');
    page.push_str(ENVELOPE_TAIL);
    page
}

fn plain_text(items: &[String]) -> String {
    items
        .iter()
        .map(|item| body_text(item))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// E-book reader. Writes HTML or plain text; page targets are chained
/// through the office suite by the router.
#[derive(Default)]
pub struct EpubEngine;

impl EpubEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConvertEngine for EpubEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::Ebook
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn convert(&self, job: &Job<'_>) -> Result<PathBuf> {
        if !matches!(job.target, Format::Html | Format::Txt) {
            return Err(EngineError::unsupported(job.input.display(), job.target));
        }
        info!("Extracting {} from {}", job.target, job.input.display());

        let input = job.input.to_path_buf();
        let target = job.target;
        let body = blocking("EPUB reader", move || {
            let items = read_spine(&input)?;
            Ok(match target {
                Format::Html => html_envelope(&items),
                _ => plain_text(&items),
            })
        })
        .await?;

        let output_path = job.output_path();
        tokio::fs::write(&output_path, body).await?;
        Ok(output_path)
    }
}
