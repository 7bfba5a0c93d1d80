//! Route document and image conversions to the best available backend.
//!
//! [`Converter::convert`] picks a path from the input and target formats,
//! falls back to alternative backends when a tool is missing, and cleans up
//! every intermediate it creates. [`batch`] and [`watch`] drive it over many
//! files; [`handlers`] exposes it over HTTP.

pub mod batch;
pub mod config;
pub mod converter;
pub mod engines;
pub mod error;
pub mod format;
pub mod handlers;
pub mod locator;
mod process;
pub mod router;
pub mod watch;

#[cfg(test)]
mod testutil;

pub use config::{ConverterConfig, ToolTimeouts};
pub use converter::Converter;
pub use engines::{ConvertOptions, EngineType, Quality};
pub use error::{ConversionFailed, EngineError};
pub use format::{matrix, Format};
pub use locator::{Tool, ToolLocator};
pub use router::{select, Strategy};
