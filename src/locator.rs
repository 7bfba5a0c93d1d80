//! Finds external converter binaries and caches the answer per process.

use crate::error::{EngineError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// External tools and libraries the engines depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Soffice,
    Pandoc,
    Docling,
    HeifConvert,
    HeifEnc,
    Chrome,
    Pdfium,
}

pub const ALL_TOOLS: &[Tool] = &[
    Tool::Soffice,
    Tool::Pandoc,
    Tool::Docling,
    Tool::HeifConvert,
    Tool::HeifEnc,
    Tool::Chrome,
    Tool::Pdfium,
];

impl Tool {
    pub fn display_name(self) -> &'static str {
        match self {
            Tool::Soffice => "LibreOffice",
            Tool::Pandoc => "Pandoc",
            Tool::Docling => "Docling",
            Tool::HeifConvert => "heif-convert",
            Tool::HeifEnc => "heif-enc",
            Tool::Chrome => "Chromium",
            Tool::Pdfium => "PDFium",
        }
    }

    /// Environment variable that overrides the search.
    pub fn env_var(self) -> &'static str {
        match self {
            Tool::Soffice => "SOFFICE_PATH",
            Tool::Pandoc => "PANDOC_PATH",
            Tool::Docling => "DOCLING_PATH",
            Tool::HeifConvert => "HEIF_CONVERT_PATH",
            Tool::HeifEnc => "HEIF_ENC_PATH",
            Tool::Chrome => "CHROME_PATH",
            Tool::Pdfium => "PDFIUM_LIB_PATH",
        }
    }

    pub fn install_hint(self) -> &'static str {
        match self {
            Tool::Soffice => "Install LibreOffice from https://www.libreoffice.org or set SOFFICE_PATH.",
            Tool::Pandoc => "Install Pandoc from https://pandoc.org or set PANDOC_PATH.",
            Tool::Docling => "Run 'pip install docling' or set DOCLING_PATH.",
            Tool::HeifConvert | Tool::HeifEnc => {
                "Install libheif-examples (provides heif-convert and heif-enc)."
            }
            Tool::Chrome => "Install Chromium or Google Chrome, or set CHROME_PATH.",
            Tool::Pdfium => {
                "Download libpdfium from https://github.com/bblanchon/pdfium-binaries or set PDFIUM_LIB_PATH."
            }
        }
    }

    /// Names looked up on the system search path, in order.
    fn path_names(self) -> &'static [&'static str] {
        match self {
            Tool::Soffice => &["soffice", "libreoffice"],
            Tool::Pandoc => &["pandoc"],
            Tool::Docling => &["docling"],
            Tool::HeifConvert => &["heif-convert", "heif-dec"],
            Tool::HeifEnc => &["heif-enc"],
            Tool::Chrome => &["chromium", "chromium-browser", "google-chrome"],
            Tool::Pdfium => &[],
        }
    }

    /// Well-known install locations probed before the search path.
    fn known_locations(self) -> &'static [&'static str] {
        match self {
            Tool::Soffice => {
                if cfg!(target_os = "macos") {
                    &["/Applications/LibreOffice.app/Contents/MacOS/soffice"]
                } else if cfg!(target_os = "windows") {
                    &[
                        r"C:\Program Files\LibreOffice\program\soffice.exe",
                        r"C:\Program Files (x86)\LibreOffice\program\soffice.exe",
                    ]
                } else {
                    &["/usr/bin/soffice", "/usr/bin/libreoffice", "/opt/libreoffice/program/soffice"]
                }
            }
            Tool::Chrome => {
                if cfg!(target_os = "macos") {
                    &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"]
                } else if cfg!(target_os = "windows") {
                    &[r"C:\Program Files\Google\Chrome\Application\chrome.exe"]
                } else {
                    &["/usr/bin/chromium", "/usr/bin/chromium-browser", "/usr/bin/google-chrome"]
                }
            }
            Tool::Pdfium => {
                if cfg!(target_os = "macos") {
                    &["./libpdfium.dylib", "/usr/local/lib/libpdfium.dylib", "/opt/homebrew/lib/libpdfium.dylib"]
                } else if cfg!(target_os = "windows") {
                    &[r".\pdfium.dll"]
                } else {
                    &["./libpdfium.so", "/usr/local/lib/libpdfium.so", "/usr/lib/libpdfium.so"]
                }
            }
            _ => &[],
        }
    }
}

/// Filesystem checks the locator relies on.
pub trait Probe: Send + Sync {
    /// Resolve `name` on the system search path.
    fn which(&self, name: &str) -> Option<PathBuf>;

    fn exists(&self, path: &Path) -> bool;
}

pub struct SystemProbe;

impl Probe for SystemProbe {
    fn which(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Resolves each [`Tool`] at most once and remembers the answer.
pub struct ToolLocator {
    probe: Arc<dyn Probe>,
    overrides: HashMap<Tool, PathBuf>,
    resolved: HashMap<Tool, OnceLock<Option<PathBuf>>>,
}

impl ToolLocator {
    pub fn new(overrides: HashMap<Tool, PathBuf>) -> Self {
        Self::with_probe(overrides, Arc::new(SystemProbe))
    }

    pub fn with_probe(overrides: HashMap<Tool, PathBuf>, probe: Arc<dyn Probe>) -> Self {
        let resolved = ALL_TOOLS.iter().map(|t| (*t, OnceLock::new())).collect();
        Self {
            probe,
            overrides,
            resolved,
        }
    }

    /// Path of `tool`, or `ToolUnavailable` with an install hint.
    pub fn locate(&self, tool: Tool) -> Result<PathBuf> {
        let cell = &self.resolved[&tool];
        cell.get_or_init(|| self.search(tool))
            .clone()
            .ok_or_else(|| EngineError::unavailable(tool.display_name(), tool.install_hint()))
    }

    pub fn is_available(&self, tool: Tool) -> bool {
        self.locate(tool).is_ok()
    }

    fn search(&self, tool: Tool) -> Option<PathBuf> {
        if let Some(path) = self.overrides.get(&tool) {
            if self.probe.exists(path) {
                info!("{} configured at {}", tool.display_name(), path.display());
                return Some(path.clone());
            }
            debug!(
                "Configured path for {} does not exist: {}",
                tool.display_name(),
                path.display()
            );
        }

        let found = tool
            .known_locations()
            .iter()
            .map(PathBuf::from)
            .find(|p| self.probe.exists(p))
            .or_else(|| tool.path_names().iter().find_map(|n| self.probe.which(n)));

        match &found {
            Some(path) => info!("{} found at {}", tool.display_name(), path.display()),
            None => info!("{} not found", tool.display_name()),
        }
        found
    }
}

impl Default for ToolLocator {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}
