use crate::locator::{Tool, ALL_TOOLS};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Per-backend bounds on external tool runs.
#[derive(Debug, Clone)]
pub struct ToolTimeouts {
    pub office: Duration,
    pub office_high: Duration,
    pub markup: Duration,
    pub markup_high: Duration,
    /// Document parser; it has no tiered bound of its own.
    pub parser: Duration,
    /// heif-convert / heif-enc.
    pub image_codec: Duration,
    /// Headless browser page print.
    pub page_render: Duration,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            office: Duration::from_secs(60),
            office_high: Duration::from_secs(120),
            markup: Duration::from_secs(45),
            markup_high: Duration::from_secs(90),
            parser: Duration::from_secs(600),
            image_codec: Duration::from_secs(60),
            page_render: Duration::from_secs(90),
        }
    }
}

/// Settings for one [`crate::Converter`].
#[derive(Debug, Clone, Default)]
pub struct ConverterConfig {
    /// Explicit tool locations; these take precedence over any search.
    pub tool_paths: HashMap<Tool, PathBuf>,
    pub timeouts: ToolTimeouts,
}

impl ConverterConfig {
    /// Build a config from the tool path environment variables
    /// (`SOFFICE_PATH`, `PANDOC_PATH`, ...).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        for tool in ALL_TOOLS {
            if let Ok(path) = std::env::var(tool.env_var()) {
                if !path.is_empty() {
                    config.tool_paths.insert(*tool, PathBuf::from(path));
                }
            }
        }
        config
    }

    pub fn with_tool_path(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        self.tool_paths.insert(tool, path.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: ToolTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let t = ToolTimeouts::default();
        assert_eq!(t.office.as_secs(), 60);
        assert_eq!(t.office_high.as_secs(), 120);
        assert_eq!(t.markup.as_secs(), 45);
        assert_eq!(t.markup_high.as_secs(), 90);
    }

    #[test]
    fn test_builder() {
        let config = ConverterConfig::default().with_tool_path(Tool::Pandoc, "/opt/pandoc");
        assert_eq!(
            config.tool_paths.get(&Tool::Pandoc),
            Some(&PathBuf::from("/opt/pandoc"))
        );
    }
}
