//! Folder watching: files dropped into a watched directory are converted
//! according to the matching rules.

use crate::converter::Converter;
use crate::engines::ConvertOptions;
use crate::error::ConversionFailed;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "auto_convert_config.json";

/// Wait before handling a modify event so the writer can finish flushing.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRule {
    pub watch_dir: PathBuf,
    /// Lowercase, dot-prefixed (`.pdf`)
    pub extensions: Vec<String>,
    pub target_format: String,
    pub output_dir: PathBuf,
}

impl WatchRule {
    fn normalized(mut self) -> Self {
        self.extensions = self
            .extensions
            .iter()
            .map(|ext| {
                let ext = ext.trim().to_lowercase();
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{}", ext)
                }
            })
            .collect();
        self.target_format = self.target_format.trim().to_lowercase();
        self
    }

    pub fn matches(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = format!(".{}", ext.to_lowercase());
        self.extensions.iter().any(|e| *e == ext)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub rules: Vec<WatchRule>,
}

impl WatchConfig {
    /// One rule: PDF and DOCX from `~/Documents/AutoConvert` to HTML in
    /// `~/Documents/Converted`.
    pub fn default_rules() -> Self {
        let documents = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Documents");
        Self {
            rules: vec![WatchRule {
                watch_dir: documents.join("AutoConvert"),
                extensions: vec![".pdf".to_string(), ".docx".to_string()],
                target_format: "html".to_string(),
                output_dir: documents.join("Converted"),
            }],
        }
    }

    pub fn parse(json: &str) -> Result<Self> {
        let config: WatchConfig = serde_json::from_str(json).context("invalid watch configuration")?;
        Ok(Self {
            rules: config.rules.into_iter().map(WatchRule::normalized).collect(),
        })
    }

    /// Read `path`, writing the default configuration there first if it
    /// does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default_rules();
            config.save(path)?;
            info!("Created default watch configuration at {}", path.display());
            return Ok(config);
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        Self::parse(&json).with_context(|| format!("in {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("could not write {}", path.display()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Modified,
}

/// Removes its path from the in-flight set when dropped.
struct InFlight {
    set: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.path);
        }
    }
}

/// Runs watch rules against filesystem events.
#[derive(Clone)]
pub struct AutoConverter {
    converter: Converter,
    rules: Arc<Vec<WatchRule>>,
    options: ConvertOptions,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
    settle: Duration,
}

impl AutoConverter {
    pub fn new(converter: Converter, config: WatchConfig) -> Self {
        Self {
            converter,
            rules: Arc::new(config.rules),
            options: ConvertOptions::default(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            settle: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    pub fn rules(&self) -> &[WatchRule] {
        &self.rules
    }

    fn begin(&self, path: &Path) -> Option<InFlight> {
        let mut set = self.in_flight.lock().ok()?;
        if !set.insert(path.to_path_buf()) {
            return None;
        }
        Some(InFlight {
            set: self.in_flight.clone(),
            path: path.to_path_buf(),
        })
    }

    fn is_in_flight(&self, path: &Path) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(path))
            .unwrap_or(false)
    }

    /// Apply every matching rule to `path`. Events for a file that is
    /// already being converted are dropped.
    pub async fn handle(&self, path: &Path, change: Change) -> Vec<Result<PathBuf, ConversionFailed>> {
        if change == Change::Modified {
            if self.is_in_flight(path) {
                return Vec::new();
            }
            tokio::time::sleep(self.settle).await;
        }

        let mut results = Vec::new();
        for rule in self.rules.iter().filter(|r| r.matches(path)) {
            let Some(_guard) = self.begin(path) else {
                return results;
            };
            info!(
                "Auto-converting {} to {}",
                path.display(),
                rule.target_format.to_uppercase()
            );
            let result = self
                .converter
                .convert(path, &rule.target_format, &rule.output_dir, &self.options)
                .await;
            match &result {
                Ok(out) => info!("Done: {}", out.display()),
                Err(err) => error!("{}", err),
            }
            results.push(result);
        }
        results
    }

    /// Watch every rule's directory until `shutdown` completes. Missing
    /// directories are created first.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if self.rules.is_empty() {
            warn!("No watch rules defined");
            return Ok(());
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;

        for rule in self.rules.iter() {
            if !rule.watch_dir.exists() {
                std::fs::create_dir_all(&rule.watch_dir)
                    .with_context(|| format!("could not create {}", rule.watch_dir.display()))?;
                info!("Created watch folder {}", rule.watch_dir.display());
            }
            watcher.watch(&rule.watch_dir, RecursiveMode::NonRecursive)?;
            info!(
                "Watching {} ({}) → {}",
                rule.watch_dir.display(),
                rule.extensions.join(", "),
                rule.target_format.to_uppercase()
            );
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        Ok(event) => self.dispatch_event(event),
                        Err(err) => warn!("Watch error: {}", err),
                    }
                }
            }
        }
        info!("Auto-converter stopped");
        Ok(())
    }

    fn dispatch_event(&self, event: Event) {
        let change = match event.kind {
            EventKind::Create(_) => Change::Created,
            EventKind::Modify(_) => Change::Modified,
            _ => return,
        };
        for path in event.paths {
            if !path.is_file() {
                continue;
            }
            let this = self.clone();
            tokio::spawn(async move {
                this.handle(&path, change).await;
            });
        }
    }
}
