//! Fake tools and helpers shared by the unit tests.

use crate::engines::{ConvertEngine, EngineType, Job, Quality};
use crate::error::{EngineError, Result};
use crate::format::Format;
use crate::locator::{Probe, Tool, ToolLocator};
use crate::router::Engines;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Probe that only sees files under `root`, so tools installed on the test
/// machine never leak into a test.
pub struct IsolatedProbe {
    root: PathBuf,
    calls: AtomicUsize,
}

impl IsolatedProbe {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Probe for IsolatedProbe {
    fn which(&self, _name: &str) -> Option<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        None
    }

    fn exists(&self, path: &Path) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        path.starts_with(&self.root) && path.is_file()
    }
}

pub fn locator(root: &Path, tools: &[(Tool, &Path)]) -> Arc<ToolLocator> {
    let overrides: HashMap<Tool, PathBuf> = tools
        .iter()
        .map(|(tool, path)| (*tool, path.to_path_buf()))
        .collect();
    Arc::new(ToolLocator::with_probe(
        overrides,
        Arc::new(IsolatedProbe::new(root)),
    ))
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Paths a fake tool was invoked with, one per call.
pub fn invocations(script: &Path) -> Vec<String> {
    std::fs::read_to_string(log_path(script))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

fn log_path(script: &Path) -> PathBuf {
    let mut name = script.as_os_str().to_os_string();
    name.push(".log");
    PathBuf::from(name)
}

#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// soffice stand-in: writes `<outdir>/<stem>.<fmt>` and logs the input.
#[cfg(unix)]
pub fn fake_soffice(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "soffice",
        r#"prev=""; outdir=""; fmt=""; last=""
for a in "$@"; do
  case "$prev" in
    --outdir) outdir="$a" ;;
    --convert-to) fmt="$a" ;;
  esac
  prev="$a"; last="$a"
done
echo "$last" >> "$0.log"
name=$(basename "$last")
stem="${name%.*}"
printf 'office:%s' "$name" > "$outdir/$stem.$fmt"
"#,
    )
}

#[cfg(unix)]
pub fn slow_soffice(dir: &Path, secs: u32) -> PathBuf {
    write_script(dir, "soffice", &format!("exec sleep {}\n", secs))
}

/// pandoc stand-in: copies the input to the `-o` path and logs the input.
#[cfg(unix)]
pub fn fake_pandoc(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "pandoc",
        r#"prev=""; out=""; input=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then
    out="$a"
  elif [ -z "$input" ] && [ "${a#-}" = "$a" ]; then
    input="$a"
  fi
  prev="$a"
done
echo "$input" >> "$0.log"
cat "$input" > "$out"
"#,
    )
}

/// docling stand-in: writes `<output>/<stem>.<md|html>`.
#[cfg(unix)]
pub fn fake_docling(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "docling",
        r#"if [ "$1" = "--version" ]; then
  echo "$*" >> "$0.log"
  echo "Docling version: 2.0.0"
  exit 0
fi
prev=""; out=""; to=""; input=""
for a in "$@"; do
  case "$prev" in
    --output) out="$a" ;;
    --to) to="$a" ;;
    *) if [ -z "$input" ] && [ "${a#-}" = "$a" ]; then input="$a"; fi ;;
  esac
  prev="$a"
done
echo "$*" >> "$0.log"
name=$(basename "$input")
stem="${name%.*}"
printf '# Parsed %s\n' "$name" > "$out/$stem.$to"
"#,
    )
}

/// Tiny single-page PDF, enough for pass-through fakes.
pub const MINIMAL_PDF: &str = "%PDF-1.4\n1 0 obj<</Type/Catalog/Pages 2 0 R>>endobj\n2 0 obj<</Type/Pages/Kids[3 0 R]/Count 1>>endobj\n3 0 obj<</Type/Page/Parent 2 0 R/MediaBox[0 0 200 200]>>endobj\ntrailer<</Root 1 0 R>>\n%%EOF\n";

/// One engine invocation seen by a [`RecordingEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub engine: EngineType,
    pub input: PathBuf,
    pub target: Format,
    pub quality: Quality,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// How a [`RecordingEngine`] fails, if it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Missing,
    Crash,
}

/// Engine stand-in that logs each call and writes `<engine type>` as output.
pub struct RecordingEngine {
    kind: EngineType,
    log: CallLog,
    failure: Option<Failure>,
}

impl RecordingEngine {
    pub fn new(kind: EngineType, log: CallLog, failure: Option<Failure>) -> Self {
        Self { kind, log, failure }
    }
}

#[async_trait]
impl ConvertEngine for RecordingEngine {
    fn engine_type(&self) -> EngineType {
        self.kind
    }

    async fn is_available(&self) -> bool {
        self.failure != Some(Failure::Missing)
    }

    async fn convert(&self, job: &Job<'_>) -> Result<PathBuf> {
        self.log.lock().unwrap().push(Call {
            engine: self.kind,
            input: job.input.to_path_buf(),
            target: job.target,
            quality: job.options.quality,
        });
        match self.failure {
            Some(Failure::Missing) => Err(EngineError::unavailable(format!("{:?}", self.kind), "fake")),
            Some(Failure::Crash) => Err(EngineError::backend(format!("{:?}", self.kind), "fake crash")),
            None => {
                let out = job.output_path();
                tokio::fs::write(&out, format!("{:?}", self.kind)).await?;
                Ok(out)
            }
        }
    }
}

/// Engine set where every backend records into `log`; engines listed in
/// `failing` fail the given way.
pub fn recording_engines(log: &CallLog, failing: &[(EngineType, Failure)]) -> Engines {
    let mut engines = Engines::from_fn(|kind| {
        Arc::new(RecordingEngine::new(kind, log.clone(), None)) as Arc<dyn ConvertEngine>
    });
    for (kind, failure) in failing {
        engines = engines.with_engine(Arc::new(RecordingEngine::new(*kind, log.clone(), Some(*failure))));
    }
    engines
}

pub fn engines_called(log: &CallLog) -> Vec<EngineType> {
    log.lock().unwrap().iter().map(|c| c.engine).collect()
}

/// Files left in `dir` whose names mark them as intermediates.
pub fn leftover_intermediates(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name.contains("_temp") || name.contains("_clean") || name.starts_with(".docmill"))
                .collect()
        })
        .unwrap_or_default()
}
