mod strategy;

pub use strategy::{candidates, select, Plan, Strategy};

use crate::config::ToolTimeouts;
use crate::engines::{
    decode_markup, ChromiumEngine, ConvertEngine, ConvertOptions, DoclingEngine, EngineType, EpubEngine,
    ImageEngine, ImagePdfEngine, Job, LibreOfficeEngine, PandocEngine, RasterEngine, SvgEngine,
};
use crate::error::{EngineError, Result};
use crate::format::Format;
use crate::locator::ToolLocator;
use futures::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{debug, info, warn};

pub const ALL_ENGINE_TYPES: &[EngineType] = &[
    EngineType::Office,
    EngineType::Markup,
    EngineType::DocumentParser,
    EngineType::Image,
    EngineType::ImagePage,
    EngineType::Vector,
    EngineType::Ebook,
    EngineType::Rasterizer,
    EngineType::PageRenderer,
];

/// One backend per engine type. Any slot can be swapped for another
/// implementation with [`Engines::with_engine`].
#[derive(Clone)]
pub struct Engines {
    office: Arc<dyn ConvertEngine>,
    markup: Arc<dyn ConvertEngine>,
    parser: Arc<dyn ConvertEngine>,
    image: Arc<dyn ConvertEngine>,
    image_page: Arc<dyn ConvertEngine>,
    vector: Arc<dyn ConvertEngine>,
    ebook: Arc<dyn ConvertEngine>,
    rasterizer: Arc<dyn ConvertEngine>,
    page_renderer: Arc<dyn ConvertEngine>,
}

impl Engines {
    /// The production backends, sharing one tool locator.
    pub fn new(locator: Arc<ToolLocator>, timeouts: &ToolTimeouts) -> Self {
        Self {
            office: Arc::new(LibreOfficeEngine::new(locator.clone(), timeouts.clone())),
            markup: Arc::new(PandocEngine::new(locator.clone(), timeouts.clone())),
            parser: Arc::new(DoclingEngine::new(locator.clone(), timeouts.parser)),
            image: Arc::new(ImageEngine::new(locator.clone(), timeouts.image_codec)),
            image_page: Arc::new(ImagePdfEngine::new(locator.clone(), timeouts.image_codec)),
            vector: Arc::new(SvgEngine::new()),
            ebook: Arc::new(EpubEngine::new()),
            rasterizer: Arc::new(RasterEngine::new(locator.clone())),
            page_renderer: Arc::new(ChromiumEngine::new(locator, timeouts.page_render)),
        }
    }

    /// Build every slot from `make`.
    pub fn from_fn(mut make: impl FnMut(EngineType) -> Arc<dyn ConvertEngine>) -> Self {
        Self {
            office: make(EngineType::Office),
            markup: make(EngineType::Markup),
            parser: make(EngineType::DocumentParser),
            image: make(EngineType::Image),
            image_page: make(EngineType::ImagePage),
            vector: make(EngineType::Vector),
            ebook: make(EngineType::Ebook),
            rasterizer: make(EngineType::Rasterizer),
            page_renderer: make(EngineType::PageRenderer),
        }
    }

    /// Replace the slot matching `engine.engine_type()`.
    pub fn with_engine(mut self, engine: Arc<dyn ConvertEngine>) -> Self {
        let kind = engine.engine_type();
        *self.slot_mut(kind) = engine;
        self
    }

    fn slot_mut(&mut self, kind: EngineType) -> &mut Arc<dyn ConvertEngine> {
        match kind {
            EngineType::Office => &mut self.office,
            EngineType::Markup => &mut self.markup,
            EngineType::DocumentParser => &mut self.parser,
            EngineType::Image => &mut self.image,
            EngineType::ImagePage => &mut self.image_page,
            EngineType::Vector => &mut self.vector,
            EngineType::Ebook => &mut self.ebook,
            EngineType::Rasterizer => &mut self.rasterizer,
            EngineType::PageRenderer => &mut self.page_renderer,
        }
    }

    pub fn get(&self, kind: EngineType) -> &Arc<dyn ConvertEngine> {
        match kind {
            EngineType::Office => &self.office,
            EngineType::Markup => &self.markup,
            EngineType::DocumentParser => &self.parser,
            EngineType::Image => &self.image,
            EngineType::ImagePage => &self.image_page,
            EngineType::Vector => &self.vector,
            EngineType::Ebook => &self.ebook,
            EngineType::Rasterizer => &self.rasterizer,
            EngineType::PageRenderer => &self.page_renderer,
        }
    }

    /// Availability of every backend, in [`ALL_ENGINE_TYPES`] order.
    pub async fn availability(&self) -> Vec<(EngineType, bool)> {
        let mut report = Vec::with_capacity(ALL_ENGINE_TYPES.len());
        for kind in ALL_ENGINE_TYPES {
            report.push((*kind, self.get(*kind).is_available().await));
        }
        report
    }
}

/// Temporary file next to `output`, named `<stem>_<tag>*.<ext>`, removed on drop.
fn intermediate_for(output: &Path, tag: &str, format: Format) -> Result<TempPath> {
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let path = tempfile::Builder::new()
        .prefix(&format!("{}_{}", stem, tag))
        .suffix(&format!(".{}", format.extension()))
        .tempfile_in(dir)?
        .into_temp_path();
    Ok(path)
}

/// Executes the plans a [`Strategy`] expands into, in order.
pub struct Dispatcher {
    engines: Engines,
}

impl Dispatcher {
    pub fn new(engines: Engines) -> Self {
        Self { engines }
    }

    pub fn engines(&self) -> &Engines {
        &self.engines
    }

    /// Convert `input` to `target`, writing `output` (or the same path with
    /// the suffix the backend actually produced).
    pub fn dispatch<'a>(
        &'a self,
        input: &'a Path,
        target: Format,
        output: &'a Path,
        options: &'a ConvertOptions,
    ) -> BoxFuture<'a, Result<PathBuf>> {
        async move {
            let source = Format::from_path(input)?;
            let strategy = select(source, target);
            info!("Routing {} → {} via {:?}", source, target, strategy);

            let mut last_err = None;
            for plan in candidates(strategy, source, target) {
                match self.run(plan, input, target, output, options).await {
                    Ok(path) => return Ok(path),
                    Err(err) if strategy.falls_back(&err) => {
                        warn!("{:?} failed ({}), trying the next option", plan, err);
                        last_err = Some(err);
                    }
                    Err(err) => return Err(err),
                }
            }
            Err(last_err.unwrap_or_else(|| EngineError::unsupported(source, target)))
        }
        .boxed()
    }

    async fn run(
        &self,
        plan: Plan,
        input: &Path,
        target: Format,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<PathBuf> {
        match plan {
            Plan::Direct(kind) => self.hop(kind, input, target, output, options).await,
            Plan::Chain { first, via, then } => {
                let intermediate = intermediate_for(output, "temp", via)?;
                let mid = self.hop(first, input, via, &intermediate, options).await?;
                self.hop(then, &mid, target, output, options).await
            }
            Plan::PageThenRaster => {
                let intermediate = intermediate_for(output, "temp", Format::Pdf)?;
                let page = self.dispatch(input, Format::Pdf, &intermediate, options).await?;
                self.hop(EngineType::Rasterizer, &page, target, output, options)
                    .await
            }
            Plan::CleanedMarkupOffice => {
                let raw = tokio::fs::read(input).await?;
                let cleaned = intermediate_for(output, "clean", Format::Markdown)?;
                tokio::fs::write(&cleaned, decode_markup(&raw)?).await?;
                self.hop(EngineType::Office, &cleaned, target, output, options)
                    .await
            }
        }
    }

    async fn hop(
        &self,
        kind: EngineType,
        input: &Path,
        target: Format,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<PathBuf> {
        debug!("{:?}: {} → {}", kind, input.display(), target);
        self.engines
            .get(kind)
            .convert(&Job::new(input, output, target, options))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::Quality;
    use crate::format::{matrix, ALL_FORMATS};
    use crate::testutil::{self, engines_called, leftover_intermediates, CallLog, Failure};
    use EngineType::*;

    struct Fixture {
        dir: tempfile::TempDir,
        log: CallLog,
        dispatcher: Dispatcher,
    }

    impl Fixture {
        fn new(failing: &[(EngineType, Failure)]) -> Self {
            let log = CallLog::default();
            let dispatcher = Dispatcher::new(testutil::recording_engines(&log, failing));
            Self {
                dir: tempfile::tempdir().unwrap(),
                log,
                dispatcher,
            }
        }

        async fn convert(&self, name: &str, target: Format) -> Result<PathBuf> {
            self.convert_with(name, target, &ConvertOptions::default()).await
        }

        async fn convert_with(&self, name: &str, target: Format, options: &ConvertOptions) -> Result<PathBuf> {
            let input = testutil::write_file(self.dir.path(), name, "# input\n");
            let stem = Path::new(name).file_stem().unwrap().to_str().unwrap();
            let output = self
                .dir
                .path()
                .join("out")
                .join(format!("{}.{}", stem, target.extension()));
            std::fs::create_dir_all(output.parent().unwrap()).unwrap();
            self.dispatcher.dispatch(&input, target, &output, options).await
        }

        fn out_dir(&self) -> PathBuf {
            self.dir.path().join("out")
        }

        fn calls(&self) -> Vec<EngineType> {
            engines_called(&self.log)
        }
    }

    fn first_engine(input: Format, output: Format) -> EngineType {
        match select(input, output) {
            Strategy::ImageToImage => Image,
            Strategy::ImageToPage => ImagePage,
            Strategy::Vector => Vector,
            Strategy::Ebook => Ebook,
            Strategy::DocumentParse => DocumentParser,
            Strategy::TwoHopRaster if input == Format::Pdf => Rasterizer,
            Strategy::TwoHopRaster if input == Format::Markdown => Markup,
            Strategy::TwoHopRaster => Office,
            Strategy::Markup => Markup,
            Strategy::Office => Office,
        }
    }

    #[tokio::test]
    async fn test_every_matrix_pair_fires_its_branch() {
        for input in ALL_FORMATS {
            for output in matrix::targets(*input) {
                let fixture = Fixture::new(&[]);
                let name = format!("sample.{}", input.extension());
                let written = fixture.convert(&name, *output).await.unwrap();

                let calls = fixture.calls();
                assert_eq!(calls[0], first_engine(*input, *output), "{} -> {}", input, output);
                assert_eq!(written.extension().unwrap(), output.extension());
                assert!(written.exists());
                assert!(leftover_intermediates(&fixture.out_dir()).is_empty());
            }
        }
    }

    #[tokio::test]
    async fn test_pdf_to_docx_parses_then_writes_through_markup() {
        let fixture = Fixture::new(&[]);
        let written = fixture.convert("report.pdf", Format::Docx).await.unwrap();

        assert_eq!(written, fixture.out_dir().join("report.docx"));
        assert_eq!(fixture.calls(), vec![DocumentParser, Markup]);
        let log = fixture.log.lock().unwrap();
        assert_eq!(log[0].target, Format::Markdown);
        assert!(log[1].input.to_string_lossy().contains("report_temp"));
        drop(log);
        assert!(leftover_intermediates(&fixture.out_dir()).is_empty());
    }

    #[tokio::test]
    async fn test_heic_to_jpg_keeps_quality_tier() {
        let fixture = Fixture::new(&[]);
        let low = ConvertOptions::default().with_quality(Quality::Low);
        let written = fixture.convert_with("photo.heic", Format::Jpg, &low).await.unwrap();

        assert_eq!(written.extension().unwrap(), "jpg");
        let log = fixture.log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].engine, Image);
        assert_eq!(log[0].quality.encoder_quality(), 60);
    }

    #[tokio::test]
    async fn test_markup_to_page_falls_back_to_native_renderer() {
        let fixture = Fixture::new(&[(Markup, Failure::Missing)]);
        let written = fixture.convert("notes.md", Format::Pdf).await.unwrap();

        assert_eq!(written.extension().unwrap(), "pdf");
        assert_eq!(fixture.calls(), vec![Markup, PageRenderer]);
        assert!(leftover_intermediates(&fixture.out_dir()).is_empty());
    }

    #[tokio::test]
    async fn test_markup_to_page_last_resort_uses_cleaned_copy() {
        let fixture = Fixture::new(&[(Markup, Failure::Missing), (PageRenderer, Failure::Missing)]);
        let written = fixture.convert("notes.md", Format::Pdf).await.unwrap();

        assert_eq!(written, fixture.out_dir().join("notes.pdf"));
        assert_eq!(fixture.calls(), vec![Markup, PageRenderer, Office]);
        let log = fixture.log.lock().unwrap();
        let office_input = log[2].input.file_name().unwrap().to_string_lossy().into_owned();
        assert!(office_input.starts_with("notes_clean"), "{}", office_input);
        assert_ne!(log[2].input, fixture.dir.path().join("notes.md"));
        drop(log);
        assert!(leftover_intermediates(&fixture.out_dir()).is_empty());
    }

    #[tokio::test]
    async fn test_markup_failure_is_not_a_fallback() {
        let fixture = Fixture::new(&[(Markup, Failure::Crash)]);
        let err = fixture.convert("notes.md", Format::Pdf).await.unwrap_err();

        assert!(matches!(err, EngineError::BackendFailure { .. }));
        assert_eq!(fixture.calls(), vec![Markup]);
        assert!(leftover_intermediates(&fixture.out_dir()).is_empty());
    }

    #[tokio::test]
    async fn test_vector_runtime_failure_chains_office_and_rasterizer() {
        let fixture = Fixture::new(&[(Vector, Failure::Crash)]);
        let written = fixture.convert("slide.svg", Format::Png).await.unwrap();

        assert_eq!(written, fixture.out_dir().join("slide.png"));
        assert_eq!(fixture.calls(), vec![Vector, Office, Rasterizer]);
        let log = fixture.log.lock().unwrap();
        assert_eq!(log[1].target, Format::Pdf);
        drop(log);
        assert!(leftover_intermediates(&fixture.out_dir()).is_empty());
    }

    #[tokio::test]
    async fn test_vector_to_pdf_falls_back_to_office() {
        let fixture = Fixture::new(&[(Vector, Failure::Missing)]);
        fixture.convert("slide.svg", Format::Pdf).await.unwrap();
        assert_eq!(fixture.calls(), vec![Vector, Office]);
    }

    #[tokio::test]
    async fn test_two_hop_removes_page_when_rasterizer_fails() {
        let fixture = Fixture::new(&[(Rasterizer, Failure::Crash)]);
        let err = fixture.convert("deck.pptx", Format::Png).await.unwrap_err();

        assert!(matches!(err, EngineError::BackendFailure { .. }));
        assert_eq!(fixture.calls(), vec![Office, Rasterizer]);
        assert!(leftover_intermediates(&fixture.out_dir()).is_empty());
        assert!(!fixture.out_dir().join("deck.png").exists());
    }

    #[tokio::test]
    async fn test_two_hop_from_markdown_recurses_through_markup_chain() {
        let fixture = Fixture::new(&[]);
        fixture.convert("notes.md", Format::Jpg).await.unwrap();

        assert_eq!(fixture.calls(), vec![Markup, Office, Rasterizer]);
        assert!(leftover_intermediates(&fixture.out_dir()).is_empty());
    }

    #[tokio::test]
    async fn test_ebook_to_page_goes_through_html() {
        let fixture = Fixture::new(&[]);
        fixture.convert("book.epub", Format::Pdf).await.unwrap();

        assert_eq!(fixture.calls(), vec![Ebook, Office]);
        let log = fixture.log.lock().unwrap();
        assert_eq!(log[0].target, Format::Html);
        assert_eq!(log[1].input.extension().unwrap(), "html");
    }

    #[tokio::test]
    async fn test_unknown_input_extension() {
        let fixture = Fixture::new(&[]);
        let err = fixture.convert("data.xyz", Format::Pdf).await.unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFormat(_)));
        assert!(fixture.calls().is_empty());
    }

    #[tokio::test]
    async fn test_engines_slot_replacement() {
        let log = CallLog::default();
        let engines = testutil::recording_engines(&log, &[(Ebook, Failure::Missing)]);
        let report = engines.availability().await;

        assert_eq!(report.len(), ALL_ENGINE_TYPES.len());
        assert!(report.iter().all(|(kind, up)| *up == (*kind != Ebook)));

        // A later replacement wins; only the matching slot changes.
        let engines = engines.with_engine(Arc::new(testutil::RecordingEngine::new(Ebook, log.clone(), None)));
        assert!(engines.get(Ebook).is_available().await);
        for kind in ALL_ENGINE_TYPES {
            assert_eq!(engines.get(*kind).engine_type(), *kind);
        }
    }
}
