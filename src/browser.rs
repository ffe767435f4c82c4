//! HTML to PDF conversion through a headless browser.
//!
//! [`BrowserPool`] owns at most one browser, launched on first use and
//! relaunched when a health check fails. Concurrent jobs that find no browser
//! wait on the single in-flight launch instead of starting their own.

use std::ffi::OsStr;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{PosError, Result};
use crate::html::HeaderFooter;
use crate::inspect;
use crate::types::{Margins, Size};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const CHROMIUM_ENV: &str = "PALLADIA_CHROMIUM";
const CHROMIUM_CANDIDATES: [&str; 4] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    pub page_size: Size,
    pub margins: Margins,
    pub header_footer: HeaderFooter,
    pub timeout: Duration,
}

impl ConvertOptions {
    pub fn new(page_size: Size, margins: Margins, header_footer: HeaderFooter) -> Self {
        Self {
            page_size,
            margins,
            header_footer,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub trait HtmlConverter: Send + Sync {
    fn convert(&self, html: &str, options: &ConvertOptions) -> Result<Vec<u8>>;
}

pub trait BrowserLauncher: Send + Sync {
    type Browser: Browser;

    fn launch(&self) -> Result<Self::Browser>;
}

pub trait Browser: Send + Sync {
    type Tab: BrowserTab;

    fn version(&self) -> Result<String>;
    fn open_tab(&self) -> Result<Self::Tab>;
}

pub trait BrowserTab {
    fn print_to_pdf(&mut self, html: &str, options: &ConvertOptions) -> Result<Vec<u8>>;
    fn close(&mut self);
}

struct PoolState<B> {
    browser: Option<Arc<B>>,
    launching: bool,
    launches: usize,
}

pub struct BrowserPool<L: BrowserLauncher> {
    launcher: L,
    state: Mutex<PoolState<L::Browser>>,
    launched: Condvar,
}

/// A tab that is closed when the guard goes out of scope.
pub struct TabGuard<B: Browser> {
    tab: B::Tab,
    _browser: Arc<B>,
}

impl<B: Browser> TabGuard<B> {
    pub fn tab(&mut self) -> &mut B::Tab {
        &mut self.tab
    }
}

impl<B: Browser> Drop for TabGuard<B> {
    fn drop(&mut self) {
        self.tab.close();
    }
}

impl<L: BrowserLauncher> BrowserPool<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            state: Mutex::new(PoolState {
                browser: None,
                launching: false,
                launches: 0,
            }),
            launched: Condvar::new(),
        }
    }

    pub fn launches(&self) -> usize {
        self.lock().launches
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<L::Browser>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A healthy browser, launching or relaunching one if needed.
    pub fn browser(&self) -> Result<Arc<L::Browser>> {
        let mut state = self.lock();
        loop {
            let current = state.browser.clone();
            if let Some(browser) = current {
                drop(state);
                match browser.version() {
                    Ok(_) => return Ok(browser),
                    Err(err) => {
                        log::warn!("browser health check failed, relaunching: {}", err);
                        state = self.lock();
                        if state
                            .browser
                            .as_ref()
                            .is_some_and(|current| Arc::ptr_eq(current, &browser))
                        {
                            state.browser = None;
                        }
                        continue;
                    }
                }
            }
            if state.launching {
                state = self
                    .launched
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                continue;
            }

            state.launching = true;
            drop(state);
            let result = self.launcher.launch();
            state = self.lock();
            state.launching = false;
            let outcome = match result {
                Ok(browser) => {
                    let browser = Arc::new(browser);
                    state.browser = Some(Arc::clone(&browser));
                    state.launches += 1;
                    Ok(browser)
                }
                Err(err) => Err(err),
            };
            self.launched.notify_all();
            return outcome;
        }
    }

    pub fn open_tab(&self) -> Result<TabGuard<L::Browser>> {
        let browser = self.browser()?;
        let tab = browser.open_tab()?;
        Ok(TabGuard {
            tab,
            _browser: browser,
        })
    }
}

impl<L: BrowserLauncher> HtmlConverter for BrowserPool<L> {
    fn convert(&self, html: &str, options: &ConvertOptions) -> Result<Vec<u8>> {
        let mut guard = self.open_tab()?;
        let bytes = guard.tab().print_to_pdf(html, options)?;
        validate_pdf(&bytes)?;
        Ok(bytes)
    }
}

/// Rejects converter output that does not parse or has no pages.
pub fn validate_pdf(bytes: &[u8]) -> Result<()> {
    let report = inspect::inspect_pdf_bytes(bytes)
        .map_err(|err| PosError::Render(format!("converter produced an invalid pdf: {}", err)))?;
    inspect::require_printable(&report)
        .map_err(|err| PosError::Render(format!("converter output rejected: {}", err)))?;
    log::debug!(
        "converter produced {} pages ({} bytes)",
        report.page_count,
        report.byte_len
    );
    Ok(())
}

/// Launches headless Chromium from the command line, one process per job.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: PathBuf,
}

impl ChromiumLauncher {
    /// Uses `PALLADIA_CHROMIUM` when set, otherwise the first known browser on `PATH`.
    pub fn locate() -> Result<Self> {
        let override_path = std::env::var_os(CHROMIUM_ENV);
        Self::resolve(override_path.as_deref())
    }

    fn resolve(override_path: Option<&OsStr>) -> Result<Self> {
        if let Some(path) = override_path.filter(|p| !p.is_empty()) {
            let path = PathBuf::from(path);
            if !path.is_file() {
                return Err(PosError::RendererUnavailable(format!(
                    "{} points to {}, which is not a file",
                    CHROMIUM_ENV,
                    path.display()
                )));
            }
            return Ok(Self { executable: path });
        }
        CHROMIUM_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(|executable| Self { executable })
            .ok_or_else(|| {
                PosError::RendererUnavailable(format!(
                    "no Chromium executable found on PATH (tried {}); install Chromium \
                     (e.g. `apt install chromium`) or set {} to the browser binary",
                    CHROMIUM_CANDIDATES.join(", "),
                    CHROMIUM_ENV
                ))
            })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl BrowserLauncher for ChromiumLauncher {
    type Browser = ChromiumBrowser;

    fn launch(&self) -> Result<ChromiumBrowser> {
        let browser = ChromiumBrowser {
            executable: self.executable.clone(),
        };
        let version = browser.version()?;
        log::info!("using {} ({})", version, self.executable.display());
        Ok(browser)
    }
}

#[derive(Debug)]
pub struct ChromiumBrowser {
    executable: PathBuf,
}

impl Browser for ChromiumBrowser {
    type Tab = ChromiumTab;

    fn version(&self) -> Result<String> {
        let output = Command::new(&self.executable)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                PosError::RendererUnavailable(format!(
                    "cannot run {}: {}",
                    self.executable.display(),
                    err
                ))
            })?;
        if !output.status.success() {
            return Err(PosError::RendererUnavailable(format!(
                "{} --version exited with {}",
                self.executable.display(),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn open_tab(&self) -> Result<ChromiumTab> {
        Ok(ChromiumTab {
            executable: self.executable.clone(),
            dir: Some(tempfile::tempdir()?),
        })
    }
}

/// Scratch directory for one conversion: input page, profile and output.
pub struct ChromiumTab {
    executable: PathBuf,
    dir: Option<tempfile::TempDir>,
}

impl ChromiumTab {
    fn args(&self, dir: &Path, input: &Path, output: &Path, options: &ConvertOptions) -> Vec<String> {
        let mut args = vec![
            "--headless=new".to_string(),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--no-first-run".to_string(),
            format!("--user-data-dir={}", dir.join("profile").display()),
            format!("--print-to-pdf={}", output.display()),
        ];
        args.push("--no-pdf-header-footer".to_string());
        args.push(format!("file://{}", input.display()));
        args
    }
}

impl BrowserTab for ChromiumTab {
    fn print_to_pdf(&mut self, html: &str, options: &ConvertOptions) -> Result<Vec<u8>> {
        if matches!(options.header_footer, HeaderFooter::Native { .. }) {
            return Err(PosError::InvalidConfiguration(
                "command-line printing cannot apply header/footer templates".to_string(),
            ));
        }
        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| PosError::Render("tab already closed".to_string()))?
            .path()
            .to_path_buf();
        let input = dir.join("document.html");
        let output = dir.join("document.pdf");
        let log_path = dir.join("chromium.log");
        std::fs::write(&input, html)?;

        let mut child = Command::new(&self.executable)
            .args(self.args(&dir, &input, &output, options))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(File::create(&log_path)?)
            .spawn()
            .map_err(|err| {
                PosError::RendererUnavailable(format!(
                    "cannot start {}: {}",
                    self.executable.display(),
                    err
                ))
            })?;

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if start.elapsed() > options.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PosError::RenderTimeout(options.timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let log = std::fs::read_to_string(&log_path).unwrap_or_default();
            let tail: String = log.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            return Err(PosError::Render(format!(
                "chromium exited with {}: {}",
                status, tail
            )));
        }
        std::fs::read(&output).map_err(|err| {
            PosError::Render(format!("chromium wrote no pdf to {}: {}", output.display(), err))
        })
    }

    fn close(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(err) = dir.close() {
                log::warn!("failed to remove browser scratch directory: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::pdf::{PdfInfo, document_to_pdf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn tiny_pdf() -> Vec<u8> {
        let mut canvas = Canvas::new(Size::a4());
        canvas.draw_string(crate::types::Pt::ZERO, crate::types::Pt::ZERO, "ok");
        document_to_pdf(
            &canvas.finish("test"),
            &crate::assets::ImageStore::new(),
            &PdfInfo::new("test"),
        )
        .expect("pdf")
        .bytes
    }

    #[derive(Default)]
    struct Counters {
        launches: AtomicUsize,
        tabs_opened: AtomicUsize,
        tabs_closed: AtomicUsize,
        fail_launch: AtomicBool,
        emit_garbage: AtomicBool,
    }

    struct FakeLauncher {
        counters: Arc<Counters>,
        health: Mutex<Option<Arc<AtomicBool>>>,
        launch_delay: Duration,
    }

    impl FakeLauncher {
        fn new(counters: Arc<Counters>) -> Self {
            Self {
                counters,
                health: Mutex::new(None),
                launch_delay: Duration::ZERO,
            }
        }

        fn break_current_browser(&self) {
            if let Some(flag) = self.health.lock().expect("lock").as_ref() {
                flag.store(false, Ordering::SeqCst);
            }
        }
    }

    struct FakeBrowser {
        counters: Arc<Counters>,
        healthy: Arc<AtomicBool>,
    }

    struct FakeTab {
        counters: Arc<Counters>,
    }

    impl BrowserLauncher for FakeLauncher {
        type Browser = FakeBrowser;

        fn launch(&self) -> Result<FakeBrowser> {
            std::thread::sleep(self.launch_delay);
            if self.counters.fail_launch.load(Ordering::SeqCst) {
                return Err(PosError::RendererUnavailable("launch refused".to_string()));
            }
            self.counters.launches.fetch_add(1, Ordering::SeqCst);
            let healthy = Arc::new(AtomicBool::new(true));
            *self.health.lock().expect("lock") = Some(Arc::clone(&healthy));
            Ok(FakeBrowser {
                counters: Arc::clone(&self.counters),
                healthy,
            })
        }
    }

    impl Browser for FakeBrowser {
        type Tab = FakeTab;

        fn version(&self) -> Result<String> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok("FakeChromium/1.0".to_string())
            } else {
                Err(PosError::RendererUnavailable("crashed".to_string()))
            }
        }

        fn open_tab(&self) -> Result<FakeTab> {
            self.counters.tabs_opened.fetch_add(1, Ordering::SeqCst);
            Ok(FakeTab {
                counters: Arc::clone(&self.counters),
            })
        }
    }

    impl BrowserTab for FakeTab {
        fn print_to_pdf(&mut self, _html: &str, _options: &ConvertOptions) -> Result<Vec<u8>> {
            if self.counters.emit_garbage.load(Ordering::SeqCst) {
                return Ok(b"not a pdf".to_vec());
            }
            Ok(tiny_pdf())
        }

        fn close(&mut self) {
            self.counters.tabs_closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn options() -> ConvertOptions {
        ConvertOptions::new(Size::a4(), Margins::pos_default(), HeaderFooter::InlineFixed)
    }

    #[test]
    fn browser_is_launched_once_and_tabs_are_closed() {
        let counters = Arc::new(Counters::default());
        let pool = BrowserPool::new(FakeLauncher::new(Arc::clone(&counters)));
        assert_eq!(pool.launches(), 0);
        for _ in 0..3 {
            let pdf = pool.convert("<p>ok</p>", &options()).expect("convert");
            assert!(pdf.starts_with(b"%PDF"));
        }
        assert_eq!(pool.launches(), 1);
        assert_eq!(counters.tabs_opened.load(Ordering::SeqCst), 3);
        assert_eq!(counters.tabs_closed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_health_check_relaunches() {
        let counters = Arc::new(Counters::default());
        let pool = BrowserPool::new(FakeLauncher::new(Arc::clone(&counters)));
        pool.convert("<p>1</p>", &options()).expect("first");
        pool.launcher.break_current_browser();
        pool.convert("<p>2</p>", &options()).expect("second");
        assert_eq!(pool.launches(), 2);
    }

    #[test]
    fn concurrent_jobs_share_one_launch() {
        let counters = Arc::new(Counters::default());
        let mut launcher = FakeLauncher::new(Arc::clone(&counters));
        launcher.launch_delay = Duration::from_millis(50);
        let pool = BrowserPool::new(launcher);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| pool.convert("<p>job</p>", &options()).expect("convert"));
            }
        });
        assert_eq!(counters.launches.load(Ordering::SeqCst), 1);
        assert_eq!(counters.tabs_closed.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn invalid_output_is_rejected_and_the_tab_still_closes() {
        let counters = Arc::new(Counters::default());
        counters.emit_garbage.store(true, Ordering::SeqCst);
        let pool = BrowserPool::new(FakeLauncher::new(Arc::clone(&counters)));
        let err = pool.convert("<p>x</p>", &options()).expect_err("garbage");
        assert!(matches!(err, PosError::Render(_)));
        assert_eq!(counters.tabs_closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn launch_failure_propagates_and_is_retried_later() {
        let counters = Arc::new(Counters::default());
        counters.fail_launch.store(true, Ordering::SeqCst);
        let pool = BrowserPool::new(FakeLauncher::new(Arc::clone(&counters)));
        let err = pool.convert("<p>x</p>", &options()).expect_err("refused");
        assert!(matches!(err, PosError::RendererUnavailable(_)));
        counters.fail_launch.store(false, Ordering::SeqCst);
        pool.convert("<p>x</p>", &options()).expect("retry");
        assert_eq!(pool.launches(), 1);
    }

    #[test]
    fn override_must_point_to_a_file() {
        let err = ChromiumLauncher::resolve(Some(OsStr::new("/nonexistent/chromium")))
            .expect_err("missing");
        assert!(matches!(err, PosError::RendererUnavailable(_)));
        assert!(err.to_string().contains(CHROMIUM_ENV));

        let file = tempfile::NamedTempFile::new().expect("temp file");
        let launcher = ChromiumLauncher::resolve(Some(file.path().as_os_str())).expect("override");
        assert_eq!(launcher.executable(), file.path());
    }

    #[test]
    fn inline_mode_disables_browser_header_and_footer() {
        let tab = ChromiumTab {
            executable: PathBuf::from("chromium"),
            dir: None,
        };
        let dir = Path::new("/tmp/job");
        let args = tab.args(dir, &dir.join("in.html"), &dir.join("out.pdf"), &options());
        assert!(args.contains(&"--no-pdf-header-footer".to_string()));
        assert!(args.contains(&"--print-to-pdf=/tmp/job/out.pdf".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("file:///tmp/job/in.html"));
    }

    #[test]
    fn native_templates_are_refused_by_command_line_printing() {
        let mut tab = ChromiumTab {
            executable: PathBuf::from("/nonexistent/chromium"),
            dir: Some(tempfile::tempdir().expect("tab dir")),
        };
        let native = ConvertOptions::new(
            Size::a4(),
            Margins::pos_default(),
            HeaderFooter::Native {
                header_template: String::new(),
                footer_template: "<span class=\"pageNumber\"></span>".to_string(),
            },
        );
        let err = tab.print_to_pdf("<p>x</p>", &native).expect_err("native");
        assert!(matches!(err, PosError::InvalidConfiguration(_)));
    }

    #[cfg(unix)]
    #[test]
    fn slow_browser_is_killed_after_the_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("slow-chromium");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");
        let mut tab = ChromiumTab {
            executable: script,
            dir: Some(tempfile::tempdir().expect("tab dir")),
        };
        let started = Instant::now();
        let err = tab
            .print_to_pdf(
                "<p>slow</p>",
                &options().with_timeout(Duration::from_millis(100)),
            )
            .expect_err("timeout");
        assert!(matches!(err, PosError::RenderTimeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
        tab.close();
    }
}
