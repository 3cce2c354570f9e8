use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Turns one rendered PDF page into text. Best effort: an empty string is a valid answer.
pub trait Ocr {
    fn recognize(&self, pdf: &Path, page_index: usize) -> Result<String>;
}

impl<T: Ocr + ?Sized> Ocr for Box<T> {
    fn recognize(&self, pdf: &Path, page_index: usize) -> Result<String> {
        (**self).recognize(pdf, page_index)
    }
}

/// Renders the page with `pdftoppm` and reads it back with `tesseract`.
pub struct TesseractOcr {
    pdftoppm: PathBuf,
    tesseract: PathBuf,
    lang: String,
    dpi: u32,
    timeout: Duration,
    scratch_root: PathBuf,
}

impl TesseractOcr {
    pub fn new(cfg: &Config) -> Self {
        Self {
            pdftoppm: PathBuf::from(&cfg.ocr.pdftoppm_exe),
            tesseract: PathBuf::from(&cfg.ocr.tesseract_exe),
            lang: cfg.ocr.lang.clone(),
            dpi: cfg.ocr.dpi.max(72),
            timeout: Duration::from_secs(cfg.ocr.page_timeout_seconds.max(1)),
            scratch_root: PathBuf::from(&cfg.paths.work_dir),
        }
    }

    fn render_page(&self, pdf: &Path, page_index: usize, dir: &Path) -> Result<PathBuf> {
        let page_no = (page_index + 1).to_string();
        let prefix = dir.join("page");
        let mut cmd = Command::new(&self.pdftoppm);
        cmd.arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(&page_no)
            .arg("-l")
            .arg(&page_no)
            .arg("-singlefile")
            .arg(pdf)
            .arg(&prefix);
        run_checked(cmd, self.timeout).with_context(|| {
            format!("rendering page {} of {}", page_no, pdf.display())
        })?;

        let png = prefix.with_extension("png");
        if !png.exists() {
            return Err(anyhow!("pdftoppm produced no image: {}", png.display()));
        }
        Ok(png)
    }
}

impl Ocr for TesseractOcr {
    fn recognize(&self, pdf: &Path, page_index: usize) -> Result<String> {
        crate::util::ensure_dir(&self.scratch_root)?;
        let scratch = tempfile::Builder::new()
            .prefix("ocr-")
            .tempdir_in(&self.scratch_root)
            .with_context(|| "creating OCR scratch dir")?;

        let png = self.render_page(pdf, page_index, scratch.path())?;

        let mut cmd = Command::new(&self.tesseract);
        cmd.arg(&png).arg("stdout").arg("-l").arg(&self.lang);
        let out = run_checked(cmd, self.timeout)
            .with_context(|| format!("tesseract on {}", png.display()))?;

        let text = String::from_utf8_lossy(&out.stdout).into_owned();
        debug!(
            "ocr {} page {} chars={}",
            pdf.display(),
            page_index,
            text.len()
        );
        Ok(text)
    }
}

/// Never recognizes anything; used when OCR is switched off.
pub struct NoOcr;

impl Ocr for NoOcr {
    fn recognize(&self, _pdf: &Path, _page_index: usize) -> Result<String> {
        Err(anyhow!("OCR is disabled"))
    }
}

fn run_checked(mut cmd: Command, timeout: Duration) -> Result<Output> {
    debug!("exec {:?} timeout={:?}", cmd, timeout);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning {program}"))?;
    let output = wait_with_timeout(&mut child, timeout)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("{program} failed ({}): {}", output.status, stderr.trim()));
    }
    Ok(output)
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Output> {
    // Drain pipes while waiting so a chatty child can't block on a full buffer.
    let stdout_reader = child.stdout.take();
    let stderr_reader = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_reader {
            out.read_to_end(&mut buf).with_context(|| "read stdout")?;
        }
        Ok(buf)
    });

    let stderr_thread = std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr_reader {
            err.read_to_end(&mut buf).with_context(|| "read stderr")?;
        }
        Ok(buf)
    });

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            let stdout = stdout_thread
                .join()
                .map_err(|_| anyhow!("stdout reader thread panicked"))??;
            let stderr = stderr_thread
                .join()
                .map_err(|_| anyhow!("stderr reader thread panicked"))??;
            return Ok(Output {
                status,
                stdout,
                stderr,
            });
        }

        if start.elapsed() > timeout {
            warn!("OCR process timed out after {:?}", timeout);
            let _ = child.kill();
            child.wait().with_context(|| "wait after kill")?;
            let stderr = stderr_thread
                .join()
                .map_err(|_| anyhow!("stderr reader thread panicked"))??;
            let _ = stdout_thread.join();
            return Err(anyhow!(
                "process exceeded timeout ({:?}); stderr: {}",
                timeout,
                String::from_utf8_lossy(&stderr)
            ));
        }

        std::thread::sleep(Duration::from_millis(50));
    }
}
