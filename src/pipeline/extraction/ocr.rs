use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use super::types::OcrEngine;
use super::OcrError;

/// Tesseract run as an external process.
///
/// PNG bytes go in on stdin and text comes back on stdout, so no temp files
/// are written. Availability is probed once with `--version`.
pub struct TesseractCli {
    binary: String,
    language: String,
    available: OnceLock<bool>,
}

impl TesseractCli {
    pub fn new(language: &str) -> Self {
        Self::with_binary("tesseract", language)
    }

    /// Use a tesseract binary at a specific path.
    pub fn with_binary(binary: &str, language: &str) -> Self {
        Self {
            binary: binary.to_string(),
            language: language.to_string(),
            available: OnceLock::new(),
        }
    }

    fn probe(&self) -> bool {
        match Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::warn!(binary = %self.binary, error = %e, "Tesseract binary not found");
                false
            }
        }
    }
}

impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract-cli"
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| self.probe())
    }

    fn ocr_image(&self, png_bytes: &[u8], psm: u32) -> Result<String, OcrError> {
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &self.language, "--psm"])
            .arg(psm.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    OcrError::Unavailable(format!("{} not found", self.binary))
                }
                _ => OcrError::Io(e),
            })?;

        // Take stdin so it is closed once written; tesseract waits for EOF.
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(png_bytes) {
                // Usually a broken pipe: tesseract quit early. Reap it and
                // report its stderr, which names the real cause.
                drop(stdin);
                let output = child.wait_with_output()?;
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(OcrError::Processing(format!(
                    "tesseract exited with {} before reading input ({e}): {}",
                    output.status,
                    stderr.trim()
                )));
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Processing(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Bundled Tesseract OCR engine.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct BundledTesseract {
    tessdata_dir: Option<std::path::PathBuf>,
    language: String,
}

#[cfg(feature = "ocr")]
impl BundledTesseract {
    /// Use the system tessdata location.
    pub fn new(language: &str) -> Self {
        Self {
            tessdata_dir: None,
            language: language.to_string(),
        }
    }

    /// Use traineddata from a specific directory.
    pub fn with_tessdata(mut self, dir: &std::path::Path) -> Self {
        if dir.join(format!("{}.traineddata", self.language)).exists() {
            self.tessdata_dir = Some(dir.to_path_buf());
        } else {
            tracing::warn!(
                path = %dir.display(),
                language = %self.language,
                "Traineddata not found, using system tessdata"
            );
        }
        self
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for BundledTesseract {
    fn name(&self) -> &str {
        "tesseract-bundled"
    }

    fn ocr_image(&self, png_bytes: &[u8], psm: u32) -> Result<String, OcrError> {
        let datapath = match &self.tessdata_dir {
            Some(dir) => Some(
                dir.to_str()
                    .ok_or_else(|| OcrError::Unavailable("Invalid tessdata path".into()))?,
            ),
            None => None,
        };

        let tess = tesseract::Tesseract::new(datapath, Some(&self.language))
            .map_err(|e| OcrError::Unavailable(format!("{e:?}")))?;

        let tess = tess
            .set_variable("tessedit_pageseg_mode", &psm.to_string())
            .map_err(|e| OcrError::Processing(format!("{e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(png_bytes)
            .map_err(|e| OcrError::Processing(format!("{e:?}")))?;

        tess.get_text()
            .map_err(|e| OcrError::Processing(format!("{e:?}")))
    }
}

/// Mock OCR engine for unit testing without Tesseract.
/// Returns the same text for every image and page segmentation mode.
pub struct MockOcrEngine {
    pub text: String,
}

impl MockOcrEngine {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn ocr_image(&self, _png_bytes: &[u8], _psm: u32) -> Result<String, OcrError> {
        Ok(self.text.clone())
    }
}

/// Returns scripted responses in call order, then empty text.
pub struct ScriptedOcrEngine {
    responses: Mutex<Vec<Result<String, OcrError>>>,
    calls: AtomicUsize,
}

impl ScriptedOcrEngine {
    pub fn new(responses: Vec<Result<String, OcrError>>) -> Self {
        let mut responses = responses;
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for ScriptedOcrEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn ocr_image(&self, _png_bytes: &[u8], _psm: u32) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| OcrError::Processing("scripted engine poisoned".into()))?;
        responses.pop().unwrap_or_else(|| Ok(String::new()))
    }
}

/// Stands in for a host without any OCR engine installed.
pub struct UnavailableOcrEngine;

impl OcrEngine for UnavailableOcrEngine {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn ocr_image(&self, _png_bytes: &[u8], _psm: u32) -> Result<String, OcrError> {
        Err(OcrError::Unavailable("no OCR engine installed".into()))
    }
}

/// Best engine for this build: bundled libtesseract when compiled in,
/// otherwise the tesseract binary.
pub fn default_ocr_engine(language: &str) -> Box<dyn OcrEngine> {
    #[cfg(feature = "ocr")]
    {
        Box::new(BundledTesseract::new(language))
    }
    #[cfg(not(feature = "ocr"))]
    {
        Box::new(TesseractCli::new(language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Executable that fails like tesseract with missing traineddata,
    /// without ever reading stdin.
    #[cfg(unix)]
    fn failing_tesseract() -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("fake-tesseract-{}", std::process::id()));
        std::fs::write(
            &path,
            "#!/bin/sh\necho \"Failed loading language 'xyz'\" >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn early_exit_reports_stderr_instead_of_pipe_error() {
        let path = failing_tesseract();
        let engine = TesseractCli::with_binary(path.to_str().unwrap(), "xyz");
        // Larger than any pipe buffer, so the write cannot complete
        let input = vec![0u8; 4 * 1024 * 1024];
        let result = engine.ocr_image(&input, 6);
        std::fs::remove_file(&path).ok();

        match result {
            Err(OcrError::Processing(msg)) => assert!(msg.contains("Failed loading language")),
            other => panic!("unexpected {other:?}"),
        }
    }


    #[test]
    fn mock_engine_returns_text() {
        let engine = MockOcrEngine::new("Aspirin 100mg");
        assert!(engine.is_available());
        assert_eq!(engine.ocr_image(&[], 6).unwrap(), "Aspirin 100mg");
    }

    #[test]
    fn scripted_engine_replays_in_order() {
        let engine = ScriptedOcrEngine::new(vec![
            Ok("first".into()),
            Err(OcrError::Processing("bad page".into())),
        ]);
        assert_eq!(engine.ocr_image(&[], 6).unwrap(), "first");
        assert!(engine.ocr_image(&[], 4).is_err());
        assert_eq!(engine.ocr_image(&[], 3).unwrap(), "");
        assert_eq!(engine.call_count(), 3);
    }

    #[test]
    fn unavailable_engine_reports_unavailable() {
        let engine = UnavailableOcrEngine;
        assert!(!engine.is_available());
        assert!(matches!(
            engine.ocr_image(&[], 6),
            Err(OcrError::Unavailable(_))
        ));
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let engine = TesseractCli::with_binary("/nonexistent/tesseract-binary", "eng");
        assert!(!engine.is_available());
        assert!(matches!(
            engine.ocr_image(&[0u8; 8], 6),
            Err(OcrError::Unavailable(_))
        ));
    }
}
