//! The OCR capability: decode a screenshot, return whatever text was found.
//!
//! Like the judge, the concrete vision backend is an external collaborator.
//! Per-image failures are tolerated here (empty string) rather than
//! propagated — the analyzer layer is responsible for treating an empty
//! concatenation as "OCR found nothing," not as an error.

use async_trait::async_trait;

/// A vision-backed text extraction capability.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Extract text from one base64-encoded screenshot. Implementations
    /// should return `Ok(String::new())` rather than an error for images
    /// that decode but contain no recognizable text.
    async fn extract_text(&self, screenshot_b64: &str) -> Result<String, String>;
}

/// OCR up to `limit` screenshots and join the non-empty results with a
/// single space, exactly as the single-shot OCR analyzer expects.
pub async fn extract_concatenated(
    backend: &dyn OcrBackend,
    screenshots_b64: &[&str],
    limit: usize,
) -> String {
    let mut parts = Vec::new();
    for screenshot in screenshots_b64.iter().take(limit) {
        match backend.extract_text(screenshot).await {
            Ok(text) if !text.trim().is_empty() => parts.push(text),
            Ok(_) => {}
            Err(reason) => {
                tracing::warn!(reason, "ocr extraction failed for one screenshot");
            }
        }
    }
    parts.join(" ")
}
