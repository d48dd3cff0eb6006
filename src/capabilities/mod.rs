//! Abstract external capabilities the analyzer layer depends on: a
//! structured generative classifier (judge) and a vision-backed text
//! extractor (OCR). Both are traits; concrete backends are out of scope.

pub mod advisor;
pub mod judge;
pub mod ocr;

pub use advisor::AdvisorBackend;
pub use judge::{JudgeBackend, JudgeOutput, JudgeRequest};
pub use ocr::OcrBackend;
