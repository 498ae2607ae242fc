pub mod types;
pub mod preprocess;
pub mod variants;
pub mod sanitize;
pub mod ocr;
pub mod local_ocr;
pub mod vocabulary;
pub mod fuzzy;
pub mod candidates;
pub mod fields;
pub mod confidence;
pub mod records;
pub mod validation;
pub mod orchestrator;

pub use types::*;
pub use preprocess::*;
pub use variants::*;
pub use sanitize::*;
pub use ocr::*;
pub use local_ocr::*;
pub use vocabulary::*;
pub use candidates::*;
pub use fields::*;
pub use records::*;
pub use validation::*;
pub use orchestrator::*;

use thiserror::Error;

/// Errors that abort an extraction. Everything past decoding degrades into
/// records with notes instead.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Image could not be decoded: {0}")]
    Decode(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),
}

/// Local OCR engine failures.
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    #[error("OCR processing failed: {0}")]
    Processing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
