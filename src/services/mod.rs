//! Service layer: CPU-bound work behind the CLI.
//!
//! This module contains domain logic separated from UI concerns: worker
//! calibration and the concurrent extraction coordinator.

pub mod calibrate;
pub mod extraction;

pub use calibrate::calibrate_pdf_workers;
pub use extraction::{extract_pdfs_concurrently, ExtractionEvent, ExtractionOutcome};
