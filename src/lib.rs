//! rollscan - class-activity evidence scanner.
//!
//! Scans heterogeneous office documents (Word, Excel, PDF, plain text) for
//! occurrences of student names, student ids, and class-tag keywords, then
//! aggregates the hits into structured report tables. PDFs run through an
//! adaptive concurrent extraction pipeline with an OCR fallback cascade.

pub mod cli;
pub mod config;
pub mod ocr;
pub mod report;
pub mod scan;
pub mod services;
