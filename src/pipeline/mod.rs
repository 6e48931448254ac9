//! Pipeline stages for document summarization.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ parse ──▶ classify ──▶ llm ──▶ postprocess
//! (path/upload) (pages) (skip rules) (JSON chat) (bullet shaping)
//! ```
//!
//! 1. [`input`]  — validate the file name, stage uploads in a temp file
//! 2. [`parse`]  — split the document into page units; runs in
//!    `spawn_blocking` because zip, XML and pdfium work is synchronous
//! 3. [`language`] — tag the document language for the response
//! 4. [`keywords`] — frequency-ranked terms per summarized page
//! 5. [`llm`]    — the JSON chat seam; the only stage with network I/O
//! 6. [`postprocess`] — deterministic length, citation and fallback rules
//!
//! Classification lives in [`crate::classify`]; orchestration in
//! [`crate::engine`].

pub mod input;
pub mod keywords;
pub mod language;
pub mod llm;
pub mod parse;
pub mod postprocess;
