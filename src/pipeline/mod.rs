//! Pipeline stages for turning one document into one merged record.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ window ──▶ client ──────────────────▶ postprocess ──▶ merge
//! (load)   (plan)     (gate, limiter, retry)      (JSON object)   (fold)
//!                        │
//!                        └─▶ service ─▶ mistral (OCR endpoint)
//!                                    └▶ vision  (render ─▶ encode ─▶ LLM)
//! ```
//!
//! 1. [`input`]  : discover PDFs and load one into memory with its page count
//! 2. [`window`] : split the page range into bounded, ordered windows
//! 3. [`limiter`]: shared rate limiter and concurrency gate
//! 4. [`client`] : one window call with classification and bounded backoff
//! 5. [`service`]: the external annotation backends
//! 6. [`postprocess`]: raw response text to a partial record
//! 7. [`merge`]  : fold partial records in page order
//!
//! [`render`] and [`encode`] are pdfium and image helpers shared by the loader
//! and the vision backend.

pub mod client;
pub mod encode;
pub mod input;
pub mod limiter;
pub mod merge;
pub mod postprocess;
pub mod render;
pub mod service;
pub mod window;
