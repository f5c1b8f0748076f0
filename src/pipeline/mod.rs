//! Pipeline stages for record extraction.
//!
//! Each submodule implements one step. Everything between [`units`] and
//! [`aggregate`] works on a single document unit.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ units ──▶ orchestrator ──▶ aggregate
//! (URL/path) (pdfium)  (pages)   │                (renumber)
//!                                ├─ llm           backend calls, retry
//!                                ├─ conversation  per-unit history
//!                                ├─ sanitize      reply → JSON array text
//!                                └─ merge         base + patches
//! ```
//!
//! 1. [`input`]: resolve the path or URL to a local file, sniff its format
//! 2. [`render`]: rasterise PDF pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`units`]: one unit per image or PDF page, numbered across inputs
//! 4. [`encode`]: PNG and base64 wrapping for the request body
//! 5. [`orchestrator`]: the five sequential calls of one unit
//! 6. [`aggregate`]: concatenate units and renumber records

pub mod aggregate;
pub mod conversation;
pub mod encode;
pub mod input;
pub mod llm;
pub mod merge;
pub mod orchestrator;
pub mod render;
pub mod sanitize;
pub mod units;
