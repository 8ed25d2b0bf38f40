//! The rendering core shared by the batch build and the dev server.
//!
//! - **path**: source-space ↔ output-space path algebra
//! - **template**: nearest-ancestor template lookup
//! - **markdown**: Markdown → HTML with front matter extraction
//! - **render**: template slotting, metadata substitution
//! - **link**: `href`/`src` rewriting for the output layout
//!
//! # Render Flow
//!
//! ```text
//! find_template() ──► render() ──► convert_markdown()
//!       │                │               │
//!       ▼                ▼               ▼
//!  template text   prefix+body+suffix  body, Metadata
//!                        │
//!                        ▼
//!                  rewrite_links() ──► RenderedDocument
//! ```
//!
//! Nothing in here walks the tree or owns a template table; callers pass
//! what they discovered, so the same functions serve both drivers.

pub mod link;
pub mod markdown;
pub mod path;
pub mod render;
pub mod template;

pub use path::{SourceEntry, SourceKind};
pub use render::render;
pub use template::{TemplateTable, find_template, find_template_file};
