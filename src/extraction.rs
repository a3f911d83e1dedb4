//! Extraction and normalization of product attributes
//!
//! Leaves first: `document` (selector evaluation), `transform` (substitution,
//! processors, cleanup), `assembler` (one item per page), then the
//! post-assembly passes `localization` and `images`.

pub mod assembler;
pub mod document;
pub mod html;
pub mod images;
pub mod localization;
pub mod transform;

pub use assembler::{ItemAssembler, ProductPage};
pub use document::{Document, HtmlDocument};
