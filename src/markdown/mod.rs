//! Markdown segmentation and rewriting.

pub mod html;
pub mod prose;
pub mod segment;
pub mod transform;

pub use prose::rewrite_prose;
pub use transform::MarkdownTransformer;
