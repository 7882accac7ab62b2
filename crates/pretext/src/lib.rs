#![deny(missing_docs)]
//! qmdptx PreTeXt output: emits a parsed chapter as PreTeXt XML, merges
//! exercise documents and converts batches of chapters in parallel.

/// Parallel batch conversion.
pub mod batch;
/// Single-document conversion pipeline.
pub mod convert;
/// PreTeXt emission.
pub mod emit;
/// Exercise document grouping and merging.
pub mod exercises;
/// Indenting XML writer.
pub mod writer;

pub use batch::{
    BatchInput, BatchOptions, BatchProcessingResult, BatchResult, BatchStats, convert_batch,
};
pub use convert::{Conversion, Converter, convert, convert_with_exercises};
pub use emit::{AssetRequest, Emission, emit_document};
pub use exercises::{group_exercises, merge_exercises};
pub use writer::XmlWriter;

pub use qmdptx_core::{ConvertConfig, ConvertError, ConvertWarning};
