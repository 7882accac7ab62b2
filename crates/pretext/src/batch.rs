//! Parallel conversion of independent chapters.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use qmdptx_core::ConvertConfig;
use rayon::prelude::*;
use serde::Serialize;

use crate::convert::{Conversion, Converter};

/// One chapter to convert.
#[derive(Debug, Clone)]
pub struct BatchInput {
    /// Chapter identifier (typically the file path).
    pub id: String,
    /// Chapter source.
    pub source: String,
    /// Source of the chapter's exercise document, if any.
    pub exercises: Option<String>,
}

impl BatchInput {
    /// Create an input without an exercise document.
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            exercises: None,
        }
    }
}

/// Result for a single chapter in a batch.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Chapter identifier matching the input.
    pub id: String,
    /// Conversion result (present on success).
    pub result: Option<Conversion>,
    /// Error message (present on failure).
    pub error: Option<String>,
}

/// Statistics for batch processing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    /// Total number of chapters processed.
    pub total: u32,
    /// Number of successful conversions.
    pub succeeded: u32,
    /// Number of failed conversions.
    pub failed: u32,
    /// Warnings across all successful conversions.
    pub warnings: u32,
    /// Total processing time in milliseconds.
    pub processing_time_ms: f64,
}

/// Options for batch processing.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum number of threads to use. Defaults to number of CPU cores.
    pub max_threads: Option<usize>,
    /// Whether to continue processing after an error. Defaults to true.
    pub continue_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_threads: None,
            continue_on_error: true,
        }
    }
}

/// Result of batch processing containing all results and statistics.
#[derive(Debug, Clone)]
pub struct BatchProcessingResult {
    /// Individual results in input order.
    pub results: Vec<BatchResult>,
    /// Processing statistics.
    pub stats: BatchStats,
}

/// Converts every input, in parallel unless `continue_on_error` is off.
///
/// Each input gets its own parser and registry; nothing is shared between
/// conversions except the read-only configuration.
pub fn convert_batch(
    inputs: Vec<BatchInput>,
    options: &BatchOptions,
    config: &ConvertConfig,
) -> BatchProcessingResult {
    let start = Instant::now();

    let pool = options.max_threads.and_then(|threads| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|err| log::warn!("falling back to the global thread pool: {}", err))
            .ok()
    });

    let total = inputs.len() as u32;
    let succeeded = AtomicU32::new(0);
    let failed = AtomicU32::new(0);
    let warnings = AtomicU32::new(0);

    let process_input = |input: BatchInput| -> BatchResult {
        let converter = Converter::new(config).with_file(input.id.clone());
        match converter.convert(&input.source, input.exercises.as_deref()) {
            Ok(conversion) => {
                succeeded.fetch_add(1, Ordering::Relaxed);
                warnings.fetch_add(conversion.warnings.len() as u32, Ordering::Relaxed);
                BatchResult {
                    id: input.id,
                    result: Some(conversion),
                    error: None,
                }
            }
            Err(err) => {
                failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}: {}", input.id, err);
                BatchResult {
                    id: input.id,
                    result: None,
                    error: Some(err.to_string()),
                }
            }
        }
    };

    let results: Vec<BatchResult> = if options.continue_on_error {
        match pool {
            Some(pool) => pool.install(|| inputs.into_par_iter().map(process_input).collect()),
            None => inputs.into_par_iter().map(process_input).collect(),
        }
    } else {
        // Stopping at the first failure needs a deterministic order.
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let result = process_input(input);
            let stop = result.error.is_some();
            results.push(result);
            if stop {
                break;
            }
        }
        results
    };

    BatchProcessingResult {
        results,
        stats: BatchStats {
            total,
            succeeded: succeeded.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            warnings: warnings.load(Ordering::Relaxed),
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        },
    }
}
