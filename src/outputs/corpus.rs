//! Monthly corpus files.
//!
//! One UTF-8 text file per [`TimeUnit`], named `{month}_{year}.txt`. Each
//! article is rendered as:
//!
//! ```text
//! === ARTÍCULO 1 ===
//! Título: <title>
//! Autor: <author or "Desconocido">
//! Fecha: <normalized date or "Desconocida">
//! Categorías: <comma-separated categories>
//! --- CONTENIDO ---
//! <body>
//! ```
//!
//! Consecutive blocks are separated by one blank line. A month with no
//! records produces an empty file.

use super::write_atomic;
use crate::error::HarvestError;
use crate::models::{ArticleRecord, MonthCorpus, TimeUnit};
use std::fmt::Write;
use std::path::PathBuf;
use tracing::{info, instrument};

pub const MISSING_AUTHOR: &str = "Desconocido";
pub const MISSING_DATE: &str = "Desconocida";

/// Builds and writes [`MonthCorpus`] values under one output directory.
#[derive(Debug, Clone)]
pub struct CorpusWriter {
    output_dir: PathBuf,
}

impl CorpusWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Deterministic location of the corpus file for `unit`.
    pub fn path_for(&self, unit: TimeUnit) -> PathBuf {
        self.output_dir.join(unit.corpus_file_name())
    }

    pub fn exists(&self, unit: TimeUnit) -> bool {
        self.path_for(unit).is_file()
    }

    /// Assemble the corpus for `unit`. Records must already be in discovery
    /// order.
    pub fn build(&self, unit: TimeUnit, records: Vec<ArticleRecord>) -> MonthCorpus {
        MonthCorpus { unit, records }
    }

    /// Write `corpus`, fully replacing any previous file for the same unit.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Storage`] if the file cannot be written or
    /// renamed into place. The previous file, if any, is left untouched.
    #[instrument(level = "info", skip_all, fields(unit = %corpus.unit))]
    pub fn write(&self, corpus: &MonthCorpus) -> Result<PathBuf, HarvestError> {
        let path = self.path_for(corpus.unit);
        let text = render(corpus);
        write_atomic(&path, text.as_bytes()).map_err(|e| HarvestError::storage(&path, e))?;
        info!(
            path = %path.display(),
            articles = corpus.records.len(),
            bytes = text.len(),
            "Wrote corpus file"
        );
        Ok(path)
    }
}

/// Render a corpus to its canonical text form.
pub fn render(corpus: &MonthCorpus) -> String {
    let mut out = String::new();
    for (i, record) in corpus.records.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        render_record(&mut out, i + 1, record);
    }
    out
}

fn render_record(out: &mut String, n: usize, record: &ArticleRecord) {
    // Writing into a String cannot fail.
    let _ = writeln!(out, "=== ARTÍCULO {n} ===");
    let _ = writeln!(out, "Título: {}", record.title);
    let _ = writeln!(
        out,
        "Autor: {}",
        record.author.as_deref().unwrap_or(MISSING_AUTHOR)
    );
    let _ = writeln!(
        out,
        "Fecha: {}",
        record.published_date.as_deref().unwrap_or(MISSING_DATE)
    );
    if record.categories.is_empty() {
        out.push_str("Categorías:\n");
    } else {
        let _ = writeln!(out, "Categorías: {}", record.categories.join(", "));
    }
    out.push_str("--- CONTENIDO ---\n");
    out.push_str(&record.body);
    out.push('\n');
}
