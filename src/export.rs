//! CSV export of an extracted plan table.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::PlannerError;
use crate::i18n::Language;
use crate::table::{ExtractedTable, TableExtractor};

/// MIME type offered alongside the export file.
pub const EXPORT_MIME_TYPE: &str = "text/csv";

/// Serialized CSV payload. Empty when there was no table to export.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportBytes(Vec<u8>);

impl ExportBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for ExportBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Serialize `table` as CSV: header record first, then one record per row,
/// `\n` terminated, fields quoted only when they need it.
///
/// The empty table serializes to zero bytes.
pub fn serialize(table: &ExtractedTable) -> ExportBytes {
    if table.is_empty() {
        return ExportBytes::default();
    }

    match write_csv(table) {
        Ok(bytes) => ExportBytes(bytes),
        Err(e) => {
            // Writing into a Vec only fails on inconsistent record widths,
            // which parse_table rules out.
            warn!(err = %e, "csv serialization failed");
            ExportBytes::default()
        }
    }
}

fn write_csv(table: &ExtractedTable) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(table.header())?;
    for row in table.rows() {
        writer.write_record(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Locate, parse and serialize the first table of `document` with the
/// default extractor. Total: any input yields a (possibly empty) payload.
pub fn extract_and_export(document: &str) -> ExportBytes {
    extract_and_export_with(&TableExtractor::default(), document)
}

pub fn extract_and_export_with(extractor: &TableExtractor, document: &str) -> ExportBytes {
    serialize(&extractor.extract(document).into_table())
}

/// `path` itself, or the export file name for `language` inside it when
/// `path` is an existing directory.
pub fn export_target(path: &Path, language: Language) -> PathBuf {
    if path.is_dir() {
        path.join(language.strings().export_file_name)
    } else {
        path.to_path_buf()
    }
}

/// Write a non-empty export to `path`, creating parent directories.
///
/// Writes to a sibling temp file and renames it into place; falls back to a
/// direct write when the rename fails (e.g. cross-device).
pub fn write_export(export: &ExportBytes, path: &Path) -> Result<(), PlannerError> {
    if export.is_empty() {
        return Err(PlannerError::NothingToExport);
    }

    let write_err = |e: std::io::Error| PlannerError::ExportWriteFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }

    let tmp_path = path.with_extension("csv.tmp");
    let written = (|| -> std::io::Result<()> {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(export.as_bytes())?;
        f.sync_all()
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(write_err(e));
    }

    if fs::rename(&tmp_path, path).is_err() {
        fs::write(path, export.as_bytes()).map_err(write_err)?;
        let _ = fs::remove_file(&tmp_path);
    }

    info!(
        path = %path.display(),
        bytes = export.len(),
        mime = EXPORT_MIME_TYPE,
        "export written"
    );
    Ok(())
}
