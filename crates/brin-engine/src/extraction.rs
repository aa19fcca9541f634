//! Extraction assembler
//!
//! Accumulates the structured data emitted by extract actions. Assignment
//! is last-write-wins per field; no shape validation happens here beyond
//! rejecting empty field names.

use brin_core::{BrinError, ExtractedData, Result};

/// Accumulates extracted fields over the life of a run
#[derive(Debug, Default)]
pub struct ExtractionAssembler {
    data: ExtractedData,
}

impl ExtractionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a field value; overwrites any previous value for the field
    pub fn record(&mut self, field: &str, value: serde_json::Value) -> Result<()> {
        if field.trim().is_empty() {
            return Err(BrinError::Extraction(
                "Field name must be a non-empty string".to_string(),
            ));
        }
        self.data.insert(field, value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the assembler, returning the immutable final data
    pub fn finalize(self) -> ExtractedData {
        self.data
    }
}
