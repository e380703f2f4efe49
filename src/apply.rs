//! Stamps detection results onto column headers.

use log::debug;

use crate::aggregate::DetectionResult;
use crate::schema::{ColumnType, DataHeader};

/// A column's detected type is applied only above this confidence.
pub const COLUMN_TYPE_CONFIDENCE_THRESHOLD: f64 = 0.6;
/// Dataset-wide formats are pre-filled only above this confidence.
pub const FORMAT_APPLICATION_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Whether the dataset-wide formats should be pre-filled for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatApplication {
    pub apply_date_format: bool,
    pub apply_number_format: bool,
}

pub fn apply_detected_formats(
    headers: &mut [DataHeader],
    result: &DetectionResult,
) -> FormatApplication {
    for header in headers.iter_mut() {
        let column = header.index;
        let detected = result.column_types.get(column).copied();
        let confidence = result
            .confidence
            .columns
            .get(column)
            .copied()
            .unwrap_or(0.0);

        match detected {
            Some(column_type) if confidence > COLUMN_TYPE_CONFIDENCE_THRESHOLD => {
                let date_format = match column_type {
                    ColumnType::Date => Some(
                        result
                            .column_date_formats
                            .get(column)
                            .copied()
                            .flatten()
                            .unwrap_or(result.date_format),
                    ),
                    ColumnType::Text | ColumnType::Number => None,
                };
                header.set_type(column_type, date_format);
            }
            _ => header.set_type(ColumnType::Text, None),
        }
        debug!(
            "Column '{}' -> {} (confidence {confidence:.3})",
            header.name, header.column_type
        );
    }

    FormatApplication {
        apply_date_format: result.confidence.date_format > FORMAT_APPLICATION_CONFIDENCE_THRESHOLD,
        apply_number_format: result.confidence.number_format
            > FORMAT_APPLICATION_CONFIDENCE_THRESHOLD,
    }
}
