//! Recipient sheet ingestion: tabular rows in, scheduled recipient tasks out.

pub mod error;
pub mod parser;
pub mod tabular;
pub mod template;

pub use error::{IngestError, RowError};
pub use parser::{parse_rows, ParsedBatch};
pub use tabular::{CellValue, JsonTabular, Row, Sheet, TabularReader, TabularWriter};
pub use template::{results_sheets, template_sheet};
