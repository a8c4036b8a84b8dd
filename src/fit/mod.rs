//! FIT binary decoding: file header, record headers, definition
//! records and data records decoded against a compiled [`Profile`].
//!
//! [`Profile`]: crate::profile::Profile

pub mod data_record;
pub mod definition_message;
pub mod fit;
pub mod fit_header;
pub mod message_header;

pub use data_record::DataRecord;
pub use definition_message::{DefinitionField, DefinitionMessage};
pub use fit::{Fit, RecordDecoder};
pub use fit_header::FitHeader;
pub use message_header::{MessageHeader, RecordKind};
