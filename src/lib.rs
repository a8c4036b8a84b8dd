#![warn(rust_2018_idioms)]

//! Compile the FIT profile workbook into a decoding schema and decode
//! FIT activity files against it.
//!
//! The profile ships as a workbook of types and messages; [`Profile`]
//! compiles it once (resolving enum mappings and dynamic-field
//! cross-references) and can be cached to disk. [`Fit`] then decodes a
//! FIT binary into named, unit-annotated records:
//!
//! ```no_run
//! use std::path::Path;
//! use fitprofile_rs::{Fit, Profile, SharedLog};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let profile = Profile::compile(Path::new("Profile.xlsx"), SharedLog::unbound())?;
//! let fit = Fit::new(Path::new("activity.fit"), &profile)?;
//! for record in fit.iter() {
//!     println!("{}", record);
//! }
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod fit;
pub mod log;
pub mod profile;

pub use crate::errors::{FitError, ProfileError};
pub use crate::fit::{DataRecord, Fit, FitHeader, RecordDecoder};
pub use crate::log::{LogSink, SharedLog, StdLog};
pub use crate::profile::{
    Cell, Endian, Field, Message, MessageCatalog, Profile, Row, Type, TypeRegistry, Value,
};
