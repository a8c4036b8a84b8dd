//! Error types for profile compilation and FIT decoding.
//! Errors name the offending entity (type name, field number, local id,
//! byte offset) so a failing file or profile can be traced.

use std::fmt;

/// Errors raised while compiling the profile workbook into a schema,
/// or while looking up compiled entities.
#[derive(Debug)]
pub enum ProfileError {
    /// No type registered under this profile name.
    UnknownType { name: String },
    /// No message registered under this profile name.
    UnknownMessage { name: String },
    /// No canonical base type at this index (valid range 0-16).
    UnknownBaseType { index: u8 },
    /// A mapping has no internal value for this profile literal.
    UnknownEnumLiteral { type_name: String, literal: String },
    /// A mapping has no profile name for this internal value.
    UnknownEnumInternal { type_name: String, value: i64 },
    /// A message has no field under this profile name.
    UnknownField { message: String, field: String },
    /// A message has no field under this field number.
    UnknownFieldNumber { message: String, number: u8 },
    /// Two types were installed under one name with differing sizes.
    DuplicateTypeConflict {
        name: String,
        existing: usize,
        duplicate: usize,
    },
    /// A dynamic alternative references a field absent from its message.
    DanglingDynamicReference {
        message: String,
        field: String,
        reference: String,
    },
    /// A type name matched no known or auto-creatable pattern,
    /// or matched with an unusable bit width.
    BadTypeName { name: String },
    /// A profile cell could not be converted to the expected shape.
    BadLiteral {
        literal: String,
        expected: &'static str,
    },
    /// The workbook lacks a required sheet.
    MissingSheet { name: String },
    /// Underlying workbook error.
    Workbook(calamine::Error),
    /// Schema cache (de)serialization error.
    Cache(bincode::Error),
    /// IO error.
    IoError(std::io::Error),
}

impl std::error::Error for ProfileError {}
impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileError::UnknownType { name } => write!(f, "No type for profile name '{}'", name),
            ProfileError::UnknownMessage { name } => {
                write!(f, "No message for profile name '{}'", name)
            }
            ProfileError::UnknownBaseType { index } => {
                write!(f, "No base type for number {}", index)
            }
            ProfileError::UnknownEnumLiteral { type_name, literal } => {
                write!(f, "No internal value for profile '{}' in type '{}'", literal, type_name)
            }
            ProfileError::UnknownEnumInternal { type_name, value } => {
                write!(f, "No profile value for internal {} in type '{}'", value, type_name)
            }
            ProfileError::UnknownField { message, field } => {
                write!(f, "No field for profile name '{}' in message '{}'", field, message)
            }
            ProfileError::UnknownFieldNumber { message, number } => {
                write!(f, "No field for number {} in message '{}'", number, message)
            }
            ProfileError::DuplicateTypeConflict {
                name,
                existing,
                duplicate,
            } => write!(
                f,
                "Duplicate type for '{}' with differing size ({} vs {})",
                name, existing, duplicate
            ),
            ProfileError::DanglingDynamicReference {
                message,
                field,
                reference,
            } => write!(
                f,
                "Dynamic field '{}' in message '{}' references unknown field '{}'",
                field, message, reference
            ),
            ProfileError::BadTypeName { name } => {
                write!(f, "Cannot derive a type from name '{}'", name)
            }
            ProfileError::BadLiteral { literal, expected } => {
                write!(f, "Cannot convert cell '{}' to {}", literal, expected)
            }
            ProfileError::MissingSheet { name } => {
                write!(f, "Profile workbook has no '{}' sheet", name)
            }
            ProfileError::Workbook(err) => write!(f, "Workbook error: {}", err),
            ProfileError::Cache(err) => write!(f, "Schema cache error: {}", err),
            ProfileError::IoError(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl From<calamine::Error> for ProfileError {
    fn from(err: calamine::Error) -> Self {
        ProfileError::Workbook(err)
    }
}

impl From<bincode::Error> for ProfileError {
    fn from(err: bincode::Error) -> Self {
        ProfileError::Cache(err)
    }
}

impl From<std::io::Error> for ProfileError {
    fn from(err: std::io::Error) -> Self {
        ProfileError::IoError(err)
    }
}

/// Errors raised while decoding a FIT binary.
#[derive(Debug)]
pub enum FitError {
    /// File header size is neither 12 nor 14 bytes.
    MalformedHeaderSize { size: u8 },
    /// File header magic is not ".FIT".
    MalformedHeaderMagic { text: String },
    /// Data record for a local id with no stored definition.
    UnknownDefinition { local: u8, offset: u64 },
    /// Compressed-timestamp record headers are an extension point,
    /// reported rather than misread.
    UnsupportedCompressedTimestamp { offset: u64 },
    /// Architecture byte in a definition record is neither 0 nor 1.
    InvalidArchitecture { arch: u8, offset: u64 },
    /// Field descriptor size is not a multiple of the field's type size.
    /// Fatal for the record, not for the file.
    SizeMismatch {
        message: String,
        field: String,
        size: u8,
        type_size: usize,
    },
    /// A dynamic field was decoded without sibling values to probe.
    DynamicUnresolvable { field: String },
    /// Byte run handed to a type decoder has the wrong length.
    InvalidValueLength {
        type_name: String,
        expected: usize,
        found: usize,
    },
    /// Record extends past the end of the data payload.
    TruncatedRecord {
        offset: u64,
        needed: usize,
        available: usize,
    },
    /// Schema lookup failed during decoding.
    Profile(ProfileError),
    /// String field holds invalid UTF-8.
    Utf8Error(std::str::Utf8Error),
    /// Underlying reader error.
    BinRead(binread::Error),
    /// Date arithmetic left the supported range.
    TimeRange(time::error::ComponentRange),
    /// IO error.
    IoError(std::io::Error),
}

impl std::error::Error for FitError {}
impl fmt::Display for FitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitError::MalformedHeaderSize { size } => {
                write!(f, "Malformed header: size {} (expected 12 or 14)", size)
            }
            FitError::MalformedHeaderMagic { text } => {
                write!(f, "Malformed header: magic '{}' (expected '.FIT')", text)
            }
            FitError::UnknownDefinition { local, offset } => {
                write!(f, "No definition for local id {} at offset {}", local, offset)
            }
            FitError::UnsupportedCompressedTimestamp { offset } => {
                write!(f, "Compressed-timestamp record header at offset {} not supported", offset)
            }
            FitError::InvalidArchitecture { arch, offset } => {
                write!(f, "Invalid architecture {} at offset {}", arch, offset)
            }
            FitError::SizeMismatch {
                message,
                field,
                size,
                type_size,
            } => write!(
                f,
                "Field '{}' in message '{}' has size {} not divisible by type size {}",
                field, message, size, type_size
            ),
            FitError::DynamicUnresolvable { field } => {
                write!(f, "Dynamic field '{}' decoded without sibling values", field)
            }
            FitError::InvalidValueLength {
                type_name,
                expected,
                found,
            } => write!(
                f,
                "Type '{}' expected {} bytes, got {}",
                type_name, expected, found
            ),
            FitError::TruncatedRecord {
                offset,
                needed,
                available,
            } => write!(
                f,
                "Record at offset {} needs {} bytes, {} available",
                offset, needed, available
            ),
            FitError::Profile(err) => write!(f, "{}", err),
            FitError::Utf8Error(err) => write!(f, "Error parsing bytes to string: {}", err),
            FitError::BinRead(err) => write!(f, "Read error: {}", err),
            FitError::TimeRange(err) => write!(f, "Date out of range: {}", err),
            FitError::IoError(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl From<ProfileError> for FitError {
    fn from(err: ProfileError) -> Self {
        FitError::Profile(err)
    }
}

impl From<std::str::Utf8Error> for FitError {
    fn from(err: std::str::Utf8Error) -> Self {
        FitError::Utf8Error(err)
    }
}

impl From<binread::Error> for FitError {
    fn from(err: binread::Error) -> Self {
        FitError::BinRead(err)
    }
}

impl From<time::error::ComponentRange> for FitError {
    fn from(err: time::error::ComponentRange) -> Self {
        FitError::TimeRange(err)
    }
}

impl From<std::io::Error> for FitError {
    fn from(err: std::io::Error) -> Self {
        FitError::IoError(err)
    }
}
