//! Profile types and the type registry.
//!
//! Every named profile type knows its wire size, how to decode a byte run
//! into a [`Value`] and how to convert a profile-sheet literal into its
//! internal integer. Integer and float types carry the FIT "invalid"
//! sentinel for their width and decode it to a missing value.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};

use binread::{BinRead, BinReaderExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime};

use crate::errors::{FitError, ProfileError};
use crate::log::SharedLog;

use super::compiler::Cell;

/// Byte order declared by a definition record (0 = little, 1 = big).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// The 17 canonical base types, in the order of the FIT base-type table.
/// A definition record refers to these by index.
pub const BASE_TYPE_NAMES: [&str; 17] = [
    "enum", "sint8", "uint8", "sint16", "uint16", "sint32", "uint32", "string", "float32",
    "float64", "uint8z", "uint16z", "uint32z", "byte", "sint64", "uint64", "uint64z",
];

const INT_PATTERN: &str = r"^([su]?)int(\d{1,2})(z?)$";
const FLOAT_PATTERN: &str = r"^float(\d{1,2})$";

/// Dates at or above this raw value are seconds since the FIT epoch;
/// below it they are passed through untouched.
const DATE_THRESHOLD: u64 = 0x1000_0000;

const UINT32: IntegerSpec = IntegerSpec {
    signed: false,
    bits: 32,
    zero_invalid: false,
};

/// A decoded field value. `count == 1` decodes to a scalar variant,
/// larger counts to `Array` in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Uint(u64),
    Sint(i64),
    Float(f64),
    Text(String),
    Timestamp(OffsetDateTime),
    LocalTimestamp(PrimitiveDateTime),
    Array(Vec<Value>),
}

impl Value {
    /// Integer view used for dynamic-reference probing.
    pub fn as_internal(&self) -> Option<i64> {
        match self {
            Value::Uint(value) => i64::try_from(*value).ok(),
            Value::Sint(value) => Some(*value),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(value) => write!(f, "{}", value),
            Value::Uint(value) => write!(f, "{}", value),
            Value::Sint(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::Text(value) => f.write_str(value),
            Value::Timestamp(value) => {
                let formatted = value
                    .format(&time::format_description::well_known::Rfc3339)
                    .map_err(|_| std::fmt::Error)?;
                f.write_str(&formatted)
            }
            Value::LocalTimestamp(value) => write!(f, "{}", value),
            Value::Array(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Reads one fixed-width value honoring the record's declared byte order.
pub(crate) fn read_endian<R, T>(reader: &mut R, endian: Endian) -> Result<T, FitError>
where
    R: Read + Seek,
    T: BinRead<Args = ()>,
{
    match endian {
        Endian::Little => reader.read_le::<T>().map_err(FitError::from),
        Endian::Big => reader.read_be::<T>().map_err(FitError::from),
    }
}

/// Width and signedness of an integer type derived from its name
/// (`uint16`, `sint8`, `uint32z`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerSpec {
    pub signed: bool,
    pub bits: u32,
    /// z-flag: zero is the invalid sentinel instead of all-ones.
    pub zero_invalid: bool,
}

impl IntegerSpec {
    pub fn size(&self) -> usize {
        (self.bits / 8) as usize
    }

    /// The sentinel value: 0 for z-types, otherwise all-ones for unsigned
    /// and `2^(bits-1) - 1` for signed.
    fn bad_value(&self) -> u64 {
        if self.zero_invalid {
            0
        } else if self.signed {
            (1u64 << (self.bits - 1)) - 1
        } else if self.bits == 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }

    fn bad_bytes(&self, endian: Endian) -> Vec<u8> {
        let size = self.size();
        match endian {
            Endian::Little => self.bad_value().to_le_bytes()[..size].to_vec(),
            Endian::Big => self.bad_value().to_be_bytes()[8 - size..].to_vec(),
        }
    }

    fn is_bad(&self, data: &[u8], endian: Endian) -> bool {
        let bad = self.bad_bytes(endian);
        !data.is_empty() && data.chunks(self.size()).all(|chunk| chunk == &bad[..])
    }

    fn decode(&self, data: &[u8], count: usize, endian: Endian) -> Result<Option<Value>, FitError> {
        if self.is_bad(data, endian) {
            return Ok(None);
        }
        let mut cursor = Cursor::new(data);
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_one(&mut cursor, endian)?);
        }
        if count == 1 {
            Ok(values.pop())
        } else {
            Ok(Some(Value::Array(values)))
        }
    }

    fn read_one(&self, cursor: &mut Cursor<&[u8]>, endian: Endian) -> Result<Value, FitError> {
        let value = match (self.signed, self.size()) {
            (false, 1) => Value::Uint(read_endian::<_, u8>(cursor, endian)? as u64),
            (false, 2) => Value::Uint(read_endian::<_, u16>(cursor, endian)? as u64),
            (false, 4) => Value::Uint(read_endian::<_, u32>(cursor, endian)? as u64),
            (false, 8) => Value::Uint(read_endian::<_, u64>(cursor, endian)?),
            (true, 1) => Value::Sint(read_endian::<_, i8>(cursor, endian)? as i64),
            (true, 2) => Value::Sint(read_endian::<_, i16>(cursor, endian)? as i64),
            (true, 4) => Value::Sint(read_endian::<_, i32>(cursor, endian)? as i64),
            _ => Value::Sint(read_endian::<_, i64>(cursor, endian)?),
        };
        Ok(value)
    }
}

/// Width of a float type derived from its name (`float32`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatSpec {
    pub bits: u32,
}

impl FloatSpec {
    pub fn size(&self) -> usize {
        (self.bits / 8) as usize
    }

    fn is_bad(&self, data: &[u8]) -> bool {
        // All-ones bit pattern for the width, so all-ones overall.
        !data.is_empty() && data.iter().all(|byte| *byte == 0xFF)
    }

    fn decode(&self, data: &[u8], count: usize, endian: Endian) -> Result<Option<Value>, FitError> {
        if self.is_bad(data) {
            return Ok(None);
        }
        let mut cursor = Cursor::new(data);
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let value = match self.size() {
                2 => f16_to_f64(read_endian::<_, u16>(&mut cursor, endian)?),
                4 => read_endian::<_, f32>(&mut cursor, endian)? as f64,
                _ => read_endian::<_, f64>(&mut cursor, endian)?,
            };
            values.push(Value::Float(value));
        }
        if count == 1 {
            Ok(values.pop())
        } else {
            Ok(Some(Value::Array(values)))
        }
    }
}

/// IEEE 754 half precision, converted by hand (no primitive on stable).
fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits >> 15 == 1 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1F) as i32;
    let fraction = (bits & 0x3FF) as f64;
    match exponent {
        0 => sign * fraction * 2f64.powi(-24),
        0x1F => {
            if fraction == 0.0 {
                sign * f64::INFINITY
            } else {
                f64::NAN
            }
        }
        _ => sign * (1.0 + fraction / 1024.0) * 2f64.powi(exponent - 15),
    }
}

/// Enumeration adorning a numeric base type with profile-name mappings
/// in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    pub base: Box<Type>,
    profile_to_internal: HashMap<String, i64>,
    internal_to_profile: HashMap<i64, String>,
}

impl Mapping {
    pub(crate) fn new(base: Type) -> Self {
        Self {
            base: Box::new(base),
            profile_to_internal: HashMap::new(),
            internal_to_profile: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, profile: String, internal: i64) {
        self.profile_to_internal.insert(profile.clone(), internal);
        self.internal_to_profile.insert(internal, profile);
    }

    pub fn len(&self) -> usize {
        self.profile_to_internal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profile_to_internal.is_empty()
    }
}

/// Decoding behavior of a [`Type`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeKind {
    /// UTF-8 byte run, one byte per element.
    Text,
    /// One byte per element, any non-zero byte is true.
    Boolean,
    /// Fixed-width integer. Aliases (`enum`, `byte`) reuse the spec of
    /// the type they alias under their own name.
    Integer(IntegerSpec),
    /// Fixed-width float.
    Float(FloatSpec),
    /// `uint32` whose values at or above the epoch threshold become
    /// absolute timestamps.
    Date { utc: bool },
    /// Enumeration over a numeric base type.
    Mapping(Mapping),
}

/// A named profile type with a fixed wire size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Type {
    pub name: String,
    pub size: usize,
    pub kind: TypeKind,
}

impl Type {
    pub fn text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: 1,
            kind: TypeKind::Text,
        }
    }

    pub fn boolean(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: 1,
            kind: TypeKind::Boolean,
        }
    }

    pub fn date(name: &str, utc: bool) -> Self {
        Self {
            name: name.to_string(),
            size: UINT32.size(),
            kind: TypeKind::Date { utc },
        }
    }

    /// Named wrapper reusing another integer type's width and decoder.
    pub fn alias_integer(name: &str, spec: &str) -> Result<Self, ProfileError> {
        match Self::from_auto_name(spec)? {
            Some(Type {
                size,
                kind: TypeKind::Integer(spec),
                ..
            }) => Ok(Self {
                name: name.to_string(),
                size,
                kind: TypeKind::Integer(spec),
            }),
            _ => Err(ProfileError::BadTypeName {
                name: spec.to_string(),
            }),
        }
    }

    pub(crate) fn mapping(name: &str, mapping: Mapping) -> Self {
        Self {
            name: name.to_string(),
            size: mapping.base.size,
            kind: TypeKind::Mapping(mapping),
        }
    }

    /// Derives a type from an integer or float name pattern.
    /// `Ok(None)` when the name matches neither pattern; an error when it
    /// matches with an unusable bit width.
    pub fn from_auto_name(name: &str) -> Result<Option<Self>, ProfileError> {
        if let Some(caps) = Regex::new(FLOAT_PATTERN).ok().and_then(|re| re.captures(name)) {
            let bits = caps[1]
                .parse::<u32>()
                .map_err(|_| ProfileError::BadTypeName {
                    name: name.to_string(),
                })?;
            let spec = FloatSpec { bits };
            if bits % 8 != 0 || ![2, 4, 8].contains(&spec.size()) {
                return Err(ProfileError::BadTypeName {
                    name: name.to_string(),
                });
            }
            return Ok(Some(Self {
                name: name.to_string(),
                size: spec.size(),
                kind: TypeKind::Float(spec),
            }));
        }
        if let Some(caps) = Regex::new(INT_PATTERN).ok().and_then(|re| re.captures(name)) {
            let bits = caps[2]
                .parse::<u32>()
                .map_err(|_| ProfileError::BadTypeName {
                    name: name.to_string(),
                })?;
            let spec = IntegerSpec {
                signed: &caps[1] != "u",
                bits,
                zero_invalid: &caps[3] == "z",
            };
            if bits % 8 != 0 || ![1, 2, 4, 8].contains(&spec.size()) {
                return Err(ProfileError::BadTypeName {
                    name: name.to_string(),
                });
            }
            return Ok(Some(Self {
                name: name.to_string(),
                size: spec.size(),
                kind: TypeKind::Integer(spec),
            }));
        }
        Ok(None)
    }

    /// Decodes `count` values from a byte run of exactly `count * size`
    /// bytes. A run matching the sentinel pattern in every chunk decodes
    /// to `None` (missing value). Pure: never touches the registry.
    pub fn decode(&self, data: &[u8], count: usize, endian: Endian) -> Result<Option<Value>, FitError> {
        if data.len() != count * self.size {
            return Err(FitError::InvalidValueLength {
                type_name: self.name.clone(),
                expected: count * self.size,
                found: data.len(),
            });
        }
        match &self.kind {
            TypeKind::Text => Ok(Some(Value::Text(std::str::from_utf8(data)?.to_string()))),
            TypeKind::Boolean => {
                let mut bools = data.iter().map(|byte| Value::Bool(*byte != 0));
                if count == 1 {
                    Ok(bools.next())
                } else {
                    Ok(Some(Value::Array(bools.collect())))
                }
            }
            TypeKind::Integer(spec) => spec.decode(data, count, endian),
            TypeKind::Float(spec) => spec.decode(data, count, endian),
            TypeKind::Date { utc } => decode_date(data, count, endian, *utc),
            TypeKind::Mapping(mapping) => mapping.base.decode(data, count, endian),
        }
    }

    /// Converts a profile-sheet literal to its internal integer. Mappings
    /// resolve through their enumeration; numeric types parse the literal
    /// (`0x...` recognized). Compile-time only.
    pub fn profile_to_internal(&self, cell: &Cell) -> Result<i64, ProfileError> {
        match &self.kind {
            TypeKind::Mapping(mapping) => {
                let literal = cell.to_text();
                mapping
                    .profile_to_internal
                    .get(&literal)
                    .copied()
                    .ok_or(ProfileError::UnknownEnumLiteral {
                        type_name: self.name.clone(),
                        literal,
                    })
            }
            TypeKind::Integer(_) | TypeKind::Date { .. } => cell.as_int(),
            TypeKind::Float(_) => {
                let value = cell.as_number()?;
                if value.fract() == 0.0 {
                    Ok(value as i64)
                } else {
                    Err(ProfileError::BadLiteral {
                        literal: cell.to_text(),
                        expected: "an integral value",
                    })
                }
            }
            TypeKind::Text | TypeKind::Boolean => Err(ProfileError::BadLiteral {
                literal: cell.to_text(),
                expected: "a numeric type",
            }),
        }
    }

    /// Reverse enumeration lookup. Only mappings can answer.
    pub fn internal_to_profile(&self, value: i64) -> Result<&str, ProfileError> {
        match &self.kind {
            TypeKind::Mapping(mapping) => mapping
                .internal_to_profile
                .get(&value)
                .map(String::as_str)
                .ok_or(ProfileError::UnknownEnumInternal {
                    type_name: self.name.clone(),
                    value,
                }),
            _ => Err(ProfileError::UnknownEnumInternal {
                type_name: self.name.clone(),
                value,
            }),
        }
    }
}

fn decode_date(data: &[u8], count: usize, endian: Endian, utc: bool) -> Result<Option<Value>, FitError> {
    match UINT32.decode(data, count, endian)? {
        Some(Value::Uint(seconds)) if seconds >= DATE_THRESHOLD => {
            let stamp = fit_basetime()? + Duration::seconds(seconds as i64);
            if utc {
                Ok(Some(Value::Timestamp(stamp.assume_utc())))
            } else {
                Ok(Some(Value::LocalTimestamp(stamp)))
            }
        }
        other => Ok(other),
    }
}

/// FIT epoch, 1989-12-31T00:00:00.
fn fit_basetime() -> Result<PrimitiveDateTime, FitError> {
    Ok(Date::from_calendar_date(1989, Month::December, 31)?.with_hms_milli(0, 0, 0, 0)?)
}

/// Every named type, installed once during compilation and read-only
/// afterwards. Also holds the canonical base-type order used by
/// definition records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeRegistry {
    types: HashMap<String, Type>,
    base_types: Vec<String>,
    #[serde(skip)]
    log: SharedLog,
}

impl TypeRegistry {
    /// Registry pre-populated with the types that cannot be inferred from
    /// a name (`string`, `enum`, `byte`, `bool`, the two date types) and
    /// the 17 canonical base types.
    pub fn new(log: SharedLog) -> Result<Self, ProfileError> {
        let mut registry = Self {
            types: HashMap::new(),
            base_types: Vec::new(),
            log,
        };
        registry.install(Type::text("string"))?;
        registry.install(Type::alias_integer("enum", "uint8")?)?;
        registry.install(Type::alias_integer("byte", "uint8")?)?;
        for name in BASE_TYPE_NAMES {
            registry.lookup_or_autocreate(name)?;
            registry.base_types.push(name.to_string());
        }
        // In the workbook but not the base-type table.
        registry.install(Type::boolean("bool"))?;
        // Defined in the workbook, interpretation only in its comments.
        registry.install(Type::date("date_time", true))?;
        registry.install(Type::date("local_date_time", false))?;
        Ok(registry)
    }

    /// Case-sensitive name lookup.
    pub fn lookup(&self, name: &str) -> Result<&Type, ProfileError> {
        self.types.get(name).ok_or_else(|| {
            self.log.error(&format!("No type for profile name '{}'", name));
            ProfileError::UnknownType {
                name: name.to_string(),
            }
        })
    }

    /// As `lookup`, but names matching the integer or float patterns are
    /// constructed and installed on first use.
    pub fn lookup_or_autocreate(&mut self, name: &str) -> Result<&Type, ProfileError> {
        if !self.types.contains_key(name) {
            match Type::from_auto_name(name)? {
                Some(ty) => {
                    self.log.warn(&format!("Auto-adding type '{}'", name));
                    self.install(ty)?;
                }
                None => {
                    self.log.error(&format!("No type for profile name '{}'", name));
                    return Err(ProfileError::UnknownType {
                        name: name.to_string(),
                    });
                }
            }
        }
        self.lookup(name)
    }

    /// Canonical base type for a definition-record index.
    pub fn base_type_by_index(&self, index: u8) -> Result<&Type, ProfileError> {
        let name = self
            .base_types
            .get(index as usize)
            .ok_or(ProfileError::UnknownBaseType { index })?;
        self.lookup(name)
    }

    /// Installs a type. A duplicate name with the same size keeps the
    /// existing entry under a warning; differing sizes are a conflict.
    pub fn install(&mut self, ty: Type) -> Result<(), ProfileError> {
        if let Some(existing) = self.types.get(&ty.name) {
            if existing.size == ty.size {
                self.log
                    .warn(&format!("Ignoring duplicate type for '{}'", ty.name));
                return Ok(());
            }
            return Err(ProfileError::DuplicateTypeConflict {
                name: ty.name.clone(),
                existing: existing.size,
                duplicate: ty.size,
            });
        }
        self.types.insert(ty.name.clone(), ty);
        Ok(())
    }

    pub(crate) fn set_log(&mut self, log: SharedLog) {
        self.log = log;
    }
}
