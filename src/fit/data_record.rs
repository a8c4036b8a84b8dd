//! Decoded data records.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::errors::FitError;
use crate::profile::messages::{Message, MessageKind};
use crate::profile::types::Value;
use crate::profile::Profile;

use super::definition_message::DefinitionMessage;

/// One decoded data record: the message profile name and a mapping from
/// field name (or decimal field number for unknown fields) to the
/// rendered, unit-annotated value. Sentinel-valued fields stay present
/// with a null value.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRecord {
    pub name: String,
    /// Global message number; `None` for the synthetic file header.
    pub global: Option<u16>,
    pub values: BTreeMap<String, Option<String>>,
}

impl DataRecord {
    /// Decodes one record payload against its definition, field by field
    /// in definition order. `message` is the global message when the
    /// profile knows it; without one every field decodes through its
    /// descriptor's base type and the record becomes a `MESSAGE <n>`
    /// placeholder.
    pub(crate) fn decode(
        profile: &Profile,
        message: Option<&Message>,
        definition: &DefinitionMessage,
        data: &[u8],
    ) -> Result<Self, FitError> {
        let name = match message {
            Some(message) => message.name.clone(),
            None => format!("MESSAGE {}", definition.global),
        };
        let global = message.map_or(Some(definition.global), |message| message.number);
        let mut values: BTreeMap<String, Option<String>> = BTreeMap::new();
        // Integer values of fields decoded so far, for dynamic probing.
        let mut internals: HashMap<String, i64> = HashMap::new();
        let mut offset = 0usize;
        for descriptor in &definition.fields {
            // Unknown numbers fall through to base-type decoding below.
            let field = message.and_then(|message| message.field_by_number(descriptor.number).ok());
            if let (Some(message), Some(field)) = (message, field) {
                // 12-byte headers have no checksum bytes to read.
                if message.kind == MessageKind::Header
                    && field.name == "checksum"
                    && internals.get("header_size") == Some(&12)
                {
                    continue;
                }
            }
            let size = descriptor.size as usize;
            let end = offset + size;
            let bytes = data.get(offset..end).ok_or(FitError::TruncatedRecord {
                offset: offset as u64,
                needed: size,
                available: data.len().saturating_sub(offset),
            })?;
            match field {
                Some(field) => {
                    let resolved = field.resolve_dynamic(Some(&internals))?;
                    let ty = profile.types.lookup(&resolved.type_name)?;
                    if ty.size == 0 || size % ty.size != 0 {
                        return Err(FitError::SizeMismatch {
                            message: name.clone(),
                            field: resolved.name.clone(),
                            size: descriptor.size,
                            type_size: ty.size,
                        });
                    }
                    let value = ty.decode(bytes, size / ty.size, definition.endian)?;
                    if let Some(internal) = value.as_ref().and_then(Value::as_internal) {
                        internals.insert(resolved.name.clone(), internal);
                    }
                    values.insert(
                        resolved.name.clone(),
                        value.map(|value| format!("{}{}", value, resolved.units)),
                    );
                }
                None => {
                    let ty = profile
                        .types
                        .base_type_by_index(descriptor.base_type_index())?;
                    if ty.size == 0 || size % ty.size != 0 {
                        return Err(FitError::SizeMismatch {
                            message: name.clone(),
                            field: descriptor.number.to_string(),
                            size: descriptor.size,
                            type_size: ty.size,
                        });
                    }
                    let value = ty.decode(bytes, size / ty.size, definition.endian)?;
                    values.insert(
                        descriptor.number.to_string(),
                        value.map(|value| value.to_string()),
                    );
                }
            }
            offset = end;
        }
        if !definition.dev_fields.is_empty() {
            // Developer payloads decode through field descriptions,
            // an extension point; their bytes are skipped to keep the
            // stream aligned.
            profile.log.debug(&format!(
                "Skipping {} developer fields in '{}'",
                definition.dev_fields.len(),
                name
            ));
        }
        Ok(Self {
            name,
            global,
            values,
        })
    }

    /// Rendered value of a field, `None` when the field is absent or
    /// decoded as missing.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|value| value.as_deref())
    }

    /// True when the field was decoded at all, sentinel values included.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for DataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.global {
            Some(global) => writeln!(f, "Global: {} | {}", global, self.name)?,
            None => writeln!(f, "{}", self.name)?,
        }
        for (name, value) in &self.values {
            writeln!(f, "    {:22} {}", name, value.as_deref().unwrap_or("N/A"))?;
        }
        Ok(())
    }
}
