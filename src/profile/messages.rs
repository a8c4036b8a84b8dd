//! Profile messages and the message catalog.
//!
//! A message owns an arena of fields indexed both by profile name and by
//! field number. Dynamic alternatives are stashed as raw rows during the
//! first pass over a message block and rewritten into the per-field
//! dynamic table once every sibling exists, since the profile allows
//! forward references within a message.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{FitError, ProfileError};
use crate::log::SharedLog;

use super::compiler::{cell, Cell, Row};
use super::types::TypeRegistry;

/// Layout of the synthetic file-header message: name, element count,
/// profile type. Field numbers follow array order.
pub(crate) const HEADER_FIELDS: [(&str, usize, &str); 6] = [
    ("header_size", 1, "uint8"),
    ("protocol_version", 1, "uint8"),
    ("profile_version", 1, "uint16"),
    ("data_size", 1, "uint32"),
    ("fit_text", 4, "string"),
    ("checksum", 1, "uint16"),
];

/// Dynamic-alternative reference noted during the row pass, resolved by
/// [`Message::complete_dynamic`].
#[derive(Debug, Clone)]
pub(crate) struct PendingDynamic {
    reference: String,
    literal: String,
    row: Row,
}

/// A message field. A field without a number only ever appears as a
/// dynamic alternative of an owning field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub number: Option<u8>,
    pub units: String,
    pub type_name: String,
    references: Vec<String>,
    dynamic: HashMap<(String, i64), Field>,
    #[serde(skip)]
    pending: Vec<PendingDynamic>,
}

impl Field {
    pub(crate) fn new(name: &str, number: Option<u8>, units: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            number,
            units: units.to_string(),
            type_name: type_name.to_string(),
            references: Vec::new(),
            dynamic: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Field from a message-block row: number from cell 1, name from
    /// cell 2, type from cell 3 (auto-created if needed), units from
    /// cell 8.
    pub(crate) fn from_row(row: &[Cell], registry: &mut TypeRegistry) -> Result<Self, ProfileError> {
        let name = match cell(row, 2) {
            Cell::Empty => {
                return Err(ProfileError::BadLiteral {
                    literal: String::new(),
                    expected: "a field name",
                })
            }
            other => other.to_text(),
        };
        let number = match cell(row, 1) {
            Cell::Empty => None,
            other => {
                let value = other.as_int()?;
                let number = u8::try_from(value).map_err(|_| ProfileError::BadLiteral {
                    literal: other.to_text(),
                    expected: "a field number",
                })?;
                Some(number)
            }
        };
        let type_name = match cell(row, 3) {
            Cell::Empty => {
                return Err(ProfileError::BadLiteral {
                    literal: String::new(),
                    expected: "a type name",
                })
            }
            other => other.to_text(),
        };
        registry.lookup_or_autocreate(&type_name)?;
        Ok(Self::new(&name, number, &cell(row, 8).to_text(), &type_name))
    }

    pub(crate) fn stash_dynamic(&mut self, reference: &str, literal: &str, row: Row) {
        self.pending.push(PendingDynamic {
            reference: reference.to_string(),
            literal: literal.to_string(),
            row,
        });
    }

    /// True iff the field has dynamic alternatives.
    pub fn is_dynamic(&self) -> bool {
        !self.dynamic.is_empty() || !self.pending.is_empty()
    }

    /// Reference fields whose runtime value selects the alternative,
    /// in profile order.
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Alternative installed for a reference field and internal value.
    pub fn dynamic_alternative(&self, reference: &str, value: i64) -> Option<&Field> {
        self.dynamic.get(&(reference.to_string(), value))
    }

    /// Picks the field to decode through: probes the dynamic table with
    /// the already-decoded sibling values, first hit wins, the generic
    /// field itself when nothing matches. Decoding a dynamic field with
    /// no sibling values at all is an error.
    pub fn resolve_dynamic<'a>(
        &'a self,
        siblings: Option<&HashMap<String, i64>>,
    ) -> Result<&'a Field, FitError> {
        if !self.is_dynamic() {
            return Ok(self);
        }
        let siblings = siblings.ok_or_else(|| FitError::DynamicUnresolvable {
            field: self.name.clone(),
        })?;
        for reference in &self.references {
            if let Some(value) = siblings.get(reference) {
                if let Some(alternative) = self.dynamic.get(&(reference.clone(), *value)) {
                    return Ok(alternative);
                }
            }
        }
        Ok(self)
    }
}

/// Distinguishes the synthetic file-header message, whose checksum field
/// is suppressed for 12-byte headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Profile,
    Header,
}

/// A named message with its ordered field set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub name: String,
    pub number: Option<u16>,
    pub kind: MessageKind,
    fields: Vec<Field>,
    by_name: HashMap<String, usize>,
    by_number: HashMap<u8, usize>,
}

impl Message {
    pub(crate) fn new(name: &str, number: Option<u16>, kind: MessageKind) -> Self {
        Self {
            name: name.to_string(),
            number,
            kind,
            fields: Vec::new(),
            by_name: HashMap::new(),
            by_number: HashMap::new(),
        }
    }

    pub(crate) fn add_field(&mut self, field: Field) {
        let index = self.fields.len();
        self.by_name.insert(field.name.clone(), index);
        if let Some(number) = field.number {
            self.by_number.insert(number, index);
        }
        self.fields.push(field);
    }

    pub fn field_by_name(&self, name: &str) -> Result<&Field, ProfileError> {
        self.by_name
            .get(name)
            .map(|index| &self.fields[*index])
            .ok_or_else(|| ProfileError::UnknownField {
                message: self.name.clone(),
                field: name.to_string(),
            })
    }

    pub fn field_by_number(&self, number: u8) -> Result<&Field, ProfileError> {
        self.by_number
            .get(&number)
            .map(|index| &self.fields[*index])
            .ok_or_else(|| ProfileError::UnknownFieldNumber {
                message: self.name.clone(),
                number,
            })
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Second pass: rewrites every stashed dynamic tuple into table
    /// entries, now that forward references can resolve. The reference
    /// value literal is converted through the reference field's type.
    pub(crate) fn complete_dynamic(&mut self, registry: &mut TypeRegistry) -> Result<(), ProfileError> {
        for index in 0..self.fields.len() {
            let pending = std::mem::take(&mut self.fields[index].pending);
            if pending.is_empty() {
                continue;
            }
            let mut resolved = Vec::with_capacity(pending.len());
            for entry in pending {
                let reference_index = *self.by_name.get(&entry.reference).ok_or_else(|| {
                    ProfileError::DanglingDynamicReference {
                        message: self.name.clone(),
                        field: self.fields[index].name.clone(),
                        reference: entry.reference.clone(),
                    }
                })?;
                let reference_type = self.fields[reference_index].type_name.clone();
                let value = registry
                    .lookup(&reference_type)?
                    .profile_to_internal(&Cell::Text(entry.literal))?;
                let alternative = Field::from_row(&entry.row, registry)?;
                resolved.push((entry.reference, value, alternative));
            }
            let field = &mut self.fields[index];
            for (reference, value, alternative) in resolved {
                if !field.references.contains(&reference) {
                    field.references.push(reference.clone());
                }
                field.dynamic.insert((reference, value), alternative);
            }
        }
        Ok(())
    }
}

/// The synthetic message describing the fixed file-header layout.
pub(crate) fn header_message(registry: &TypeRegistry) -> Result<Message, ProfileError> {
    let mut message = Message::new("HEADER", None, MessageKind::Header);
    for (number, (name, _count, type_name)) in HEADER_FIELDS.iter().enumerate() {
        registry.lookup(type_name)?;
        message.add_field(Field::new(name, Some(number as u8), "", type_name));
    }
    Ok(message)
}

/// Every named message, installed once during compilation and read-only
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCatalog {
    messages: Vec<Message>,
    by_name: HashMap<String, usize>,
    by_number: HashMap<u16, usize>,
    #[serde(skip)]
    log: SharedLog,
}

impl MessageCatalog {
    pub(crate) fn new(log: SharedLog) -> Self {
        Self {
            messages: Vec::new(),
            by_name: HashMap::new(),
            by_number: HashMap::new(),
            log,
        }
    }

    pub fn message(&self, name: &str) -> Result<&Message, ProfileError> {
        self.by_name
            .get(name)
            .map(|index| &self.messages[*index])
            .ok_or_else(|| {
                self.log.error(&format!("No message for profile name '{}'", name));
                ProfileError::UnknownMessage {
                    name: name.to_string(),
                }
            })
    }

    /// Global message number lookup. Unknown numbers are the caller's
    /// concern; the decoder substitutes a placeholder.
    pub fn message_by_number(&self, number: u16) -> Option<&Message> {
        self.by_number.get(&number).map(|index| &self.messages[*index])
    }

    pub(crate) fn install(&mut self, message: Message) {
        let index = self.messages.len();
        self.by_name.insert(message.name.clone(), index);
        if let Some(number) = message.number {
            self.by_number.insert(number, index);
        }
        self.messages.push(message);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn set_log(&mut self, log: SharedLog) {
        self.log = log;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_message_lists_the_fixed_fields() {
        let registry = TypeRegistry::new(SharedLog::unbound()).unwrap();
        let header = header_message(&registry).unwrap();
        assert_eq!(header.kind, MessageKind::Header);
        assert_eq!(header.number, None);
        let names: Vec<&str> = header.fields().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "header_size",
                "protocol_version",
                "profile_version",
                "data_size",
                "fit_text",
                "checksum"
            ]
        );
        assert_eq!(header.field_by_number(4).unwrap().name, "fit_text");
    }

    #[test]
    fn dynamic_field_without_siblings_is_an_error() {
        let mut field = Field::new("target_value", Some(1), "", "uint16");
        field.dynamic.insert(
            ("sport".to_string(), 2),
            Field::new("target_hr_zone", None, "bpm", "uint8"),
        );
        field.references.push("sport".to_string());
        assert!(matches!(
            field.resolve_dynamic(None),
            Err(FitError::DynamicUnresolvable { .. })
        ));
    }

    #[test]
    fn dynamic_resolution_prefers_first_matching_reference() {
        let mut field = Field::new("target_value", Some(1), "", "uint16");
        field.references.push("sport".to_string());
        field.references.push("sub_sport".to_string());
        field.dynamic.insert(
            ("sport".to_string(), 2),
            Field::new("target_hr_zone", None, "bpm", "uint8"),
        );
        field.dynamic.insert(
            ("sub_sport".to_string(), 7),
            Field::new("target_power_zone", None, "W", "uint8"),
        );
        let mut siblings = HashMap::new();
        siblings.insert("sport".to_string(), 2i64);
        siblings.insert("sub_sport".to_string(), 7i64);
        let resolved = field.resolve_dynamic(Some(&siblings)).unwrap();
        assert_eq!(resolved.name, "target_hr_zone");
        // No hit anywhere falls back to the generic field.
        let mut other = HashMap::new();
        other.insert("sport".to_string(), 5i64);
        let generic = field.resolve_dynamic(Some(&other)).unwrap();
        assert_eq!(generic.name, "target_value");
    }

    #[test]
    fn field_indexes_cover_names_and_numbers() {
        let mut message = Message::new("workout", Some(26), MessageKind::Profile);
        message.add_field(Field::new("sport", Some(4), "", "enum"));
        message.add_field(Field::new("capabilities", Some(5), "", "uint32z"));
        assert_eq!(message.field_by_number(4).unwrap().name, "sport");
        assert_eq!(
            message.field_by_name("capabilities").unwrap().number,
            Some(5)
        );
        assert!(matches!(
            message.field_by_number(9),
            Err(ProfileError::UnknownFieldNumber { number: 9, .. })
        ));
        assert!(matches!(
            message.field_by_name("missing"),
            Err(ProfileError::UnknownField { .. })
        ));
    }
}
