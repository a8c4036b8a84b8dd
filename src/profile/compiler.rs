//! Profile table compiler.
//!
//! The profile ships as a workbook with a `Types` and a `Messages` sheet.
//! Both sheets are streamed as rows of untyped cells; a row whose first
//! cell is non-empty and starts lowercase opens a block (a mapping type
//! or a message), commentary rows starting uppercase are skipped, and
//! block compilers consume trailing rows through a peekable iterator so
//! the terminating row stays available to the driver.

use std::fs::File;
use std::io::BufReader;
use std::iter::Peekable;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};

use crate::errors::ProfileError;
use crate::log::SharedLog;

use super::messages::{header_message, Field, Message, MessageCatalog, MessageKind};
use super::types::{Mapping, Type, TypeRegistry};

/// An untyped profile cell. Blank cells are distinct from empty strings:
/// blanks end a block, an empty string is merely falsy in the header
/// heuristic.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Number(f64),
    Bool(bool),
}

/// One sheet row.
pub type Row = Vec<Cell>;

impl Cell {
    /// A truly blank cell.
    pub fn is_blank(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Truthiness the way the row heuristics need it: blank cells, empty
    /// strings and zeros all read as false.
    pub fn truthy(&self) -> bool {
        match self {
            Cell::Empty => false,
            Cell::Text(text) => !text.is_empty(),
            Cell::Int(value) => *value != 0,
            Cell::Number(value) => *value != 0.0,
            Cell::Bool(value) => *value,
        }
    }

    /// Canonical text rendering. Integral numbers render without a
    /// fraction since the workbook stores most numbers as floats.
    pub fn to_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(text) => text.clone(),
            Cell::Int(value) => value.to_string(),
            Cell::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 9e15 {
                    (*value as i64).to_string()
                } else {
                    value.to_string()
                }
            }
            Cell::Bool(value) => value.to_string(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Integer view. Text parses with auto-detected base (`0x...`).
    pub fn as_int(&self) -> Result<i64, ProfileError> {
        match self {
            Cell::Int(value) => Ok(*value),
            Cell::Number(value) if value.fract() == 0.0 => Ok(*value as i64),
            Cell::Text(text) => parse_int_literal(text),
            other => Err(ProfileError::BadLiteral {
                literal: other.to_text(),
                expected: "an integer",
            }),
        }
    }

    pub fn as_number(&self) -> Result<f64, ProfileError> {
        match self {
            Cell::Int(value) => Ok(*value as f64),
            Cell::Number(value) => Ok(*value),
            Cell::Text(text) => text.trim().parse().map_err(|_| ProfileError::BadLiteral {
                literal: text.clone(),
                expected: "a number",
            }),
            other => Err(ProfileError::BadLiteral {
                literal: other.to_text(),
                expected: "a number",
            }),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(text) => Cell::Text(text.clone()),
            Data::Int(value) => Cell::Int(*value),
            Data::Float(value) => Cell::Number(*value),
            Data::Bool(value) => Cell::Bool(*value),
            Data::DateTime(value) => Cell::Number(value.as_f64()),
            Data::DateTimeIso(text) | Data::DurationIso(text) => Cell::Text(text.clone()),
            Data::Error(_) => Cell::Empty,
        }
    }
}

/// Cell at `index`, blank when the row is shorter.
pub(crate) fn cell(row: &[Cell], index: usize) -> &Cell {
    row.get(index).unwrap_or(&Cell::Empty)
}

/// Integer literal with auto-detected base.
fn parse_int_literal(text: &str) -> Result<i64, ProfileError> {
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let parsed = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse(),
    };
    let value = parsed.map_err(|_| ProfileError::BadLiteral {
        literal: text.to_string(),
        expected: "an integer",
    })?;
    Ok(if negative { -value } else { value })
}

fn starts_uppercase(text: &str) -> bool {
    text.chars().next().map_or(false, char::is_uppercase)
}

/// Reads the two profile sheets. The workbook is opened, drained into
/// rows and released before compilation proper starts.
pub(crate) fn read_workbook(path: &Path) -> Result<(Vec<Row>, Vec<Row>), ProfileError> {
    let mut workbook = open_workbook_auto(path)?;
    let types = sheet_rows(&mut workbook, "Types")?;
    let messages = sheet_rows(&mut workbook, "Messages")?;
    Ok((types, messages))
}

fn sheet_rows(workbook: &mut Sheets<BufReader<File>>, name: &str) -> Result<Vec<Row>, ProfileError> {
    if !workbook.sheet_names().iter().any(|sheet| sheet.as_str() == name) {
        return Err(ProfileError::MissingSheet {
            name: name.to_string(),
        });
    }
    let range = workbook.worksheet_range(name)?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect())
        .collect())
}

/// Drives the `Types` sheet: one mapping type per block.
pub(crate) fn compile_types(
    rows: impl IntoIterator<Item = Row>,
    registry: &mut TypeRegistry,
    log: &SharedLog,
) -> Result<(), ProfileError> {
    let mut rows = rows.into_iter().peekable();
    while let Some(row) = rows.next() {
        let head = cell(&row, 0);
        if !head.truthy() {
            continue;
        }
        let name = head.to_text();
        if starts_uppercase(&name) {
            log.debug(&format!("Skipping commentary row '{}'", name));
            continue;
        }
        log.info(&format!("Parsing type {}", name));
        let compiled = compile_mapping(&row, &mut rows, registry, log)?;
        registry.install(compiled)?;
    }
    Ok(())
}

/// One type block: the header row names the type and its base type, the
/// trailing rows are enumeration values until a row with a non-blank
/// first cell or a blank name/literal cell, which stays in the iterator.
fn compile_mapping<I>(
    header: &Row,
    rows: &mut Peekable<I>,
    registry: &mut TypeRegistry,
    log: &SharedLog,
) -> Result<Type, ProfileError>
where
    I: Iterator<Item = Row>,
{
    let name = cell(header, 0).to_text();
    let base_cell = cell(header, 1);
    if base_cell.is_blank() {
        return Err(ProfileError::BadLiteral {
            literal: name,
            expected: "a base type name",
        });
    }
    let base = registry.lookup_or_autocreate(&base_cell.to_text())?.clone();
    let mut mapping = Mapping::new(base);
    while let Some(row) = rows.next_if(|row| {
        !cell(row, 0).truthy() && !cell(row, 2).is_blank() && !cell(row, 3).is_blank()
    }) {
        let profile = cell(&row, 2).to_text();
        let internal = mapping.base.profile_to_internal(cell(&row, 3))?;
        mapping.insert(profile, internal);
    }
    log.debug(&format!("Parsed {} values", mapping.len()));
    Ok(Type::mapping(&name, mapping))
}

/// Drives the `Messages` sheet, then installs the synthetic header
/// message.
pub(crate) fn compile_messages(
    rows: impl IntoIterator<Item = Row>,
    registry: &mut TypeRegistry,
    catalog: &mut MessageCatalog,
    log: &SharedLog,
) -> Result<(), ProfileError> {
    let mut rows = rows.into_iter().peekable();
    while let Some(row) = rows.next() {
        let head = cell(&row, 0);
        if !head.truthy() {
            continue;
        }
        let name = head.to_text();
        if starts_uppercase(&name) {
            log.debug(&format!("Skipping commentary row '{}'", name));
            continue;
        }
        log.info(&format!("Parsing message {}", name));
        let message = compile_message(&name, &mut rows, registry, log)?;
        catalog.install(message);
    }
    catalog.install(header_message(registry)?);
    Ok(())
}

/// One message block. Rows with a field name are consumed: a number in
/// cell 1 introduces a field, a blank cell 1 adds a dynamic alternative
/// to the previous field. A row without a field name terminates the
/// block and stays in the iterator.
fn compile_message<I>(
    name: &str,
    rows: &mut Peekable<I>,
    registry: &mut TypeRegistry,
    log: &SharedLog,
) -> Result<Message, ProfileError>
where
    I: Iterator<Item = Row>,
{
    let number = message_number(name, registry, log)?;
    let mut message = Message::new(name, number, MessageKind::Profile);
    while let Some(row) = rows.next_if(|row| cell(row, 2).truthy()) {
        let mut field = Field::from_row(&row, registry)?;
        while let Some(alternative) =
            rows.next_if(|row| cell(row, 2).truthy() && cell(row, 1).is_blank())
        {
            let names = cell(&alternative, 11).to_text();
            let values = cell(&alternative, 12).to_text();
            if names.is_empty() || values.is_empty() {
                log.warn(&format!(
                    "Dynamic row for field '{}' in message '{}' lacks references",
                    field.name, name
                ));
                continue;
            }
            for (reference, value) in names.split(',').zip(values.split(',')) {
                field.stash_dynamic(reference.trim(), value.trim(), alternative.clone());
            }
        }
        message.add_field(field);
    }
    // References may point forward within the message.
    message.complete_dynamic(registry)?;
    Ok(message)
}

/// The message's numeric id according to the `mesg_num` mapping. Absent
/// entries leave the message addressable by name only.
fn message_number(
    name: &str,
    registry: &TypeRegistry,
    log: &SharedLog,
) -> Result<Option<u16>, ProfileError> {
    let internal = registry
        .lookup("mesg_num")
        .and_then(|ty| ty.profile_to_internal(&Cell::Text(name.to_string())));
    match internal {
        Ok(value) => match u16::try_from(value) {
            Ok(number) => Ok(Some(number)),
            Err(_) => {
                log.warn(&format!("No mesg_num for '{}'", name));
                Ok(None)
            }
        },
        Err(ProfileError::UnknownType { .. }) | Err(ProfileError::UnknownEnumLiteral { .. }) => {
            log.warn(&format!("No mesg_num for '{}'", name));
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
