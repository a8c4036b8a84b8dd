//! Definition records.

use std::io::Cursor;

use binread::{BinRead, BinReaderExt};

use crate::errors::FitError;
use crate::profile::types::{read_endian, Endian};

use super::message_header::MessageHeader;

/// 3-byte field descriptor inside a definition record. For developer
/// fields the third byte is the developer data index rather than a base
/// type.
#[derive(Debug, Clone, Copy, BinRead)]
pub struct DefinitionField {
    pub number: u8,
    pub size: u8,
    pub base_type: u8,
}

impl DefinitionField {
    /// Canonical base-type index: the low five bits. The top bit only
    /// flags endian ability.
    pub fn base_type_index(&self) -> u8 {
        self.base_type & 0x1F
    }
}

/// Declares the layout of the data records bound to one local message
/// id until the next definition overwrites that id.
#[derive(Debug, Clone)]
pub struct DefinitionMessage {
    pub reserved: u8,
    pub endian: Endian,
    pub global: u16,
    pub fields: Vec<DefinitionField>,
    pub dev_fields: Vec<DefinitionField>,
}

impl DefinitionMessage {
    /// Reads the definition payload following its record header.
    /// The global message number uses the endianness the record itself
    /// declares.
    pub fn read(cursor: &mut Cursor<&[u8]>, header: &MessageHeader) -> Result<Self, FitError> {
        let reserved: u8 = cursor.read_ne()?;
        let arch: u8 = cursor.read_ne()?;
        let endian = match arch {
            0 => Endian::Little,
            1 => Endian::Big,
            _ => {
                return Err(FitError::InvalidArchitecture {
                    arch,
                    offset: cursor.position(),
                })
            }
        };
        let global: u16 = read_endian(cursor, endian)?;
        let count: u8 = cursor.read_ne()?;
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            fields.push(cursor.read_ne::<DefinitionField>()?);
        }
        let mut dev_fields = Vec::new();
        if header.has_dev_fields() {
            let dev_count: u8 = cursor.read_ne()?;
            for _ in 0..dev_count {
                dev_fields.push(cursor.read_ne::<DefinitionField>()?);
            }
        }
        Ok(Self {
            reserved,
            endian,
            global,
            fields,
            dev_fields,
        })
    }

    /// Payload size in bytes of a data record bound to this definition,
    /// excluding the record header byte.
    pub fn data_size(&self) -> usize {
        self.fields
            .iter()
            .chain(self.dev_fields.iter())
            .map(|field| field.size as usize)
            .sum()
    }
}
