//! FIT file header, 12 or 14 bytes.

use crate::errors::FitError;
use crate::profile::messages::HEADER_FIELDS;
use crate::profile::types::Endian;
use crate::profile::Profile;

use super::data_record::DataRecord;
use super::definition_message::{DefinitionField, DefinitionMessage};

/// Decoded file header. The control fields needed to walk the file are
/// carried directly; `record` is the same header decoded through the
/// synthetic header message, with the checksum suppressed for 12-byte
/// headers.
#[derive(Debug, Clone)]
pub struct FitHeader {
    /// Byte 0: size of the header itself, 12 or 14.
    pub header_size: u8,
    /// Byte 1: protocol version.
    pub protocol_version: u8,
    /// Bytes 2-3: profile version, little endian.
    pub profile_version: u16,
    /// Bytes 4-7: size of the data payload after the header, little
    /// endian.
    pub data_size: u32,
    /// Bytes 12-13: checksum, only present in 14-byte headers. Verifying
    /// it is out of scope; it is recognized, not checked.
    pub crc: Option<u16>,
    /// The header as a decoded record mapping.
    pub record: DataRecord,
}

impl FitHeader {
    /// Reads and validates the header at the start of `data`.
    pub fn read(data: &[u8], profile: &Profile) -> Result<Self, FitError> {
        let header_size = *data.first().ok_or(FitError::MalformedHeaderSize { size: 0 })?;
        if header_size != 12 && header_size != 14 {
            return Err(FitError::MalformedHeaderSize { size: header_size });
        }
        let size = header_size as usize;
        let slice = data.get(..size).ok_or(FitError::TruncatedRecord {
            offset: 0,
            needed: size,
            available: data.len(),
        })?;
        let magic = &slice[8..12];
        if magic != b".FIT" {
            return Err(FitError::MalformedHeaderMagic {
                text: String::from_utf8_lossy(magic).into_owned(),
            });
        }
        let definition = Self::definition(profile)?;
        let message = profile.header_message()?;
        let record = DataRecord::decode(profile, Some(message), &definition, slice)?;
        Ok(Self {
            header_size,
            protocol_version: slice[1],
            profile_version: u16::from_le_bytes([slice[2], slice[3]]),
            data_size: u32::from_le_bytes([slice[4], slice[5], slice[6], slice[7]]),
            crc: if size == 14 {
                Some(u16::from_le_bytes([slice[12], slice[13]]))
            } else {
                None
            },
            record,
        })
    }

    /// Synthetic definition for the fixed header layout. All header
    /// fields are little endian regardless of the records that follow.
    fn definition(profile: &Profile) -> Result<DefinitionMessage, FitError> {
        let mut fields = Vec::with_capacity(HEADER_FIELDS.len());
        for (number, (_name, count, type_name)) in HEADER_FIELDS.iter().enumerate() {
            let ty = profile.types.lookup(type_name)?;
            fields.push(DefinitionField {
                number: number as u8,
                size: (count * ty.size) as u8,
                base_type: 0,
            });
        }
        Ok(DefinitionMessage {
            reserved: 0,
            endian: Endian::Little,
            global: 0,
            fields,
            dev_fields: Vec::new(),
        })
    }

    /// Offset just past the data payload.
    pub fn end(&self) -> u64 {
        self.header_size as u64 + self.data_size as u64
    }
}
