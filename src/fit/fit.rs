//! FIT decode loop.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use binread::BinReaderExt;
use rayon::prelude::*;

use crate::errors::FitError;
use crate::profile::Profile;

use super::data_record::DataRecord;
use super::definition_message::DefinitionMessage;
use super::fit_header::FitHeader;
use super::message_header::{MessageHeader, RecordKind};

/// Walks a FIT byte stream against a compiled profile.
///
/// The decoder owns the per-file state: the table of the latest
/// definition per local message id (ids 0-15, overwritten as the file
/// declares new ones) and the read position. The profile itself is
/// shared and read-only, so independent files may decode concurrently,
/// one decoder each.
#[derive(Debug)]
pub struct RecordDecoder<'a> {
    profile: &'a Profile,
    definitions: HashMap<u8, DefinitionMessage>,
}

impl<'a> RecordDecoder<'a> {
    pub fn new(profile: &'a Profile) -> Self {
        Self {
            profile,
            definitions: HashMap::new(),
        }
    }

    /// Decodes the file header and every record in the stream, strictly
    /// in order. Definition records mutate the local-id table observed
    /// by the data records after them.
    ///
    /// A record whose field sizes do not divide by their type sizes is
    /// logged and skipped; the rest of the file still decodes.
    pub fn decode(&mut self, data: &[u8]) -> Result<(FitHeader, Vec<DataRecord>), FitError> {
        let header = FitHeader::read(data, self.profile)?;
        let end = header.end();
        let mut cursor = Cursor::new(data);
        cursor.set_position(header.header_size as u64);
        let mut records = Vec::new();

        while cursor.position() < end {
            let offset = cursor.position();
            let message_header: MessageHeader = cursor.read_ne()?;

            match message_header.kind() {
                RecordKind::CompressedTimestamp => {
                    return Err(FitError::UnsupportedCompressedTimestamp { offset })
                }
                RecordKind::Definition => {
                    let definition = DefinitionMessage::read(&mut cursor, &message_header)?;
                    self.definitions
                        .insert(message_header.local_id(), definition);
                }
                RecordKind::Data => {
                    let local = message_header.local_id();
                    let definition = self
                        .definitions
                        .get(&local)
                        .ok_or(FitError::UnknownDefinition { local, offset })?;
                    let size = definition.data_size();
                    let start = cursor.position() as usize;
                    let slice = data.get(start..start + size).ok_or(FitError::TruncatedRecord {
                        offset: start as u64,
                        needed: size,
                        available: data.len().saturating_sub(start),
                    })?;
                    let message = self.profile.messages.message_by_number(definition.global);
                    match DataRecord::decode(self.profile, message, definition, slice) {
                        Ok(record) => records.push(record),
                        Err(err @ FitError::SizeMismatch { .. }) => {
                            self.profile.log.error(&err.to_string())
                        }
                        Err(err) => return Err(err),
                    }
                    cursor.set_position((start + size) as u64);
                }
            }
        }

        Ok((header, records))
    }
}

/// A decoded FIT file: header plus all data records in logging order.
#[derive(Debug, Clone)]
pub struct Fit {
    pub path: PathBuf,
    pub header: FitHeader,
    pub records: Vec<DataRecord>,
}

impl Fit {
    /// Reads and decodes the file at `path`.
    pub fn new(path: &Path, profile: &Profile) -> Result<Self, FitError> {
        let data = std::fs::read(path)?;
        let mut fit = Self::from_bytes(&data, profile)?;
        fit.path = path.to_owned();
        Ok(fit)
    }

    /// Decodes an in-memory FIT byte stream.
    pub fn from_bytes(data: &[u8], profile: &Profile) -> Result<Self, FitError> {
        let mut decoder = RecordDecoder::new(profile);
        let (header, records) = decoder.decode(data)?;
        Ok(Self {
            path: PathBuf::new(),
            header,
            records,
        })
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataRecord> {
        self.records.iter()
    }

    /// Records of one message type.
    pub fn filter(&self, name: &str) -> Vec<DataRecord> {
        self.records
            .par_iter()
            .filter(|record| record.name == name)
            .cloned()
            .collect()
    }

    /// Groups records into message types. Key is the message profile
    /// name (or placeholder name for unknown messages).
    pub fn group(&self) -> HashMap<String, Vec<DataRecord>> {
        let mut grouped: HashMap<String, Vec<DataRecord>> = HashMap::new();
        self.records.iter().for_each(|record| {
            grouped
                .entry(record.name.clone())
                .or_insert(Vec::new())
                .push(record.to_owned())
        });
        grouped
    }
}
