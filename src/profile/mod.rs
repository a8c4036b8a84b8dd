//! Compiled FIT profile: the type registry plus the message catalog.
//!
//! A profile is compiled once from the profile workbook (or reloaded
//! from the schema cache) and is immutable afterwards, so it can be
//! shared by reference among any number of decoders.

pub mod cache;
pub mod compiler;
pub mod messages;
pub mod types;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ProfileError;
use crate::log::SharedLog;

pub use compiler::{Cell, Row};
pub use messages::{Field, Message, MessageCatalog, MessageKind};
pub use types::{Endian, Type, TypeKind, TypeRegistry, Value};

/// The compiled decoding schema.
///
/// The log handle is not part of the schema itself: the cache skips it
/// and [`Profile::load`] rebinds it, so a reloaded profile reports
/// through the caller's current sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(skip)]
    pub log: SharedLog,
    pub types: TypeRegistry,
    pub messages: MessageCatalog,
}

impl Profile {
    /// Compiles the profile workbook at `path`. The workbook is read
    /// into rows and released before compilation proper.
    pub fn compile(path: &Path, log: SharedLog) -> Result<Self, ProfileError> {
        let (types_rows, messages_rows) = compiler::read_workbook(path)?;
        Self::compile_rows(types_rows, messages_rows, log)
    }

    /// Compiles from in-memory sheet rows: the `Types` sheet first, then
    /// `Messages`.
    pub fn compile_rows(
        types_rows: Vec<Row>,
        messages_rows: Vec<Row>,
        log: SharedLog,
    ) -> Result<Self, ProfileError> {
        let mut types = TypeRegistry::new(log.clone())?;
        compiler::compile_types(types_rows, &mut types, &log)?;
        let mut messages = MessageCatalog::new(log.clone());
        compiler::compile_messages(messages_rows, &mut types, &mut messages, &log)?;
        Ok(Self {
            log,
            types,
            messages,
        })
    }

    /// Rebinds the log handle, including the registry's and catalog's
    /// copies. Used after deserialization.
    pub fn set_log(&mut self, log: SharedLog) {
        self.types.set_log(log.clone());
        self.messages.set_log(log.clone());
        self.log = log;
    }

    /// The synthetic message describing the file header.
    pub fn header_message(&self) -> Result<&Message, ProfileError> {
        self.messages.message("HEADER")
    }
}
