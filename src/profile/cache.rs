//! Schema cache.
//!
//! Compiling the full profile workbook is slow enough to be worth doing
//! once: the compiled registry and catalog serialize to a single cache
//! file that later runs load instead. The log handle is deliberately
//! not part of the serialized form; the loader rebinds it before
//! handing the profile back.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::errors::ProfileError;
use crate::log::SharedLog;

use super::Profile;

/// Well-known cache file name under the application's resource
/// directory.
pub const CACHE_FILE_NAME: &str = "fit-profile.bin";

/// The conventional cache location under `dir`.
pub fn cache_path(dir: &Path) -> PathBuf {
    dir.join(CACHE_FILE_NAME)
}

impl Profile {
    /// Writes the compiled schema to `path`. The output stream lives
    /// only for the duration of the call.
    pub fn save(&self, path: &Path) -> Result<(), ProfileError> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Loads a compiled schema from `path` and rebinds its log handle
    /// to `log` before returning it.
    pub fn load(path: &Path, log: SharedLog) -> Result<Self, ProfileError> {
        let file = File::open(path)?;
        let mut profile: Profile = bincode::deserialize_from(BufReader::new(file))?;
        profile.set_log(log);
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::compiler::{Cell, Row};
    use crate::profile::types::{Endian, Value};

    fn rows() -> (Vec<Row>, Vec<Row>) {
        let text = |s: &str| Cell::Text(s.to_string());
        let types = vec![
            vec![text("mesg_num"), text("uint16")],
            vec![Cell::Empty, Cell::Empty, text("session"), Cell::Int(18)],
            vec![text("file"), text("enum")],
            vec![Cell::Empty, Cell::Empty, text("activity"), Cell::Int(4)],
        ];
        let messages = vec![
            vec![text("session")],
            {
                let mut row = vec![Cell::Empty; 9];
                row[1] = Cell::Int(0);
                row[2] = text("file_type");
                row[3] = text("file");
                row
            },
        ];
        (types, messages)
    }

    #[test]
    fn cache_round_trip_preserves_schema_and_rebinds_log() {
        let (types, messages) = rows();
        let profile = Profile::compile_rows(types, messages, SharedLog::unbound()).unwrap();
        let path = std::env::temp_dir().join(format!("fitprofile-cache-{}.bin", std::process::id()));
        profile.save(&path).unwrap();

        let log = SharedLog::new(std::sync::Arc::new(crate::log::StdLog));
        let reloaded = Profile::load(&path, log).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(reloaded.log.is_bound());
        let file = reloaded.types.lookup("file").unwrap();
        assert_eq!(
            file.decode(&[0x04], 1, Endian::Little).unwrap(),
            Some(Value::Uint(4))
        );
        assert_eq!(file.internal_to_profile(4).unwrap(), "activity");
        let session = reloaded.messages.message("session").unwrap();
        assert_eq!(session.number, Some(18));
        assert_eq!(session.field_by_number(0).unwrap().name, "file_type");
        assert!(reloaded.messages.message("HEADER").is_ok());
    }

    #[test]
    fn cache_path_uses_the_well_known_name() {
        let path = cache_path(Path::new("/tmp"));
        assert!(path.ends_with(CACHE_FILE_NAME));
    }
}
