//! End-to-end decoding against a small compiled profile and synthetic
//! FIT byte streams.

use std::collections::BTreeMap;

use fitprofile_rs::{Cell, Fit, FitError, Profile, Row, SharedLog};

fn text(value: &str) -> Cell {
    Cell::Text(value.to_string())
}

fn type_header(name: &str, base: &str) -> Row {
    vec![text(name), text(base)]
}

fn value_row(profile: &str, internal: i64) -> Row {
    vec![Cell::Empty, Cell::Empty, text(profile), Cell::Int(internal)]
}

fn field_row(number: Option<i64>, name: &str, type_name: &str, units: &str) -> Row {
    let mut row = vec![Cell::Empty; 13];
    if let Some(number) = number {
        row[1] = Cell::Int(number);
    }
    row[2] = text(name);
    row[3] = text(type_name);
    if !units.is_empty() {
        row[8] = text(units);
    }
    row
}

fn dynamic_row(name: &str, type_name: &str, units: &str, refs: &str, values: &str) -> Row {
    let mut row = field_row(None, name, type_name, units);
    row[11] = text(refs);
    row[12] = text(values);
    row
}

fn profile() -> Profile {
    let types = vec![
        type_header("mesg_num", "uint16"),
        value_row("record", 20),
        value_row("workout", 26),
        type_header("sport", "enum"),
        value_row("running", 1),
        value_row("cycling", 2),
    ];
    let messages = vec![
        vec![text("record")],
        field_row(Some(2), "altitude", "uint16", "m"),
        field_row(Some(3), "heart_rate", "uint8", "bpm"),
        vec![text("workout")],
        field_row(Some(4), "sport", "sport", ""),
        field_row(Some(1), "target_value", "uint16", ""),
        dynamic_row("target_hr_zone", "uint8", "bpm", "sport", "cycling"),
    ];
    Profile::compile_rows(types, messages, SharedLog::unbound()).unwrap()
}

/// 12- or 14-byte file header with the given payload size.
fn file_header(header_size: u8, data_size: u32) -> Vec<u8> {
    let mut bytes = vec![header_size, 0x10];
    bytes.extend(2140u16.to_le_bytes());
    bytes.extend(data_size.to_le_bytes());
    bytes.extend(b".FIT");
    if header_size == 14 {
        bytes.extend(0u16.to_le_bytes());
    }
    bytes
}

/// Definition record: header byte, reserved, architecture, global,
/// field count and 3-byte descriptors.
fn definition(local: u8, arch: u8, global: u16, fields: &[(u8, u8, u8)]) -> Vec<u8> {
    let mut bytes = vec![0x40 | local, 0, arch];
    match arch {
        0 => bytes.extend(global.to_le_bytes()),
        _ => bytes.extend(global.to_be_bytes()),
    }
    bytes.push(fields.len() as u8);
    for (number, size, base_type) in fields {
        bytes.extend([*number, *size, *base_type]);
    }
    bytes
}

fn data(local: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![local];
    bytes.extend(payload);
    bytes
}

fn fit_file_with_header(header_size: u8, records: &[Vec<u8>]) -> Vec<u8> {
    let data_size: usize = records.iter().map(Vec::len).sum();
    let mut bytes = file_header(header_size, data_size as u32);
    for record in records {
        bytes.extend(record);
    }
    bytes
}

fn fit_file(records: &[Vec<u8>]) -> Vec<u8> {
    fit_file_with_header(14, records)
}

#[test]
fn known_fields_decode_under_their_profile_names() {
    let profile = profile();
    let bytes = fit_file(&[
        definition(0, 0, 20, &[(3, 1, 2), (2, 2, 0x84)]),
        data(0, &[120, 0x34, 0x12]),
    ]);
    let fit = Fit::from_bytes(&bytes, &profile).unwrap();
    assert_eq!(fit.len(), 1);
    let record = &fit.records[0];
    assert_eq!(record.name, "record");
    assert_eq!(record.global, Some(20));
    let mut expected = BTreeMap::new();
    expected.insert("heart_rate".to_string(), Some("120bpm".to_string()));
    expected.insert("altitude".to_string(), Some("4660m".to_string()));
    assert_eq!(record.values, expected);
}

#[test]
fn sentinel_values_stay_present_as_null() {
    let profile = profile();
    let bytes = fit_file(&[
        definition(0, 0, 20, &[(2, 2, 0x84)]),
        data(0, &[0xFF, 0xFF]),
    ]);
    let fit = Fit::from_bytes(&bytes, &profile).unwrap();
    let record = &fit.records[0];
    assert!(record.contains("altitude"));
    assert_eq!(record.value("altitude"), None);
    assert_eq!(record.values["altitude"], None);
}

#[test]
fn unknown_fields_fall_back_to_their_base_type() {
    let profile = profile();
    // Field 250 is not in the record message; base type index 2 is uint8.
    let bytes = fit_file(&[
        definition(0, 0, 20, &[(250, 1, 2)]),
        data(0, &[0x2A]),
    ]);
    let fit = Fit::from_bytes(&bytes, &profile).unwrap();
    assert_eq!(fit.records[0].values["250"], Some("42".to_string()));
}

#[test]
fn unknown_messages_become_placeholders() {
    let profile = profile();
    let bytes = fit_file(&[
        definition(3, 0, 999, &[(0, 2, 0x84), (1, 1, 2)]),
        data(3, &[0x05, 0x00, 0x07]),
    ]);
    let fit = Fit::from_bytes(&bytes, &profile).unwrap();
    let record = &fit.records[0];
    assert_eq!(record.name, "MESSAGE 999");
    assert_eq!(record.global, Some(999));
    assert_eq!(record.values["0"], Some("5".to_string()));
    assert_eq!(record.values["1"], Some("7".to_string()));
}

#[test]
fn dynamic_field_uses_the_alternative_selected_by_its_reference() {
    let profile = profile();
    // sport = 2 (cycling) selects the uint8 heart-rate alternative.
    let bytes = fit_file(&[
        definition(1, 0, 26, &[(4, 1, 0), (1, 1, 2)]),
        data(1, &[0x02, 0x30]),
    ]);
    let fit = Fit::from_bytes(&bytes, &profile).unwrap();
    let record = &fit.records[0];
    assert_eq!(record.value("sport"), Some("2"));
    assert_eq!(record.value("target_hr_zone"), Some("48bpm"));
    assert!(!record.contains("target_value"));
}

#[test]
fn dynamic_field_without_a_hit_takes_the_generic_type() {
    let profile = profile();
    // sport = 1 (running) has no alternative installed.
    let bytes = fit_file(&[
        definition(1, 0, 26, &[(4, 1, 0), (1, 2, 0x84)]),
        data(1, &[0x01, 0x30, 0x00]),
    ]);
    let fit = Fit::from_bytes(&bytes, &profile).unwrap();
    let record = &fit.records[0];
    assert_eq!(record.value("target_value"), Some("48"));
    assert!(!record.contains("target_hr_zone"));
}

#[test]
fn twelve_byte_headers_suppress_the_checksum() {
    let profile = profile();
    let bytes = fit_file_with_header(12, &[]);
    let fit = Fit::from_bytes(&bytes, &profile).unwrap();
    let header = &fit.header;
    assert_eq!(header.header_size, 12);
    assert_eq!(header.crc, None);
    assert!(!header.record.contains("checksum"));
    assert_eq!(header.record.value("fit_text"), Some(".FIT"));
    assert_eq!(header.record.value("header_size"), Some("12"));
}

#[test]
fn fourteen_byte_headers_carry_the_checksum() {
    let profile = profile();
    let bytes = fit_file(&[]);
    let fit = Fit::from_bytes(&bytes, &profile).unwrap();
    assert_eq!(fit.header.crc, Some(0));
    assert!(fit.header.record.contains("checksum"));
    assert_eq!(fit.header.record.value("profile_version"), Some("2140"));
    assert_eq!(fit.header.record.value("data_size"), Some("0"));
}

#[test]
fn local_id_reassignment_does_not_leak_state() {
    let profile = profile();
    let bytes = fit_file(&[
        definition(0, 0, 20, &[(3, 1, 2)]),
        data(0, &[100]),
        definition(0, 0, 26, &[(4, 1, 0), (1, 1, 2)]),
        data(0, &[0x02, 0x30]),
    ]);
    let fit = Fit::from_bytes(&bytes, &profile).unwrap();
    assert_eq!(fit.len(), 2);
    assert_eq!(fit.records[0].name, "record");
    let first: Vec<&str> = fit.records[0].values.keys().map(String::as_str).collect();
    assert_eq!(first, ["heart_rate"]);
    assert_eq!(fit.records[1].name, "workout");
    let second: Vec<&str> = fit.records[1].values.keys().map(String::as_str).collect();
    assert_eq!(second, ["sport", "target_hr_zone"]);
}

#[test]
fn big_endian_records_decode_per_their_definition() {
    let profile = profile();
    let bytes = fit_file(&[
        definition(0, 1, 20, &[(2, 2, 0x84)]),
        data(0, &[0x12, 0x34]),
    ]);
    let fit = Fit::from_bytes(&bytes, &profile).unwrap();
    assert_eq!(fit.records[0].value("altitude"), Some("4660m"));
}

#[test]
fn compressed_timestamp_headers_are_a_structured_error() {
    let profile = profile();
    let bytes = fit_file(&[vec![0x80]]);
    assert!(matches!(
        Fit::from_bytes(&bytes, &profile),
        Err(FitError::UnsupportedCompressedTimestamp { .. })
    ));
}

#[test]
fn data_before_any_definition_is_an_error() {
    let profile = profile();
    let bytes = fit_file(&[vec![0x05]]);
    assert!(matches!(
        Fit::from_bytes(&bytes, &profile),
        Err(FitError::UnknownDefinition { local: 5, .. })
    ));
}

#[test]
fn size_mismatch_skips_the_record_but_not_the_file() {
    let profile = profile();
    // Altitude is uint16; a 3-byte descriptor cannot divide evenly.
    let bytes = fit_file(&[
        definition(0, 0, 20, &[(2, 3, 0x84)]),
        data(0, &[0x01, 0x02, 0x03]),
        definition(1, 0, 20, &[(3, 1, 2)]),
        data(1, &[90]),
    ]);
    let fit = Fit::from_bytes(&bytes, &profile).unwrap();
    assert_eq!(fit.len(), 1);
    assert_eq!(fit.records[0].value("heart_rate"), Some("90bpm"));
}

#[test]
fn malformed_headers_are_fatal() {
    let profile = profile();
    let mut bad_magic = fit_file(&[]);
    bad_magic[8] = b'X';
    assert!(matches!(
        Fit::from_bytes(&bad_magic, &profile),
        Err(FitError::MalformedHeaderMagic { .. })
    ));

    let mut bad_size = fit_file(&[]);
    bad_size[0] = 13;
    assert!(matches!(
        Fit::from_bytes(&bad_size, &profile),
        Err(FitError::MalformedHeaderSize { size: 13 })
    ));
}

#[test]
fn arrays_decode_in_wire_order() {
    let profile = profile();
    // Two uint16 elements in a single 4-byte field.
    let bytes = fit_file(&[
        definition(0, 0, 20, &[(2, 4, 0x84)]),
        data(0, &[0x01, 0x00, 0x02, 0x00]),
    ]);
    let fit = Fit::from_bytes(&bytes, &profile).unwrap();
    assert_eq!(fit.records[0].value("altitude"), Some("[1, 2]m"));
}

#[test]
fn filter_and_group_cover_all_records() {
    let profile = profile();
    let bytes = fit_file(&[
        definition(0, 0, 20, &[(3, 1, 2)]),
        data(0, &[100]),
        data(0, &[110]),
        definition(1, 0, 26, &[(4, 1, 0), (1, 2, 0x84)]),
        data(1, &[0x01, 0x30, 0x00]),
    ]);
    let fit = Fit::from_bytes(&bytes, &profile).unwrap();
    assert_eq!(fit.len(), 3);
    assert_eq!(fit.filter("record").len(), 2);
    assert_eq!(fit.filter("workout").len(), 1);
    let grouped = fit.group();
    assert_eq!(grouped.len(), 2);
    assert_eq!(grouped["record"].len(), 2);
}

#[test]
fn reloaded_schema_decodes_identically() {
    let profile = profile();
    let bytes = fit_file(&[
        definition(0, 0, 20, &[(3, 1, 2), (2, 2, 0x84)]),
        data(0, &[120, 0x34, 0x12]),
    ]);
    let first = Fit::from_bytes(&bytes, &profile).unwrap();

    let path = std::env::temp_dir().join(format!("fitprofile-decode-{}.bin", std::process::id()));
    profile.save(&path).unwrap();
    let reloaded = Profile::load(&path, SharedLog::unbound()).unwrap();
    std::fs::remove_file(&path).ok();

    let second = Fit::from_bytes(&bytes, &reloaded).unwrap();
    assert_eq!(first.records[0].values, second.records[0].values);
}
