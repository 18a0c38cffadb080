//! Zip fixtures shared by the unit tests.

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Build an in-memory archive. `None` content makes a directory entry.
pub fn zip_bytes(entries: &[(&str, Option<&str>)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        match content {
            None => zip.add_directory(*name, options).unwrap(),
            Some(data) => {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data.as_bytes()).unwrap();
            }
        }
    }
    zip.finish().unwrap().into_inner()
}

pub fn write_zip(path: &Path, entries: &[(&str, Option<&str>)]) {
    fs::write(path, zip_bytes(entries)).unwrap();
}
