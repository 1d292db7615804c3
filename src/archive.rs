// archive.rs - bundling finished results into one downloadable container

use std::io::{Cursor, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Local};
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::compression::Encoding;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("malformed payload for {0}")]
    Payload(String),
    #[error("archive write failed: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// `photo.png` compressed to JPEG downloads as `photo_compressed.jpg`.
pub fn derived_filename(stem: &str, encoding: Encoding) -> String {
    format!("{}_compressed.{}", stem, encoding.extension())
}

pub fn archive_filename(at: DateTime<Local>) -> String {
    format!("compressed_images_{}.zip", at.format("%Y%m%d_%H%M%S"))
}

/// Recover the raw bytes embedded in a data-URL payload.
pub fn decode_payload(payload: &str) -> Option<Vec<u8>> {
    let encoded = payload.split_once("base64,")?.1;
    STANDARD.decode(encoded).ok()
}

/// Bundle (filename, payload) pairs into a single ZIP. Entries are stored
/// rather than re-deflated: the payloads are already compressed images. Any
/// malformed payload aborts the whole archive; there is no partial output.
pub fn build(entries: &[(String, String)]) -> Result<Vec<u8>, ArchiveError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);

    for (name, payload) in entries {
        let bytes = decode_payload(payload).ok_or_else(|| ArchiveError::Payload(name.clone()))?;
        writer.start_file(name, options)?;
        writer.write_all(&bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Read;

    fn payload_for(bytes: &[u8]) -> String {
        format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))
    }

    #[test]
    fn derived_filename_uses_the_final_encoding() {
        assert_eq!(derived_filename("photo", Encoding::Jpeg), "photo_compressed.jpg");
        assert_eq!(derived_filename("logo", Encoding::WebP), "logo_compressed.webp");
    }

    #[test]
    fn archive_filename_is_timestamped() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(archive_filename(at), "compressed_images_20240309_140507.zip");
    }

    #[test]
    fn payload_round_trips_through_the_data_url() {
        let bytes = b"not really a jpeg".to_vec();
        assert_eq!(decode_payload(&payload_for(&bytes)), Some(bytes));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert_eq!(decode_payload("no marker here"), None);
        assert_eq!(decode_payload("data:image/jpeg;base64,@@@"), None);
    }

    #[test]
    fn built_archive_contains_every_entry() {
        let first = b"first image bytes".to_vec();
        let second = b"second image bytes".to_vec();
        let entries = vec![
            ("a_compressed.jpg".to_string(), payload_for(&first)),
            ("b_compressed.png".to_string(), payload_for(&second)),
        ];

        let data = build(&entries).expect("archive should build");
        let mut archive = zip::ZipArchive::new(Cursor::new(data)).expect("archive should open");
        assert_eq!(archive.len(), 2);

        let mut contents = Vec::new();
        archive
            .by_name("a_compressed.jpg")
            .expect("first entry present")
            .read_to_end(&mut contents)
            .expect("first entry readable");
        assert_eq!(contents, first);

        contents.clear();
        archive
            .by_name("b_compressed.png")
            .expect("second entry present")
            .read_to_end(&mut contents)
            .expect("second entry readable");
        assert_eq!(contents, second);
    }

    #[test]
    fn a_single_bad_payload_aborts_the_archive() {
        let entries = vec![
            ("good.jpg".to_string(), payload_for(b"fine")),
            ("bad.jpg".to_string(), "data:image/jpeg;base64,###".to_string()),
        ];
        assert!(matches!(build(&entries), Err(ArchiveError::Payload(name)) if name == "bad.jpg"));
    }
}
