//! In-memory zip assembly for bundles.
//!
//! Outputs that are themselves archives are flattened into the bundle so the
//! user never receives a zip inside a zip.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use bytes::Bytes;
use cf_core::{base_name, ConversionOutput, Error, Result};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::naming::{split_extension, UniqueNames};
use crate::sink::Delivery;

/// One completed job's contribution to a bundle.
#[derive(Debug, Clone)]
pub struct BundleItem {
    /// The job's original input name; flattened entries are prefixed with
    /// its base name.
    pub source_name: String,
    pub output: ConversionOutput,
}

impl BundleItem {
    pub fn new(source_name: impl Into<String>, output: ConversionOutput) -> Self {
        Self {
            source_name: source_name.into(),
            output,
        }
    }
}

/// Builds a zip archive in memory with collision-free entry names.
pub struct ArchiveBuilder {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    names: UniqueNames,
    entries: Vec<String>,
}

impl ArchiveBuilder {
    /// `compression_level` 0 stores entries; 1-9 deflates (values above 9
    /// are treated as 9).
    pub fn new(compression_level: u32) -> Self {
        let options = if compression_level == 0 {
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
        } else {
            SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(i64::from(compression_level.min(9))))
        };
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options,
            names: UniqueNames::new(),
            entries: Vec::new(),
        }
    }

    /// Add a file entry; returns the (possibly suffixed) name it was stored
    /// under.
    pub fn add_file(&mut self, name: &str, bytes: &[u8]) -> Result<String> {
        let name = self.names.claim(name);
        self.zip
            .start_file(name.as_str(), self.options)
            .map_err(|e| Error::archive(format!("failed to add entry {name}: {e}")))?;
        self.zip.write_all(bytes)?;
        self.entries.push(name.clone());
        Ok(name)
    }

    /// Add a job's output, flattening it if it is an archive.
    pub fn add_item(&mut self, item: &BundleItem) -> Result<()> {
        let base = base_name(&item.source_name);

        if !item.output.is_archive() {
            self.add_file(&item.output.file_name, &item.output.bytes)?;
            return Ok(());
        }

        let reason = match read_entries(&item.output.bytes) {
            Ok(entries) if !entries.is_empty() => {
                for (entry_name, bytes) in entries {
                    self.add_file(&format!("{base}_{entry_name}"), &bytes)?;
                }
                return Ok(());
            }
            Ok(_) => "archive has no file entries".to_string(),
            Err(e) => e.to_string(),
        };

        let (_, ext) = split_extension(&item.output.file_name);
        let fallback = format!("{base}_converted{ext}");
        tracing::warn!(
            output = %item.output.file_name,
            fallback = %fallback,
            error = %reason,
            "could not flatten nested archive; adding it unmodified"
        );
        self.add_file(&fallback, &item.output.bytes)?;
        Ok(())
    }

    /// Entry names added so far, in insertion order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Finish the archive and return its bytes with the entry list.
    pub fn finish(self) -> Result<(Vec<u8>, Vec<String>)> {
        let cursor = self
            .zip
            .finish()
            .map_err(|e| Error::archive(format!("failed to finish archive: {e}")))?;
        Ok((cursor.into_inner(), self.entries))
    }
}

/// Read every file entry of a zip, keyed by its final path component.
///
/// All entries are read before anything is returned, so a corrupt archive
/// never contributes a partial set of entries.
pub fn read_entries(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::archive(format!("invalid nested archive: {e}")))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| Error::archive(format!("unreadable entry #{i}: {e}")))?;
        if file.is_dir() {
            continue;
        }
        let raw_name = file.name().to_string();
        let Some(name) = Path::new(raw_name.trim_end_matches('/'))
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
        else {
            continue;
        };
        // Header sizes are untrusted; let the buffer grow with what is read.
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| Error::archive(format!("failed to read entry {raw_name}: {e}")))?;
        entries.push((name, buf));
    }
    Ok(entries)
}

/// Build the delivery for `items`.
///
/// A single item is passed through as a direct file download; several items
/// are zipped into `<bundle_name>.zip`.
pub fn build_delivery(items: &[BundleItem], bundle_name: &str, compression_level: u32) -> Result<Delivery> {
    match items {
        [] => Err(Error::archive("nothing to deliver")),
        [single] => Ok(Delivery {
            name: single.output.file_name.clone(),
            bytes: single.output.bytes.clone(),
            entries: Vec::new(),
            job_count: 1,
        }),
        many => {
            let mut builder = ArchiveBuilder::new(compression_level);
            for item in many {
                builder.add_item(item)?;
            }
            let (bytes, entries) = builder.finish()?;
            Ok(Delivery {
                name: format!("{bundle_name}.zip"),
                bytes: Bytes::from(bytes),
                entries,
                job_count: many.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = ArchiveBuilder::new(6);
        for (name, bytes) in entries {
            builder.add_file(name, bytes).unwrap();
        }
        builder.finish().unwrap().0
    }

    fn names_in(bytes: &[u8]) -> Vec<String> {
        read_entries(bytes).unwrap().into_iter().map(|(n, _)| n).collect()
    }

    fn item(source: &str, output: &str, bytes: Vec<u8>) -> BundleItem {
        BundleItem::new(source, ConversionOutput::new(output, bytes))
    }

    #[test]
    fn nested_archive_is_flattened() {
        let inner = zip_of(&[("a.png", b"A"), ("b.png", b"B")]);
        let items = [
            item("report.pdf", "report_pages.zip", inner),
            item("photo.jpg", "photo.png", b"P".to_vec()),
        ];
        let delivery = build_delivery(&items, "Pack-1", 6).unwrap();

        assert_eq!(delivery.name, "Pack-1.zip");
        assert_eq!(delivery.job_count, 2);
        assert_eq!(delivery.entries, vec!["report_a.png", "report_b.png", "photo.png"]);

        let contents = read_entries(&delivery.bytes).unwrap();
        assert_eq!(contents[0], ("report_a.png".to_string(), b"A".to_vec()));
        assert!(contents.iter().all(|(n, _)| !n.ends_with(".zip")));
    }

    #[test]
    fn colliding_outputs_get_suffixes() {
        let items = [
            item("one.jpg", "out.png", b"1".to_vec()),
            item("two.jpg", "out.png", b"2".to_vec()),
        ];
        let delivery = build_delivery(&items, "Complete", 0).unwrap();
        assert_eq!(names_in(&delivery.bytes), vec!["out.png", "out_1.png"]);
    }

    #[test]
    fn corrupt_nested_archive_falls_back() {
        let items = [
            item("scan.pdf", "scan_pages.zip", b"definitely not a zip".to_vec()),
            item("x.png", "x.bmp", b"X".to_vec()),
        ];
        let delivery = build_delivery(&items, "Pack-2", 6).unwrap();
        let contents = read_entries(&delivery.bytes).unwrap();
        assert_eq!(contents[0].0, "scan_converted.zip");
        assert_eq!(contents[0].1, b"definitely not a zip".to_vec());
    }

    #[test]
    fn empty_nested_archive_falls_back() {
        let empty = ArchiveBuilder::new(6).finish().unwrap().0;
        let items = [
            item("blank.pdf", "blank_pages.zip", empty.clone()),
            item("x.png", "x.bmp", b"X".to_vec()),
        ];
        let delivery = build_delivery(&items, "Pack-1", 6).unwrap();
        assert_eq!(delivery.entries, vec!["blank_converted.zip", "x.bmp"]);
        let contents = read_entries(&delivery.bytes).unwrap();
        assert_eq!(contents[0].1, empty);
    }

    #[test]
    fn entry_with_inflated_size_header_is_read_from_data() {
        let mut bytes = zip_of(&[("a.png", b"AAAA")]);
        // Central directory record: signature, then uncompressed size at +24.
        let cd = bytes
            .windows(4)
            .rposition(|w| w == [0x50, 0x4b, 0x01, 0x02])
            .unwrap();
        bytes[cd + 24..cd + 28].copy_from_slice(&0x7fff_ffffu32.to_le_bytes());

        // Either the mismatch is reported or the real data is returned; no
        // allocation is sized from the header.
        if let Ok(entries) = read_entries(&bytes) {
            assert_eq!(entries[0].1, b"AAAA");
        }
    }

    #[test]
    fn nested_directories_are_skipped_and_paths_flattened() {
        let mut builder = ArchiveBuilder::new(6);
        builder.add_file("pages/p1.png", b"1").unwrap();
        let (inner, _) = builder.finish().unwrap();

        assert_eq!(names_in(&inner), vec!["p1.png"]);
    }

    #[test]
    fn single_item_is_passed_through() {
        let items = [item("song.wav", "song.mp3", b"ID3".to_vec())];
        let delivery = build_delivery(&items, "Pack-1", 6).unwrap();
        assert_eq!(delivery.name, "song.mp3");
        assert_eq!(&delivery.bytes[..], b"ID3");
        assert_eq!(delivery.job_count, 1);
    }

    #[test]
    fn empty_is_archive_error() {
        let err = build_delivery(&[], "Pack-1", 6).unwrap_err();
        assert_matches!(err, Error::Archive(_));
    }
}
