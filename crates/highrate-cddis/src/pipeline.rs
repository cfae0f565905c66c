//! Post-processing: gunzip, then optional Hatanaka conversion
//!
//! Each stage writes to `<output>.part` and renames on success, so a stage
//! output on disk is always complete. A corrupt compressed artifact is
//! deleted, and so are the inputs of a failed conversion: the next run
//! fetches them again instead of reprocessing the same bytes.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use highrate_core::fsutil::remove_if_exists;
use highrate_core::{copy_cancellable, is_nonempty_file, is_shutdown_requested, part_path};

use crate::convert::Converter;
use crate::error::ItemError;
use crate::layout::LocalPaths;
use crate::state::Stage;

/// Stage runner for one file's local artifacts.
pub struct Pipeline<'a> {
    converter: Option<&'a dyn Converter>,
    keep_intermediates: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(converter: Option<&'a dyn Converter>, keep_intermediates: bool) -> Self {
        Self {
            converter,
            keep_intermediates,
        }
    }

    /// Process from the `from` stage (present on disk) up to `target`.
    ///
    /// Returns the stage reached, which equals `target` on success.
    pub fn advance(&self, paths: &LocalPaths, from: Stage, target: Stage) -> Result<Stage, ItemError> {
        let mut stage = from;
        if stage < Stage::Decompressed && target >= Stage::Decompressed {
            extract(&paths.compressed, &paths.decompressed)?;
            stage = Stage::Decompressed;
        }
        if stage < Stage::Converted && target >= Stage::Converted {
            let converter = self
                .converter
                .ok_or_else(|| ItemError::Conversion("no converter configured".to_string()))?;
            if let Err(e) = convert(converter, &paths.decompressed, &paths.converted) {
                if matches!(e, ItemError::Conversion(_)) {
                    discard_inputs(paths)?;
                }
                return Err(e);
            }
            stage = Stage::Converted;
        }
        if !self.keep_intermediates {
            remove_intermediates(paths, stage)?;
        }
        Ok(stage)
    }
}

/// Gunzip `compressed` into `decompressed`, returning the output size.
///
/// A truncated or malformed archive yields [`ItemError::CorruptArchive`]
/// and the compressed file is removed.
pub fn extract(compressed: &Path, decompressed: &Path) -> Result<u64, ItemError> {
    let tmp = part_path(decompressed);
    let result = gunzip(compressed, &tmp);
    let bytes = match result {
        Ok(0) => Err(corrupt(compressed, "archive is empty")),
        Ok(n) => Ok(n),
        Err(e) if is_corruption(&e) => Err(corrupt(compressed, &e.to_string())),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(ItemError::Cancelled),
        Err(e) => Err(ItemError::Io(e)),
    };

    match bytes {
        Ok(n) => {
            fs::rename(&tmp, decompressed)?;
            log::debug!("Extracted {} ({n} bytes)", decompressed.display());
            Ok(n)
        }
        Err(e) => {
            remove_if_exists(&tmp)?;
            if matches!(e, ItemError::CorruptArchive { .. }) {
                log::warn!("Removing corrupt archive {}", compressed.display());
                remove_if_exists(compressed)?;
            }
            Err(e)
        }
    }
}

/// Run `converter` on `decompressed`, renaming its output into `converted`.
pub fn convert(converter: &dyn Converter, decompressed: &Path, converted: &Path) -> Result<(), ItemError> {
    let tmp = part_path(converted);
    let result = converter.convert(decompressed, &tmp).and_then(|()| {
        if is_nonempty_file(&tmp) {
            Ok(())
        } else {
            Err(ItemError::Conversion(format!(
                "{} produced no output for {}",
                converter.describe(),
                decompressed.display()
            )))
        }
    });
    match result {
        Ok(()) => {
            fs::rename(&tmp, converted)?;
            log::debug!("Converted {}", converted.display());
            Ok(())
        }
        Err(e) => {
            remove_if_exists(&tmp)?;
            Err(e)
        }
    }
}

/// Remove the compressed and decompressed artifacts after a failed conversion.
fn discard_inputs(paths: &LocalPaths) -> io::Result<()> {
    log::warn!(
        "Removing {} and {} after failed conversion",
        paths.decompressed.display(),
        paths.compressed.display()
    );
    remove_if_exists(&paths.decompressed)?;
    remove_if_exists(&paths.compressed)
}

/// Remove stage outputs that precede `reached`.
fn remove_intermediates(paths: &LocalPaths, reached: Stage) -> io::Result<()> {
    for stage in [Stage::Compressed, Stage::Decompressed] {
        if stage < reached && is_nonempty_file(paths.get(reached)) {
            remove_if_exists(paths.get(stage))?;
        }
    }
    Ok(())
}

fn gunzip(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut reader = MultiGzDecoder::new(BufReader::new(File::open(src)?));
    let mut writer = BufWriter::new(File::create(dst)?);
    let bytes = copy_cancellable(&mut reader, &mut writer, &is_shutdown_requested, |_| {})?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(bytes)
}

/// Decoder errors: bad header, bad checksum, premature end
fn is_corruption(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
    )
}

fn corrupt(path: &Path, reason: &str) -> ItemError {
    ItemError::CorruptArchive {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LocalLayout;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::cell::Cell;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    /// Upper-cases its input and counts calls
    struct Upper {
        calls: Cell<u32>,
        fail: bool,
    }

    impl Upper {
        fn new(fail: bool) -> Self {
            Self {
                calls: Cell::new(0),
                fail,
            }
        }
    }

    impl Converter for Upper {
        fn convert(&self, input: &Path, output: &Path) -> Result<(), ItemError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                fs::write(output, b"half")?;
                return Err(ItemError::Conversion("exit status 1".to_string()));
            }
            let data = fs::read(input)?;
            fs::write(output, data.to_ascii_uppercase())?;
            Ok(())
        }

        fn describe(&self) -> String {
            "upper".to_string()
        }
    }

    fn fixture(dir: &Path, payload: &[u8]) -> LocalPaths {
        let paths = LocalLayout::new(dir).paths("BRST00FRA", 2024, "300", "00", "BRST00FRA_R_X");
        fs::create_dir_all(paths.dir()).unwrap();
        fs::write(&paths.compressed, payload).unwrap();
        paths
    }

    #[test]
    fn extract_writes_decompressed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fixture(dir.path(), &gzip(b"crx body"));

        let n = extract(&paths.compressed, &paths.decompressed).unwrap();
        assert_eq!(n, 8);
        assert_eq!(fs::read(&paths.decompressed).unwrap(), b"crx body");
        assert!(!part_path(&paths.decompressed).exists());
        assert!(paths.compressed.exists());
    }

    #[test]
    fn truncated_archive_is_corrupt_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let full = gzip(&vec![b'x'; 4096]);
        let paths = fixture(dir.path(), &full[..full.len() / 2]);

        let err = extract(&paths.compressed, &paths.decompressed).unwrap_err();
        assert_eq!(err.kind(), "corrupt-archive");
        assert!(!paths.compressed.exists());
        assert!(!paths.decompressed.exists());
        assert!(!part_path(&paths.decompressed).exists());
    }

    #[test]
    fn garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fixture(dir.path(), b"this is not gzip at all");
        let err = extract(&paths.compressed, &paths.decompressed).unwrap_err();
        assert!(matches!(err, ItemError::CorruptArchive { .. }));
    }

    #[test]
    fn advance_to_converted() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fixture(dir.path(), &gzip(b"crx body"));
        let upper = Upper::new(false);

        let reached = Pipeline::new(Some(&upper), true)
            .advance(&paths, Stage::Compressed, Stage::Converted)
            .unwrap();
        assert_eq!(reached, Stage::Converted);
        assert_eq!(fs::read(&paths.converted).unwrap(), b"CRX BODY");
        // Intermediates kept by default
        assert!(paths.compressed.exists());
        assert!(paths.decompressed.exists());
    }

    #[test]
    fn advance_from_decompressed_skips_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fixture(dir.path(), b"not gzip, never read");
        fs::write(&paths.decompressed, b"crx").unwrap();
        let upper = Upper::new(false);

        Pipeline::new(Some(&upper), true)
            .advance(&paths, Stage::Decompressed, Stage::Converted)
            .unwrap();
        assert_eq!(upper.calls.get(), 1);
        assert_eq!(fs::read(&paths.converted).unwrap(), b"CRX");
    }

    #[test]
    fn cleanup_removes_earlier_stages() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fixture(dir.path(), &gzip(b"crx body"));
        let upper = Upper::new(false);

        Pipeline::new(Some(&upper), false)
            .advance(&paths, Stage::Compressed, Stage::Converted)
            .unwrap();
        assert!(!paths.compressed.exists());
        assert!(!paths.decompressed.exists());
        assert!(paths.converted.exists());
    }

    #[test]
    fn failed_conversion_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fixture(dir.path(), &gzip(b"crx body"));
        let upper = Upper::new(true);

        let err = Pipeline::new(Some(&upper), true)
            .advance(&paths, Stage::Compressed, Stage::Converted)
            .unwrap_err();
        assert_eq!(err.kind(), "conversion");
        assert!(!paths.converted.exists());
        assert!(!part_path(&paths.converted).exists());
        // Inputs are dropped so the next run fetches fresh bytes
        assert!(!paths.decompressed.exists());
        assert!(!paths.compressed.exists());
        assert_eq!(crate::state::resolve_existing_stage(&paths), None);
    }

    #[test]
    fn compressed_target_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fixture(dir.path(), b"anything");
        let reached = Pipeline::new(None, false)
            .advance(&paths, Stage::Compressed, Stage::Compressed)
            .unwrap();
        assert_eq!(reached, Stage::Compressed);
        assert!(paths.compressed.exists());
    }
}
