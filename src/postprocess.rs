//! Turns a downloaded artifact into its final form.
//!
//! The compressed original is always kept; the decoded data goes to a sibling
//! with one compression suffix removed, written atomically.

use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::lzw;
use crate::outcome::TransferOutcome;
use crate::path::strip_compression_suffix;
use crate::profile::Compression;

/// How many leading bytes are inspected when sniffing a download.
pub(crate) const SNIFF_LEN: usize = 64;

/// Compares the first bytes of an artifact with the magic of `compression`.
///
/// On mismatch the error names what was found instead, so a saved login page
/// is reported as such.
pub(crate) fn check_magic(head: &[u8], compression: Compression) -> Result<(), String> {
    if head.starts_with(&compression.magic()) {
        return Ok(());
    }
    if head.is_empty() {
        return Err("an empty body".to_string());
    }
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();
    let text = text.trim_start();
    if text.starts_with("<!doctype html") || text.starts_with("<html") {
        return Err("an HTML page (likely the Earthdata login page)".to_string());
    }
    let shown: Vec<String> = head.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    Err(format!("data starting with {}", shown.join(" ")))
}

pub(crate) fn read_head(mut reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    reader.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    Ok(head)
}

/// Checks that the file at `path` really is in the format its suffix names.
/// Files without a compression suffix are accepted as they are.
pub fn verify_artifact(path: &Path) -> Result<(), ConfigError> {
    let Some(compression) = Compression::from_path(path) else {
        return Ok(());
    };
    let file = File::open(path).map_err(|e| ConfigError::io("failed to open", path, e))?;
    let head = read_head(file).map_err(|e| ConfigError::io("failed to read", path, e))?;
    check_magic(&head, compression).map_err(|found| ConfigError::UnexpectedContent {
        location: path.display().to_string(),
        expected: compression.suffix(),
        found,
    })
}

/// Checks a downloaded file against its suffix and decodes it when asked.
///
/// A `Success` whose content is not what the suffix says is removed from its
/// final path and reported, so a later skip-existing run fetches it again.
pub fn process(outcome: TransferOutcome, decompress: bool) -> TransferOutcome {
    match outcome {
        TransferOutcome::Success { bytes, path } => {
            if let Err(e) = verify_artifact(&path) {
                log::error!("{}; removing {}", e, path.display());
                if let Err(rm) = fs::remove_file(&path) {
                    log::warn!("cannot remove {}: {}", path.display(), rm);
                }
                return TransferOutcome::ConfigError(e);
            }
            if !decompress {
                return TransferOutcome::Success { bytes, path };
            }
            match decompress_sibling(&path) {
                Ok(_) => TransferOutcome::Success { bytes, path },
                Err(e) => {
                    log::error!("{}; keeping {}", e, path.display());
                    TransferOutcome::ConfigError(e)
                }
            }
        }
        // A re-run may finish a decompression that failed or never ran.
        TransferOutcome::Skipped { path, reason } if decompress => {
            let pending = strip_compression_suffix(&path).is_some_and(|out| !out.exists());
            if pending {
                if let Err(e) = decompress_sibling(&path) {
                    log::error!("{}; keeping {}", e, path.display());
                    return TransferOutcome::ConfigError(e);
                }
            }
            TransferOutcome::Skipped { path, reason }
        }
        other => other,
    }
}

/// Decodes `path` next to itself. Returns the decoded path, or `None` when
/// the file carries no known compression suffix.
pub fn decompress_sibling(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let (Some(compression), Some(target)) =
        (Compression::from_path(path), strip_compression_suffix(path))
    else {
        log::debug!("{} is not compressed, leaving as is", path.display());
        return Ok(None);
    };

    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let source = File::open(path).map_err(|e| ConfigError::io("failed to open", path, e))?;
    let mut part = tempfile::Builder::new()
        .prefix(".")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| ConfigError::io("failed to create temp file in", dir, e))?;

    let reader = BufReader::new(source);
    let decoded = match compression {
        Compression::Gzip => {
            std::io::copy(&mut MultiGzDecoder::new(reader), part.as_file_mut())
        }
        Compression::UnixZ => lzw::decompress(reader, part.as_file_mut()),
    };

    let bytes = decoded.map_err(|e| ConfigError::Decompress {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    part.as_file_mut()
        .flush()
        .map_err(|e| ConfigError::io("failed to write", part.path(), e))?;
    part.persist(&target)
        .map_err(|e| ConfigError::io("failed to move decompressed file to", &target, e.error))?;

    log::info!("decompressed {} ({} bytes)", target.display(), bytes);
    Ok(Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::SkipReason;
    use flate2::Compression as Level;
    use flate2::write::GzEncoder;

    const SAMPLE: &[u8] = b"     3.04           N: GNSS NAV DATA    M: MIXED            RINEX VERSION / TYPE\n";

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Level::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn success(path: &Path) -> TransferOutcome {
        TransferOutcome::Success {
            bytes: std::fs::metadata(path).unwrap().len(),
            path: path.to_path_buf(),
        }
    }

    #[test]
    fn gzip_roundtrip_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("BRDC00IGS_R_20250150000_01D_MN.rnx.gz");
        std::fs::write(&gz, gzip(SAMPLE)).unwrap();

        let outcome = process(success(&gz), true);
        assert!(matches!(outcome, TransferOutcome::Success { .. }));
        assert!(gz.exists());
        let plain = dir.path().join("BRDC00IGS_R_20250150000_01D_MN.rnx");
        assert_eq!(std::fs::read(plain).unwrap(), SAMPLE);
    }

    #[test]
    fn unix_z_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let z = dir.path().join("brdc3350.20n.Z");
        std::fs::write(&z, lzw::tests::compress(SAMPLE)).unwrap();

        let outcome = process(success(&z), true);
        assert!(matches!(outcome, TransferOutcome::Success { .. }), "{outcome:?}");
        assert_eq!(std::fs::read(dir.path().join("brdc3350.20n")).unwrap(), SAMPLE);
        assert!(z.exists());
    }

    #[test]
    fn truncated_gzip_is_reported_and_original_kept() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("brdc0010.24n.gz");
        let full = gzip(SAMPLE);
        let truncated = &full[..full.len() / 2];
        std::fs::write(&gz, truncated).unwrap();

        let outcome = process(success(&gz), true);
        assert!(
            matches!(outcome, TransferOutcome::ConfigError(ConfigError::Decompress { .. })),
            "{outcome:?}"
        );
        assert_eq!(std::fs::read(&gz).unwrap(), truncated);
        assert!(!dir.path().join("brdc0010.24n").exists());
        // Only the original remains; the temp file was cleaned up.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn login_page_saved_as_z_is_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let z = dir.path().join("igsg0050.09i.Z");
        std::fs::write(&z, b"<html>login required</html>").unwrap();
        let outcome = process(success(&z), true);
        assert!(
            matches!(outcome, TransferOutcome::ConfigError(ConfigError::UnexpectedContent { .. })),
            "{outcome:?}"
        );
        assert!(!z.exists());
        assert!(!dir.path().join("igsg0050.09i").exists());
    }

    #[test]
    fn content_is_checked_without_decompression_too() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("a.rnx.gz");
        std::fs::write(&gz, b"<!DOCTYPE html><title>Earthdata Login</title>").unwrap();
        let outcome = process(success(&gz), false);
        assert!(
            matches!(outcome, TransferOutcome::ConfigError(ConfigError::UnexpectedContent { .. })),
            "{outcome:?}"
        );
        assert!(!gz.exists());

        let good = dir.path().join("b.rnx.gz");
        std::fs::write(&good, gzip(SAMPLE)).unwrap();
        assert!(matches!(process(success(&good), false), TransferOutcome::Success { .. }));
        assert!(good.exists());
        assert!(!dir.path().join("b.rnx").exists());
    }

    #[test]
    fn skipped_artifact_is_decompressed_when_sibling_missing() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("b.rnx.gz");
        std::fs::write(&gz, gzip(SAMPLE)).unwrap();
        let skipped = TransferOutcome::Skipped {
            path: gz.clone(),
            reason: SkipReason::AlreadyExists,
        };
        assert!(matches!(process(skipped, true), TransferOutcome::Skipped { .. }));
        assert_eq!(std::fs::read(dir.path().join("b.rnx")).unwrap(), SAMPLE);
    }

    #[test]
    fn magic_mismatch_names_what_was_found() {
        assert!(check_magic(&gzip(SAMPLE), Compression::Gzip).is_ok());
        assert!(check_magic(&lzw::tests::compress(SAMPLE), Compression::UnixZ).is_ok());

        let login = b"\n  <!DOCTYPE html><html><title>Earthdata Login</title>";
        let found = check_magic(login, Compression::Gzip).unwrap_err();
        assert!(found.contains("HTML page"), "{found}");
        assert_eq!(check_magic(b"", Compression::UnixZ).unwrap_err(), "an empty body");
        // gzip data under a .Z name is still wrong.
        let found = check_magic(&gzip(SAMPLE), Compression::UnixZ).unwrap_err();
        assert_eq!(found, "data starting with 1f 8b 08 00");
    }

    #[test]
    fn verify_artifact_follows_the_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("brdc0010.24n.gz");
        std::fs::write(&good, gzip(SAMPLE)).unwrap();
        assert!(verify_artifact(&good).is_ok());

        let bad = dir.path().join("igsg0050.09i.Z");
        std::fs::write(&bad, b"<html>login</html>").unwrap();
        assert!(matches!(
            verify_artifact(&bad),
            Err(ConfigError::UnexpectedContent { expected: ".Z", .. })
        ));

        let plain = dir.path().join("brdc0010.24n");
        std::fs::write(&plain, b"anything").unwrap();
        assert!(verify_artifact(&plain).is_ok());
    }

    #[test]
    fn not_found_passes_through() {
        let outcome = process(TransferOutcome::NotFound { url: "u".into() }, true);
        assert!(matches!(outcome, TransferOutcome::NotFound { .. }));
    }
}
