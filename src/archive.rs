//! Tar archive stages.
//!
//! [`archive`] turns a directory tree into a tar byte stream and
//! [`extract`] materializes such a stream under a directory. Both run on
//! the blocking pool since the `tar` crate works on `std::io`.

use crate::error::{Error, Result};
use crate::pipeline::{Sink, Source};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const ARCHIVE_STAGE: &str = "archive";
pub const EXTRACT_STAGE: &str = "extract";

/// Source stage producing a tar stream of everything below `source`.
///
/// Entry names are relative to `source`; the directory itself is not an
/// entry. Symbolic links are stored as links.
pub fn archive(source: impl Into<PathBuf>) -> Source {
    let source = source.into();
    Source::blocking(ARCHIVE_STAGE, move |writer| write_archive(&source, writer))
}

/// Sink stage unpacking a tar stream into `target`, creating it if needed.
pub fn extract(target: impl Into<PathBuf>) -> Sink {
    let target = target.into();
    Sink::blocking(EXTRACT_STAGE, move |reader| unpack_archive(reader, &target))
}

pub(crate) fn write_archive<W: Write>(source: &Path, writer: W) -> Result<()> {
    let meta = fs::metadata(source)?;
    if !meta.is_dir() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("'{}' is not a directory", source.display()),
        )));
    }

    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        let name = path
            .strip_prefix(source)
            .map_err(|e| Error::Internal(e.to_string()))?;
        tracing::debug!(entry = %name.display(), "archiving");
        if entry.file_type().is_dir() {
            builder.append_dir(name, path)?;
        } else {
            builder.append_path_with_name(path, name)?;
        }
    }

    builder.finish()?;
    Ok(())
}

pub(crate) fn unpack_archive<R: Read>(mut reader: R, target: &Path) -> Result<()> {
    {
        let mut archive = tar::Archive::new(&mut reader);
        archive.set_preserve_mtime(true);
        archive.unpack(target).map_err(Error::from_codec)?;
    }
    // Gzip padding or trailing blocks after the end-of-archive marker.
    io::copy(&mut reader, &mut io::sink())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn test_entries_are_relative_and_sorted() {
        let src = tempdir().unwrap();
        fs::create_dir(src.path().join("b")).unwrap();
        fs::write(src.path().join("b").join("c.txt"), b"c").unwrap();
        fs::write(src.path().join("a.txt"), b"a").unwrap();

        let mut tarball = Vec::new();
        write_archive(src.path(), &mut tarball).unwrap();

        let mut archive = tar::Archive::new(tarball.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| {
                let entry = e.unwrap();
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                name.trim_end_matches('/').to_string()
            })
            .collect();
        assert_eq!(names, vec!["a.txt", "b", "b/c.txt"]);
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let src = tempdir().unwrap().path().join("no_such_dir");
        let err = write_archive(&src, Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.code().as_deref(), Some("2"));
    }

    #[test]
    fn test_file_source_is_rejected() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();

        let err = write_archive(&file, Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("is not a directory"));
    }

    #[test]
    fn test_unpack_round_trip() {
        let src = tempdir().unwrap();
        fs::create_dir_all(src.path().join("nested/deep")).unwrap();
        fs::write(src.path().join("nested/deep/file.bin"), [0u8, 1, 2, 255]).unwrap();

        let mut tarball = Vec::new();
        write_archive(src.path(), &mut tarball).unwrap();
        tarball.extend_from_slice(&[0u8; 1024]);

        let dest = tempdir().unwrap();
        let target = dest.path().join("out");
        unpack_archive(tarball.as_slice(), &target).unwrap();

        let content = fs::read(target.join("nested/deep/file.bin")).unwrap();
        assert_eq!(content, vec![0u8, 1, 2, 255]);
    }

    #[test]
    fn test_garbage_is_a_format_error() {
        let dest = tempdir().unwrap();
        let garbage = vec![b'x'; 1024];
        let err = unpack_archive(garbage.as_slice(), dest.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}
