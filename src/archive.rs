use crate::error::ProvisionError;
use crate::types::ArchiveEntry;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::Archive;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    TarXz,
}

impl ArchiveKind {
    /// Sniffs the file header, falling back to the file name when the
    /// header is not recognised.
    pub fn detect(archive_path: &Path) -> Result<Self, ProvisionError> {
        let mut header = [0u8; 6];
        let read = File::open(archive_path)
            .and_then(|mut file| read_prefix(&mut file, &mut header))
            .map_err(|e| invalid(archive_path, e))?;
        let header = &header[..read];

        if header.starts_with(ZIP_MAGIC) || header.starts_with(ZIP_EMPTY_MAGIC) {
            return Ok(ArchiveKind::Zip);
        }
        if header.starts_with(XZ_MAGIC) {
            return Ok(ArchiveKind::TarXz);
        }
        if header.starts_with(GZIP_MAGIC) {
            return Ok(ArchiveKind::TarGz);
        }

        Self::from_file_name(archive_path)
            .ok_or_else(|| invalid(archive_path, "unrecognized archive format"))
    }

    fn from_file_name(archive_path: &Path) -> Option<Self> {
        let name = archive_path.file_name()?.to_string_lossy().to_lowercase();
        let name = name.strip_suffix(".download").unwrap_or(&name);

        if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".tar.xz") {
            Some(ArchiveKind::TarXz)
        } else {
            None
        }
    }
}

fn read_prefix(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn invalid(archive_path: &Path, reason: impl ToString) -> ProvisionError {
    ProvisionError::InvalidArchive {
        path: archive_path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn open_tar(archive_path: &Path, kind: ArchiveKind) -> io::Result<Archive<Box<dyn Read>>> {
    let file = File::open(archive_path)?;
    let reader: Box<dyn Read> = match kind {
        ArchiveKind::TarXz => Box::new(xz2::read::XzDecoder::new(file)),
        _ => Box::new(GzDecoder::new(file)),
    };
    Ok(Archive::new(reader))
}

/// Scans members in archive order and returns the first regular file whose
/// base name equals `binary_name`.
pub fn find_entry(
    archive_path: &Path,
    kind: ArchiveKind,
    binary_name: &str,
) -> Result<Option<ArchiveEntry>, ProvisionError> {
    tracing::debug!(
        "Scanning {} ({:?}) for {}",
        archive_path.display(),
        kind,
        binary_name
    );

    match kind {
        ArchiveKind::Zip => {
            let file = File::open(archive_path).map_err(|e| invalid(archive_path, e))?;
            let mut archive = zip::ZipArchive::new(file).map_err(|e| invalid(archive_path, e))?;

            // Raw access reads the name without setting up decryption or
            // decompression, so members we cannot decode are still skipped
            for index in 0..archive.len() {
                let member = archive
                    .by_index_raw(index)
                    .map_err(|e| invalid(archive_path, e))?;
                if member.is_dir() {
                    continue;
                }
                let entry = ArchiveEntry::new(member.name(), index);
                tracing::trace!("Archive member: {}", entry.name_in_archive);
                if entry.base_name == binary_name {
                    return Ok(Some(entry));
                }
            }
            Ok(None)
        }
        ArchiveKind::TarGz | ArchiveKind::TarXz => {
            let mut archive = open_tar(archive_path, kind).map_err(|e| invalid(archive_path, e))?;
            let entries = archive.entries().map_err(|e| invalid(archive_path, e))?;

            for (index, member) in entries.enumerate() {
                let member = member.map_err(|e| invalid(archive_path, e))?;
                if !member.header().entry_type().is_file() {
                    continue;
                }
                let name = member
                    .path()
                    .map_err(|e| invalid(archive_path, e))?
                    .to_string_lossy()
                    .to_string();
                let entry = ArchiveEntry::new(name, index);
                tracing::trace!("Archive member: {}", entry.name_in_archive);
                if entry.base_name == binary_name {
                    return Ok(Some(entry));
                }
            }
            Ok(None)
        }
    }
}

/// Extracts `entry` to `<dest_dir>/<base name>`, dropping any directory
/// prefix stored in the archive. The data lands in a temp file first so a
/// failed extraction never leaves a truncated binary behind.
pub fn extract_entry(
    archive_path: &Path,
    kind: ArchiveKind,
    entry: &ArchiveEntry,
    dest_dir: &Path,
) -> Result<PathBuf, ProvisionError> {
    let dest = dest_dir.join(&entry.base_name);
    let fail = |reason: String| ProvisionError::extraction(&entry.base_name, &dest, reason);

    tracing::info!(
        "Extracting {} to {}",
        entry.name_in_archive,
        dest.display()
    );

    let mut staged = tempfile::Builder::new()
        .prefix(".ffprovision-")
        .suffix(".partial")
        .tempfile_in(dest_dir)
        .map_err(|e| fail(e.to_string()))?;

    match kind {
        ArchiveKind::Zip => {
            let file = File::open(archive_path).map_err(|e| fail(e.to_string()))?;
            let mut archive = zip::ZipArchive::new(file).map_err(|e| fail(e.to_string()))?;
            let mut member = archive
                .by_index(entry.index)
                .map_err(|e| fail(e.to_string()))?;
            io::copy(&mut member, staged.as_file_mut()).map_err(|e| fail(e.to_string()))?;
        }
        ArchiveKind::TarGz | ArchiveKind::TarXz => {
            let mut archive = open_tar(archive_path, kind).map_err(|e| fail(e.to_string()))?;
            let mut entries = archive.entries().map_err(|e| fail(e.to_string()))?;
            let mut member = entries
                .nth(entry.index)
                .ok_or_else(|| fail(format!("member {} disappeared", entry.name_in_archive)))?
                .map_err(|e| fail(e.to_string()))?;
            io::copy(&mut member, staged.as_file_mut()).map_err(|e| fail(e.to_string()))?;
        }
    }

    staged
        .as_file()
        .sync_all()
        .map_err(|e| fail(e.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        staged
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o755))
            .map_err(|e| fail(e.to_string()))?;
    }

    staged
        .persist(&dest)
        .map_err(|e| fail(e.error.to_string()))?;

    Ok(dest)
}
