//! Streaming access to `.tar.zst` container exports.
//!
//! Archives are never buffered whole: readers walk members one at a time and
//! writers stream copied members straight into a zstd encoder backed by a
//! temp file next to the final destination.

use std::borrow::Cow;
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use tar::{EntryType, Header};
use tempfile::NamedTempFile;

use crate::error::{LxdeltaError, Result};

/// Decoded byte stream of a compressed archive.
pub type ZstdReader<R> = zstd::stream::read::Decoder<'static, BufReader<R>>;

/// A member of an archive being walked, positioned at the start of its payload.
pub type MemberEntry<'a, R> = tar::Entry<'a, ZstdReader<R>>;

const GNU_LONG_LINK_NAME: &[u8] = b"././@LongLink";
const PAX_HEADER_NAME: &[u8] = b"././@PaxHeader";

/// Walk every member of a compressed archive in order.
///
/// `visit` receives the member together with its full archive path (GNU long
/// names and PAX `path` records already resolved). Payload bytes the visitor
/// leaves unread are skipped. Framing or decompression failures surface as
/// [`LxdeltaError::CorruptArchive`] naming `archive`.
pub fn for_each_member<R, F>(reader: R, archive: &str, mut visit: F) -> Result<()>
where
    R: Read,
    F: FnMut(&mut MemberEntry<'_, R>, &str) -> Result<()>,
{
    let decoder =
        zstd::stream::read::Decoder::new(reader).map_err(|e| LxdeltaError::corrupt(archive, e))?;
    let mut tar = tar::Archive::new(decoder);
    let entries = tar
        .entries()
        .map_err(|e| LxdeltaError::corrupt(archive, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| LxdeltaError::corrupt(archive, e))?;
        let path = member_path(&entry.path_bytes(), archive)?;
        visit(&mut entry, &path)?;
    }
    Ok(())
}

/// Member paths are table keys, so names that are not UTF-8 are refused
/// rather than lossily folded into a key another member might share.
fn member_path(raw: &[u8], archive: &str) -> Result<String> {
    std::str::from_utf8(raw).map(str::to_owned).map_err(|_| {
        LxdeltaError::corrupt(
            archive,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "member path is not valid UTF-8: {}",
                    String::from_utf8_lossy(raw)
                ),
            ),
        )
    })
}

/// Reader adapter that counts payload bytes and remembers whether the
/// source (rather than the sink) failed.
pub(crate) struct CountingReader<R> {
    inner: R,
    count: u64,
    read_failed: bool,
}

impl<R: Read> CountingReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            count: 0,
            read_failed: false,
        }
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    pub(crate) fn read_failed(&self) -> bool {
        self.read_failed
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.count += n as u64;
                Ok(n)
            }
            Err(e) => {
                self.read_failed = true;
                Err(e)
            }
        }
    }
}

/// Compressed archive under construction in a temp file.
///
/// Nothing becomes visible at the destination until the caller persists the
/// temp file returned by [`ArchiveWriter::finish`].
pub struct ArchiveWriter {
    builder: tar::Builder<zstd::stream::write::Encoder<'static, BufWriter<NamedTempFile>>>,
    temp_path: PathBuf,
    members: usize,
}

impl ArchiveWriter {
    /// Start a new archive in `dir`, compressed at `level`.
    pub fn create_in(dir: &Path, level: i32) -> Result<Self> {
        let tmp = NamedTempFile::new_in(dir)
            .map_err(|e| LxdeltaError::file("create temp archive in", dir, e))?;
        let temp_path = tmp.path().to_path_buf();
        let encoder = zstd::stream::write::Encoder::new(BufWriter::new(tmp), level)
            .map_err(|e| LxdeltaError::file("start zstd stream for", &temp_path, e))?;
        Ok(Self {
            builder: tar::Builder::new(encoder),
            temp_path,
            members: 0,
        })
    }

    /// Number of members copied so far.
    pub fn members(&self) -> usize {
        self.members
    }

    /// Copy a member verbatim: its extension records, its header block and
    /// exactly its declared payload.
    pub fn copy_member<R: Read>(
        &mut self,
        entry: &mut MemberEntry<'_, R>,
        path: &str,
        archive: &str,
    ) -> Result<()> {
        let pax: Vec<(String, Vec<u8>)> = match entry
            .pax_extensions()
            .map_err(|e| LxdeltaError::corrupt(archive, e))?
        {
            Some(extensions) => {
                let mut records = Vec::new();
                for ext in extensions {
                    let ext = ext.map_err(|e| LxdeltaError::corrupt(archive, e))?;
                    if let Ok(key) = ext.key() {
                        records.push((key.to_string(), ext.value_bytes().to_vec()));
                    }
                }
                records
            }
            None => Vec::new(),
        };
        let pax_has = |key: &str| pax.iter().any(|(k, _)| k == key);

        let header = entry.header().clone();
        let expected = entry.size();

        if !pax.is_empty() {
            let data = encode_pax_records(&pax);
            let ext_header = extension_header(PAX_HEADER_NAME, EntryType::XHeader, &data);
            self.append_extension(&ext_header, &data)?;
        }
        if !pax_has("path") && entry.path_bytes() != header.path_bytes() {
            let data = nul_terminated(&entry.path_bytes());
            let ext_header = extension_header(GNU_LONG_LINK_NAME, EntryType::GNULongName, &data);
            self.append_extension(&ext_header, &data)?;
        }
        if !pax_has("linkpath") {
            if let Some(link) = long_link_name(entry.link_name_bytes(), header.link_name_bytes()) {
                let data = nul_terminated(&link);
                let ext_header =
                    extension_header(GNU_LONG_LINK_NAME, EntryType::GNULongLink, &data);
                self.append_extension(&ext_header, &data)?;
            }
        }

        let mut payload = CountingReader::new(&mut *entry);
        if let Err(e) = self.builder.append(&header, &mut payload) {
            return Err(if payload.read_failed() {
                LxdeltaError::corrupt(archive, e)
            } else {
                LxdeltaError::file("write", &self.temp_path, e)
            });
        }
        if payload.count() != expected {
            return Err(LxdeltaError::TruncatedMember {
                archive: archive.to_string(),
                member: path.to_string(),
                expected,
                actual: payload.count(),
            });
        }
        self.members += 1;
        Ok(())
    }

    fn append_extension(&mut self, header: &Header, data: &[u8]) -> Result<()> {
        self.builder
            .append(header, data)
            .map_err(|e| LxdeltaError::file("write", &self.temp_path, e))
    }

    /// Write the end-of-archive marker, flush the compressor and hand back
    /// the closed temp file.
    pub fn finish(self) -> Result<NamedTempFile> {
        let temp_path = self.temp_path;
        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| LxdeltaError::file("finish archive", &temp_path, e))?;
        let writer = encoder
            .finish()
            .map_err(|e| LxdeltaError::file("finish zstd stream for", &temp_path, e))?;
        writer
            .into_inner()
            .map_err(|e| LxdeltaError::file("flush", &temp_path, e.into_error()))
    }
}

fn long_link_name<'a>(
    resolved: Option<Cow<'a, [u8]>>,
    in_header: Option<Cow<'_, [u8]>>,
) -> Option<Cow<'a, [u8]>> {
    match (resolved, in_header) {
        (Some(resolved), Some(in_header)) if resolved != in_header => Some(resolved),
        (Some(resolved), None) => Some(resolved),
        _ => None,
    }
}

fn nul_terminated(bytes: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(bytes.len() + 1);
    data.extend_from_slice(bytes);
    data.push(0);
    data
}

fn extension_header(name: &[u8], kind: EntryType, data: &[u8]) -> Header {
    let mut header = if kind == EntryType::XHeader {
        Header::new_ustar()
    } else {
        Header::new_gnu()
    };
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(data.len() as u64);
    header.set_entry_type(kind);
    header.set_cksum();
    header
}

/// Serialize PAX records as `"<len> <key>=<value>\n"`, where `len` counts
/// the whole record including its own digits.
fn encode_pax_records(records: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in records {
        let base = key.len() + value.len() + 3;
        let mut len = base + decimal_digits(base);
        if decimal_digits(len) != decimal_digits(base) {
            len = base + decimal_digits(len);
        }
        out.extend_from_slice(format!("{len} {key}=").as_bytes());
        out.extend_from_slice(value);
        out.push(b'\n');
    }
    out
}

fn decimal_digits(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}
