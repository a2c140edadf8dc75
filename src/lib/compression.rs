//! Detection of the compression format of FASTQ files and codec-aware readers and writers.
//!
//! Compressed content is always decoded on read, so every consumer of [`open_reader`] sees
//! plain FASTQ text.

use std::{
    fmt::Display,
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::Path,
};

use anyhow::anyhow;
use bzip2::{read::MultiBzDecoder, write::BzEncoder};
use clap::{ArgEnum, PossibleValue};
use flate2::read::MultiGzDecoder;
use gzp::{deflate::Gzip, ZBuilder, ZWriter, BUFSIZE};
use log::debug;

use crate::errors::{Result, SequenceDataError};

/// The number of bytes a decoder must be able to read for it to be accepted when the format of a
/// file cannot be determined from its suffix.
pub const SNIFF_SIZE: usize = 2048;

/// The suffixes recognized when scanning a directory for sequence files.
pub const RECOGNIZED_SUFFIXES: &[&str] =
    &[".fastq", ".fq", ".bzip2", ".bzp2", ".bz2", ".gzip", ".gz"];

/// The recognized suffixes that mark a compressed file.
pub const COMPRESSED_SUFFIXES: &[&str] = &[".bzip2", ".bzp2", ".bz2", ".gzip", ".gz"];

/// Suffixes that determine the format without looking at the file content, in the order the
/// formats are tried when sniffing.
const SUFFIX_TO_COMPRESSION: &[(&str, Compression)] = &[
    (".gz", Compression::Gzip),
    (".bz2", Compression::Bzip2),
    (".fastq", Compression::Plain),
    (".fq", Compression::Plain),
];

/// The compression state of a FASTQ file.
#[derive(ArgEnum, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    Plain,
    Gzip,
    Bzip2,
}

impl Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Gzip => write!(f, "gzip"),
            Self::Bzip2 => write!(f, "bzip2"),
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        for variant in Self::value_variants() {
            if variant.to_possible_value().map_or(false, |value| value.matches(s, true)) {
                return Ok(*variant);
            }
        }
        Err(anyhow!("Invalid compression: {}", s))
    }
}

impl Compression {
    pub fn possible_values<'a>() -> impl Iterator<Item = PossibleValue<'a>> {
        Compression::value_variants().iter().filter_map(ArgEnum::to_possible_value)
    }

    /// True for any format other than [`Compression::Plain`].
    pub fn is_compressed(self) -> bool {
        self != Self::Plain
    }

    /// The suffix appended to a file name when compressing to this format.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Plain => "",
            Self::Gzip => ".gz",
            Self::Bzip2 => ".bz2",
        }
    }

    /// Look the format up from the last suffix of `path`.
    pub fn from_suffix<P: AsRef<Path>>(path: P) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_string_lossy();
        SUFFIX_TO_COMPRESSION
            .iter()
            .find(|(suffix, _)| suffix[1..] == *extension)
            .map(|(_, compression)| *compression)
    }

    /// Determine the format of an existing file.
    ///
    /// The suffix is used when it is recognized.  Otherwise each decoder is tried on the first
    /// [`SNIFF_SIZE`] bytes and the first one that succeeds wins.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::MissingFile`] if the path is not a file
    /// - [`SequenceDataError::EmptyUnknownFormat`] if the suffix is unknown and the file is empty
    /// - [`SequenceDataError::UnknownFormat`] if no decoder can read the file
    pub fn detect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SequenceDataError::MissingFile { path: path.to_path_buf() });
        }
        if let Some(compression) = Self::from_suffix(path) {
            return Ok(compression);
        }
        if path.metadata()?.len() == 0 {
            return Err(SequenceDataError::EmptyUnknownFormat { path: path.to_path_buf() });
        }
        for (_, compression) in SUFFIX_TO_COMPRESSION {
            if compression.can_decode(path) {
                debug!("Detected {} content in {}", compression, path.to_string_lossy());
                return Ok(*compression);
            }
        }
        Err(SequenceDataError::UnknownFormat { path: path.to_path_buf() })
    }

    /// Attempt to decode the start of the file with this format.
    fn can_decode(self, path: &Path) -> bool {
        let mut buffer = Vec::with_capacity(SNIFF_SIZE);
        let read = open_reader(path, self)
            .and_then(|reader| reader.take(SNIFF_SIZE as u64).read_to_end(&mut buffer));
        match (self, read) {
            (_, Err(_)) => false,
            // Plain content must be text; a multi-byte character may be cut at the end.
            (Self::Plain, Ok(_)) => match std::str::from_utf8(&buffer) {
                Ok(_) => true,
                Err(e) => e.error_len().is_none(),
            },
            (_, Ok(_)) => true,
        }
    }
}

/// Open a file for reading, decoding it according to `compression`.  Empty files read as empty
/// regardless of the compression.
pub fn open_reader<P: AsRef<Path>>(
    path: P,
    compression: Compression,
) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(Box::new(io::empty()));
    }
    let file = BufReader::with_capacity(BUFSIZE, file);
    Ok(match compression {
        Compression::Plain => Box::new(file),
        Compression::Gzip => Box::new(BufReader::with_capacity(BUFSIZE, MultiGzDecoder::new(file))),
        Compression::Bzip2 => Box::new(BufReader::with_capacity(BUFSIZE, MultiBzDecoder::new(file))),
    })
}

/// A writer that encodes FASTQ text according to a [`Compression`].
///
/// [`FastqWriter::finish`] must be called to write any trailing codec data.
pub enum FastqWriter {
    Plain(BufWriter<File>),
    Gzip(Box<dyn ZWriter>),
    Bzip2(BzEncoder<BufWriter<File>>),
}

impl FastqWriter {
    /// Create (or truncate) `path` for writing.
    pub fn create<P: AsRef<Path>>(path: P, compression: Compression, threads: usize) -> io::Result<Self> {
        Ok(Self::new(File::create(path)?, compression, threads))
    }

    /// Open `path` for appending.  Compressed formats append a new member/stream, which the
    /// readers returned by [`open_reader`] decode transparently.
    pub fn append<P: AsRef<Path>>(path: P, compression: Compression, threads: usize) -> io::Result<Self> {
        Ok(Self::new(OpenOptions::new().append(true).open(path)?, compression, threads))
    }

    fn new(file: File, compression: Compression, threads: usize) -> Self {
        let file = BufWriter::with_capacity(BUFSIZE, file);
        match compression {
            Compression::Plain => Self::Plain(file),
            Compression::Gzip => {
                Self::Gzip(ZBuilder::<Gzip, _>::new().num_threads(threads.max(1)).from_writer(file))
            }
            Compression::Bzip2 => Self::Bzip2(BzEncoder::new(file, bzip2::Compression::default())),
        }
    }

    /// True if bytes reach the file unencoded, in which case the writer supports seeking.
    pub fn is_plain(&self) -> bool {
        matches!(self, Self::Plain(_))
    }

    /// Seek the underlying file of a plain writer.
    pub fn seek(&mut self, position: SeekFrom) -> Option<io::Result<u64>> {
        match self {
            Self::Plain(writer) => Some(writer.seek(position)),
            _ => None,
        }
    }

    /// Truncate (or extend) the underlying file of a plain writer to `size` bytes.
    pub fn set_len(&mut self, size: u64) -> Option<io::Result<()>> {
        match self {
            Self::Plain(writer) => Some(writer.flush().and_then(|_| writer.get_ref().set_len(size))),
            _ => None,
        }
    }

    /// Flush all buffered data, write codec trailers and close the file.
    pub fn finish(self) -> io::Result<()> {
        match self {
            Self::Plain(mut writer) => writer.flush(),
            Self::Gzip(mut writer) => {
                writer.finish().map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
            }
            Self::Bzip2(mut writer) => {
                writer.try_finish()?;
                writer.get_mut().flush()
            }
        }
    }
}

impl Write for FastqWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(writer) => writer.write(buf),
            Self::Gzip(writer) => writer.write(buf),
            Self::Bzip2(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(writer) => writer.flush(),
            Self::Gzip(writer) => writer.flush(),
            Self::Bzip2(writer) => writer.flush(),
        }
    }
}

/// The number of decoded bytes in a file.
pub fn decoded_len<P: AsRef<Path>>(path: P, compression: Compression) -> io::Result<u64> {
    match compression {
        Compression::Plain => Ok(path.as_ref().metadata()?.len()),
        _ => io::copy(&mut open_reader(path, compression)?, &mut io::sink()),
    }
}

/// The last decoded byte of a file, `None` if it is empty.
pub fn last_byte<P: AsRef<Path>>(path: P, compression: Compression) -> io::Result<Option<u8>> {
    if compression == Compression::Plain {
        let mut file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut byte)?;
        return Ok(Some(byte[0]));
    }

    let mut reader = open_reader(path, compression)?;
    let mut last = None;
    loop {
        let buffer = reader.fill_buf()?;
        if buffer.is_empty() {
            return Ok(last);
        }
        last = buffer.last().copied();
        let consumed = buffer.len();
        reader.consume(consumed);
    }
}
