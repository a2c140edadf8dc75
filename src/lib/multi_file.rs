//! A [`MultiFileHandle`] opens every physical file of a sample together so that they can be read
//! or written in lock-step.
//!
//! The handle owns one [`Stream`] per file.  All streams are opened in the same [`OpenMode`] and
//! with the same [`Compression`]; either all of them open or none do.  Streams are closed when the
//! handle is closed or dropped.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use gzp::BUFSIZE;
use log::warn;
use seq_io::fastq::{self, OwnedRecord, Record};

use crate::{
    compression::{open_reader, Compression, FastqWriter},
    errors::{Result, SequenceDataError},
    utils::MultiZip,
};

/// The number of lines in one FASTQ record.
pub const LINES_PER_RECORD: usize = 4;

/// A group of consecutive lines read from one stream, each line including its newline.
pub type LineGroup = Vec<Vec<u8>>;

/// How the files of a [`MultiFileHandle`] are opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or truncate.
    Write,
    Append,
}

impl OpenMode {
    fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Append => "append",
        }
    }
}

/// One open file of a sample.
pub enum Stream {
    /// An uncompressed file opened for reading; supports seeking.
    PlainReader(BufReader<File>),
    /// A compressed file opened for reading, decoded on the fly.
    Decoder(Box<dyn BufRead + Send>),
    Writer(FastqWriter),
}

impl Stream {
    fn open(path: &Path, compression: Compression, mode: OpenMode, threads: usize) -> io::Result<Self> {
        Ok(match (mode, compression) {
            (OpenMode::Read, Compression::Plain) => {
                Self::PlainReader(BufReader::with_capacity(BUFSIZE, File::open(path)?))
            }
            (OpenMode::Read, _) => Self::Decoder(open_reader(path, compression)?),
            (OpenMode::Write, _) => Self::Writer(FastqWriter::create(path, compression, threads)?),
            (OpenMode::Append, _) => Self::Writer(FastqWriter::append(path, compression, threads)?),
        })
    }

    fn close(self) -> io::Result<()> {
        match self {
            Self::Writer(writer) => writer.finish(),
            Self::PlainReader(_) | Self::Decoder(_) => Ok(()),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::PlainReader(reader) => reader.read(buf),
            Self::Decoder(reader) => reader.read(buf),
            Self::Writer(_) => Err(unsupported("read from", "write")),
        }
    }
}

impl BufRead for Stream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            Self::PlainReader(reader) => reader.fill_buf(),
            Self::Decoder(reader) => reader.fill_buf(),
            Self::Writer(_) => Err(unsupported("read from", "write")),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Self::PlainReader(reader) => reader.consume(amt),
            Self::Decoder(reader) => reader.consume(amt),
            Self::Writer(_) => {}
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Writer(writer) => writer.write(buf),
            _ => Err(unsupported("write to", "read")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Writer(writer) => writer.flush(),
            _ => Ok(()),
        }
    }
}

fn unsupported(action: &str, mode: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, format!("cannot {} a {} stream", action, mode))
}

/// Reads groups of `size` lines from one stream.  The final group may be short.
struct LineChunks<'a> {
    stream: &'a mut Stream,
    size: usize,
}

impl<'a> Iterator for LineChunks<'a> {
    type Item = io::Result<LineGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut group = Vec::with_capacity(self.size);
        for _ in 0..self.size {
            let mut line = vec![];
            match self.stream.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => group.push(line),
                Err(e) => return Some(Err(e)),
            }
        }
        if group.is_empty() {
            None
        } else {
            Some(Ok(group))
        }
    }
}

/// A handle over all the files of one sample.
pub struct MultiFileHandle {
    paths: Vec<PathBuf>,
    mode: OpenMode,
    compression: Compression,
    streams: Vec<Stream>,
}

impl MultiFileHandle {
    /// Open every path in `paths` with the same mode and compression.
    ///
    /// `threads` is the number of compression threads used per gzip writer.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::NoFiles`] if `paths` is empty
    /// - [`SequenceDataError::Io`] if any of the files cannot be opened, in which case the files
    ///   that were opened are closed again
    pub fn open(
        paths: &[PathBuf],
        compression: Compression,
        mode: OpenMode,
        threads: usize,
    ) -> Result<Self> {
        if paths.is_empty() {
            return Err(SequenceDataError::NoFiles);
        }
        let streams = paths
            .iter()
            .map(|path| Stream::open(path, compression, mode, threads))
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self { paths: paths.to_vec(), mode, compression, streams })
    }

    /// The number of open streams.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Mutable access to the individual streams, in file order.
    pub fn streams_mut(&mut self) -> &mut [Stream] {
        &mut self.streams
    }

    /// Iterate over FASTQ records as raw line groups, one group per stream per step.
    ///
    /// Iteration stops as soon as any stream runs out of lines.
    pub fn records(&mut self) -> impl Iterator<Item = Result<Vec<LineGroup>>> + '_ {
        self.line_groups(LINES_PER_RECORD)
    }

    /// Iterate over groups of `size` consecutive lines, read in lock-step from every stream.
    pub fn line_groups(&mut self, size: usize) -> impl Iterator<Item = Result<Vec<LineGroup>>> + '_ {
        let chunks =
            self.streams.iter_mut().map(|stream| LineChunks { stream, size }).collect::<Vec<_>>();
        MultiZip::new(chunks)
            .map(|groups| {
                groups.into_iter().collect::<io::Result<Vec<_>>>().map_err(SequenceDataError::from)
            })
    }

    /// Iterate over parsed FASTQ records, one record per stream per step.
    pub fn fastq_records(&mut self) -> impl Iterator<Item = Result<Vec<OwnedRecord>>> + '_ {
        let readers = self
            .streams
            .iter_mut()
            .map(|stream| fastq::Reader::new(stream).into_records())
            .collect::<Vec<_>>();
        MultiZip::new(readers).map(|records| {
            records
                .into_iter()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    SequenceDataError::from(io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
                })
        })
    }

    /// Write one record to each stream.
    pub fn write_records(&mut self, records: &[OwnedRecord]) -> Result<()> {
        self.check_count(records.len())?;
        for (record, stream) in records.iter().zip(self.streams.iter_mut()) {
            record.write(stream)?;
        }
        Ok(())
    }

    /// Write one group of lines to each stream.
    pub fn write_line_groups(&mut self, groups: &[LineGroup]) -> Result<()> {
        self.check_count(groups.len())?;
        for (group, stream) in groups.iter().zip(self.streams.iter_mut()) {
            for line in group {
                stream.write_all(line)?;
            }
        }
        Ok(())
    }

    /// Read up to `size` bytes from each stream.  An empty buffer means the stream is exhausted.
    pub fn read(&mut self, size: usize) -> Result<Vec<Vec<u8>>> {
        self.streams
            .iter_mut()
            .map(|stream| {
                let mut buffer = Vec::with_capacity(size);
                stream.take(size as u64).read_to_end(&mut buffer)?;
                Ok(buffer)
            })
            .collect()
    }

    /// Write the `i`th buffer to the `i`th stream.
    pub fn write(&mut self, buffers: &[&[u8]]) -> Result<()> {
        self.check_count(buffers.len())?;
        for (buffer, stream) in buffers.iter().zip(self.streams.iter_mut()) {
            stream.write_all(buffer)?;
        }
        Ok(())
    }

    /// Seek every stream to the same position.  Only uncompressed streams can seek.
    pub fn seek(&mut self, position: SeekFrom) -> Result<()> {
        if self.compression.is_compressed() {
            return Err(self.unsupported("seek"));
        }
        for stream in &mut self.streams {
            match stream {
                Stream::PlainReader(reader) => {
                    reader.seek(position)?;
                }
                Stream::Writer(writer) => {
                    if let Some(result) = writer.seek(position) {
                        result?;
                    }
                }
                Stream::Decoder(_) => {}
            }
        }
        Ok(())
    }

    /// Truncate every file to `size` bytes, or to the current position when `size` is `None`.
    /// Only uncompressed streams opened for writing can be truncated.
    pub fn truncate(&mut self, size: Option<u64>) -> Result<()> {
        if self.compression.is_compressed() || self.mode == OpenMode::Read {
            return Err(self.unsupported("truncate"));
        }
        for stream in &mut self.streams {
            if let Stream::Writer(writer) = stream {
                let size = match size {
                    Some(size) => size,
                    None => writer.seek(SeekFrom::Current(0)).unwrap_or(Ok(0))?,
                };
                if let Some(result) = writer.set_len(size) {
                    result?;
                }
            }
        }
        Ok(())
    }

    /// Copy the remaining content of each stream of `source` into the matching stream of `self`.
    pub fn copy_from(&mut self, source: &mut MultiFileHandle) -> Result<u64> {
        self.check_count(source.len())?;
        let mut copied = 0;
        for (destination, source) in self.streams.iter_mut().zip(source.streams.iter_mut()) {
            copied += io::copy(source, destination)?;
        }
        Ok(copied)
    }

    /// Flush and close every stream, reporting the first error.
    pub fn close(mut self) -> Result<()> {
        let mut result = Ok(());
        for stream in self.streams.drain(..) {
            if let Err(e) = stream.close() {
                if result.is_ok() {
                    result = Err(e.into());
                }
            }
        }
        result
    }

    fn check_count(&self, count: usize) -> Result<()> {
        if count == self.streams.len() {
            Ok(())
        } else {
            Err(SequenceDataError::CountMismatch { expected: self.streams.len(), actual: count })
        }
    }

    fn unsupported(&self, action: &'static str) -> SequenceDataError {
        SequenceDataError::UnsupportedStreamOperation {
            action,
            mode: match (self.mode, self.compression) {
                (OpenMode::Read, Compression::Plain) => "plain read",
                (_, Compression::Plain) => "plain write",
                (OpenMode::Read, _) => "compressed read",
                _ => "compressed write",
            },
        }
    }
}

impl Drop for MultiFileHandle {
    fn drop(&mut self) {
        for stream in self.streams.drain(..) {
            if let Err(e) = stream.close() {
                warn!("Failed to close a {} stream: {}", self.mode.name(), e);
            }
        }
    }
}
