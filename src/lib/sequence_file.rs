//! A [`SequenceFile`] is one sequencing sample: the single physical FASTQ of a single-end sample
//! or the forward and reverse FASTQs of a paired-end sample, together with the metadata parsed
//! from their file names.
//!
//! All sibling files of a sample are created, renamed, compressed, split and joined together.
//! Splitting cuts the first file on record boundaries and replays the resulting line counts on
//! the other files, so the mates of a paired-end sample stay synchronized partition by
//! partition.

use std::{
    fmt::Display,
    fs::{self, OpenOptions},
    io::{self, BufRead, Read, Write},
    path::{Path, PathBuf},
};

use ahash::AHashSet;
use bstr::ByteSlice;
use itertools::Itertools;
use log::{debug, warn};
use path_absolutize::Absolutize;

use crate::{
    collection::SequenceCollection,
    compression::{
        decoded_len, last_byte, open_reader, Compression, FastqWriter, COMPRESSED_SUFFIXES,
        RECOGNIZED_SUFFIXES,
    },
    edit::{Editable, Operation},
    errors::{Result, SequenceDataError},
    multi_file::{MultiFileHandle, OpenMode, Stream, LINES_PER_RECORD},
    template::{FileNameTemplate, TemplateValue, TemplateValues},
};

/// The number of bytes read at a time while looking for partition boundaries.
pub const SPLIT_BUFFER: usize = 25 * 16 * 1024;

/// The number of bytes read at a time while counting records.
const COUNT_BUFFER: usize = 65536;

pub const RUN: &str = "run";
pub const SAMPLE_NAME: &str = "sample_name";
pub const EXTENSION: &str = "extension";
pub const ORIENTATION: &str = "orientation";

/// The number of physical files backing a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    SingleEnd,
    PairedEnd,
}

impl Layout {
    /// The number of files a sample with this layout consists of.
    pub fn cardinality(self) -> usize {
        match self {
            Self::SingleEnd => 1,
            Self::PairedEnd => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SingleEnd => "single-end",
            Self::PairedEnd => "paired-end",
        }
    }
}

/// The paths of a sample, sized by its [`Layout`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SampleFiles {
    SingleEnd([PathBuf; 1]),
    PairedEnd([PathBuf; 2]),
}

impl SampleFiles {
    /// Group `paths` into a sample with the given layout.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::NoFiles`] if `paths` is empty
    /// - [`SequenceDataError::WrongCardinality`] if the number of paths does not match the layout
    pub fn new(layout: Layout, paths: Vec<PathBuf>) -> Result<Self> {
        if paths.is_empty() {
            return Err(SequenceDataError::NoFiles);
        }
        let wrong_cardinality = |actual| SequenceDataError::WrongCardinality {
            layout: layout.name(),
            expected: layout.cardinality(),
            actual,
        };
        let actual = paths.len();
        match layout {
            Layout::SingleEnd => <[PathBuf; 1]>::try_from(paths)
                .map(Self::SingleEnd)
                .map_err(|_| wrong_cardinality(actual)),
            Layout::PairedEnd => <[PathBuf; 2]>::try_from(paths)
                .map(Self::PairedEnd)
                .map_err(|_| wrong_cardinality(actual)),
        }
    }

    pub fn layout(&self) -> Layout {
        match self {
            Self::SingleEnd(_) => Layout::SingleEnd,
            Self::PairedEnd(_) => Layout::PairedEnd,
        }
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        match self {
            Self::SingleEnd(paths) => paths,
            Self::PairedEnd(paths) => paths,
        }
    }

    /// Replace every path, keeping the layout.
    fn try_map<F>(self, mut f: F) -> Result<Self>
    where
        F: FnMut(PathBuf) -> Result<PathBuf>,
    {
        Ok(match self {
            Self::SingleEnd([path]) => Self::SingleEnd([f(path)?]),
            Self::PairedEnd([forward, reverse]) => Self::PairedEnd([f(forward)?, f(reverse)?]),
        })
    }
}

/// The metadata of a sample.  Any of the properties may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SampleProperties {
    pub run: Option<String>,
    pub sample_name: Option<String>,
    /// The trailing part of the file names, e.g. `.fastq.gz`.
    pub extension: Option<String>,
    /// One distinct tag per file, e.g. `["1", "2"]` for the forward and reverse mates.
    pub orientation: Option<Vec<String>>,
}

impl SampleProperties {
    /// The properties as template values.  The orientation is multi-valued so that filling a
    /// template with it generates one file name per file.
    pub fn to_template_values(&self) -> TemplateValues {
        let mut values = TemplateValues::new();
        for (field, value) in
            [(RUN, &self.run), (SAMPLE_NAME, &self.sample_name), (EXTENSION, &self.extension)]
        {
            if let Some(value) = value {
                values.insert(field.to_string(), TemplateValue::from(value.clone()));
            }
        }
        if let Some(orientation) = &self.orientation {
            values.insert(ORIENTATION.to_string(), TemplateValue::Multiple(orientation.clone()));
        }
        values
    }

    /// Derive the properties of a sample by parsing each of its file names.
    ///
    /// Run, sample name and extension must agree between the files.  The orientation is kept
    /// per file unless all files agree.
    pub fn from_file_names(template: &FileNameTemplate, paths: &[PathBuf]) -> Result<Self> {
        let parsed = paths
            .iter()
            .map(|path| template.parse(&file_name(path)))
            .collect::<Result<Vec<_>>>()?;
        let values_of = |field: &str| -> Option<Vec<String>> {
            parsed.iter().map(|fields| fields.get(field).cloned()).collect()
        };
        let consensus = |field: &'static str| -> Result<Option<String>> {
            match values_of(field) {
                None => Ok(None),
                Some(values) if values.iter().all_equal() => Ok(values.into_iter().next()),
                Some(values) => {
                    Err(SequenceDataError::InconsistentProperty { property: field, values })
                }
            }
        };
        Ok(Self {
            run: consensus(RUN)?,
            sample_name: consensus(SAMPLE_NAME)?,
            extension: consensus(EXTENSION)?,
            orientation: values_of(ORIENTATION)
                .map(|values| values.into_iter().unique().collect()),
        })
    }
}

/// One sequencing sample backed by one or two FASTQ files.
///
/// Two samples are equal when they are backed by the same files.
#[derive(Debug, Clone)]
pub struct SequenceFile {
    files: SampleFiles,
    properties: SampleProperties,
}

impl PartialEq for SequenceFile {
    fn eq(&self, other: &Self) -> bool {
        self.files == other.files
    }
}

impl Eq for SequenceFile {}

impl std::hash::Hash for SequenceFile {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.files.hash(state);
    }
}

impl Display for SequenceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}(files={:?}, sample_name={:?}, run={:?}, orientation={:?})",
            self.layout(),
            self.files(),
            self.properties.sample_name,
            self.properties.run,
            self.properties.orientation
        )
    }
}

impl SequenceFile {
    /// Build a sample from its paths.
    ///
    /// With `exists_ok` every path must be an existing file.  Without it the files are created
    /// empty and none of them may exist yet.  Paths are stored in absolute form.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::NoFiles`] or [`SequenceDataError::WrongCardinality`] if the number
    ///   of paths does not match the layout
    /// - [`SequenceDataError::InvalidOrientation`] if the orientation does not hold one distinct
    ///   tag per file
    /// - [`SequenceDataError::DuplicatePath`] if two paths point to the same file
    /// - [`SequenceDataError::MissingFile`] if a path does not exist and `exists_ok` is set
    /// - [`SequenceDataError::FileExists`] if a path exists and `exists_ok` is not set
    pub fn new(
        layout: Layout,
        paths: Vec<PathBuf>,
        properties: SampleProperties,
        exists_ok: bool,
    ) -> Result<Self> {
        let files = SampleFiles::new(layout, paths)?;
        validate_orientation(layout, properties.orientation.as_deref())?;
        let files = if exists_ok { resolve_existing(files)? } else { create_files(files)? };
        if layout == Layout::PairedEnd && properties.orientation.is_none() {
            warn!("Paired-end sample {:?} might need to have the orientation set.", files.as_slice());
        }
        Ok(Self { files, properties })
    }

    /// Take the next sample from a stream of paths, consuming exactly as many paths as the
    /// layout requires.  Returns `None` if the stream is exhausted.
    ///
    /// When a template is given the sample properties are parsed from the file names.
    pub fn pop<I>(
        paths: &mut I,
        layout: Layout,
        template: Option<&FileNameTemplate>,
        exists_ok: bool,
    ) -> Result<Option<Self>>
    where
        I: Iterator<Item = PathBuf>,
    {
        let first = match paths.next() {
            Some(path) => path,
            None => return Ok(None),
        };
        let mut files = vec![first];
        files.extend(paths.by_ref().take(layout.cardinality() - 1));
        if files.len() != layout.cardinality() {
            return Err(SequenceDataError::WrongCardinality {
                layout: layout.name(),
                expected: layout.cardinality(),
                actual: files.len(),
            });
        }
        debug!("Found {} sample files {:?}", layout.name(), files);

        let properties = match template {
            Some(template) => SampleProperties::from_file_names(template, &files)?,
            None => SampleProperties::default(),
        };
        Self::new(layout, files, properties, exists_ok).map(Some)
    }

    /// Create a new, empty sample in `directory` with file names generated from `properties`.
    pub fn create_from_properties(
        layout: Layout,
        template: &FileNameTemplate,
        directory: &Path,
        properties: SampleProperties,
    ) -> Result<Self> {
        if !directory.is_dir() {
            return Err(SequenceDataError::NotADirectory { path: directory.to_path_buf() });
        }
        let paths = template
            .fill(&properties.to_template_values())?
            .into_iter()
            .map(|name| directory.join(name))
            .collect_vec();
        check_distinct(&paths)?;
        Self::new(layout, paths, properties, false)
    }

    pub fn layout(&self) -> Layout {
        self.files.layout()
    }

    /// The absolute paths of the files, in order.
    pub fn files(&self) -> &[PathBuf] {
        self.files.as_slice()
    }

    pub fn properties(&self) -> &SampleProperties {
        &self.properties
    }

    pub fn run(&self) -> Option<&str> {
        self.properties.run.as_deref()
    }

    pub fn sample_name(&self) -> Option<&str> {
        self.properties.sample_name.as_deref()
    }

    pub fn extension(&self) -> Option<&str> {
        self.properties.extension.as_deref()
    }

    pub fn orientation(&self) -> Option<&[String]> {
        self.properties.orientation.as_deref()
    }

    /// The compression shared by all files of the sample.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::InconsistentCompression`] if the files use different formats
    /// - any error of [`Compression::detect`]
    pub fn compression(&self) -> Result<Compression> {
        let formats =
            self.files().iter().map(Compression::detect).collect::<Result<Vec<_>>>()?;
        if !formats.iter().all_equal() {
            return Err(SequenceDataError::InconsistentCompression {
                formats: formats.iter().map(ToString::to_string).collect(),
            });
        }
        Ok(formats[0])
    }

    pub fn is_compressed(&self) -> Result<bool> {
        Ok(self.compression()?.is_compressed())
    }

    /// Open all files together, detecting their compression.
    pub fn open(&self, mode: OpenMode, threads: usize) -> Result<MultiFileHandle> {
        self.open_with(mode, self.compression()?, threads)
    }

    /// Open all files together with the given compression.
    pub fn open_with(
        &self,
        mode: OpenMode,
        compression: Compression,
        threads: usize,
    ) -> Result<MultiFileHandle> {
        MultiFileHandle::open(self.files(), compression, mode, threads)
    }

    /// True when every file holds nothing but whitespace once decoded.
    pub fn is_empty(&self) -> Result<bool> {
        let mut sizes = vec![];
        for file in self.files() {
            sizes.push(fs::metadata(file)?.len());
        }
        if sizes.iter().all(|size| *size == 0) {
            return Ok(true);
        }

        let compression = self.compression()?;
        for file in self.files() {
            let mut reader = open_reader(file, compression)?;
            loop {
                let buffer = reader.fill_buf()?;
                if buffer.is_empty() {
                    break;
                }
                if !buffer.iter().all(u8::is_ascii_whitespace) {
                    return Ok(false);
                }
                let consumed = buffer.len();
                reader.consume(consumed);
            }
        }
        Ok(true)
    }

    /// The number of records in the sample.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::UnevenLineCounts`] if the files hold different numbers of lines
    pub fn number_of_records(&self) -> Result<usize> {
        let mut handle = self.open(OpenMode::Read, 1)?;
        let mut lines = vec![0; handle.len()];
        loop {
            let parts = handle.read(COUNT_BUFFER)?;
            if parts.iter().all(Vec::is_empty) {
                break;
            }
            for (count, part) in lines.iter_mut().zip(parts.iter()) {
                *count += bytecount::count(part, b'\n');
            }
        }
        handle.close()?;

        if !lines.iter().all_equal() {
            return Err(SequenceDataError::UnevenLineCounts { sample: self.to_string(), lines });
        }
        Ok(lines[0] / LINES_PER_RECORD)
    }

    /// Rename the files in place using names generated from `properties`.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::CountMismatch`] if the template does not generate one name per file
    /// - any error of [`FileNameTemplate::fill`]
    pub fn rename(self, template: &FileNameTemplate, properties: SampleProperties) -> Result<Self> {
        let names = template.fill(&properties.to_template_values())?;
        if names.len() != self.files().len() {
            return Err(SequenceDataError::CountMismatch {
                expected: self.files().len(),
                actual: names.len(),
            });
        }
        let mut paths = Vec::with_capacity(names.len());
        for (old, name) in self.files().iter().zip(names) {
            let new = old.with_file_name(name);
            debug!("Renaming {} to {}", old.to_string_lossy(), new.to_string_lossy());
            fs::rename(old, &new)?;
            paths.push(new);
        }
        Self::new(self.layout(), paths, properties, true)
    }

    /// Delete the files of the sample.
    pub fn remove(self) -> Result<()> {
        for file in self.files() {
            fs::remove_file(file)?;
        }
        Ok(())
    }

    /// Write a compressed copy of an uncompressed sample.
    ///
    /// The copy is written next to the originals, or into `output_dir` when given, with the
    /// compression suffix appended to each file name.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::AlreadyCompressed`] if the sample is already compressed
    /// - [`SequenceDataError::AlreadyDecompressed`] if `compression` is [`Compression::Plain`]
    pub fn compress(
        &self,
        compression: Compression,
        output_dir: Option<&Path>,
        threads: usize,
    ) -> Result<Self> {
        let current = self.compression()?;
        if current.is_compressed() {
            return Err(SequenceDataError::AlreadyCompressed { path: self.files()[0].clone() });
        }
        if !compression.is_compressed() {
            return Err(SequenceDataError::AlreadyDecompressed { path: self.files()[0].clone() });
        }
        let paths = self
            .files()
            .iter()
            .map(|file| {
                output_location(file, output_dir)
                    .join(format!("{}{}", file_name(file), compression.suffix()))
            })
            .collect_vec();
        let properties = SampleProperties {
            extension: Some(format!("{}{}", self.extension().unwrap_or(""), compression.suffix())),
            ..self.properties.clone()
        };
        let compressed = Self::new(self.layout(), paths, properties, false)?;
        self.copy_into(&compressed, current, compression, threads)?;
        Ok(compressed)
    }

    /// Write an uncompressed copy of a compressed sample.
    ///
    /// Each file `name.fastq.gz` is decompressed to `name.fastq` next to the original, or into
    /// `output_dir` when given.  Only the compression suffix is dropped, so the extension of a
    /// partition such as `_0.fastq.gz` becomes `_0.fastq`.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::AlreadyDecompressed`] if the sample is not compressed
    pub fn decompress(&self, output_dir: Option<&Path>, threads: usize) -> Result<Self> {
        let current = self.compression()?;
        if !current.is_compressed() {
            return Err(SequenceDataError::AlreadyDecompressed { path: self.files()[0].clone() });
        }
        let paths = self
            .files()
            .iter()
            .map(|file| output_location(file, output_dir).join(decompressed_name(&file_name(file))))
            .collect_vec();
        let extension = self.extension().map_or_else(|| ".fastq".to_string(), decompressed_name);
        let properties = SampleProperties { extension: Some(extension), ..self.properties.clone() };
        let decompressed = Self::new(self.layout(), paths, properties, false)?;
        self.copy_into(&decompressed, current, Compression::Plain, threads)?;
        Ok(decompressed)
    }

    fn copy_into(
        &self,
        target: &SequenceFile,
        from: Compression,
        to: Compression,
        threads: usize,
    ) -> Result<()> {
        let mut source = self.open_with(OpenMode::Read, from, 1)?;
        let mut sink = target.open_with(OpenMode::Write, to, threads)?;
        sink.copy_from(&mut source)?;
        sink.close()?;
        source.close()
    }

    /// Split the sample into `pieces` partitions written to `output_dir`.
    ///
    /// The first file is cut into partitions of roughly equal decoded size, always directly in
    /// front of a record header.  The number of lines in each partition is then replayed on the
    /// other files.  Partition `i` of `reads.fastq.gz` is written to `reads_i.fastq.gz` and gets
    /// the extension `_i.fastq.gz`.
    ///
    /// Partitions are created even when there are fewer records than pieces; the trailing ones
    /// are then empty.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::ZeroPieces`] if `pieces` is zero
    /// - [`SequenceDataError::FileExists`] if a partition file exists already
    pub fn split(&self, pieces: usize, output_dir: &Path) -> Result<SequenceCollection> {
        if pieces == 0 {
            return Err(SequenceDataError::ZeroPieces);
        }
        let empty = self.is_empty()?;
        let compression = match self.compression() {
            Err(SequenceDataError::EmptyUnknownFormat { .. }) if empty => Compression::Plain,
            result => result?,
        };
        let partitions = self.create_partitions(pieces, output_dir)?;
        let outputs_of = |index: usize| {
            partitions.iter().map(|partition| partition.files()[index].clone()).collect_vec()
        };

        if empty {
            debug!("Sample {} is empty, writing {} empty partitions", self, pieces);
            for index in 0..self.files().len() {
                split_by_lines(&mut io::empty(), &outputs_of(index), compression, &[])?;
            }
            return Ok(SequenceCollection::new(partitions));
        }

        let target = div_ceil(decoded_len(&self.files()[0], compression)?, pieces as u64);
        let mut handle = self.open_with(OpenMode::Read, compression, 1)?;
        let (first, others) = handle.streams_mut().split_at_mut(1);
        let plan = split_by_size(&mut first[0], &outputs_of(0), compression, target)?.plan;
        for (index, stream) in others.iter_mut().enumerate() {
            split_by_lines(stream, &outputs_of(index + 1), compression, &plan)?;
        }
        handle.close()?;
        debug!("Split {} into {} partitions with line counts {:?}", self, pieces, plan);

        Ok(SequenceCollection::new(partitions))
    }

    /// Create the empty partition samples of [`SequenceFile::split`].
    fn create_partitions(&self, pieces: usize, output_dir: &Path) -> Result<Vec<SequenceFile>> {
        let extension = match self.extension() {
            Some(extension) => extension.to_string(),
            None => recognized_suffix(&file_name(&self.files()[0])).to_string(),
        };
        (0..pieces)
            .map(|index| {
                let paths = self
                    .files()
                    .iter()
                    .map(|file| {
                        let name = file_name(file);
                        let stem = name.strip_suffix(extension.as_str()).unwrap_or(&name);
                        output_dir.join(format!("{}_{}{}", stem, index, extension))
                    })
                    .collect_vec();
                let properties = SampleProperties {
                    extension: Some(format!("_{}{}", index, extension)),
                    ..self.properties.clone()
                };
                Self::new(self.layout(), paths, properties, false)
            })
            .collect()
    }

    /// Append the content of `other` to this sample and delete `other`.
    ///
    /// A newline is inserted between the two when this sample does not end with one, and
    /// appended after `other`'s content when it lacks one.  An empty `other` is deleted without
    /// touching this sample.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::WrongCardinality`] if the samples have a different number of files
    pub fn join(self, other: SequenceFile) -> Result<Self> {
        if other.layout() != self.layout() {
            return Err(SequenceDataError::WrongCardinality {
                layout: self.layout().name(),
                expected: self.files().len(),
                actual: other.files().len(),
            });
        }
        if other.is_empty()? {
            debug!("Sample {} is empty, removing it without joining.", other);
            other.remove()?;
            return Ok(self);
        }

        let source_compression = other.compression()?;
        let compression = match self.compression() {
            Err(SequenceDataError::EmptyUnknownFormat { .. }) => source_compression,
            result => result?,
        };
        let before = self
            .files()
            .iter()
            .map(|file| lacks_trailing_newline(file, compression))
            .collect::<Result<Vec<_>>>()?;
        let after = other
            .files()
            .iter()
            .map(|file| lacks_trailing_newline(file, source_compression))
            .collect::<Result<Vec<_>>>()?;

        debug!("Copying contents from {} to {}", other, self);
        let mut into = self.open_with(OpenMode::Append, compression, 1)?;
        let mut from = other.open_with(OpenMode::Read, source_compression, 1)?;
        into.write(&newlines(&before))?;
        into.copy_from(&mut from)?;
        into.write(&newlines(&after))?;
        into.close()?;
        from.close()?;

        other.remove()?;
        Ok(self)
    }
}

impl Editable for SequenceFile {
    type Output = SequenceCollection;

    fn edit<O: Operation + ?Sized>(
        &self,
        operation: &O,
    ) -> anyhow::Result<(SequenceCollection, SequenceCollection)> {
        operation.perform(self)
    }
}

fn validate_orientation(layout: Layout, orientation: Option<&[String]>) -> Result<()> {
    match orientation {
        Some(tags)
            if tags.len() != layout.cardinality() || tags.iter().unique().count() != tags.len() =>
        {
            Err(SequenceDataError::InvalidOrientation {
                expected: layout.cardinality(),
                values: tags.to_vec(),
            })
        }
        _ => Ok(()),
    }
}

fn check_distinct(paths: &[PathBuf]) -> Result<()> {
    let mut seen = AHashSet::new();
    for path in paths {
        if !seen.insert(path) {
            return Err(SequenceDataError::DuplicatePath { path: path.clone() });
        }
    }
    Ok(())
}

/// Resolve the paths of files that must exist.
fn resolve_existing(files: SampleFiles) -> Result<SampleFiles> {
    let files = files.try_map(|path| {
        if !path.is_file() {
            return Err(SequenceDataError::MissingFile { path });
        }
        Ok(path.canonicalize()?)
    })?;
    check_distinct(files.as_slice())?;
    Ok(files)
}

/// Create the files of a new sample.  Files created before a failure are deleted again.
fn create_files(files: SampleFiles) -> Result<SampleFiles> {
    let files = files.try_map(|path| Ok(path.absolutize()?.to_path_buf()))?;
    check_distinct(files.as_slice())?;

    let mut created: Vec<&Path> = vec![];
    for path in files.as_slice() {
        if let Err(e) = OpenOptions::new().write(true).create_new(true).open(path) {
            for path in created {
                let _ = fs::remove_file(path);
            }
            return Err(match e.kind() {
                io::ErrorKind::AlreadyExists => {
                    SequenceDataError::FileExists { path: path.clone() }
                }
                _ => e.into(),
            });
        }
        created.push(path);
    }
    files.try_map(|path| Ok(path.canonicalize()?))
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().to_string()).unwrap_or_default()
}

fn output_location(file: &Path, output_dir: Option<&Path>) -> PathBuf {
    match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => file.parent().map(Path::to_path_buf).unwrap_or_default(),
    }
}

/// The trailing run of recognized sequence file suffixes in `name`, e.g. `.fastq.gz`.
fn recognized_suffix(name: &str) -> &str {
    let mut start = name.len();
    while let Some(suffix) = RECOGNIZED_SUFFIXES.iter().find(|suffix| name[..start].ends_with(*suffix)) {
        start -= suffix.len();
    }
    &name[start..]
}

/// `name` without its compression suffixes, ending in `.fastq` unless it already ends in a plain
/// FASTQ suffix.
fn decompressed_name(name: &str) -> String {
    let mut end = name.len();
    while let Some(suffix) = COMPRESSED_SUFFIXES.iter().find(|suffix| name[..end].ends_with(*suffix)) {
        end -= suffix.len();
    }
    let plain = &name[..end];
    if plain.ends_with(".fastq") || plain.ends_with(".fq") {
        plain.to_string()
    } else {
        format!("{}.fastq", plain)
    }
}

fn div_ceil(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator - 1) / denominator
}

fn lacks_trailing_newline(file: &Path, compression: Compression) -> Result<bool> {
    if fs::metadata(file)?.len() == 0 {
        return Ok(false);
    }
    Ok(last_byte(file, compression)?.map_or(false, |byte| byte != b'\n'))
}

fn newlines(needed: &[bool]) -> Vec<&'static [u8]> {
    needed.iter().map(|needed| if *needed { &b"\n"[..] } else { &b""[..] }).collect()
}

/// Append up to [`SPLIT_BUFFER`] bytes from `reader` to `buffer`, returning the number read.
fn read_chunk<R: Read>(reader: &mut R, buffer: &mut Vec<u8>) -> io::Result<usize> {
    reader.take(SPLIT_BUFFER as u64).read_to_end(buffer)
}

/// Find the first record start in `buffer` whose preceding newline is at or after `from`,
/// returning the offset of its `@`.
///
/// A line starting with `@` may be a header or a quality line.  It is a header only when
/// exactly one line separates it from the closest preceding `+` separator line.
fn find_record_start(buffer: &[u8], from: usize) -> Option<usize> {
    if from >= buffer.len() {
        return None;
    }
    buffer[from..]
        .find_iter(b"\n@")
        .map(|offset| from + offset)
        .find(|&newline| {
            buffer[..newline].rfind(b"\n+").map_or(false, |separator| {
                bytecount::count(&buffer[separator + 1..newline], b'\n') == 1
            })
        })
        .map(|newline| newline + 1)
}

/// The outcome of [`split_by_size`].
struct SizeSplit {
    /// The number of lines of each partition that was closed at a boundary.
    plan: Vec<usize>,
    /// The largest number of bytes held in the lookahead buffer.
    peak_buffer: usize,
}

/// Split the first file of a sample into `outputs` by size.  Each partition but the last ends
/// at the first record boundary at or after `target` decoded bytes.
///
/// A chunk is only read when the buffered bytes cannot close the current partition, so the
/// buffer stays within about two chunks regardless of the file size.
fn split_by_size<R: Read>(
    reader: &mut R,
    outputs: &[PathBuf],
    compression: Compression,
    target: u64,
) -> Result<SizeSplit> {
    let mut plan = vec![];
    let mut writer = FastqWriter::create(&outputs[0], compression, 1)?;
    let mut pending = Vec::with_capacity(2 * SPLIT_BUFFER);
    let mut peak_buffer = 0;
    let mut written = 0u64;
    let mut lines = 0;
    let mut search_from = 0;
    let mut exhausted = false;
    let mut need_more = true;

    loop {
        if need_more && !exhausted {
            exhausted = read_chunk(reader, &mut pending)? == 0;
            peak_buffer = peak_buffer.max(pending.len());
        }

        let last_partition = plan.len() + 1 == outputs.len();
        if last_partition || written + (pending.len() as u64) < target {
            lines += bytecount::count(&pending, b'\n');
            written += pending.len() as u64;
            writer.write_all(&pending)?;
            pending.clear();
            search_from = 0;
            need_more = true;
            if exhausted {
                break;
            }
            continue;
        }

        let limit = (target - written).max(1) as usize;
        match find_record_start(&pending, search_from.max(limit - 1)) {
            Some(cut) => {
                writer.write_all(&pending[..cut])?;
                plan.push(lines + bytecount::count(&pending[..cut], b'\n'));
                writer.finish()?;
                writer = FastqWriter::create(&outputs[plan.len()], compression, 1)?;
                pending.drain(..cut);
                written = 0;
                lines = 0;
                search_from = 0;
                need_more = false;
            }
            None if exhausted => {
                debug!("No record boundary left, {} partitions stay empty", outputs.len() - plan.len() - 1);
                writer.write_all(&pending)?;
                pending.clear();
                break;
            }
            None => {
                search_from = pending.len().saturating_sub(1);
                need_more = true;
            }
        }
    }
    writer.finish()?;

    for output in &outputs[plan.len() + 1..] {
        FastqWriter::create(output, compression, 1)?.finish()?;
    }
    debug!("Split with a lookahead buffer of at most {} bytes", peak_buffer);
    Ok(SizeSplit { plan, peak_buffer })
}

/// Split a file into `outputs` following the line counts of `plan`.  The partition after the
/// last planned one receives the remainder and any further partitions stay empty.
fn split_by_lines<R: BufRead>(
    reader: &mut R,
    outputs: &[PathBuf],
    compression: Compression,
    plan: &[usize],
) -> Result<()> {
    let mut line = vec![];
    for (index, output) in outputs.iter().enumerate() {
        let mut writer = FastqWriter::create(output, compression, 1)?;
        match plan.get(index) {
            Some(count) => {
                for _ in 0..*count {
                    line.clear();
                    if reader.read_until(b'\n', &mut line)? == 0 {
                        warn!("{} ended early while splitting", output.to_string_lossy());
                        break;
                    }
                    writer.write_all(&line)?;
                }
            }
            None if index == plan.len() => {
                io::copy(reader, &mut writer)?;
            }
            None => {}
        }
        writer.finish()?;
    }
    Ok(())
}
