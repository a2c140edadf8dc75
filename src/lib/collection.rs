//! Ordered collections of samples.
//!
//! The order of a [`SequenceCollection`] is significant: joining and editing pair samples up by
//! position.  A [`SplitCollection`] is the transpose of a split collection: partition `p` holds
//! the `p`-th piece of every sample.

use std::{
    fs,
    iter::{repeat, FromIterator},
    ops::{Add, AddAssign},
    path::Path,
};

use log::{debug, info};
use glob::Pattern;

use crate::{
    compression::RECOGNIZED_SUFFIXES,
    edit::{Editable, Operation, ParallelEditable, WorkerPool},
    errors::{Result, SequenceDataError},
    sequence_file::{Layout, SampleProperties, SequenceFile},
    template::FileNameTemplate,
};

/// An ordered collection of samples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceCollection {
    samples: Vec<SequenceFile>,
}

impl SequenceCollection {
    pub fn new(samples: Vec<SequenceFile>) -> Self {
        Self { samples }
    }

    /// Discover the samples in `directory`.
    ///
    /// Files with a recognized sequence file suffix whose name does not match `exclude` are
    /// sorted by path and grouped into samples of `layout`'s cardinality, so that the forward and
    /// reverse files of a paired-end sample must sort next to each other.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::NotADirectory`] if `directory` is not a directory
    /// - [`SequenceDataError::NoSequenceFiles`] if no sequence files are found
    /// - any error of [`SequenceFile::pop`]
    pub fn from_directory(
        layout: Layout,
        directory: &Path,
        template: Option<&FileNameTemplate>,
        exclude: Option<&Pattern>,
    ) -> Result<Self> {
        info!("Looking for sequence files in {}", directory.to_string_lossy());
        if !directory.is_dir() {
            return Err(SequenceDataError::NotADirectory { path: directory.to_path_buf() });
        }

        let mut paths = vec![];
        for entry in fs::read_dir(directory)? {
            let path = entry?.path();
            let recognized = path.extension().map_or(false, |extension| {
                RECOGNIZED_SUFFIXES.contains(&format!(".{}", extension.to_string_lossy()).as_str())
            });
            let excluded = exclude.map_or(false, |exclude| {
                path.file_name().map_or(false, |name| exclude.matches(&name.to_string_lossy()))
            });
            if excluded {
                info!("Excluding {}", path.to_string_lossy());
            } else if recognized && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        debug!("Sequence files found: {:?}", paths);
        if paths.is_empty() {
            return Err(SequenceDataError::NoSequenceFiles { path: directory.to_path_buf() });
        }

        let mut paths = paths.into_iter();
        let mut samples = vec![];
        while let Some(sample) = SequenceFile::pop(&mut paths, layout, template, true)? {
            samples.push(sample);
        }
        info!("Number of {} samples: {}", layout.name(), samples.len());
        Ok(Self::new(samples))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SequenceFile> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[SequenceFile] {
        &self.samples
    }

    pub fn push(&mut self, sample: SequenceFile) {
        self.samples.push(sample);
    }

    /// Split every sample into `pieces` partitions written to `output_dir`.
    pub fn split(&self, pieces: usize, output_dir: &Path) -> Result<SplitCollection> {
        if pieces == 0 {
            return Err(SequenceDataError::ZeroPieces);
        }
        let mut partitions = vec![SequenceCollection::default(); pieces];
        for sample in &self.samples {
            let split = sample.split(pieces, output_dir)?;
            for (partition, piece) in partitions.iter_mut().zip(split) {
                partition.push(piece);
            }
        }
        Ok(SplitCollection::new(partitions, self.samples.clone()))
    }

    /// Join the samples of `other` onto the samples of this collection, position by position.
    /// An empty collection on either side yields the other side unchanged.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::CountMismatch`] if the collections differ in length
    pub fn join(self, other: SequenceCollection) -> Result<Self> {
        if self.is_empty() {
            return Ok(other);
        }
        if other.is_empty() {
            return Ok(self);
        }
        if self.len() != other.len() {
            return Err(SequenceDataError::CountMismatch {
                expected: self.len(),
                actual: other.len(),
            });
        }
        self.samples
            .into_iter()
            .zip(other.samples)
            .map(|(receiver, sample)| receiver.join(sample))
            .collect()
    }

    /// Delete the files of every sample.
    pub fn remove(self) -> Result<()> {
        for sample in self.samples {
            sample.remove()?;
        }
        Ok(())
    }
}

impl Add for SequenceCollection {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl AddAssign for SequenceCollection {
    fn add_assign(&mut self, other: Self) {
        self.samples.extend(other.samples);
    }
}

impl FromIterator<SequenceFile> for SequenceCollection {
    fn from_iter<I: IntoIterator<Item = SequenceFile>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for SequenceCollection {
    type Item = SequenceFile;
    type IntoIter = std::vec::IntoIter<SequenceFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter()
    }
}

impl<'a> IntoIterator for &'a SequenceCollection {
    type Item = &'a SequenceFile;
    type IntoIter = std::slice::Iter<'a, SequenceFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

fn concat(
    results: Vec<(SequenceCollection, SequenceCollection)>,
) -> (SequenceCollection, SequenceCollection) {
    results.into_iter().fold(
        (SequenceCollection::default(), SequenceCollection::default()),
        |(primary, auxiliary), (result, aux)| (primary + result, auxiliary + aux),
    )
}

impl Editable for SequenceCollection {
    type Output = SequenceCollection;

    fn edit<O: Operation + ?Sized>(
        &self,
        operation: &O,
    ) -> anyhow::Result<(SequenceCollection, SequenceCollection)> {
        let results = self
            .samples
            .iter()
            .map(|sample| sample.edit(operation))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(concat(results))
    }
}

impl ParallelEditable for SequenceCollection {
    fn edit_parallel<P: WorkerPool, O: Operation + ?Sized>(
        &self,
        pool: &P,
        operation: &O,
        workers: usize,
    ) -> anyhow::Result<(SequenceCollection, SequenceCollection)> {
        let results = pool.map(&self.samples, workers, |sample| sample.edit(operation))?;
        Ok(concat(results))
    }
}

/// The partitions of a split [`SequenceCollection`] together with the samples they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitCollection {
    partitions: Vec<SequenceCollection>,
    originals: Vec<SequenceFile>,
}

impl SplitCollection {
    pub fn new(partitions: Vec<SequenceCollection>, originals: Vec<SequenceFile>) -> Self {
        Self { partitions, originals }
    }

    /// The number of partitions.
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SequenceCollection> {
        self.partitions.iter()
    }

    pub fn partitions(&self) -> &[SequenceCollection] {
        &self.partitions
    }

    /// The samples that were split.
    pub fn originals(&self) -> &[SequenceFile] {
        &self.originals
    }

    /// Join the partitions back together, one sample per slot, and rename the joined samples
    /// through `template`.
    ///
    /// Partition numbering is dropped from the names by giving each joined sample the extension
    /// of the sample it came from.  When an edit produced several samples per original sample,
    /// consecutive joined samples are matched to the same original.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::CountMismatch`] if the number of joined samples is not a multiple
    ///   of the number of original samples
    pub fn join(self, template: &FileNameTemplate) -> Result<SequenceCollection> {
        let mut joined = SequenceCollection::default();
        for partition in self.partitions {
            joined = joined.join(partition)?;
        }
        if self.originals.is_empty() || joined.is_empty() {
            return Ok(joined);
        }

        let per_original = joined.len() / self.originals.len();
        if per_original * self.originals.len() != joined.len() || per_original == 0 {
            return Err(SequenceDataError::CountMismatch {
                expected: self.originals.len(),
                actual: joined.len(),
            });
        }
        let originals =
            self.originals.iter().flat_map(|original| repeat(original).take(per_original));
        originals
            .zip(joined)
            .map(|(original, sample)| {
                let properties = SampleProperties {
                    extension: original.properties().extension.clone(),
                    ..sample.properties().clone()
                };
                sample.rename(template, properties)
            })
            .collect()
    }

    /// Delete the files of every partition.
    pub fn remove(self) -> Result<()> {
        for partition in self.partitions {
            partition.remove()?;
        }
        Ok(())
    }
}

impl Editable for SplitCollection {
    type Output = SplitCollection;

    fn edit<O: Operation + ?Sized>(
        &self,
        operation: &O,
    ) -> anyhow::Result<(SplitCollection, SplitCollection)> {
        let results = self
            .partitions
            .iter()
            .map(|partition| partition.edit(operation))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(self.regroup(results))
    }
}

impl ParallelEditable for SplitCollection {
    fn edit_parallel<P: WorkerPool, O: Operation + ?Sized>(
        &self,
        pool: &P,
        operation: &O,
        workers: usize,
    ) -> anyhow::Result<(SplitCollection, SplitCollection)> {
        let results =
            pool.map(&self.partitions, workers, |partition| partition.edit(operation))?;
        Ok(self.regroup(results))
    }
}

impl SplitCollection {
    fn regroup(
        &self,
        results: Vec<(SequenceCollection, SequenceCollection)>,
    ) -> (SplitCollection, SplitCollection) {
        let (primary, auxiliary): (Vec<_>, Vec<_>) = results.into_iter().unzip();
        (
            SplitCollection::new(primary, self.originals.clone()),
            SplitCollection::new(auxiliary, self.originals.clone()),
        )
    }
}

#[cfg(test)]
mod test {
    use std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use anyhow::{bail, Result};
    use glob::Pattern;
    use rstest::rstest;
    use tempfile::tempdir;

    use crate::{
        edit::{Editable, Operation, ParallelEditable, RayonWorkerPool},
        errors::SequenceDataError,
        sequence_file::{Layout, SampleProperties, SequenceFile},
        template::FileNameTemplate,
        utils::test_commons::{fastq_bytes, generate_reads, slurp_bytes, write_reads_to_file},
    };

    use super::SequenceCollection;

    const TEMPLATE: &str = "{sample_name}_{orientation:2}{extension}";

    /// Write `num_samples` paired-end samples with increasing numbers of reads.
    fn write_paired_samples(dir: &Path, num_samples: usize, suffix: &str) {
        for sample in 1..=num_samples {
            for orientation in ["R1", "R2"] {
                let path = dir.join(format!("s{}_{}{}", sample, orientation, suffix));
                write_reads_to_file(
                    generate_reads(sample, orientation, sample * 3).into_iter(),
                    path,
                );
            }
        }
    }

    fn discover(dir: &Path) -> SequenceCollection {
        let template = FileNameTemplate::compile(TEMPLATE).unwrap();
        SequenceCollection::from_directory(Layout::PairedEnd, dir, Some(&template), None).unwrap()
    }

    /// Copies a sample into a new single-end sample per mate, counting its calls.
    struct SplitMates {
        output_dir: std::path::PathBuf,
        calls: AtomicUsize,
    }

    impl Operation for SplitMates {
        fn perform(
            &self,
            sample: &SequenceFile,
        ) -> Result<(SequenceCollection, SequenceCollection)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Later samples finish first when run in parallel.
            let index = sample.sample_name().unwrap()[1..].parse::<u64>().unwrap();
            thread::sleep(Duration::from_millis(30u64.saturating_sub(5 * index)));
            let mut result = SequenceCollection::default();
            for (file, tag) in sample.files().iter().zip(sample.orientation().unwrap()) {
                let path = self.output_dir.join(format!(
                    "{}_{}{}",
                    sample.sample_name().unwrap(),
                    tag,
                    sample.extension().unwrap()
                ));
                std::fs::copy(file, &path)?;
                let properties = SampleProperties {
                    orientation: Some(vec![tag.clone()]),
                    ..sample.properties().clone()
                };
                result.push(SequenceFile::new(Layout::SingleEnd, vec![path], properties, true)?);
            }
            Ok((result, SequenceCollection::default()))
        }
    }

    struct Fail;

    impl Operation for Fail {
        fn perform(&self, sample: &SequenceFile) -> Result<(SequenceCollection, SequenceCollection)> {
            bail!("Cannot process {}", sample)
        }
    }

    #[test]
    fn test_from_directory() {
        let dir = tempdir().unwrap();
        write_paired_samples(dir.path(), 3, ".fastq");
        std::fs::write(dir.path().join("notes.txt"), b"not a fastq").unwrap();

        let collection = discover(dir.path());
        assert_eq!(collection.len(), 3);
        let first = &collection.samples()[0];
        assert_eq!(first.sample_name(), Some("s1"));
        assert_eq!(first.orientation().unwrap(), &["R1".to_string(), "R2".to_string()]);
        assert_eq!(first.extension(), Some(".fastq"));
        assert_eq!(collection.samples()[2].number_of_records().unwrap(), 9);
    }

    #[test]
    fn test_from_directory_exclude_and_errors() {
        let dir = tempdir().unwrap();
        write_paired_samples(dir.path(), 2, ".fastq.gz");
        let template = FileNameTemplate::compile(TEMPLATE).unwrap();
        let exclude = Pattern::new("s2_*").unwrap();
        let collection = SequenceCollection::from_directory(
            Layout::PairedEnd,
            dir.path(),
            Some(&template),
            Some(&exclude),
        )
        .unwrap();
        assert_eq!(collection.len(), 1);

        let everything = Pattern::new("*").unwrap();
        let err = SequenceCollection::from_directory(
            Layout::PairedEnd,
            dir.path(),
            None,
            Some(&everything),
        )
        .unwrap_err();
        assert!(matches!(err, SequenceDataError::NoSequenceFiles { .. }));

        let err = SequenceCollection::from_directory(
            Layout::SingleEnd,
            &dir.path().join("s1_R1.fastq.gz"),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SequenceDataError::NotADirectory { .. }));
    }

    #[test]
    fn test_from_directory_odd_number_of_paired_files() {
        let dir = tempdir().unwrap();
        write_paired_samples(dir.path(), 1, ".fastq");
        write_reads_to_file(generate_reads(9, "R1", 1).into_iter(), dir.path().join("s9_R1.fastq"));
        let err = SequenceCollection::from_directory(Layout::PairedEnd, dir.path(), None, None)
            .unwrap_err();
        assert!(matches!(err, SequenceDataError::WrongCardinality { .. }));
    }

    #[rstest]
    #[case(".fastq", 1)]
    #[case(".fastq", 2)]
    #[case(".fastq.gz", 5)]
    #[case(".fastq.bz2", 17)]
    fn test_split_then_join_round_trips(#[case] suffix: &str, #[case] pieces: usize) {
        let input = tempdir().unwrap();
        let work = tempdir().unwrap();
        write_paired_samples(input.path(), 3, suffix);
        let collection = discover(input.path());
        let expected = collection
            .iter()
            .map(|sample| sample.files().iter().map(slurp_bytes).collect::<Vec<_>>())
            .collect::<Vec<_>>();

        let split = collection.split(pieces, work.path()).unwrap();
        assert_eq!(split.len(), pieces);
        assert!(split.iter().all(|partition| partition.len() == 3));
        let records =
            split.iter().map(|partition| partition.samples()[0].number_of_records().unwrap());
        assert_eq!(records.sum::<usize>(), 3);

        let template = FileNameTemplate::compile(TEMPLATE).unwrap();
        let joined = split.join(&template).unwrap();
        assert_eq!(joined.len(), 3);
        for (sample, (original, contents)) in joined.iter().zip(collection.iter().zip(expected)) {
            assert_eq!(sample.extension(), original.extension());
            for (file, (original_file, content)) in
                sample.files().iter().zip(original.files().iter().zip(contents))
            {
                assert_eq!(file.file_name(), original_file.file_name());
                assert_eq!(file.parent().unwrap(), work.path().canonicalize().unwrap());
                assert_eq!(slurp_bytes(file), content);
            }
        }
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 6);
    }

    #[test]
    fn test_join_collections() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a.fastq");
        let second = dir.path().join("b.fastq");
        let reads = generate_reads(1, "R1", 4);
        write_reads_to_file(reads[..2].to_vec().into_iter(), &first);
        write_reads_to_file(reads[2..].to_vec().into_iter(), &second);
        let sample = |path| {
            SequenceFile::new(Layout::SingleEnd, vec![path], SampleProperties::default(), true)
                .unwrap()
        };

        let receiver = SequenceCollection::new(vec![sample(first.clone())]);
        let other = SequenceCollection::new(vec![sample(second.clone())]);
        assert_eq!(SequenceCollection::default().join(receiver.clone()).unwrap(), receiver);
        assert_eq!(receiver.clone().join(SequenceCollection::default()).unwrap(), receiver);

        let joined = receiver.join(other).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(slurp_bytes(&first), fastq_bytes(&reads));
        assert!(!second.exists());
    }

    #[test]
    fn test_concatenation() {
        let dir = tempdir().unwrap();
        write_paired_samples(dir.path(), 4, ".fastq");
        let collection = discover(dir.path());
        let (left, right) = collection.samples().split_at(1);
        let mut combined = SequenceCollection::new(left.to_vec());
        combined += SequenceCollection::new(right.to_vec());
        assert_eq!(combined, collection);
        assert_eq!(combined.clone() + SequenceCollection::default(), collection);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    fn test_edit_parallel_matches_sequential(#[case] workers: usize) {
        let input = tempdir().unwrap();
        write_paired_samples(input.path(), 5, ".fastq");
        let collection = discover(input.path());
        let pool = RayonWorkerPool::new(4).unwrap();

        let sequential_dir = tempdir().unwrap();
        let sequential_op =
            SplitMates { output_dir: sequential_dir.path().to_path_buf(), calls: AtomicUsize::new(0) };
        let (sequential, sequential_aux) = collection.edit(&sequential_op).unwrap();

        let parallel_dir = tempdir().unwrap();
        let parallel_op =
            SplitMates { output_dir: parallel_dir.path().to_path_buf(), calls: AtomicUsize::new(0) };
        let (parallel, parallel_aux) =
            collection.edit_parallel(&pool, &parallel_op, workers).unwrap();

        assert_eq!(sequential_op.calls.load(Ordering::SeqCst), 5);
        assert_eq!(parallel_op.calls.load(Ordering::SeqCst), 5);
        assert!(sequential_aux.is_empty() && parallel_aux.is_empty());
        let names = |collection: &SequenceCollection| {
            collection
                .iter()
                .map(|sample| sample.files()[0].file_name().unwrap().to_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(parallel.len(), 10);
        assert_eq!(names(&parallel), names(&sequential));
    }

    #[test]
    fn test_split_collection_edit_and_join() {
        let input = tempdir().unwrap();
        let work = tempdir().unwrap();
        let edited = tempdir().unwrap();
        write_paired_samples(input.path(), 2, ".fastq");
        let collection = discover(input.path());
        let split = collection.split(3, work.path()).unwrap();

        let operation =
            SplitMates { output_dir: edited.path().to_path_buf(), calls: AtomicUsize::new(0) };
        let pool = RayonWorkerPool::new(3).unwrap();
        let (results, aux) = split.edit_parallel(&pool, &operation, 3).unwrap();
        assert_eq!(operation.calls.load(Ordering::SeqCst), 6);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|partition| partition.len() == 4));
        assert!(aux.iter().all(SequenceCollection::is_empty));
        split.remove().unwrap();

        // Two single-end samples per original, matched to the same original on join.
        let template = FileNameTemplate::compile(TEMPLATE).unwrap();
        let joined = results.join(&template).unwrap();
        assert_eq!(joined.len(), 4);
        let names = joined
            .iter()
            .map(|sample| sample.files()[0].file_name().unwrap().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["s1_R1.fastq", "s1_R2.fastq", "s2_R1.fastq", "s2_R2.fastq"]);
        for (sample, name) in joined.iter().zip(&names) {
            assert_eq!(slurp_bytes(&sample.files()[0]), slurp_bytes(input.path().join(name)));
        }
    }

    #[test]
    fn test_edit_failure_aborts() {
        let dir = tempdir().unwrap();
        write_paired_samples(dir.path(), 3, ".fastq");
        let collection = discover(dir.path());
        let pool = RayonWorkerPool::new(2).unwrap();
        assert!(collection.edit(&Fail).is_err());
        assert!(collection.edit_parallel(&pool, &Fail, 2).is_err());
    }
}
