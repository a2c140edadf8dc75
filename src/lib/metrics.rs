//! Per-partition metrics collected after a collection has been split.
//!
//! One [`PartitionMetrics`] row is written per sample per partition, so that the balance of a
//! split can be checked without re-reading the partitions.

use std::path::Path;

use anyhow::{Context, Result};
use fgoxide::io::DelimFile;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::collection::SplitCollection;

/// The name of the metrics file written to the output directory.
pub const SPLIT_METRICS_FILE_NAME: &str = "split_metrics.tsv";

/// The contents of one partition of one sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionMetrics {
    /// The sample name, or the first file name when the sample has no name.
    pub(crate) sample: String,
    /// The zero-based index of the partition.
    pub(crate) partition: usize,
    /// The number of records in the partition.
    pub(crate) records: usize,
    /// The comma separated files of the partition.
    pub(crate) files: String,
}

impl PartitionMetrics {
    /// Collect the metrics of every sample in every partition, counting records as it goes.
    pub fn from_split(split: &SplitCollection) -> Result<Vec<Self>> {
        let mut metrics = vec![];
        for (partition, samples) in split.iter().enumerate() {
            for sample in samples {
                let records = sample
                    .number_of_records()
                    .with_context(|| format!("Unable to count records of {}", sample))?;
                let name = sample.sample_name().map_or_else(
                    || {
                        sample.files()[0]
                            .file_name()
                            .map(|name| name.to_string_lossy().to_string())
                            .unwrap_or_default()
                    },
                    str::to_string,
                );
                metrics.push(Self {
                    sample: name,
                    partition,
                    records,
                    files: sample.files().iter().map(|f| f.to_string_lossy()).join(","),
                });
            }
        }
        Ok(metrics)
    }

    /// Write the metrics to [`SPLIT_METRICS_FILE_NAME`] in `output_dir`.
    pub fn write(metrics: Vec<Self>, output_dir: impl AsRef<Path>) -> Result<()> {
        let output_path = output_dir.as_ref().join(SPLIT_METRICS_FILE_NAME);
        let delim = DelimFile::default();
        delim.write_tsv(&output_path, metrics)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use fgoxide::io::DelimFile;
    use tempfile::tempdir;

    use crate::{
        collection::SequenceCollection,
        sequence_file::{Layout, SampleProperties, SequenceFile},
        utils::test_commons::{generate_reads, write_reads_to_file},
    };

    use super::{PartitionMetrics, SPLIT_METRICS_FILE_NAME};

    #[test]
    fn test_partition_metrics() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let path = input.path().join("reads.fastq.gz");
        write_reads_to_file(generate_reads(1, "R1", 10).into_iter(), &path);
        let properties =
            SampleProperties { sample_name: Some("s1".to_string()), ..SampleProperties::default() };
        let sample = SequenceFile::new(Layout::SingleEnd, vec![path], properties, true).unwrap();
        let split = SequenceCollection::new(vec![sample]).split(3, output.path()).unwrap();

        let metrics = PartitionMetrics::from_split(&split).unwrap();
        assert_eq!(metrics.len(), 3);
        assert!(metrics.iter().all(|m| m.sample == "s1"));
        assert_eq!(metrics.iter().map(|m| m.partition).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(metrics.iter().map(|m| m.records).sum::<usize>(), 10);
        assert!(metrics[0].files.ends_with("reads_0.fastq.gz"));

        PartitionMetrics::write(metrics.clone(), output.path()).unwrap();
        let delim = DelimFile::default();
        let read: Vec<PartitionMetrics> =
            delim.read_tsv(&output.path().join(SPLIT_METRICS_FILE_NAME)).unwrap();
        assert_eq!(read, metrics);
    }

    #[test]
    fn test_unnamed_sample_uses_file_name() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let path = input.path().join("reads.fastq");
        write_reads_to_file(generate_reads(1, "R1", 2).into_iter(), &path);
        let sample =
            SequenceFile::new(Layout::SingleEnd, vec![path], SampleProperties::default(), true)
                .unwrap();
        let split = SequenceCollection::new(vec![sample]).split(1, output.path()).unwrap();

        let metrics = PartitionMetrics::from_split(&split).unwrap();
        assert_eq!(metrics[0].sample, "reads_0.fastq");
        assert_eq!(metrics[0].records, 2);
    }
}
