use std::fs;

use anyhow::{ensure, Context, Result};
use itertools::Itertools;
use log::{debug, info};

use crate::{
    collection::{SequenceCollection, SplitCollection},
    compression::Compression,
    edit::{Operation, ParallelEditable, RayonWorkerPool},
    metrics::PartitionMetrics,
    opts::{Opts, TOOL_NAME},
    sequence_file::SequenceFile,
    template::FileNameTemplate,
    utils::built_info,
};

/// Converts a sample to another compression, replacing the files of the sample.
pub struct Recompress {
    /// The compression to convert to.
    pub compression: Compression,
    /// The number of threads for compressing each file.
    pub threads: usize,
}

impl Operation for Recompress {
    fn perform(&self, sample: &SequenceFile) -> Result<(SequenceCollection, SequenceCollection)> {
        let current = sample.compression()?;
        if current == self.compression {
            return Ok((SequenceCollection::new(vec![sample.clone()]), SequenceCollection::default()));
        }

        let plain = if current.is_compressed() {
            sample.decompress(None, self.threads)?
        } else {
            sample.clone()
        };
        let converted = if self.compression.is_compressed() {
            let compressed = plain.compress(self.compression, None, self.threads)?;
            if current.is_compressed() {
                plain.remove()?;
            }
            compressed
        } else {
            plain
        };
        debug!("Converted {} from {} to {}", sample, current, self.compression);
        sample.clone().remove()?;
        Ok((SequenceCollection::new(vec![converted]), SequenceCollection::default()))
    }
}

/// Join the partitions through `template` and compare the record counts with the inputs.
fn join_and_verify(
    split: SplitCollection,
    template: &FileNameTemplate,
    expected: &[usize],
) -> Result<SequenceCollection> {
    let joined = split.join(template).context("Unable to join partitions")?;
    let observed = joined.iter().map(SequenceFile::number_of_records).collect::<Result<Vec<_>, _>>()?;
    ensure!(
        observed == expected,
        "Joined samples hold {:?} records, expected {:?}",
        observed,
        expected
    );
    Ok(joined)
}

#[allow(clippy::needless_pass_by_value)]
pub fn run(opts: Opts) -> Result<()> {
    info!("{} {}", TOOL_NAME, built_info::VERSION.as_str());

    // Preflight checks
    ensure!(
        opts.input_dir.is_dir(),
        "Input directory does not exist: {}",
        &opts.input_dir.to_string_lossy()
    );
    ensure!(
        opts.output_dir.is_dir(),
        "Output directory does not exist: {}",
        &opts.output_dir.to_string_lossy()
    );
    ensure!(
        fs::canonicalize(&opts.input_dir)? != fs::canonicalize(&opts.output_dir)?,
        "Output directory must differ from the input directory"
    );
    ensure!(opts.pieces > 0, "At least one piece must be requested");
    ensure!(opts.threads > 0, "At least one thread must be requested");

    let template = opts
        .template
        .as_deref()
        .map(FileNameTemplate::compile)
        .transpose()
        .context("Invalid file name template")?;
    let join_template = opts
        .join_template
        .as_deref()
        .map(FileNameTemplate::compile)
        .transpose()
        .context("Invalid join template")?;

    let collection = SequenceCollection::from_directory(
        opts.layout(),
        &opts.input_dir,
        template.as_ref(),
        opts.exclude.as_ref(),
    )?;
    info!("Found {} {} samples", collection.len(), opts.layout().name());

    if let (Some(compression), Some(_)) = (opts.compression, &join_template) {
        let inputs = collection.iter().map(SequenceFile::compression).collect::<Result<Vec<_>, _>>()?;
        ensure!(
            inputs.iter().all(|input| *input == compression),
            "--join-template keeps the input extensions, --compression {} differs from the input {}",
            compression,
            inputs.iter().unique().join(", ")
        );
    }
    let expected = if join_template.is_some() {
        collection.iter().map(SequenceFile::number_of_records).collect::<Result<Vec<_>, _>>()?
    } else {
        vec![]
    };

    info!("Splitting samples into {} partitions", opts.pieces);
    let mut split = collection
        .split(opts.pieces, &opts.output_dir)
        .with_context(|| format!("Unable to split samples into {}", opts.output_dir.to_string_lossy()))?;

    if let Some(compression) = opts.compression {
        info!("Converting partitions to {} on {} threads", compression, opts.threads);
        let pool = RayonWorkerPool::new(opts.threads)?;
        let operation = Recompress { compression, threads: opts.compressor_threads };
        let (converted, _) = split.edit_parallel(&pool, &operation, opts.threads)?;
        split = converted;
    }

    info!("Writing metrics");
    let metrics = PartitionMetrics::from_split(&split)?;
    PartitionMetrics::write(metrics, &opts.output_dir)?;

    if let Some(template) = join_template {
        info!("Joining partitions through {}", template.as_str());
        let joined = join_and_verify(split, &template, &expected)?;
        for sample in &joined {
            info!("Joined {}", sample);
        }
    }

    info!("Done");
    Ok(())
}
