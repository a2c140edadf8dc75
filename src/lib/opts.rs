#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::Parser;
use env_logger::Env;
use glob::Pattern;

use crate::{
    compression::Compression,
    sequence_file::Layout,
    utils::{built_info, NUM_CPU},
};

pub static TOOL_NAME: &str = "fqsplit";

static SHORT_USAGE: &str = "Splits FASTQ samples into record-aligned partitions.";

static LONG_USAGE: &str = "
Splits FASTQ samples into record-aligned partitions.

Every sequence file in the input directory is grouped into a sample: one file per sample for
single-end data, two sorted neighbours per sample with --paired.  File names are parsed with the
file name template, whose fields are written in braces with an optional fixed width, e.g.
`{sample_name}_{orientation:2}{extension}`.  The recognized fields are `run`, `sample_name`,
`extension` and `orientation`.

Each sample is cut into --pieces partitions of roughly equal size.  Partitions never cut through a
FASTQ record and the mates of a paired-end sample are always cut after the same record.  Partition
`i` of `name.fastq.gz` is written to `name_i.fastq.gz` in the output directory, which must exist.
Plain, gzip and bzip2 input is supported and partitions keep the compression of their input unless
--compression is given.

The number of records in every partition is written to `split_metrics.tsv`.

With --join-template the partitions are joined back together after they were written, renamed
through the given template, and checked against the record counts of the input samples.

Example invocation:

fqsplit \\
  --input-dir fastqs/ \\
  --template '{sample_name}_{orientation:2}{extension}' \\
  --paired \\
  --pieces 8 \\
  --output-dir partitions/
";

#[derive(Parser, Debug, Clone)]
#[clap(name = TOOL_NAME, version = built_info::VERSION.as_str(), about=SHORT_USAGE, long_about=LONG_USAGE, term_width=0)]
pub struct Opts {
    /// The directory holding the input sequence files.
    #[clap(long, short = 'i', display_order = 1)]
    pub input_dir: PathBuf,

    /// The template the input file names follow.
    ///
    /// [default: None]
    #[clap(long, short = 't', display_order = 2)]
    pub template: Option<String>,

    /// The directory to write partitions and metrics to, the directory must exist.
    #[clap(long, short, display_order = 3)]
    pub output_dir: PathBuf,

    /// Group the input files into paired-end samples.
    #[clap(long, short = 'p', display_order = 11)]
    pub paired: bool,

    /// Ignore input files whose name matches this glob pattern, e.g. `Undetermined*`.
    ///
    /// [default: None]
    #[clap(long, short = 'x', display_order = 11)]
    pub exclude: Option<Pattern>,

    /// The number of partitions to split every sample into.
    #[clap(long, short = 'n', default_value = "2", display_order = 11)]
    pub pieces: usize,

    /// Convert the partitions to this compression.
    ///
    /// [default: the compression of the input]
    #[clap(long, short = 'c', possible_values=Compression::possible_values(), display_order = 21)]
    pub compression: Option<Compression>,

    /// Join the partitions again and name the joined samples with this template.
    ///
    /// The joined samples keep the extension of the input samples.
    ///
    /// [default: None]
    #[clap(long, short = 'j', display_order = 21)]
    pub join_template: Option<String>,

    /// Number of threads for processing partitions.
    #[clap(long, short = 'T', default_value = NUM_CPU.as_str(), display_order = 31)]
    pub threads: usize,

    /// Number of threads for compressing each gzip output file.
    #[clap(long, default_value = "1", display_order = 31, hide = true)]
    pub compressor_threads: usize,
}

impl Opts {
    /// The layout implied by `--paired`.
    pub fn layout(&self) -> Layout {
        if self.paired {
            Layout::PairedEnd
        } else {
            Layout::SingleEnd
        }
    }
}

/// Implement defaults that match the CLI options to allow for easier testing.
///
/// Note that these defaults exist only within test code.
#[cfg(test)]
impl Default for Opts {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::default(),
            template: None,
            output_dir: PathBuf::default(),
            paired: false,
            exclude: None,
            pieces: 2,
            compression: None,
            join_template: None,
            threads: 2,
            compressor_threads: 1,
        }
    }
}

/// Parse args and set up logging / tracing
pub fn setup() -> Opts {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    Opts::parse()
}
