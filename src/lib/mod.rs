//! A library for splitting FASTQ samples into record-aligned partitions and joining them back.
//!
//! # Overview
//!
//! The flow of data is as follows:
//!
//! - A [`collection::SequenceCollection`] is discovered in a directory, grouping files into
//!   single- or paired-end [`sequence_file::SequenceFile`]s whose properties are parsed from the
//!   file names with a [`template::FileNameTemplate`].
//! - Every sample is split into partitions that start at a record header, reading all files of a
//!   sample in lock-step through a [`multi_file::MultiFileHandle`].  The partitions are
//!   transposed into a [`collection::SplitCollection`].
//! - An [`edit::Operation`] may be applied to every partition on a [`edit::WorkerPool`].
//! - The partitions are joined back, one sample per slot, and renamed through a template.
//! - [`metrics`] describe the content of every partition.
#![deny(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]
pub mod collection;
pub mod compression;
pub mod edit;
pub mod errors;
pub mod metrics;
pub mod multi_file;
pub mod opts;
pub mod run;
pub mod sequence_file;
pub mod template;
pub mod utils;
