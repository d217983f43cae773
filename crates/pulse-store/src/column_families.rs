//! Column family definitions for the RocksDB adapter.
//!
//! Each column family isolates data with different access patterns:
//! - jobs: job definitions, point lookups and small scans
//! - runs: run records under time-prefixed keys for ordered range scans
//! - run_index: run-id and occurrence lookups into the runs family
//! - settings: the singleton settings record

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family for scheduled job definitions
pub const CF_JOBS: &str = "jobs";

/// Column family for job run records
pub const CF_RUNS: &str = "runs";

/// Column family for run-id and occurrence indexes
pub const CF_RUN_INDEX: &str = "run_index";

/// Column family for the settings singleton
pub const CF_SETTINGS: &str = "settings";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_JOBS, CF_RUNS, CF_RUN_INDEX, CF_SETTINGS];

/// Options for the runs family (append-mostly, compressed)
fn runs_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_JOBS, Options::default()),
        ColumnFamilyDescriptor::new(CF_RUNS, runs_options()),
        ColumnFamilyDescriptor::new(CF_RUN_INDEX, Options::default()),
        ColumnFamilyDescriptor::new(CF_SETTINGS, Options::default()),
    ]
}
