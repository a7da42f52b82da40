//! DocVault command line: filesystem blob store, JSON snapshot catalog and
//! the bundled text/CSV parsers wired into a `DocumentService`.

pub mod cli;
pub mod csv_parser;
pub mod snapshot_repository;

pub use csv_parser::CsvParser;
pub use snapshot_repository::SnapshotRepository;
