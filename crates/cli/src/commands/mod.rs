//! CLI commands for the occupancy tracker.

pub mod collect;
pub mod common;
pub mod csv_io;
pub mod data_status;
pub mod latest;
pub mod occupancy;
pub mod transitions;

pub use collect::{run_collect, CollectArgs};
pub use csv_io::{run_export_csv, run_import_csv, ExportCsvArgs, ImportCsvArgs};
pub use data_status::{run_data_status, DataStatusArgs};
pub use latest::{run_latest, LatestArgs};
pub use occupancy::{run_occupancy, OccupancyArgs};
pub use transitions::{run_transitions, TransitionsArgs};
