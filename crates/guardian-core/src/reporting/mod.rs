//! Report assembly and output.
//!
//! [`GuardianReport`] merges the quality report, the anomaly result and the
//! explanation with run metadata. The same structure backs the CLI's `--json`
//! output and the file written by `--emit-report`.
//!
//! # Example
//!
//! ```rust,ignore
//! use guardian_core::reporting::{GuardianReport, ReportWriter};
//!
//! let output = guardian.run(&df)?;
//! let report = GuardianReport::new("data/orders.csv", &df, output);
//!
//! println!("{}", serde_json::to_string_pretty(&report)?);
//!
//! let path = ReportWriter::new("outputs").write(&report, "orders")?;
//! ```

mod generator;

pub use generator::{DatasetShape, GuardianReport, ReportWriter};
