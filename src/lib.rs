pub mod config;
pub mod error;
pub mod fetch;
pub mod merge;
pub mod pipeline;
pub mod process;
pub mod sink;
pub mod sources;
pub mod table;

pub use config::Config;
pub use error::PipelineError;
pub use merge::merge;
pub use pipeline::{run, run_with, RunSummary};
pub use process::reshape;
pub use sources::{Locator, SourceRegistry};
pub use table::{LongTable, MergedTable};
