// Beam spot ingestion and rotated 2D Gaussian fitting.
pub mod analysis;
pub mod calibration;
pub mod config;
pub mod error;
pub mod formats;
pub mod output;
pub mod pipeline;
pub mod types;

pub use analysis::derive::{DerivedMetrics, Projection};
pub use analysis::fitting::{FitOptions, FitResult};
pub use analysis::params::{FitParameter, ParamId, ParamSet, SpotParams};
pub use analysis::{SpotAnalyzer, SpotReport};
pub use calibration::Calibration;
pub use config::AppConfig;
pub use error::SpotError;
pub use pipeline::{ingest, subtract_background};
pub use types::{CalibratedImage, FormatKind, SourceInfo, Warning};
