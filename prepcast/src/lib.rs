//! # Prepcast
//!
//! Guided pipeline that turns a kitchen's daily prep and sales records into a
//! trained demand forecast.
//!
//! ## Stages
//!
//! - **Upload**: a table with `Item`, `Qty Prepped`, `Qty Sold`, `Date` and
//!   `WeatherOpt` columns is validated into a dataset
//! - **Validation review**: zero-sales, high-waste and outlier anomalies are
//!   listed alongside a waste heat map
//! - **Training**: a background job fits a demand model with the selected
//!   features, reporting progress and honouring cancellation
//! - **Forecasting**: predictions over any date range, with MAE, MAPE, R² and
//!   feature impacts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use prepcast::data::DataLoader;
//! use prepcast::forecast::DateRange;
//! use prepcast::{PipelineConfig, PipelineSession};
//!
//! let mut session = PipelineSession::new(PipelineConfig::default())?;
//!
//! let table = DataLoader::from_csv("prep_log.csv")?;
//! let validation = session.submit_upload(&table)?;
//! assert!(validation.is_valid());
//!
//! session.confirm_validation()?;
//! session.toggle_feature("menuType")?;
//! session.start_training()?;
//! session.wait_for_training()?;
//!
//! let range = DateRange::new(
//!     "2024-03-01".parse().unwrap(),
//!     "2024-03-31".parse().unwrap(),
//! )?;
//! let forecast = session.get_forecast(range)?;
//! println!("{}", forecast.metrics);
//! # Ok::<(), prepcast::PipelineError>(())
//! ```

pub mod anomaly;
pub mod attribution;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod forecast;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod synthetic;
pub mod training;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use crate::anomaly::{Anomaly, AnomalyDetector, AnomalyKind};
pub use crate::config::PipelineConfig;
pub use crate::data::{DataLoader, Dataset, RawTable, Record};
pub use crate::error::{PipelineError, Result, TrainingFailure};
pub use crate::features::{Feature, FeatureRegistry, FeatureSnapshot};
pub use crate::forecast::{DateRange, ForecastResult, Granularity};
pub use crate::metrics::Metrics;
pub use crate::pipeline::{PipelineSession, PipelineStage};
pub use crate::training::{JobController, JobEvent, JobId, JobStatus, TrainingJob};
pub use crate::validation::{validate, ValidationResult};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
