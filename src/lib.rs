//! # Prepcast workspace
//!
//! Facade over the workspace crates:
//!
//! - [`prepcast`]: the guided upload, validation, training and forecasting
//!   pipeline
//! - [`prep_math`]: running statistics and guarded ratios used by the
//!   pipeline
//!
//! ## Example
//!
//! ```
//! use prepcast_workspace::prep_math::waste_ratio;
//! use prepcast_workspace::prepcast::{PipelineConfig, PipelineSession, PipelineStage};
//!
//! assert_eq!(waste_ratio(10.0, 2.0), Some(0.8));
//!
//! let session = PipelineSession::new(PipelineConfig::default()).unwrap();
//! assert_eq!(session.stage(), PipelineStage::AwaitingUpload);
//! ```

pub use prep_math;
pub use prepcast;

/// Version of the workspace facade
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
