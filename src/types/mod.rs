pub mod activity;
pub mod error;

pub use activity::{Activity, HrvSample};
pub use error::{
    ErrorCategory, ErrorClassifier, FetchError, Result, ResultExt, TrainError,
};
