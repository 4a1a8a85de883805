pub mod submitter;

pub use submitter::{RecommendedFees, TransactionSubmitter};
