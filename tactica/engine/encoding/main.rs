//! Encoders turning raw categorical strings and principle sets into numeric form.

/// Stable string-to-code mapping with an unseen-value sentinel.
pub mod categorical;
/// Principle-set to binary indicator mapping.
pub mod labels;

pub use categorical::{CategoricalEncoder, UNSEEN_CODE};
pub use labels::{nonzero_indices, EncodingError, LabelSetEncoder};
