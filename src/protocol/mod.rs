/// Protocol types for the sum call
///
/// This module defines the JSON payloads carried inside request and response
/// envelopes. Correlation and cancellation travel in envelope metadata.
mod message;

pub use message::{SumRequest, SumResponse, SUM_METHOD};
