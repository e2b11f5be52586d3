//! Core spamd protocol types.

mod status;
mod tell;
mod verdict;

pub use status::{ProtocolVersion, ResponseCode, StatusLine};
pub use tell::{MessageClass, TellAck, TellTargets};
pub use verdict::{EMPTY_SUMMARY, SCORE_LIMIT, Verdict};
