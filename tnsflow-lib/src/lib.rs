//! Passive Oracle Net (TNS) analyzer: reconstructs client/server
//! conversations from a packet capture, re-associates SQL text with the
//! exchanges that executed it, and aggregates per-statement timing from
//! the application's point of view, without server-side instrumentation.

pub mod capture;
pub mod constants;
pub mod conversation;
pub mod error;
pub mod fingerprint;
pub mod flow;
pub mod packet;
pub mod report;
pub mod request;
pub mod response;
pub mod session;
pub mod stats;
pub mod tns;

pub use error::TnsError;
pub use report::Report;
pub use session::{AnalysisSession, SessionConfig};
