//! Observability helpers for authorization flows.
//!
//! Spans are always emitted, named `cbl_auth.flow` with the `flow` (exchange kind) and
//! `stage` (call site) fields. Enable the `metrics` feature to additionally increment
//! the `cbl_auth_flow_total` counter for every attempt/success/failure, labeled by
//! `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Authorization-server exchange kinds observed by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Device/user code pair request.
	CodePair,
	/// Device-code polling exchange against the token endpoint.
	TokenExchange,
	/// Refresh-token exchange.
	Refresh,
	/// Customer-profile fetch.
	Profile,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::CodePair => "code_pair",
			FlowKind::TokenExchange => "token_exchange",
			FlowKind::Refresh => "refresh",
			FlowKind::Profile => "profile",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to an exchange.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure surfaced to the state machine.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
