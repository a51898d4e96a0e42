// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;

/// Outcome of evaluating a single rule.
///
/// Failures are carried separately as `Err(AuthzError)` so that an error can
/// never be mistaken for a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
	/// Terminal: the operation is permitted.
	Allow,
	/// Terminal: the operation is refused, with a reason for logs and errors.
	Deny(String),
	/// Not decisive; evaluation continues with the next rule.
	Skip,
}

impl Decision {
	pub fn deny(reason: impl Into<String>) -> Self {
		Decision::Deny(reason.into())
	}

	pub fn is_terminal(&self) -> bool {
		!matches!(self, Decision::Skip)
	}

	pub fn is_allow(&self) -> bool {
		matches!(self, Decision::Allow)
	}
}

impl fmt::Display for Decision {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Decision::Allow => write!(f, "allow"),
			Decision::Deny(_) => write!(f, "deny"),
			Decision::Skip => write!(f, "skip"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_skip_is_non_terminal() {
		assert!(Decision::Allow.is_terminal());
		assert!(Decision::deny("nope").is_terminal());
		assert!(!Decision::Skip.is_terminal());
	}
}
