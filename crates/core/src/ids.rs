//! Identifiers derived from deployment records and rule names.
//!
//! Everything here must be deterministic across processes and runs: the
//! target id and the permission statement id are the idempotency keys that
//! keep repeated reconciliation from piling up duplicate remote entries.

use crate::model::ScheduleBinding;

/// Prefix keeping target ids from starting with a digit.
pub const TARGET_ID_PREFIX: &str = "ID";

/// Prefix for invoke-permission statement ids.
pub const STATEMENT_ID_PREFIX: &str = "SID";

/// Segment count of a qualified Lambda ARN:
/// `arn:<partition>:lambda:<region>:<account>:function:<name>:<qualifier>`.
const QUALIFIED_ARN_SEGMENTS: usize = 8;

/// 32-bit rolling string hash (`h = h * 31 + unit`, wrapping) over UTF-16
/// code units.
///
/// Not cryptographic. It only has to be stable and produce a charset-safe
/// decimal. Matches `String.hashCode` semantics, which keeps ids identical to
/// targets registered by earlier tooling.
pub fn stable_hash(s: &str) -> i32 {
    s.encode_utf16().fold(0i32, |acc, unit| {
        acc.wrapping_shl(5)
            .wrapping_sub(acc)
            .wrapping_add(i32::from(unit))
    })
}

/// Function ARN the rule target must reference: the stage qualifier removed.
///
/// Only a trailing qualifier segment of a fully qualified Lambda ARN is
/// stripped, so an unqualified ARN (even one whose function name equals the
/// stage) comes back unchanged.
pub fn invocation_target(function_arn: &str, stage: &str) -> String {
    if stage.is_empty() {
        return function_arn.to_string();
    }
    let segments = function_arn.split(':').count();
    if segments < QUALIFIED_ARN_SEGMENTS {
        return function_arn.to_string();
    }
    match function_arn.strip_suffix(stage) {
        Some(rest) if rest.ends_with(':') => rest[..rest.len() - 1].to_string(),
        _ => function_arn.to_string(),
    }
}

fn prefixed_hash(prefix: &str, first: &str, second: &str) -> String {
    let key = format!("{first}---{second}").replace(':', "_");
    format!("{prefix}{}", stable_hash(&key))
}

/// Stable target-assignment id for `(function_arn, rule_name)`.
pub fn target_assignment_id(function_arn: &str, rule_name: &str) -> String {
    prefixed_hash(TARGET_ID_PREFIX, function_arn, rule_name)
}

/// Stable invoke-permission statement id for `(rule_name, function_arn)`.
///
/// Re-granting with the same id hits the existing statement instead of
/// adding a new one.
pub fn permission_statement_id(rule_name: &str, function_arn: &str) -> String {
    prefixed_hash(STATEMENT_ID_PREFIX, rule_name, function_arn)
}

/// The `(targetArn, targetId)` pair attached to a binding's rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAssignment {
    pub target_arn: String,
    pub target_id: String,
}

impl TargetAssignment {
    pub fn for_binding(binding: &ScheduleBinding, stage: &str) -> Self {
        Self {
            target_arn: invocation_target(binding.function_arn(), stage),
            target_id: target_assignment_id(binding.function_arn(), &binding.name),
        }
    }
}
