//! Classification of platform error strings
//!
//! The platform reports failures as free-form RPC error strings. This module is
//! the only place that looks at that wording; everything past the provider
//! boundary works with `InviteOutcome`.

use crate::InviteOutcome;

/// Error markers that mean the account has to wait before its next call.
const RATE_LIMIT_PATTERNS: &[&str] = &["flood_wait", "slowmode_wait", "a wait of"];

/// Error markers that can never succeed for this target, no matter which
/// account retries.
const PERMANENT_PATTERNS: &[&str] = &[
    "user_privacy_restricted",
    "user_already_participant",
    "user_banned_in_channel",
    "user_not_mutual_contact",
    "user_channels_too_much",
    "user_kicked",
    "user_id_invalid",
    "user_bot",
    "user_deleted",
    "username_not_occupied",
    "username_invalid",
    "input_user_deactivated",
];

/// Error markers returned by a join call when the account is already inside
/// the destination group.
const ALREADY_MEMBER_PATTERNS: &[&str] = &["user_already_participant", "already a member"];

/// Error markers meaning the account's session is gone for good.
const REVOKED_PATTERNS: &[&str] = &[
    "auth_key_unregistered",
    "auth_key_invalid",
    "session_revoked",
    "session_expired",
    "user_deactivated",
    "phone_number_banned",
];

/// Extract the wait duration from a rate-limit message.
///
/// Handles `FLOOD_WAIT_30`, `A wait of 30 seconds is required` and similar
/// wording by taking the first run of digits. Returns 0 when no number is
/// present; the cooldown manager turns that into its minimum cooldown. A
/// number too large for `u64` saturates, so the cooldown cap applies.
pub fn parse_wait_secs(message: &str) -> u64 {
    let digits: String = message
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return 0;
    }
    digits.parse().unwrap_or(u64::MAX)
}

/// Classify an error string returned by an invite call.
pub fn classify_invite_error(message: &str) -> InviteOutcome {
    let lower = message.to_lowercase();
    if RATE_LIMIT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return InviteOutcome::RateLimited {
            wait_secs: parse_wait_secs(message),
        };
    }
    if let Some(reason) = PERMANENT_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return InviteOutcome::PermanentRejection {
            reason: reason.to_uppercase(),
        };
    }
    if is_session_revoked(message) {
        return InviteOutcome::SessionRevoked {
            reason: message.to_string(),
        };
    }
    InviteOutcome::TransientFailure {
        error: message.to_string(),
    }
}

/// Classify an error string returned by a join call.
///
/// "Already a member" is a success for the join-if-needed step. Rate limits
/// keep their meaning. Other rejections (private group, account banned from
/// the group) are reported as permanent: the account cannot invite into this
/// group at all.
pub fn classify_join_error(message: &str) -> InviteOutcome {
    let lower = message.to_lowercase();
    if ALREADY_MEMBER_PATTERNS.iter().any(|p| lower.contains(p)) {
        return InviteOutcome::Success;
    }
    if RATE_LIMIT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return InviteOutcome::RateLimited {
            wait_secs: parse_wait_secs(message),
        };
    }
    if is_session_revoked(message) {
        return InviteOutcome::SessionRevoked {
            reason: message.to_string(),
        };
    }
    if lower.contains("channel_private")
        || lower.contains("channels_too_much")
        || lower.contains("invite_hash_expired")
        || lower.contains("user_banned_in_channel")
    {
        return InviteOutcome::PermanentRejection {
            reason: message.to_string(),
        };
    }
    InviteOutcome::TransientFailure {
        error: message.to_string(),
    }
}

/// Whether a connect failure means the session was revoked rather than a
/// temporary outage.
pub fn is_session_revoked(message: &str) -> bool {
    let lower = message.to_lowercase();
    REVOKED_PATTERNS.iter().any(|p| lower.contains(p))
}
