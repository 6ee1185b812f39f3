//! Participant filters for member export
//!
//! Pure predicates, no state. Unknown filter values deserialize to the
//! permissive variant, so an unrecognized option never drops participants.

use serde::Deserialize;

use crate::{Participant, TargetId};

const WEEK_SECS: i64 = 7 * 24 * 3600;
const MONTH_SECS: i64 = 30 * 24 * 3600;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberFilter {
    /// Keep only participants with a public username.
    Username,
    #[default]
    #[serde(other)]
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastOnlineFilter {
    Week,
    Month,
    #[default]
    #[serde(other)]
    Any,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoFilter {
    Has,
    #[default]
    #[serde(other)]
    Any,
}

/// Filters accepted by the export endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFilters {
    #[serde(default)]
    pub filter_members: MemberFilter,
    #[serde(default)]
    pub filter_last_online: LastOnlineFilter,
    #[serde(default)]
    pub filter_photo: PhotoFilter,
}

impl ExportFilters {
    /// Whether `participant` passes every active filter at `now` (unix seconds).
    pub fn matches(&self, participant: &Participant, now: i64) -> bool {
        if self.filter_members == MemberFilter::Username
            && participant.username.as_deref().is_none_or(str::is_empty)
        {
            return false;
        }

        let window = match self.filter_last_online {
            LastOnlineFilter::Week => Some(WEEK_SECS),
            LastOnlineFilter::Month => Some(MONTH_SECS),
            LastOnlineFilter::Any => None,
        };
        if let Some(window) = window {
            match participant.last_online {
                Some(seen) if now - seen <= window => {}
                _ => return false,
            }
        }

        if self.filter_photo == PhotoFilter::Has && !participant.has_photo {
            return false;
        }
        true
    }

    /// Apply the filters and map survivors to invitation targets, keeping order.
    pub fn export(&self, participants: &[Participant], now: i64) -> Vec<TargetId> {
        participants
            .iter()
            .filter(|p| self.matches(p, now))
            .map(Participant::target)
            .collect()
    }
}
