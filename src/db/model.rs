//! Row slices used by repositories.
//!
//! Keep these structs focused on the data returned by queries. State
//! transitions live in `crate::reconcile`.

use crate::model::{
    Link, LinkState, LinkStatus, MatchMethod, MatchType, MediaType, Screen, StateDecodeError,
};
use chrono::{DateTime, Utc};

/// Raw `ad_links` row.
#[derive(Debug, Clone)]
pub struct LinkRow {
    pub status: String,
    pub advertiser_id: Option<String>,
    pub match_type: Option<String>,
    pub match_confidence: Option<f64>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl LinkRow {
    /// Column values for a state; archived rows keep the previous link's columns.
    pub fn from_state(state: &LinkState) -> Self {
        let columns = |link: Option<&Link>| match link {
            Some(link) => (
                Some(link.advertiser_id.clone()),
                Some(link.method.match_type().as_str().to_string()),
                link.method.confidence().map(|c| c.value()),
            ),
            None => (None, None, None),
        };
        let (link, archived_at) = match state {
            LinkState::Unlinked => (None, None),
            LinkState::Linked(link) => (Some(link), None),
            LinkState::Archived {
                archived_at,
                previous,
            } => (previous.as_ref(), Some(*archived_at)),
        };
        let (advertiser_id, match_type, match_confidence) = columns(link);
        Self {
            status: state.status().as_str().to_string(),
            advertiser_id,
            match_type,
            match_confidence,
            archived_at,
        }
    }

    pub fn into_state(self) -> Result<LinkState, StateDecodeError> {
        let status =
            LinkStatus::parse_status(&self.status).ok_or(StateDecodeError::UnknownValue {
                field: "status",
                value: self.status.clone(),
            })?;
        let link = match (self.advertiser_id, self.match_type) {
            (Some(advertiser_id), Some(match_type)) => {
                let kind = MatchType::parse_type(&match_type).ok_or(
                    StateDecodeError::UnknownValue {
                        field: "match_type",
                        value: match_type.clone(),
                    },
                )?;
                let method = MatchMethod::from_parts(kind, self.match_confidence)?;
                Some(Link::new(advertiser_id, method))
            }
            (None, None) => None,
            _ => {
                return Err(StateDecodeError::Inconsistent(
                    "advertiser_id and match_type must be set together",
                ))
            }
        };
        match (status, link) {
            (LinkStatus::Unlinked, None) => Ok(LinkState::Unlinked),
            (LinkStatus::Unlinked, Some(_)) => Err(StateDecodeError::Inconsistent(
                "unlinked row carries a link",
            )),
            (LinkStatus::Linked, Some(link)) => Ok(LinkState::Linked(link)),
            (LinkStatus::Linked, None) => {
                Err(StateDecodeError::Inconsistent("linked row has no advertiser"))
            }
            (LinkStatus::Archived, previous) => {
                let archived_at = self.archived_at.ok_or(StateDecodeError::Inconsistent(
                    "archived row has no archived_at",
                ))?;
                Ok(LinkState::Archived {
                    archived_at,
                    previous,
                })
            }
        }
    }
}

/// Media item as observed on the screen-management platform during a sync.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaUpsert {
    pub external_id: i64,
    pub name: String,
    pub media_type: MediaType,
    pub duration_seconds: Option<f64>,
    pub screens: Vec<Screen>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Row of `sync_runs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRun {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub media_seen: i64,
    pub media_new: i64,
    pub media_updated: i64,
    pub auto_linked: i64,
    pub error: Option<String>,
}
