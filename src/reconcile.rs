//! Server-authoritative link state machine.
//!
//! ```text
//! unlinked --link--> linked --unlink--> unlinked
//! linked --link--> linked (reassign)
//! unlinked|linked --archive--> archived --unarchive--> previous state
//! ```
use crate::db::{self, Pool};
use crate::model::{Link, LinkState, LinkStatus};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Link(Link),
    Unlink,
    Archive,
    Unarchive,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Link(_) => CommandKind::Link,
            Command::Unlink => CommandKind::Unlink,
            Command::Archive => CommandKind::Archive,
            Command::Unarchive => CommandKind::Unarchive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Link,
    Unlink,
    Archive,
    Unarchive,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Link => "link",
            CommandKind::Unlink => "unlink",
            CommandKind::Archive => "archive",
            CommandKind::Unarchive => "unarchive",
        }
    }

    /// Commands the server accepts for an item in `status`.
    pub fn allowed_from(status: LinkStatus) -> &'static [CommandKind] {
        match status {
            LinkStatus::Unlinked => &[CommandKind::Link, CommandKind::Archive],
            LinkStatus::Linked => &[CommandKind::Link, CommandKind::Unlink, CommandKind::Archive],
            LinkStatus::Archived => &[CommandKind::Unarchive],
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {command} a media item that is {status}")]
pub struct TransitionError {
    pub command: CommandKind,
    pub status: LinkStatus,
}

impl LinkState {
    /// Pure transition; `self` is left untouched on error.
    pub fn apply(
        &self,
        command: Command,
        now: DateTime<Utc>,
    ) -> Result<LinkState, TransitionError> {
        match (self, command) {
            (LinkState::Unlinked | LinkState::Linked(_), Command::Link(link)) => {
                Ok(LinkState::Linked(link))
            }
            (LinkState::Linked(_), Command::Unlink) => Ok(LinkState::Unlinked),
            (LinkState::Unlinked, Command::Archive) => Ok(LinkState::Archived {
                archived_at: now,
                previous: None,
            }),
            (LinkState::Linked(link), Command::Archive) => Ok(LinkState::Archived {
                archived_at: now,
                previous: Some(link.clone()),
            }),
            (LinkState::Archived { previous, .. }, Command::Unarchive) => {
                Ok(previous.clone().map_or(LinkState::Unlinked, LinkState::Linked))
            }
            (_, command) => Err(TransitionError {
                command: command.kind(),
                status: self.status(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("media item {0} not found")]
    MediaNotFound(i64),
    #[error("advertiser {0} not found")]
    AdvertiserNotFound(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Outcome of a persisted transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub external_id: i64,
    pub state: LinkState,
    pub message: String,
}

/// Load, transition and persist in one transaction. Nothing is written when
/// any step fails.
#[instrument(skip(pool, command), fields(command = %command.kind()))]
pub async fn execute(
    pool: &Pool,
    external_id: i64,
    command: Command,
) -> Result<Applied, ReconcileError> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let current = db::fetch_link_state(&mut tx, external_id)
        .await?
        .ok_or(ReconcileError::MediaNotFound(external_id))?;

    let advertiser_name = match &command {
        Command::Link(link) => Some(
            db::advertiser_name(&mut tx, &link.advertiser_id)
                .await?
                .ok_or_else(|| ReconcileError::AdvertiserNotFound(link.advertiser_id.clone()))?,
        ),
        _ => None,
    };

    let kind = command.kind();
    let now = Utc::now();
    let next = current.apply(command, now)?;
    db::store_link_state(&mut tx, external_id, &next, now).await?;
    tx.commit().await.context("failed to commit link state")?;

    info!(
        external_id,
        from = %current.status(),
        to = %next.status(),
        advertiser = next.advertiser_id().unwrap_or("-"),
        "link state changed"
    );

    let message = match (kind, advertiser_name) {
        (CommandKind::Link, Some(name)) => {
            format!("Media {} linked to {}", external_id, name)
        }
        (CommandKind::Unlink, _) => format!("Media {} unlinked", external_id),
        (CommandKind::Archive, _) => format!("Media {} archived", external_id),
        (CommandKind::Unarchive, _) => {
            format!("Media {} restored as {}", external_id, next.status())
        }
        (CommandKind::Link, None) => format!("Media {} linked", external_id),
    };
    Ok(Applied {
        external_id,
        state: next,
        message,
    })
}
