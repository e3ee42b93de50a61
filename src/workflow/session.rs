use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{info, instrument, warn};

use super::cache::ViewCache;
use super::guard::InFlight;
use super::WorkflowError;
use crate::client::{AdsApi, ClientResult};
use crate::model::{
    AdItem, AdsView, LinkRequest, MessageResponse, Suggestion, HIGH_CONFIDENCE_SCORE,
};
use crate::reconcile::CommandKind;

/// Styling hint for a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Score at or above the high-confidence threshold.
    Affirmative,
    Cautionary,
}

impl Tone {
    pub fn for_suggestion(suggestion: &Suggestion) -> Self {
        if suggestion.score.value() >= HIGH_CONFIDENCE_SCORE {
            Tone::Affirmative
        } else {
            Tone::Cautionary
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionView {
    pub suggestion: Suggestion,
    pub tone: Tone,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionPanel {
    /// Archived items are not matched; nothing was requested.
    NotApplicable,
    /// The suggestion query failed. The rest of the detail is still usable.
    Unavailable(String),
    Ready {
        best: Option<SuggestionView>,
        items: Vec<SuggestionView>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detail {
    pub item: AdItem,
    pub suggestions: SuggestionPanel,
    /// Commands the item's current status allows.
    pub actions: Vec<CommandKind>,
    /// Command currently in flight for this item; every action is disabled
    /// while it is set.
    pub pending: Option<CommandKind>,
}

/// One operator's reconciliation session against the API.
pub struct Reconciler<A> {
    api: A,
    cache: Mutex<ViewCache>,
    in_flight: InFlight,
}

impl<A: AdsApi> Reconciler<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            cache: Mutex::new(ViewCache::new()),
            in_flight: InFlight::new(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn cache(&self) -> MutexGuard<'_, ViewCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached ads view; fetched from the server when missing or stale.
    pub async fn ads_view(&self, include_archived: bool) -> Result<AdsView, WorkflowError> {
        let generation = {
            let cache = self.cache();
            if let Some(view) = cache.get(include_archived) {
                return Ok(view.clone());
            }
            cache.generation()
        };
        let view = self.api.ads_view(include_archived).await?;
        self.cache().put(include_archived, view.clone(), generation);
        Ok(view)
    }

    pub async fn refresh(&self, include_archived: bool) -> Result<AdsView, WorkflowError> {
        self.invalidate();
        self.ads_view(include_archived).await
    }

    pub fn invalidate(&self) {
        self.cache().invalidate_all();
    }

    pub fn pending(&self, external_id: i64) -> Option<CommandKind> {
        self.in_flight.pending(external_id)
    }

    /// Loads one item with its suggestions. Suggestions are requested only
    /// here, and never for archived items.
    #[instrument(skip(self))]
    pub async fn open_detail(&self, external_id: i64) -> Result<Detail, WorkflowError> {
        let view = self.ads_view(true).await?;
        let item = view
            .find(external_id)
            .cloned()
            .ok_or(WorkflowError::UnknownItem(external_id))?;

        let suggestions = if item.link.is_archived() {
            SuggestionPanel::NotApplicable
        } else {
            match self.api.match_suggestions(external_id).await {
                Ok(found) => SuggestionPanel::Ready {
                    best: found.best_match.map(view_of),
                    items: found.suggestions.into_iter().map(view_of).collect(),
                },
                Err(err) => {
                    warn!(?err, external_id, "suggestions unavailable");
                    SuggestionPanel::Unavailable(err.to_string())
                }
            }
        };

        Ok(Detail {
            actions: CommandKind::allowed_from(item.status()).to_vec(),
            pending: self.pending(external_id),
            item,
            suggestions,
        })
    }

    /// One-click accept: links as `suggested` with confidence `score / 100`.
    pub async fn accept_suggestion(
        &self,
        external_id: i64,
        suggestion: &Suggestion,
    ) -> Result<String, WorkflowError> {
        let request = LinkRequest::suggested(suggestion);
        self.run(external_id, CommandKind::Link, || {
            self.api.link(external_id, &request)
        })
        .await
    }

    pub async fn link_manual(
        &self,
        external_id: i64,
        advertiser_id: &str,
    ) -> Result<String, WorkflowError> {
        let request = LinkRequest::manual(advertiser_id);
        self.run(external_id, CommandKind::Link, || {
            self.api.link(external_id, &request)
        })
        .await
    }

    pub async fn unlink(&self, external_id: i64) -> Result<String, WorkflowError> {
        self.run(external_id, CommandKind::Unlink, || self.api.unlink(external_id))
            .await
    }

    pub async fn archive(&self, external_id: i64) -> Result<String, WorkflowError> {
        self.run(external_id, CommandKind::Archive, || self.api.archive(external_id))
            .await
    }

    pub async fn unarchive(&self, external_id: i64) -> Result<String, WorkflowError> {
        self.run(external_id, CommandKind::Unarchive, || {
            self.api.unarchive(external_id)
        })
        .await
    }

    /// Issues one command under the item's guard. The cached views are
    /// invalidated whatever the outcome; nothing is merged locally.
    async fn run<F, Fut>(
        &self,
        external_id: i64,
        kind: CommandKind,
        call: F,
    ) -> Result<String, WorkflowError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<MessageResponse>>,
    {
        let _ticket = self
            .in_flight
            .try_begin(external_id, kind)
            .map_err(|pending| WorkflowError::Busy {
                external_id,
                pending,
            })?;
        let result = call().await;
        self.invalidate();
        match result {
            Ok(response) => {
                info!(external_id, command = %kind, "{}", response.message);
                Ok(response.message)
            }
            Err(err) => {
                warn!(?err, external_id, command = %kind, "command rejected");
                Err(WorkflowError::Rejected {
                    kind,
                    message: err.to_string(),
                })
            }
        }
    }
}

fn view_of(suggestion: Suggestion) -> SuggestionView {
    SuggestionView {
        tone: Tone::for_suggestion(&suggestion),
        suggestion,
    }
}
