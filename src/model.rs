//! Domain types for the ad-link reconciliation workflow and their JSON wire shapes.
//!
//! Link state is an exhaustive enum; the flat `status`/`advertiserId`/`matchType`
//! fields seen on the wire are produced from it and validated back into it, so
//! combinations like an unlinked item carrying an advertiser cannot be parsed.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Suggestions scoring at or above this value get one-click acceptance with
/// affirmative styling and are eligible for auto-linking during sync.
pub const HIGH_CONFIDENCE_SCORE: u8 = 75;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateDecodeError {
    #[error("match confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("suggestion score {0} is outside [0, 100]")]
    ScoreOutOfRange(i64),
    #[error("matchConfidence is required when matchType is {0}")]
    MissingConfidence(MatchType),
    #[error("matchConfidence must be omitted when matchType is manual")]
    UnexpectedConfidence,
    #[error("unknown {field} value '{value}'")]
    UnknownValue { field: &'static str, value: String },
    #[error("inconsistent link state: {0}")]
    Inconsistent(&'static str),
    #[error("screensCount {declared} does not match {actual} screens")]
    ScreensCountMismatch { declared: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    #[serde(other)]
    Other,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Other => "other",
        }
    }

    /// Lenient: upstream platforms use a handful of spellings.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "image" | "img" | "picture" | "photo" => MediaType::Image,
            "video" | "movie" => MediaType::Video,
            _ => MediaType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Unlinked,
    Linked,
    Archived,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Unlinked => "unlinked",
            LinkStatus::Linked => "linked",
            LinkStatus::Archived => "archived",
        }
    }

    pub fn parse_status(value: &str) -> Option<Self> {
        match value {
            "unlinked" => Some(LinkStatus::Unlinked),
            "linked" => Some(LinkStatus::Linked),
            "archived" => Some(LinkStatus::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Auto,
    Suggested,
    Manual,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Auto => "auto",
            MatchType::Suggested => "suggested",
            MatchType::Manual => "manual",
        }
    }

    pub fn parse_type(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(MatchType::Auto),
            "suggested" => Some(MatchType::Suggested),
            "manual" => Some(MatchType::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Match confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub fn new(value: f64) -> Result<Self, StateDecodeError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(StateDecodeError::ConfidenceOutOfRange(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = StateDecodeError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Confidence::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(value: Confidence) -> Self {
        value.0
    }
}

/// Suggestion score in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Score(u8);

impl Score {
    pub fn new(value: i64) -> Result<Self, StateDecodeError> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Self)
            .ok_or(StateDecodeError::ScoreOutOfRange(value))
    }

    /// Rounds and clamps a similarity in `[0, 1]`.
    pub fn from_similarity(similarity: f64) -> Self {
        let scaled = (similarity * 100.0).round();
        Self(scaled.clamp(0.0, 100.0) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_high_confidence(self) -> bool {
        self.0 >= HIGH_CONFIDENCE_SCORE
    }

    pub fn to_confidence(self) -> Confidence {
        Confidence(f64::from(self.0) / 100.0)
    }
}

impl TryFrom<i64> for Score {
    type Error = StateDecodeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Score::new(value)
    }
}

impl From<Score> for u8 {
    fn from(value: Score) -> Self {
        value.0
    }
}

/// How a link was established. Confidence exists exactly for heuristic matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchMethod {
    Auto(Confidence),
    Suggested(Confidence),
    Manual,
}

impl MatchMethod {
    pub fn from_parts(
        match_type: MatchType,
        confidence: Option<f64>,
    ) -> Result<Self, StateDecodeError> {
        match (match_type, confidence) {
            (MatchType::Manual, None) => Ok(MatchMethod::Manual),
            (MatchType::Manual, Some(_)) => Err(StateDecodeError::UnexpectedConfidence),
            (kind, None) => Err(StateDecodeError::MissingConfidence(kind)),
            (MatchType::Auto, Some(c)) => Ok(MatchMethod::Auto(Confidence::new(c)?)),
            (MatchType::Suggested, Some(c)) => Ok(MatchMethod::Suggested(Confidence::new(c)?)),
        }
    }

    pub fn match_type(&self) -> MatchType {
        match self {
            MatchMethod::Auto(_) => MatchType::Auto,
            MatchMethod::Suggested(_) => MatchType::Suggested,
            MatchMethod::Manual => MatchType::Manual,
        }
    }

    pub fn confidence(&self) -> Option<Confidence> {
        match self {
            MatchMethod::Auto(c) | MatchMethod::Suggested(c) => Some(*c),
            MatchMethod::Manual => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub advertiser_id: String,
    pub method: MatchMethod,
}

impl Link {
    pub fn new(advertiser_id: impl Into<String>, method: MatchMethod) -> Self {
        Self {
            advertiser_id: advertiser_id.into(),
            method,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkState {
    Unlinked,
    Linked(Link),
    /// `previous` is the link in force when the item was archived.
    Archived {
        archived_at: DateTime<Utc>,
        previous: Option<Link>,
    },
}

impl LinkState {
    pub fn status(&self) -> LinkStatus {
        match self {
            LinkState::Unlinked => LinkStatus::Unlinked,
            LinkState::Linked(_) => LinkStatus::Linked,
            LinkState::Archived { .. } => LinkStatus::Archived,
        }
    }

    /// Advertiser of the current link; `None` unless linked.
    pub fn advertiser_id(&self) -> Option<&str> {
        match self {
            LinkState::Linked(link) => Some(&link.advertiser_id),
            _ => None,
        }
    }

    pub fn link(&self) -> Option<&Link> {
        match self {
            LinkState::Linked(link) => Some(link),
            _ => None,
        }
    }

    pub fn is_archived(&self) -> bool {
        matches!(self, LinkState::Archived { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkWire {
    pub advertiser_id: String,
    pub match_type: MatchType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_confidence: Option<f64>,
}

impl From<&Link> for LinkWire {
    fn from(link: &Link) -> Self {
        Self {
            advertiser_id: link.advertiser_id.clone(),
            match_type: link.method.match_type(),
            match_confidence: link.method.confidence().map(Confidence::value),
        }
    }
}

impl TryFrom<LinkWire> for Link {
    type Error = StateDecodeError;

    fn try_from(wire: LinkWire) -> Result<Self, Self::Error> {
        let method = MatchMethod::from_parts(wire.match_type, wire.match_confidence)?;
        Ok(Link::new(wire.advertiser_id, method))
    }
}

/// Flat JSON shape of a link state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkStateWire {
    pub status: LinkStatus,
    #[serde(default)]
    pub advertiser_id: Option<String>,
    #[serde(default)]
    pub match_type: Option<MatchType>,
    #[serde(default)]
    pub match_confidence: Option<f64>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_link: Option<LinkWire>,
}

impl From<&LinkState> for LinkStateWire {
    fn from(state: &LinkState) -> Self {
        let mut wire = LinkStateWire {
            status: state.status(),
            advertiser_id: None,
            match_type: None,
            match_confidence: None,
            archived_at: None,
            previous_link: None,
        };
        match state {
            LinkState::Unlinked => {}
            LinkState::Linked(link) => {
                let link = LinkWire::from(link);
                wire.advertiser_id = Some(link.advertiser_id);
                wire.match_type = Some(link.match_type);
                wire.match_confidence = link.match_confidence;
            }
            LinkState::Archived {
                archived_at,
                previous,
            } => {
                wire.archived_at = Some(*archived_at);
                wire.previous_link = previous.as_ref().map(LinkWire::from);
            }
        }
        wire
    }
}

impl TryFrom<LinkStateWire> for LinkState {
    type Error = StateDecodeError;

    fn try_from(wire: LinkStateWire) -> Result<Self, Self::Error> {
        match wire.status {
            LinkStatus::Unlinked => {
                if wire.advertiser_id.is_some()
                    || wire.match_type.is_some()
                    || wire.match_confidence.is_some()
                {
                    return Err(StateDecodeError::Inconsistent(
                        "unlinked items carry no advertiser or match data",
                    ));
                }
                if wire.archived_at.is_some() || wire.previous_link.is_some() {
                    return Err(StateDecodeError::Inconsistent(
                        "only archived items carry archive data",
                    ));
                }
                Ok(LinkState::Unlinked)
            }
            LinkStatus::Linked => {
                if wire.archived_at.is_some() || wire.previous_link.is_some() {
                    return Err(StateDecodeError::Inconsistent(
                        "only archived items carry archive data",
                    ));
                }
                let (Some(advertiser_id), Some(match_type)) = (wire.advertiser_id, wire.match_type)
                else {
                    return Err(StateDecodeError::Inconsistent(
                        "linked items need advertiserId and matchType",
                    ));
                };
                let method = MatchMethod::from_parts(match_type, wire.match_confidence)?;
                Ok(LinkState::Linked(Link::new(advertiser_id, method)))
            }
            LinkStatus::Archived => {
                if wire.advertiser_id.is_some()
                    || wire.match_type.is_some()
                    || wire.match_confidence.is_some()
                {
                    return Err(StateDecodeError::Inconsistent(
                        "archived items expose their link only as previousLink",
                    ));
                }
                let archived_at = wire.archived_at.ok_or(StateDecodeError::Inconsistent(
                    "archived items need archivedAt",
                ))?;
                let previous = wire.previous_link.map(Link::try_from).transpose()?;
                Ok(LinkState::Archived {
                    archived_at,
                    previous,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Screen {
    pub screen_id: i64,
    pub screen_display_id: String,
    pub screen_name: String,
    #[serde(default)]
    pub location_name: Option<String>,
    pub is_online: bool,
}

/// Playable item mirrored from the screen-management platform.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub external_id: i64,
    pub name: String,
    pub media_type: MediaType,
    pub duration_seconds: Option<f64>,
    pub screens: Vec<Screen>,
    pub last_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaItem {
    pub fn screens_count(&self) -> usize {
        self.screens.len()
    }

    pub fn online_screens(&self) -> usize {
        self.screens.iter().filter(|s| s.is_online).count()
    }
}

/// One row of the ads view: the mirrored media joined with its link state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "AdItemWire", try_from = "AdItemWire")]
pub struct AdItem {
    pub media: MediaItem,
    pub link: LinkState,
    /// Display name of the linked advertiser, when linked.
    pub advertiser_name: Option<String>,
}

impl AdItem {
    pub fn external_id(&self) -> i64 {
        self.media.external_id
    }

    pub fn status(&self) -> LinkStatus {
        self.link.status()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdItemWire {
    pub external_id: i64,
    pub name: String,
    pub media_type: MediaType,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub screens: Vec<Screen>,
    #[serde(default)]
    pub screens_count: Option<usize>,
    pub last_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub advertiser_name: Option<String>,
    #[serde(flatten)]
    pub link: LinkStateWire,
}

impl From<AdItem> for AdItemWire {
    fn from(item: AdItem) -> Self {
        let link = LinkStateWire::from(&item.link);
        let screens_count = Some(item.media.screens_count());
        let media = item.media;
        Self {
            external_id: media.external_id,
            name: media.name,
            media_type: media.media_type,
            duration_seconds: media.duration_seconds,
            screens: media.screens,
            screens_count,
            last_seen_at: media.last_seen_at,
            updated_at: media.updated_at,
            advertiser_name: item.advertiser_name,
            link,
        }
    }
}

impl TryFrom<AdItemWire> for AdItem {
    type Error = StateDecodeError;

    fn try_from(wire: AdItemWire) -> Result<Self, Self::Error> {
        if let Some(declared) = wire.screens_count {
            if declared != wire.screens.len() {
                return Err(StateDecodeError::ScreensCountMismatch {
                    declared,
                    actual: wire.screens.len(),
                });
            }
        }
        let link = LinkState::try_from(wire.link)?;
        Ok(AdItem {
            media: MediaItem {
                external_id: wire.external_id,
                name: wire.name,
                media_type: wire.media_type,
                duration_seconds: wire.duration_seconds,
                screens: wire.screens,
                last_seen_at: wire.last_seen_at,
                updated_at: wire.updated_at,
            },
            link,
            advertiser_name: wire.advertiser_name,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdsSummary {
    pub total: u64,
    pub linked: u64,
    pub unlinked: u64,
    pub archived: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdsView {
    pub items: Vec<AdItem>,
    pub summary: AdsSummary,
}

impl AdsView {
    pub fn find(&self, external_id: i64) -> Option<&AdItem> {
        self.items.iter().find(|i| i.external_id() == external_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Advertiser {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub advertiser_id: String,
    pub advertiser_name: String,
    pub score: Score,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchSuggestions {
    pub media_name: String,
    #[serde(default)]
    pub best_match: Option<Suggestion>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

/// Body of `POST /api/yodeck-media/:id/link`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub advertiser_id: String,
    pub match_type: MatchType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_confidence: Option<f64>,
}

impl LinkRequest {
    pub fn manual(advertiser_id: impl Into<String>) -> Self {
        Self {
            advertiser_id: advertiser_id.into(),
            match_type: MatchType::Manual,
            match_confidence: None,
        }
    }

    pub fn suggested(suggestion: &Suggestion) -> Self {
        Self {
            advertiser_id: suggestion.advertiser_id.clone(),
            match_type: MatchType::Suggested,
            match_confidence: Some(suggestion.score.to_confidence().value()),
        }
    }

    pub fn into_link(self) -> Result<Link, StateDecodeError> {
        if self.advertiser_id.trim().is_empty() {
            return Err(StateDecodeError::Inconsistent("advertiserId must be non-empty"));
        }
        let method = MatchMethod::from_parts(self.match_type, self.match_confidence)?;
        Ok(Link::new(self.advertiser_id, method))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
