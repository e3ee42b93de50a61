//! Suggestion engine: scores advertisers against a media item's name.
//!
//! Media names coming off the screen platform are file-ish
//! (`SummerSale_v2.mp4`, `bakker-jansen_1080p_FINAL`), so both sides are
//! normalised before comparing. The score is the best of a whole-string
//! Jaro-Winkler, a separator-insensitive comparison, and per-token coverage of
//! the advertiser name, scaled to 0..=100.
use crate::config::Matching;
use crate::model::{Advertiser, MatchSuggestions, Score, Suggestion};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Reverse;

static EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(mp4|mov|m4v|avi|mkv|webm|jpe?g|png|gif|webp|bmp)$").unwrap()
});

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").unwrap());

// Camel humps: "SummerSale" -> "Summer Sale".
static CAMEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\p{Ll})(\p{Lu})").unwrap());

static NOISE: Lazy<Regex> = Lazy::new(|| {
    let words = r"v\d+|versie\d*|final|def|definitief|nieuw|new|copy|kopie|concept|hd|4k";
    let numbers = r"\d{3,4}p|\d+x\d+|\d{6,8}|\d{1,2}";
    Regex::new(&format!(r"(?i)^({}|{})$", words, numbers)).unwrap()
});

/// Lowercased, de-noised, space-separated form of a media or advertiser name.
pub fn normalize(name: &str) -> String {
    let trimmed = EXTENSION.replace(name.trim(), "");
    let split = CAMEL.replace_all(&trimmed, "$1 $2");
    let spaced = SEPARATORS.replace_all(&split, " ");
    spaced
        .split_whitespace()
        .filter(|token| !NOISE.is_match(token))
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity in `[0, 1]` between two already-normalised names.
fn similarity(media: &str, advertiser: &str) -> f64 {
    if media.is_empty() || advertiser.is_empty() {
        return 0.0;
    }
    let whole = strsim::jaro_winkler(media, advertiser);

    let media_compact: String = media.split_whitespace().collect();
    let adv_compact: String = advertiser.split_whitespace().collect();
    let compact = if adv_compact.chars().count() >= 4 && media_compact.contains(&adv_compact) {
        0.95
    } else {
        strsim::jaro_winkler(&media_compact, &adv_compact)
    };

    let media_tokens: Vec<&str> = media.split_whitespace().collect();
    let adv_tokens: Vec<&str> = advertiser
        .split_whitespace()
        .filter(|t| t.chars().count() >= 3)
        .collect();
    let coverage = if adv_tokens.is_empty() {
        0.0
    } else {
        let total: f64 = adv_tokens
            .iter()
            .map(|a| {
                media_tokens
                    .iter()
                    .map(|m| strsim::jaro_winkler(a, m))
                    .fold(0.0, f64::max)
            })
            .sum();
        total / adv_tokens.len() as f64
    };

    whole.max(compact).max(coverage).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    min_score: u8,
    max_suggestions: usize,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::from_config(&Matching::default())
    }
}

impl Matcher {
    pub fn new(min_score: u8, max_suggestions: usize) -> Self {
        Self {
            min_score: min_score.min(100),
            max_suggestions,
        }
    }

    pub fn from_config(cfg: &Matching) -> Self {
        Self::new(cfg.min_score, cfg.max_suggestions)
    }

    pub fn score(&self, media_name: &str, advertiser_name: &str) -> Score {
        Score::from_similarity(similarity(
            &normalize(media_name),
            &normalize(advertiser_name),
        ))
    }

    /// Ranked candidates for a media name; `best_match` is `None` when nothing
    /// clears `min_score`.
    pub fn suggest(&self, media_name: &str, advertisers: &[Advertiser]) -> MatchSuggestions {
        let media = normalize(media_name);
        let mut suggestions: Vec<Suggestion> = advertisers
            .iter()
            .map(|adv| Suggestion {
                advertiser_id: adv.id.clone(),
                advertiser_name: adv.name.clone(),
                score: Score::from_similarity(similarity(&media, &normalize(&adv.name))),
            })
            .filter(|s| s.score.value() >= self.min_score)
            .collect();
        suggestions.sort_by(|a, b| {
            (Reverse(a.score), a.advertiser_name.to_lowercase(), &a.advertiser_id).cmp(&(
                Reverse(b.score),
                b.advertiser_name.to_lowercase(),
                &b.advertiser_id,
            ))
        });
        suggestions.truncate(self.max_suggestions);

        MatchSuggestions {
            media_name: media_name.to_string(),
            best_match: suggestions.first().cloned(),
            suggestions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adv(id: &str, name: &str) -> Advertiser {
        Advertiser {
            id: id.into(),
            name: name.into(),
        }
    }

    #[test]
    fn normalize_strips_file_noise() {
        assert_eq!(normalize("SummerSale_v2.mp4"), "summer sale");
        assert_eq!(normalize("bakker-jansen_1080p_FINAL"), "bakker jansen");
        assert_eq!(normalize("  Pizza Palace  "), "pizza palace");
        assert_eq!(normalize("Kapsalon Knip&Go 20260114.png"), "kapsalon knip go");
    }

    #[test]
    fn exact_advertiser_in_file_name_scores_high() {
        let m = Matcher::default();
        assert!(m.score("PizzaPalace_zomer_v3.mp4", "Pizza Palace").is_high_confidence());
        assert!(m.score("bakker-jansen_1080p", "Bakkerij Jansen").value() >= 75);
    }

    #[test]
    fn unrelated_names_score_low() {
        let m = Matcher::default();
        assert!(!m.score("Garage_Vermeulen_APK", "Pizza Palace").is_high_confidence());
        assert_eq!(m.score("", "Pizza Palace").value(), 0);
    }

    #[test]
    fn suggestions_are_ranked_and_truncated() {
        let m = Matcher::new(0, 2);
        let result = m.suggest(
            "PizzaPalace_zomer.mp4",
            &[
                adv("A9", "Garage Vermeulen"),
                adv("A1", "Pizza Palace"),
                adv("A2", "Pizza Napoli"),
            ],
        );
        assert_eq!(result.suggestions.len(), 2);
        assert_eq!(result.best_match.as_ref().unwrap().advertiser_id, "A1");
        assert!(result.suggestions[0].score >= result.suggestions[1].score);
        assert_eq!(result.media_name, "PizzaPalace_zomer.mp4");
    }

    #[test]
    fn nothing_above_min_score_means_no_best_match() {
        let m = Matcher::new(100, 5);
        let result = m.suggest("Totally unrelated", &[adv("A1", "Pizza Palace")]);
        assert!(result.best_match.is_none());
        assert!(result.suggestions.is_empty());
    }
}
