use crate::db::{self, MediaUpsert, Pool, UpsertOutcome};
use crate::matching::Matcher;
use crate::model::{Link, MatchMethod, MediaType, Screen};
use crate::reconcile::{self, Command};
use crate::yodeck::{MediaSource, RemoteScreen};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: i64,
    pub media_seen: i64,
    pub media_new: i64,
    pub media_updated: i64,
    pub screens_seen: i64,
    /// Items absent from this listing whose screens were cleared.
    pub media_missing: i64,
    pub auto_linked: i64,
}

/// Invert the screens' schedules into per-media screen lists, ordered by
/// screen name then id.
fn screens_by_media(screens: &[RemoteScreen]) -> HashMap<i64, Vec<Screen>> {
    let mut by_media: HashMap<i64, Vec<Screen>> = HashMap::new();
    for remote in screens {
        let screen = Screen {
            screen_id: remote.id,
            screen_display_id: remote
                .uuid
                .clone()
                .unwrap_or_else(|| remote.id.to_string()),
            screen_name: remote.name.clone(),
            location_name: remote.location_name.clone(),
            is_online: remote.state.online,
        };
        for media_id in &remote.media_ids {
            let entry = by_media.entry(*media_id).or_default();
            if !entry.iter().any(|s| s.screen_id == screen.screen_id) {
                entry.push(screen.clone());
            }
        }
    }
    for list in by_media.values_mut() {
        list.sort_by(|a, b| {
            a.screen_name
                .to_lowercase()
                .cmp(&b.screen_name.to_lowercase())
                .then(a.screen_id.cmp(&b.screen_id))
        });
    }
    by_media
}

/// Pull the full inventory from `source` into the local mirror. Items missing
/// upstream are kept with an empty screen list; link state of known items is
/// never reset.
#[instrument(skip_all)]
pub async fn refresh(
    pool: &Pool,
    source: &dyn MediaSource,
    matcher: &Matcher,
    auto_link: bool,
) -> Result<SyncReport> {
    let run_id = db::begin_sync_run(pool, Utc::now()).await?;
    match refresh_inner(pool, source, matcher, auto_link, run_id).await {
        Ok(report) => {
            db::finish_sync_run(
                pool,
                run_id,
                report.media_seen,
                report.media_new,
                report.media_updated,
                report.auto_linked,
                None,
            )
            .await?;
            info!(
                run_id,
                seen = report.media_seen,
                new = report.media_new,
                updated = report.media_updated,
                missing = report.media_missing,
                auto_linked = report.auto_linked,
                "mirror refreshed"
            );
            Ok(report)
        }
        Err(err) => {
            let detail = format!("{:#}", err);
            if let Err(record_err) =
                db::finish_sync_run(pool, run_id, 0, 0, 0, 0, Some(&detail)).await
            {
                warn!(?record_err, run_id, "failed to record sync failure");
            }
            Err(err)
        }
    }
}

async fn refresh_inner(
    pool: &Pool,
    source: &dyn MediaSource,
    matcher: &Matcher,
    auto_link: bool,
    run_id: i64,
) -> Result<SyncReport> {
    let (media, screens) = futures::try_join!(source.list_media(), source.list_screens())?;
    let mut by_media = screens_by_media(&screens);

    let mut report = SyncReport {
        run_id,
        screens_seen: screens.len() as i64,
        ..Default::default()
    };
    let mut created = Vec::new();
    let mut seen = HashSet::new();

    let now = Utc::now();
    let mut tx = pool.begin().await.context("failed to begin mirror transaction")?;
    for remote in media {
        let upsert = MediaUpsert {
            external_id: remote.id,
            media_type: remote
                .media_type
                .as_deref()
                .map(MediaType::parse)
                .unwrap_or(MediaType::Other),
            duration_seconds: remote.duration.filter(|d| d.is_finite() && *d >= 0.0),
            screens: by_media.remove(&remote.id).unwrap_or_default(),
            name: remote.name,
        };
        report.media_seen += 1;
        seen.insert(upsert.external_id);
        match db::upsert_media(&mut tx, &upsert, now).await? {
            UpsertOutcome::Created => {
                report.media_new += 1;
                created.push((upsert.external_id, upsert.name));
            }
            UpsertOutcome::Updated => report.media_updated += 1,
            UpsertOutcome::Unchanged => {}
        }
    }
    report.media_missing = db::clear_screens_except(&mut tx, &seen).await? as i64;
    tx.commit().await.context("failed to commit mirror")?;

    if auto_link && !created.is_empty() {
        report.auto_linked = auto_link_new(pool, matcher, &created).await?;
    }
    Ok(report)
}

/// Link newly observed items whose best suggestion is high-confidence.
async fn auto_link_new(pool: &Pool, matcher: &Matcher, created: &[(i64, String)]) -> Result<i64> {
    let advertisers = db::list_advertisers(pool).await?;
    if advertisers.is_empty() {
        return Ok(0);
    }
    let mut linked = 0;
    for (external_id, name) in created {
        let Some(best) = matcher.suggest(name, &advertisers).best_match else {
            continue;
        };
        if !best.score.is_high_confidence() {
            continue;
        }
        let link = Link::new(
            best.advertiser_id.clone(),
            MatchMethod::Auto(best.score.to_confidence()),
        );
        match reconcile::execute(pool, *external_id, Command::Link(link)).await {
            Ok(_) => linked += 1,
            Err(err) => warn!(?err, external_id, "auto-link failed"),
        }
    }
    Ok(linked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yodeck::model::ScreenState;

    fn remote_screen(id: i64, name: &str, media_ids: Vec<i64>) -> RemoteScreen {
        RemoteScreen {
            id,
            uuid: None,
            name: name.into(),
            location_name: None,
            state: ScreenState { online: true },
            media_ids,
        }
    }

    #[test]
    fn screens_are_grouped_per_media_and_sorted() {
        let grouped = screens_by_media(&[
            remote_screen(2, "kassa", vec![501, 502]),
            remote_screen(1, "Entree", vec![501, 501]),
        ]);
        let for_501 = &grouped[&501];
        assert_eq!(for_501.len(), 2);
        assert_eq!(for_501[0].screen_name, "Entree");
        assert_eq!(for_501[1].screen_display_id, "2");
        assert_eq!(grouped[&502].len(), 1);
        assert!(!grouped.contains_key(&503));
    }
}
