use super::model::{LinkRow, MediaUpsert, SyncRun, UpsertOutcome};
use crate::model::{
    AdItem, AdsSummary, AdsView, Advertiser, LinkState, MediaItem, MediaType, Screen,
};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and create the parent
/// directory. In-memory and non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // sqlx will not create a missing database file without mode=rwc.
    let mut rebuilt = format!("sqlite://{}", expanded_path);
    match query_part {
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn upsert_advertiser(pool: &Pool, id: &str, name: &str) -> Result<Advertiser> {
    sqlx::query(
        "INSERT INTO advertisers (id, name, created_at) VALUES (?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
    )
    .bind(id)
    .bind(name)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("failed to upsert advertiser")?;
    Ok(Advertiser {
        id: id.to_string(),
        name: name.to_string(),
    })
}

#[instrument(skip_all)]
pub async fn list_advertisers(pool: &Pool) -> Result<Vec<Advertiser>> {
    let rows = sqlx::query("SELECT id, name FROM advertisers ORDER BY name COLLATE NOCASE, id")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| Advertiser {
            id: row.get("id"),
            name: row.get("name"),
        })
        .collect())
}

pub async fn advertiser_name(conn: &mut SqliteConnection, id: &str) -> Result<Option<String>> {
    let name = sqlx::query_scalar::<_, String>("SELECT name FROM advertisers WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(name)
}

/// Insert or refresh a mirrored media item. New items start `unlinked`;
/// existing link state is never touched here.
#[instrument(skip_all, fields(external_id = media.external_id))]
pub async fn upsert_media(
    conn: &mut SqliteConnection,
    media: &MediaUpsert,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    let existing = sqlx::query(
        "SELECT name, media_type, duration_seconds FROM media_items WHERE external_id = ?",
    )
    .bind(media.external_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = existing else {
        sqlx::query(
            "INSERT INTO media_items \
             (external_id, name, media_type, duration_seconds, last_seen_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(media.external_id)
        .bind(&media.name)
        .bind(media.media_type.as_str())
        .bind(media.duration_seconds)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        sqlx::query(
            "INSERT INTO ad_links (external_id, status, updated_at) VALUES (?, 'unlinked', ?)",
        )
        .bind(media.external_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        replace_screens(conn, media.external_id, &media.screens).await?;
        return Ok(UpsertOutcome::Created);
    };

    let name: String = row.get("name");
    let media_type: String = row.get("media_type");
    let duration: Option<f64> = row.get("duration_seconds");
    let screens = load_screens(&mut *conn, media.external_id).await?;
    let changed = name != media.name
        || MediaType::parse(&media_type) != media.media_type
        || duration != media.duration_seconds
        || screens != media.screens;

    if changed {
        sqlx::query(
            "UPDATE media_items SET name = ?, media_type = ?, duration_seconds = ?, \
             last_seen_at = ?, updated_at = ? \
             WHERE external_id = ?",
        )
        .bind(&media.name)
        .bind(media.media_type.as_str())
        .bind(media.duration_seconds)
        .bind(now)
        .bind(now)
        .bind(media.external_id)
        .execute(&mut *conn)
        .await?;
        replace_screens(conn, media.external_id, &media.screens).await?;
        Ok(UpsertOutcome::Updated)
    } else {
        sqlx::query("UPDATE media_items SET last_seen_at = ? WHERE external_id = ?")
            .bind(now)
            .bind(media.external_id)
            .execute(&mut *conn)
            .await?;
        Ok(UpsertOutcome::Unchanged)
    }
}

async fn load_screens(conn: &mut SqliteConnection, external_id: i64) -> Result<Vec<Screen>> {
    let rows = sqlx::query(
        "SELECT screen_id, screen_display_id, screen_name, location_name, is_online \
         FROM media_screens WHERE external_id = ? ORDER BY position",
    )
    .bind(external_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.iter().map(screen_from_row).collect())
}

async fn replace_screens(
    conn: &mut SqliteConnection,
    external_id: i64,
    screens: &[Screen],
) -> Result<()> {
    sqlx::query("DELETE FROM media_screens WHERE external_id = ?")
        .bind(external_id)
        .execute(&mut *conn)
        .await?;
    for (position, screen) in screens.iter().enumerate() {
        sqlx::query(
            "INSERT INTO media_screens (external_id, position, screen_id, screen_display_id, \
             screen_name, location_name, is_online) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(external_id)
        .bind(position as i64)
        .bind(screen.screen_id)
        .bind(&screen.screen_display_id)
        .bind(&screen.screen_name)
        .bind(&screen.location_name)
        .bind(screen.is_online)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Empties the screen list of every mirrored item not in `seen`. Items and
/// their link state stay; returns how many items lost their screens.
#[instrument(skip_all, fields(seen = seen.len()))]
pub async fn clear_screens_except(conn: &mut SqliteConnection, seen: &HashSet<i64>) -> Result<u64> {
    let with_screens: Vec<i64> =
        sqlx::query_scalar("SELECT DISTINCT external_id FROM media_screens")
            .fetch_all(&mut *conn)
            .await?;
    let mut cleared = 0;
    for external_id in with_screens.into_iter().filter(|id| !seen.contains(id)) {
        replace_screens(&mut *conn, external_id, &[]).await?;
        cleared += 1;
    }
    Ok(cleared)
}

fn screen_from_row(row: &SqliteRow) -> Screen {
    Screen {
        screen_id: row.get("screen_id"),
        screen_display_id: row.get("screen_display_id"),
        screen_name: row.get("screen_name"),
        location_name: row.get("location_name"),
        is_online: row.get("is_online"),
    }
}

#[instrument(skip_all)]
pub async fn fetch_link_state(
    conn: &mut SqliteConnection,
    external_id: i64,
) -> Result<Option<LinkState>> {
    let row = sqlx::query(
        "SELECT status, advertiser_id, match_type, match_confidence, archived_at \
         FROM ad_links WHERE external_id = ?",
    )
    .bind(external_id)
    .fetch_optional(conn)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let state = link_row(&row)
        .into_state()
        .with_context(|| format!("corrupt link state for media {}", external_id))?;
    Ok(Some(state))
}

#[instrument(skip_all)]
pub async fn store_link_state(
    conn: &mut SqliteConnection,
    external_id: i64,
    state: &LinkState,
    now: DateTime<Utc>,
) -> Result<()> {
    let row = LinkRow::from_state(state);
    let result = sqlx::query(
        "UPDATE ad_links SET status = ?, advertiser_id = ?, match_type = ?, match_confidence = ?, \
         archived_at = ?, updated_at = ? WHERE external_id = ?",
    )
    .bind(&row.status)
    .bind(&row.advertiser_id)
    .bind(&row.match_type)
    .bind(row.match_confidence)
    .bind(row.archived_at)
    .bind(now)
    .bind(external_id)
    .execute(conn)
    .await
    .context("failed to persist link state")?;
    if result.rows_affected() == 0 {
        return Err(anyhow!("no link state for media {}", external_id));
    }
    Ok(())
}

fn link_row(row: &SqliteRow) -> LinkRow {
    LinkRow {
        status: row.get("status"),
        advertiser_id: row.get("advertiser_id"),
        match_type: row.get("match_type"),
        match_confidence: row.get("match_confidence"),
        archived_at: row.get("archived_at"),
    }
}

const AD_ITEM_SELECT: &str = "SELECT m.external_id, m.name, m.media_type, m.duration_seconds, \
        m.last_seen_at, m.updated_at, \
        l.status, l.advertiser_id, l.match_type, l.match_confidence, l.archived_at, \
        CASE WHEN l.status = 'linked' THEN a.name END AS advertiser_name \
     FROM media_items m \
     JOIN ad_links l ON l.external_id = m.external_id \
     LEFT JOIN advertisers a ON a.id = l.advertiser_id";

fn ad_item_from_row(row: &SqliteRow, screens: Vec<Screen>) -> Result<AdItem> {
    let external_id: i64 = row.get("external_id");
    let link = link_row(row)
        .into_state()
        .with_context(|| format!("corrupt link state for media {}", external_id))?;
    let media_type: String = row.get("media_type");
    Ok(AdItem {
        media: MediaItem {
            external_id,
            name: row.get("name"),
            media_type: MediaType::parse(&media_type),
            duration_seconds: row.get("duration_seconds"),
            screens,
            last_seen_at: row.get("last_seen_at"),
            updated_at: row.get("updated_at"),
        },
        link,
        advertiser_name: row.get("advertiser_name"),
    })
}

#[instrument(skip_all)]
pub async fn fetch_ad_item(pool: &Pool, external_id: i64) -> Result<Option<AdItem>> {
    let mut conn = pool.acquire().await?;
    let row = sqlx::query(&format!("{} WHERE m.external_id = ?", AD_ITEM_SELECT))
        .bind(external_id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let screens = load_screens(&mut conn, external_id).await?;
    Ok(Some(ad_item_from_row(&row, screens)?))
}

/// The merged media × screens × link view. Archived items are omitted unless
/// `include_archived`; the summary always counts them separately. Items and
/// summary are read from the same snapshot.
#[instrument(skip(pool))]
pub async fn ads_view(pool: &Pool, include_archived: bool) -> Result<AdsView> {
    let mut tx = pool.begin().await.context("failed to begin read")?;
    let rows = sqlx::query(&format!(
        "{} WHERE (? OR l.status <> 'archived') ORDER BY m.name COLLATE NOCASE, m.external_id",
        AD_ITEM_SELECT
    ))
    .bind(include_archived)
    .fetch_all(&mut *tx)
    .await?;

    let screen_rows = sqlx::query(
        "SELECT external_id, screen_id, screen_display_id, screen_name, location_name, is_online \
         FROM media_screens ORDER BY external_id, position",
    )
    .fetch_all(&mut *tx)
    .await?;
    let summary = count_links(&mut tx, include_archived).await?;
    tx.commit().await?;

    let mut screens: HashMap<i64, Vec<Screen>> = HashMap::new();
    for row in &screen_rows {
        screens
            .entry(row.get("external_id"))
            .or_default()
            .push(screen_from_row(row));
    }

    let items = rows
        .iter()
        .map(|row| {
            let id: i64 = row.get("external_id");
            ad_item_from_row(row, screens.remove(&id).unwrap_or_default())
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(AdsView { items, summary })
}

#[instrument(skip(pool))]
pub async fn summary(pool: &Pool, include_archived: bool) -> Result<AdsSummary> {
    let mut conn = pool.acquire().await?;
    count_links(&mut conn, include_archived).await
}

async fn count_links(conn: &mut SqliteConnection, include_archived: bool) -> Result<AdsSummary> {
    let counts: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM ad_links GROUP BY status")
            .fetch_all(conn)
            .await?;
    let mut summary = AdsSummary::default();
    for (status, n) in counts {
        let n = n.max(0) as u64;
        match status.as_str() {
            "linked" => summary.linked = n,
            "unlinked" => summary.unlinked = n,
            "archived" => summary.archived = n,
            other => return Err(anyhow!("unknown link status {}", other)),
        }
    }
    summary.total = summary.linked + summary.unlinked;
    if include_archived {
        summary.total += summary.archived;
    }
    Ok(summary)
}

pub async fn begin_sync_run(pool: &Pool, started_at: DateTime<Utc>) -> Result<i64> {
    let id: i64 = sqlx::query("INSERT INTO sync_runs (started_at) VALUES (?) RETURNING id")
        .bind(started_at)
        .fetch_one(pool)
        .await?
        .get("id");
    Ok(id)
}

#[allow(clippy::too_many_arguments)]
pub async fn finish_sync_run(
    pool: &Pool,
    id: i64,
    media_seen: i64,
    media_new: i64,
    media_updated: i64,
    auto_linked: i64,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE sync_runs SET finished_at = ?, media_seen = ?, media_new = ?, media_updated = ?, \
         auto_linked = ?, error = ? WHERE id = ?",
    )
    .bind(Utc::now())
    .bind(media_seen)
    .bind(media_new)
    .bind(media_updated)
    .bind(auto_linked)
    .bind(error)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to record sync run")?;
    Ok(())
}

pub async fn last_sync_run(pool: &Pool) -> Result<Option<SyncRun>> {
    let row = sqlx::query(
        "SELECT id, started_at, finished_at, media_seen, media_new, media_updated, \
         auto_linked, error \
         FROM sync_runs ORDER BY id DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| SyncRun {
        id: row.get("id"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        media_seen: row.get("media_seen"),
        media_new: row.get("media_new"),
        media_updated: row.get("media_updated"),
        auto_linked: row.get("auto_linked"),
        error: row.get("error"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Link, MatchMethod, Score};

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn media(id: i64, name: &str, screens: Vec<Screen>) -> MediaUpsert {
        MediaUpsert {
            external_id: id,
            name: name.into(),
            media_type: MediaType::Video,
            duration_seconds: Some(10.0),
            screens,
        }
    }

    fn screen(id: i64, name: &str) -> Screen {
        Screen {
            screen_id: id,
            screen_display_id: format!("YDK-{:03}", id),
            screen_name: name.into(),
            location_name: Some("Centrum".into()),
            is_online: id % 2 == 0,
        }
    }

    #[test]
    fn prepare_sqlite_url_passes_memory_through() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
    }

    #[tokio::test]
    async fn upsert_creates_unlinked_state_and_detects_changes() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();

        let first = upsert_media(&mut conn, &media(1, "Promo", vec![screen(2, "Hal")]), now)
            .await
            .unwrap();
        assert_eq!(first, UpsertOutcome::Created);
        assert_eq!(
            fetch_link_state(&mut conn, 1).await.unwrap(),
            Some(LinkState::Unlinked)
        );

        let again = upsert_media(&mut conn, &media(1, "Promo", vec![screen(2, "Hal")]), now)
            .await
            .unwrap();
        assert_eq!(again, UpsertOutcome::Unchanged);

        let moved = upsert_media(
            &mut conn,
            &media(1, "Promo", vec![screen(2, "Hal"), screen(3, "Kassa")]),
            now,
        )
        .await
        .unwrap();
        assert_eq!(moved, UpsertOutcome::Updated);
        drop(conn);

        let item = fetch_ad_item(&pool, 1).await.unwrap().unwrap();
        assert_eq!(item.media.screens_count(), 2);
        assert_eq!(item.media.screens[1].screen_name, "Kassa");
    }

    #[tokio::test]
    async fn archived_state_round_trips_with_previous_link() {
        let pool = setup_pool().await;
        upsert_advertiser(&pool, "A3", "Fietsenwinkel").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        upsert_media(&mut conn, &media(503, "Fietsen", vec![]), Utc::now())
            .await
            .unwrap();

        let state = LinkState::Archived {
            archived_at: Utc::now(),
            previous: Some(Link::new(
                "A3",
                MatchMethod::Suggested(Score::new(90).unwrap().to_confidence()),
            )),
        };
        store_link_state(&mut conn, 503, &state, Utc::now())
            .await
            .unwrap();
        let loaded = fetch_link_state(&mut conn, 503).await.unwrap().unwrap();
        match (&loaded, &state) {
            (
                LinkState::Archived { previous: a, .. },
                LinkState::Archived { previous: b, .. },
            ) => assert_eq!(a, b),
            _ => panic!("expected archived state, got {:?}", loaded),
        }
    }

    #[tokio::test]
    async fn summary_counts_archived_separately() {
        let pool = setup_pool().await;
        upsert_advertiser(&pool, "A1", "Pizza Palace").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        for id in 1..=4 {
            upsert_media(&mut conn, &media(id, &format!("Ad {}", id), vec![]), Utc::now())
                .await
                .unwrap();
        }
        store_link_state(
            &mut conn,
            1,
            &LinkState::Linked(Link::new("A1", MatchMethod::Manual)),
            Utc::now(),
        )
        .await
        .unwrap();
        store_link_state(
            &mut conn,
            2,
            &LinkState::Archived {
                archived_at: Utc::now(),
                previous: None,
            },
            Utc::now(),
        )
        .await
        .unwrap();
        drop(conn);

        let without = ads_view(&pool, false).await.unwrap();
        assert_eq!(without.items.len(), 3);
        assert_eq!(without.summary.archived, 1);
        assert_eq!(
            without.summary.total,
            without.summary.linked + without.summary.unlinked
        );

        let with = ads_view(&pool, true).await.unwrap();
        assert_eq!(with.items.len(), 4);
        assert_eq!(
            with.summary.total,
            with.summary.linked + with.summary.unlinked + with.summary.archived
        );
        let linked = with.find(1).unwrap();
        assert_eq!(linked.advertiser_name.as_deref(), Some("Pizza Palace"));
    }

    #[tokio::test]
    async fn clearing_screens_keeps_items_and_links() {
        let pool = setup_pool().await;
        upsert_advertiser(&pool, "A1", "Pizza Palace").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        for id in [1, 2] {
            upsert_media(&mut conn, &media(id, "Ad", vec![screen(7, "Entree")]), Utc::now())
                .await
                .unwrap();
        }
        let linked = LinkState::Linked(Link::new("A1", MatchMethod::Manual));
        store_link_state(&mut conn, 1, &linked, Utc::now())
            .await
            .unwrap();

        let cleared = clear_screens_except(&mut conn, &HashSet::from([2]))
            .await
            .unwrap();
        assert_eq!(cleared, 1);
        drop(conn);

        let gone = fetch_ad_item(&pool, 1).await.unwrap().unwrap();
        assert_eq!(gone.media.screens_count(), 0);
        assert_eq!(gone.link, linked);
        let kept = fetch_ad_item(&pool, 2).await.unwrap().unwrap();
        assert_eq!(kept.media.screens_count(), 1);
    }

    #[tokio::test]
    async fn view_summary_agrees_with_items() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        for id in 1..=3 {
            upsert_media(&mut conn, &media(id, "Ad", vec![]), Utc::now())
                .await
                .unwrap();
        }
        let archived = LinkState::Archived {
            archived_at: Utc::now(),
            previous: None,
        };
        store_link_state(&mut conn, 3, &archived, Utc::now())
            .await
            .unwrap();
        drop(conn);

        for include_archived in [false, true] {
            let view = ads_view(&pool, include_archived).await.unwrap();
            assert_eq!(view.summary.total, view.items.len() as u64);
            assert_eq!(view.summary, summary(&pool, include_archived).await.unwrap());
        }
    }

    #[tokio::test]
    async fn sync_runs_are_recorded() {
        let pool = setup_pool().await;
        assert!(last_sync_run(&pool).await.unwrap().is_none());
        let id = begin_sync_run(&pool, Utc::now()).await.unwrap();
        finish_sync_run(&pool, id, 3, 2, 1, 0, None).await.unwrap();
        let run = last_sync_run(&pool).await.unwrap().unwrap();
        assert_eq!(run.id, id);
        assert_eq!(run.media_new, 2);
        assert!(run.finished_at.is_some());
        assert!(run.error.is_none());
    }
}
