use adlink::api::{build_router, AppState};
use adlink::client::{AdsApi, ClientError, HttpAdsClient};
use adlink::db::{self, MediaUpsert};
use adlink::matching::Matcher;
use adlink::model::{LinkRequest, LinkStatus, MatchType, MediaType, Screen, Suggestion};
use adlink::workflow::{Reconciler, SuggestionPanel, Tone, WorkflowError};
use chrono::Utc;
use reqwest::StatusCode;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

async fn seed(pool: &sqlx::SqlitePool) {
    for (id, name) in [
        ("A1", "Pizza Palace"),
        ("A2", "Bakkerij Jansen"),
        ("A3", "Garage Vermeulen"),
    ] {
        db::upsert_advertiser(pool, id, name).await.unwrap();
    }
    let entrance = Screen {
        screen_id: 7,
        screen_display_id: "YDK-007".into(),
        screen_name: "Entrance".into(),
        location_name: Some("Bakkerij Jansen".into()),
        is_online: true,
    };
    let mut conn = pool.acquire().await.unwrap();
    for (id, name) in [
        (501, "SummerSale_v2"),
        (502, "Bakkerij_winter.mp4"),
        (503, "Garage_APK_2026.mp4"),
    ] {
        db::upsert_media(
            &mut conn,
            &MediaUpsert {
                external_id: id,
                name: name.into(),
                media_type: MediaType::Video,
                duration_seconds: Some(15.0),
                screens: vec![entrance.clone()],
            },
            Utc::now(),
        )
        .await
        .unwrap();
    }
}

/// Serves the API on an ephemeral port and returns a client pointed at it.
async fn start() -> (HttpAdsClient, sqlx::SqlitePool) {
    let pool = setup_pool().await;
    seed(&pool).await;
    let router = build_router(AppState::new(pool.clone(), Matcher::default()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    let client = HttpAdsClient::new(&format!("http://{}", addr)).unwrap();
    (client, pool)
}

fn suggestion(advertiser_id: &str, name: &str, score: i64) -> Suggestion {
    Suggestion {
        advertiser_id: advertiser_id.into(),
        advertiser_name: name.into(),
        score: adlink::model::Score::new(score).unwrap(),
    }
}

#[tokio::test]
async fn accepting_a_suggestion_links_with_score_as_confidence() {
    let (client, _pool) = start().await;
    let session = Reconciler::new(client);

    let message = session
        .accept_suggestion(501, &suggestion("A1", "Pizza Palace", 82))
        .await
        .unwrap();
    assert_eq!(message, "Media 501 linked to Pizza Palace");

    let view = session.ads_view(false).await.unwrap();
    let item = view.find(501).unwrap();
    assert_eq!(item.status(), LinkStatus::Linked);
    let link = item.link.link().unwrap();
    assert_eq!(link.advertiser_id, "A1");
    assert_eq!(link.method.match_type(), MatchType::Suggested);
    assert_eq!(link.method.confidence().unwrap().value(), 0.82);
}

#[tokio::test]
async fn unlink_clears_advertiser_and_match_type() {
    let (client, _pool) = start().await;
    client
        .link(502, &LinkRequest::manual("A2"))
        .await
        .unwrap();
    let session = Reconciler::new(client);

    session.unlink(502).await.unwrap();
    let view = session.ads_view(false).await.unwrap();
    let item = view.find(502).unwrap();
    assert_eq!(item.status(), LinkStatus::Unlinked);
    assert_eq!(item.link.advertiser_id(), None);
    assert!(item.link.link().is_none());
}

#[tokio::test]
async fn archive_then_unarchive_restores_manual_link() {
    let (client, _pool) = start().await;
    let session = Reconciler::new(client);
    session.link_manual(503, "A3").await.unwrap();
    let before = session.ads_view(false).await.unwrap().find(503).unwrap().link.clone();

    session.archive(503).await.unwrap();
    let hidden = session.ads_view(false).await.unwrap();
    assert!(hidden.find(503).is_none());
    assert_eq!(hidden.summary.archived, 1);
    assert_eq!(
        hidden.summary.total,
        hidden.summary.linked + hidden.summary.unlinked
    );

    let all = session.ads_view(true).await.unwrap();
    assert_eq!(all.find(503).unwrap().status(), LinkStatus::Archived);
    assert_eq!(
        all.summary.total,
        all.summary.linked + all.summary.unlinked + all.summary.archived
    );

    let detail = session.open_detail(503).await.unwrap();
    assert_eq!(detail.suggestions, SuggestionPanel::NotApplicable);

    session.unarchive(503).await.unwrap();
    let after = session.ads_view(false).await.unwrap().find(503).unwrap().link.clone();
    assert_eq!(after, before);
    assert_eq!(after.advertiser_id(), Some("A3"));
}

#[tokio::test]
async fn rejected_command_surfaces_server_message() {
    let (client, _pool) = start().await;
    let session = Reconciler::new(client);

    let err = session.unarchive(501).await.unwrap_err();
    match err {
        WorkflowError::Rejected { message, .. } => {
            assert_eq!(message, "cannot unarchive a media item that is unlinked")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let view = session.ads_view(false).await.unwrap();
    assert_eq!(view.find(501).unwrap().status(), LinkStatus::Unlinked);
    assert_eq!(session.pending(501), None);
}

#[tokio::test]
async fn detail_ranks_suggestions_with_tone() {
    let (client, _pool) = start().await;
    let session = Reconciler::new(client);

    let detail = session.open_detail(502).await.unwrap();
    let SuggestionPanel::Ready { best, items } = detail.suggestions else {
        panic!("expected suggestions");
    };
    let best = best.unwrap();
    assert_eq!(best.suggestion.advertiser_id, "A2");
    assert_eq!(best.tone, Tone::Affirmative);
    assert_eq!(items[0], best);
    assert!(detail.actions.contains(&adlink::reconcile::CommandKind::Archive));
}

#[tokio::test]
async fn client_reports_status_and_message() {
    let (client, _pool) = start().await;

    let err = client.match_suggestions(9999).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(err.to_string(), "media item 9999 not found");

    let err = client
        .link(501, &LinkRequest::manual("nobody"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Api { status, .. } if status == StatusCode::NOT_FOUND));

    let advertisers = client.advertisers().await.unwrap();
    assert_eq!(advertisers.len(), 3);
    assert_eq!(advertisers[0].name, "Bakkerij Jansen");
}
