//! Vote submission and consensus tally

mod helpers;

use helpers::*;
use sigcat_resolver::db::{links, objects, votes};
use sigcat_resolver::models::{HashQuery, MatchMethod, MetadataSource, ObjectType};
use sigcat_resolver::providers::EntityKind;
use sigcat_resolver::services::{VotePair, VoteTarget};
use sigcat_resolver::{Catalog, ErrorClass, RunContext};

const TGDB: MetadataSource = MetadataSource::TheGamesDb;

async fn new_game(pool: &sqlx::SqlitePool, name: &str) -> i64 {
    let object = objects::create_object(pool, ObjectType::Game, name).await.unwrap();
    links::ensure_links(pool, object.id).await.unwrap();
    object.id
}

async fn vote(catalog: &Catalog, user: &str, object_id: i64, source: MetadataSource, id: &str) {
    let ctx = RunContext::new("vote").with_user(user);
    let submission = catalog
        .submit_vote(&ctx, user, &VoteTarget::Object(object_id), &[VotePair::new(source, id)])
        .await
        .unwrap();
    assert!(submission.decisions[0].accepted, "{:?}", submission.decisions);
}

async fn link(pool: &sqlx::SqlitePool, object_id: i64, source: MetadataSource) -> sigcat_resolver::models::MetadataLink {
    links::get_link(pool, object_id, source).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_first_signal_promotes_single_vote() {
    let (_dir, pool) = create_test_db().await;
    let catalog = catalog(&pool, &[]);
    let game = new_game(&pool, "Contra").await;

    vote(&catalog, "u1", game, TGDB, "77").await;
    let report = catalog.tally_votes(&RunContext::new("tally")).await.unwrap();
    assert_eq!(report.pairs, 1);
    assert_eq!(report.promoted, 1);

    let link = link(&pool, game, TGDB).await;
    assert_eq!(link.match_method, MatchMethod::Voted);
    assert_eq!(link.provider_id, "77");
    assert_eq!(link.winning_vote_count, 1);
    assert_eq!(link.total_vote_count, 1);
}

#[tokio::test]
async fn test_quorum_needed_to_overturn_automatic_match() {
    let (_dir, pool) = create_test_db().await;
    let catalog = catalog(&pool, &[]);
    let ctx = RunContext::new("tally");
    let game = new_game(&pool, "Contra").await;
    assert!(links::record_match(&pool, game, TGDB, MatchMethod::Automatic, "10")
        .await
        .unwrap());

    vote(&catalog, "u1", game, TGDB, "20").await;
    vote(&catalog, "u2", game, TGDB, "20").await;
    catalog.tally_votes(&ctx).await.unwrap();

    let current = link(&pool, game, TGDB).await;
    assert_eq!(current.match_method, MatchMethod::Automatic);
    assert_eq!(current.provider_id, "10");
    assert_eq!(current.winning_vote_count, 2);

    vote(&catalog, "u3", game, TGDB, "20").await;
    catalog.tally_votes(&ctx).await.unwrap();

    let current = link(&pool, game, TGDB).await;
    assert_eq!(current.match_method, MatchMethod::Voted);
    assert_eq!(current.provider_id, "20");
    assert_eq!(current.winning_vote_count, 3);
}

#[tokio::test]
async fn test_tie_keeps_voted_incumbent() {
    let (_dir, pool) = create_test_db().await;
    let catalog = catalog(&pool, &[]);
    let ctx = RunContext::new("tally");
    let game = new_game(&pool, "Contra").await;

    for user in ["u1", "u2", "u3"] {
        vote(&catalog, user, game, TGDB, "5").await;
    }
    catalog.tally_votes(&ctx).await.unwrap();
    assert_eq!(link(&pool, game, TGDB).await.provider_id, "5");

    // "10" sorts before "5" but only ties
    for user in ["u4", "u5", "u6"] {
        vote(&catalog, user, game, TGDB, "10").await;
    }
    let report = catalog.tally_votes(&ctx).await.unwrap();
    assert_eq!(report.promoted, 0);

    let current = link(&pool, game, TGDB).await;
    assert_eq!(current.match_method, MatchMethod::Voted);
    assert_eq!(current.provider_id, "5");
    assert_eq!(current.winning_vote_count, 3);
    assert_eq!(current.total_vote_count, 6);

    // A clear majority still overturns it
    vote(&catalog, "u7", game, TGDB, "10").await;
    catalog.tally_votes(&ctx).await.unwrap();
    assert_eq!(link(&pool, game, TGDB).await.provider_id, "10");
}

#[tokio::test]
async fn test_manual_link_ignores_votes() {
    let (_dir, pool) = create_test_db().await;
    let catalog = catalog(&pool, &[]);
    let game = new_game(&pool, "Contra").await;
    links::set_manual(&pool, game, TGDB, MatchMethod::ManualByAdmin, "5")
        .await
        .unwrap();

    for user in ["u1", "u2", "u3", "u4"] {
        vote(&catalog, user, game, TGDB, "6").await;
    }
    let report = catalog.tally_votes(&RunContext::new("tally")).await.unwrap();
    assert_eq!(report.promoted, 0);

    let current = link(&pool, game, TGDB).await;
    assert_eq!(current.match_method, MatchMethod::ManualByAdmin);
    assert_eq!(current.provider_id, "5");
}

#[tokio::test]
async fn test_resubmission_overwrites_previous_vote() {
    let (_dir, pool) = create_test_db().await;
    let catalog = catalog(&pool, &[]);
    let game = new_game(&pool, "Contra").await;

    vote(&catalog, "u1", game, TGDB, "77").await;
    vote(&catalog, "u1", game, TGDB, "78").await;

    assert_eq!(
        votes::count_votes(&pool, game, TGDB).await.unwrap(),
        vec![("78".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_implausible_votes_rejected_per_pair() {
    let (_dir, pool) = create_test_db().await;
    let catalog = catalog(&pool, &[]);
    let game = new_game(&pool, "Contra").await;
    let ctx = RunContext::new("vote");

    let submission = catalog
        .submit_vote(
            &ctx,
            "u1",
            &VoteTarget::Object(game),
            &[
                VotePair::new(TGDB, "abc"),
                VotePair::new(MetadataSource::RetroAchievements, "0"),
                VotePair::new(MetadataSource::GiantBomb, "3030-4725"),
                VotePair::new(MetadataSource::Wikipedia, "http://en.wikipedia.org/wiki/Contra"),
                VotePair::new(MetadataSource::Wikipedia, "https://example.com/wiki/Contra"),
                VotePair::new(
                    MetadataSource::Wikipedia,
                    "https://en.wikipedia.org/wiki/Contra_(video_game)",
                ),
            ],
        )
        .await
        .unwrap();

    let accepted: Vec<bool> = submission.decisions.iter().map(|d| d.accepted).collect();
    assert_eq!(accepted, vec![false, false, true, false, false, true]);
    assert!(submission.decisions[0].reason.is_some());
    assert_eq!(votes::list_voted_pairs(&pool).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_vote_input_errors() {
    let (_dir, pool) = create_test_db().await;
    let catalog = catalog(&pool, &[]);
    let game = new_game(&pool, "Contra").await;
    let ctx = RunContext::new("vote");

    let err = catalog
        .submit_vote(&ctx, "u1", &VoteTarget::Object(game), &[])
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::ClientError);

    let err = catalog
        .submit_vote(&ctx, " ", &VoteTarget::Object(game), &[VotePair::new(TGDB, "1")])
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::ClientError);

    let err = catalog
        .submit_vote(&ctx, "u1", &VoteTarget::Object(424242), &[VotePair::new(TGDB, "1")])
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);
}

#[tokio::test]
async fn test_igdb_vote_checked_against_provider() {
    let (_dir, pool) = create_test_db().await;
    let igdb = FakeProvider::new(MetadataSource::IGDB);
    igdb.add(EntityKind::Game, entity("1234", "Contra"));
    let catalog = catalog(&pool, &[igdb]);
    let game = new_game(&pool, "Contra").await;

    let submission = catalog
        .submit_vote(
            &RunContext::new("vote"),
            "u1",
            &VoteTarget::Object(game),
            &[
                VotePair::new(MetadataSource::IGDB, "1234"),
                VotePair::new(MetadataSource::IGDB, "999"),
            ],
        )
        .await
        .unwrap();

    assert!(submission.decisions[0].accepted);
    assert!(!submission.decisions[1].accepted);
}

#[tokio::test]
async fn test_vote_by_hashes_creates_object() {
    let (_dir, pool) = create_test_db().await;
    seed_platform(&pool, 10, "NES").await;
    seed_game(&pool, 100, "Contra", Some(10), None).await;
    seed_rom(&pool, 1000, 100, &md5("c0a7"), 0).await;
    let catalog = catalog(&pool, &[]);

    let submission = catalog
        .submit_vote(
            &RunContext::new("vote"),
            "u1",
            &VoteTarget::Hashes(HashQuery::md5(md5("c0a7"))),
            &[VotePair::new(TGDB, "77")],
        )
        .await
        .unwrap();

    assert!(submission.decisions[0].accepted);
    assert_eq!(
        objects::object_type_of(&pool, submission.object_id).await.unwrap(),
        Some(ObjectType::Game)
    );
    assert_eq!(count_objects(&pool, ObjectType::Game).await, 1);
}

async fn cached_rows(pool: &sqlx::SqlitePool, kind: EntityKind) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM provider_cache WHERE kind = ?")
        .bind(kind.as_str())
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_igdb_promotion_warms_game_artwork() {
    let (_dir, pool) = create_test_db().await;
    let igdb = FakeProvider::new(MetadataSource::IGDB);
    igdb.add(
        EntityKind::Game,
        sigcat_resolver::providers::ProviderEntity {
            payload: serde_json::json!({ "id": 1234, "name": "Contra", "cover": 77 }),
            ..entity("1234", "Contra")
        },
    );
    igdb.add(EntityKind::Cover, entity("77", ""));
    let catalog = catalog(&pool, &[igdb]);
    let game = new_game(&pool, "Contra").await;

    vote(&catalog, "u1", game, MetadataSource::IGDB, "1234").await;

    // Drop what vote validation already warmed so only the promotion can refill it
    sqlx::query("DELETE FROM provider_cache WHERE kind = 'Cover'")
        .execute(&pool)
        .await
        .unwrap();

    let report = catalog.tally_votes(&RunContext::new("tally")).await.unwrap();
    assert_eq!(report.promoted, 1);

    let mut warmed = false;
    for _ in 0..100 {
        if cached_rows(&pool, EntityKind::Cover).await > 0 {
            warmed = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(warmed, "cover was not fetched after promotion");
}
