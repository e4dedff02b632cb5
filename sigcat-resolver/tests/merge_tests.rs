//! Duplicate object merge

mod helpers;

use helpers::*;
use sigcat_resolver::db::{links, objects, votes};
use sigcat_resolver::models::{
    Attribute, AttributeName, AttributeValue, MatchMethod, MetadataSource, ObjectType,
    SignatureLink, SignatureType,
};
use sigcat_resolver::services::MergeOutcome;
use sigcat_resolver::{ErrorClass, RunContext};

struct Fixture {
    duplicate: i64,
    survivor: i64,
    game: i64,
}

/// Two company objects for the same publisher and a game pointing at the duplicate
async fn setup(pool: &sqlx::SqlitePool) -> Fixture {
    let survivor = objects::create_object(pool, ObjectType::Company, "Konami").await.unwrap().id;
    let duplicate = objects::create_object(pool, ObjectType::Company, "Konami Co.").await.unwrap().id;
    let game = objects::create_object(pool, ObjectType::Game, "Contra").await.unwrap().id;

    for id in [survivor, duplicate, game] {
        links::ensure_links(pool, id).await.unwrap();
    }

    objects::add_signature_link(
        pool,
        survivor,
        SignatureLink {
            signature_type: SignatureType::Company,
            signature_id: 20,
        },
    )
    .await
    .unwrap();
    objects::add_signature_link(
        pool,
        duplicate,
        SignatureLink {
            signature_type: SignatureType::Company,
            signature_id: 21,
        },
    )
    .await
    .unwrap();

    objects::set_attribute(
        pool,
        survivor,
        &Attribute::new(AttributeName::Description, AttributeValue::LongString(String::new())),
    )
    .await
    .unwrap();
    objects::set_attribute(
        pool,
        duplicate,
        &Attribute::new(
            AttributeName::Description,
            AttributeValue::LongString("Japanese publisher".to_string()),
        ),
    )
    .await
    .unwrap();
    objects::set_attribute(
        pool,
        duplicate,
        &Attribute::new(
            AttributeName::Homepage,
            AttributeValue::Link("https://www.konami.com".to_string()),
        ),
    )
    .await
    .unwrap();

    links::record_match(pool, survivor, MetadataSource::IGDB, MatchMethod::Automatic, "129")
        .await
        .unwrap();
    links::record_match(pool, duplicate, MetadataSource::IGDB, MatchMethod::Automatic, "999")
        .await
        .unwrap();
    links::record_match(pool, duplicate, MetadataSource::TheGamesDb, MatchMethod::Automatic, "23")
        .await
        .unwrap();

    objects::set_attribute(
        pool,
        game,
        &Attribute::relationship(AttributeName::Publisher, ObjectType::Company, duplicate),
    )
    .await
    .unwrap();

    let now = chrono::Utc::now();
    votes::upsert_vote(pool, "u1", survivor, MetadataSource::GiantBomb, "1", now).await.unwrap();
    votes::upsert_vote(pool, "u1", duplicate, MetadataSource::GiantBomb, "2", now).await.unwrap();
    votes::upsert_vote(pool, "u2", duplicate, MetadataSource::GiantBomb, "2", now).await.unwrap();

    Fixture {
        duplicate,
        survivor,
        game,
    }
}

#[tokio::test]
async fn test_commit_merges_into_survivor() {
    let (_dir, pool) = create_test_db().await;
    let fx = setup(&pool).await;
    let catalog = catalog(&pool, &[]);

    let outcome = catalog
        .merge_objects(&RunContext::new("merge"), fx.duplicate, fx.survivor, true)
        .await
        .unwrap();
    assert!(matches!(outcome, MergeOutcome::Committed(_)));

    assert!(objects::load_object(&pool, fx.duplicate).await.unwrap().is_none());
    let survivor = objects::load_object(&pool, fx.survivor).await.unwrap().unwrap();

    // Empty survivor value filled, missing attribute appended
    assert_eq!(
        survivor.attribute(AttributeName::Description),
        Some(&AttributeValue::LongString("Japanese publisher".to_string()))
    );
    assert_eq!(
        survivor.attribute(AttributeName::Homepage),
        Some(&AttributeValue::Link("https://www.konami.com".to_string()))
    );

    assert_eq!(survivor.signature_links.len(), 2);
    assert_eq!(
        objects::find_by_signature(&pool, SignatureType::Company, 21).await.unwrap(),
        Some(fx.survivor)
    );

    // Survivor's own match wins; its unset link takes the duplicate's match
    let igdb = survivor.metadata_link(MetadataSource::IGDB).unwrap();
    assert_eq!(igdb.provider_id, "129");
    let tgdb = survivor.metadata_link(MetadataSource::TheGamesDb).unwrap();
    assert_eq!(tgdb.provider_id, "23");
    assert_eq!(tgdb.match_method, MatchMethod::Automatic);

    let game = objects::load_object(&pool, fx.game).await.unwrap().unwrap();
    assert_eq!(
        game.relationship(AttributeName::Publisher),
        Some((ObjectType::Company, fx.survivor))
    );

    // u1 keeps the survivor vote, u2's vote moves over
    assert_eq!(
        votes::get_vote(&pool, "u1", fx.survivor, MetadataSource::GiantBomb).await.unwrap(),
        Some("1".to_string())
    );
    assert_eq!(
        votes::get_vote(&pool, "u2", fx.survivor, MetadataSource::GiantBomb).await.unwrap(),
        Some("2".to_string())
    );
    assert!(votes::list_voted_pairs(&pool)
        .await
        .unwrap()
        .iter()
        .all(|(id, _)| *id == fx.survivor));
}

#[tokio::test]
async fn test_preview_changes_nothing() {
    let (_dir, pool) = create_test_db().await;
    let fx = setup(&pool).await;
    let catalog = catalog(&pool, &[]);
    let before = objects::load_object(&pool, fx.survivor).await.unwrap().unwrap();

    let outcome = catalog
        .merge_objects(&RunContext::new("merge"), fx.duplicate, fx.survivor, false)
        .await
        .unwrap();
    let MergeOutcome::Preview(plan) = outcome else {
        panic!("expected preview");
    };
    assert_eq!(plan.repointed_objects, vec![fx.game]);
    assert_eq!(plan.signature_links.len(), 2);

    assert!(objects::load_object(&pool, fx.duplicate).await.unwrap().is_some());
    let after = objects::load_object(&pool, fx.survivor).await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_merge_validation() {
    let (_dir, pool) = create_test_db().await;
    let fx = setup(&pool).await;
    let catalog = catalog(&pool, &[]);
    let ctx = RunContext::new("merge");

    let err = catalog
        .merge_objects(&ctx, fx.survivor, fx.survivor, true)
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::ClientError);

    let err = catalog
        .merge_objects(&ctx, fx.game, fx.survivor, true)
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::ClientError);

    let err = catalog
        .merge_objects(&ctx, 424242, fx.survivor, true)
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);

    assert!(objects::load_object(&pool, fx.game).await.unwrap().is_some());
}
