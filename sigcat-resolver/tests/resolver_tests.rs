//! Hash lookup and canonical object creation

mod helpers;

use helpers::*;
use sigcat_resolver::models::{
    AttributeName, AttributeValue, HashQuery, MatchMethod, MetadataSource, ObjectType,
    SignatureLink, SignatureType,
};
use sigcat_resolver::{ErrorClass, RunContext};

async fn seed_contra(pool: &sqlx::SqlitePool) {
    seed_platform(pool, 10, "Nintendo Entertainment System").await;
    seed_publisher(pool, 20, "Konami").await;
    seed_game(pool, 100, "Contra", Some(10), Some(20)).await;
    seed_rom(pool, 1000, 100, &md5("c0a7"), 0).await;
}

#[tokio::test]
async fn test_lookup_creates_linked_objects() {
    let (_dir, pool) = create_test_db().await;
    seed_contra(&pool).await;
    let catalog = catalog(&pool, &[]);

    let result = catalog
        .lookup_by_hash(&RunContext::new("test"), &HashQuery::md5(md5("c0a7")))
        .await
        .unwrap();

    assert_eq!(result.object.object_type, ObjectType::Game);
    assert_eq!(result.object.name, "Contra");
    assert_eq!(result.signature.rom.id, 1000);
    assert_eq!(
        result.object.signature_links,
        vec![SignatureLink {
            signature_type: SignatureType::Game,
            signature_id: 100
        }]
    );

    let platform = result.platform.expect("platform object");
    let publisher = result.publisher.expect("publisher object");
    assert_eq!(platform.object_type, ObjectType::Platform);
    assert_eq!(publisher.object_type, ObjectType::Company);
    assert_eq!(
        result.object.relationship(AttributeName::Platform),
        Some((ObjectType::Platform, platform.id))
    );
    assert_eq!(
        result.object.relationship(AttributeName::Publisher),
        Some((ObjectType::Company, publisher.id))
    );
    assert_eq!(
        result.object.attribute(AttributeName::Year),
        Some(&AttributeValue::ShortString("1988".to_string()))
    );

    // One unmatched link per known provider
    assert_eq!(result.metadata_links.len(), MetadataSource::ALL.len());
    assert!(result
        .metadata_links
        .iter()
        .all(|l| l.match_method == MatchMethod::NoMatch && l.provider_id.is_empty()));
}

#[tokio::test]
async fn test_repeated_lookup_is_idempotent() {
    let (_dir, pool) = create_test_db().await;
    seed_contra(&pool).await;
    let catalog = catalog(&pool, &[]);
    let ctx = RunContext::new("test");

    let first = catalog
        .lookup_by_hash(&ctx, &HashQuery::md5(md5("c0a7")))
        .await
        .unwrap();
    let second = catalog
        .lookup_by_hash(&ctx, &HashQuery::md5(md5("C0A7")))
        .await
        .unwrap();

    assert_eq!(first.object.id, second.object.id);
    assert_eq!(count_objects(&pool, ObjectType::Game).await, 1);
    assert_eq!(count_objects(&pool, ObjectType::Platform).await, 1);
    assert_eq!(count_objects(&pool, ObjectType::Company).await, 1);
}

#[tokio::test]
async fn test_games_share_platform_object() {
    let (_dir, pool) = create_test_db().await;
    seed_contra(&pool).await;
    seed_game(&pool, 101, "Gradius", Some(10), Some(20)).await;
    seed_rom(&pool, 1001, 101, &md5("9ad1"), 0).await;
    let catalog = catalog(&pool, &[]);
    let ctx = RunContext::new("test");

    let contra = catalog
        .lookup_by_hash(&ctx, &HashQuery::md5(md5("c0a7")))
        .await
        .unwrap();
    let gradius = catalog
        .lookup_by_hash(&ctx, &HashQuery::md5(md5("9ad1")))
        .await
        .unwrap();

    assert_ne!(contra.object.id, gradius.object.id);
    assert_eq!(
        contra.platform.map(|p| p.id),
        gradius.platform.map(|p| p.id)
    );
    assert_eq!(count_objects(&pool, ObjectType::Platform).await, 1);
}

#[tokio::test]
async fn test_uppercase_catalog_hash_matches() {
    let (_dir, pool) = create_test_db().await;
    seed_platform(&pool, 10, "NES").await;
    seed_game(&pool, 100, "Contra", Some(10), None).await;
    let stored = "ABCDEF0123456789ABCDEF0123456789";
    seed_rom(&pool, 1000, 100, stored, 0).await;
    let catalog = catalog(&pool, &[]);
    let ctx = RunContext::new("test");

    for query in [stored.to_string(), stored.to_ascii_lowercase()] {
        let result = catalog
            .lookup_by_hash(&ctx, &HashQuery::md5(query))
            .await
            .unwrap();
        assert_eq!(result.signature.rom.id, 1000);
    }
    assert_eq!(count_objects(&pool, ObjectType::Game).await, 1);
}

#[tokio::test]
async fn test_tie_break_prefers_score_then_lowest_rom_id() {
    let (_dir, pool) = create_test_db().await;
    seed_platform(&pool, 10, "NES").await;
    seed_game(&pool, 100, "Contra", Some(10), None).await;
    seed_game(&pool, 101, "Probotector", Some(10), None).await;
    seed_game(&pool, 102, "Gryzor", Some(10), None).await;

    let shared = md5("5a3e");
    seed_rom(&pool, 2002, 102, &shared, 0).await;
    seed_rom(&pool, 2001, 101, &shared, 0).await;
    let catalog = catalog(&pool, &[]);
    let ctx = RunContext::new("test");

    for _ in 0..3 {
        let result = catalog
            .lookup_by_hash(&ctx, &HashQuery::md5(shared.clone()))
            .await
            .unwrap();
        assert_eq!(result.signature.rom.id, 2001);
        assert_eq!(result.object.name, "Probotector");
    }

    // A better-scored dump wins regardless of id
    seed_rom(&pool, 2003, 100, &shared, 5).await;
    let result = catalog
        .lookup_by_hash(&ctx, &HashQuery::md5(shared))
        .await
        .unwrap();
    assert_eq!(result.signature.rom.id, 2003);
    assert_eq!(result.object.name, "Contra");
}

#[tokio::test]
async fn test_lookup_error_classes() {
    let (_dir, pool) = create_test_db().await;
    seed_contra(&pool).await;
    let catalog = catalog(&pool, &[]);
    let ctx = RunContext::new("test");

    let missing = catalog
        .lookup_by_hash(&ctx, &HashQuery::md5(md5("ffff")))
        .await
        .unwrap_err();
    assert_eq!(missing.class(), ErrorClass::NotFound);

    let malformed = catalog
        .lookup_by_hash(&ctx, &HashQuery::md5("not-a-hash"))
        .await
        .unwrap_err();
    assert_eq!(malformed.class(), ErrorClass::ClientError);

    let empty = catalog
        .lookup_by_hash(&ctx, &HashQuery::default())
        .await
        .unwrap_err();
    assert_eq!(empty.class(), ErrorClass::ClientError);

    // Failed lookups create nothing
    assert_eq!(count_objects(&pool, ObjectType::Game).await, 0);
}

#[tokio::test]
async fn test_link_backfill_fills_gaps() {
    let (_dir, pool) = create_test_db().await;
    seed_contra(&pool).await;
    let catalog = catalog(&pool, &[]);
    let ctx = RunContext::new("test");

    let result = catalog
        .lookup_by_hash(&ctx, &HashQuery::md5(md5("c0a7")))
        .await
        .unwrap();
    assert_eq!(catalog.backfill_links(&ctx).await.unwrap(), 0);

    sqlx::query("DELETE FROM metadata_links WHERE object_id = ? AND source = 'GiantBomb'")
        .bind(result.object.id)
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(catalog.backfill_links(&ctx).await.unwrap(), 1);
}
