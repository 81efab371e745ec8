mod helpers;

use galerie_core::{AppError, VariantStatus};
use galerie_db::AssetStatusStore;
use helpers::setup_test_db;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn status_writes_follow_the_transition_rules() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = &db.store;
    let id = Uuid::new_v4();

    let asset = store
        .register_asset(id, "media/a.jpg", "image/jpeg")
        .await
        .unwrap();
    assert_eq!(asset.variant_status, VariantStatus::Pending);

    let err = store
        .set_status(id, VariantStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStatusTransition {
            from: VariantStatus::Pending,
            to: VariantStatus::Completed,
            ..
        }
    ));

    store.set_status(id, VariantStatus::Processing).await.unwrap();
    store.set_status(id, VariantStatus::Completed).await.unwrap();
    // Re-derivation goes back through pending.
    store.set_status(id, VariantStatus::Pending).await.unwrap();

    let stored = store.get_asset(id).await.unwrap().unwrap();
    assert_eq!(stored.variant_status, VariantStatus::Pending);
    assert_eq!(stored.original_key, "media/a.jpg");

    let unknown = store
        .set_status(Uuid::new_v4(), VariantStatus::Processing)
        .await
        .unwrap_err();
    assert!(matches!(unknown, AppError::NotFound(_)));
}

#[tokio::test]
async fn lists_assets_by_status_oldest_first() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = &db.store;

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let done = Uuid::new_v4();
    store.register_asset(first, "media/1.jpg", "image/jpeg").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    store.register_asset(second, "media/2.jpg", "image/jpeg").await.unwrap();
    store.register_asset(done, "media/3.jpg", "image/jpeg").await.unwrap();

    store.set_status(second, VariantStatus::Processing).await.unwrap();
    store.set_status(done, VariantStatus::Processing).await.unwrap();
    store.set_status(done, VariantStatus::Completed).await.unwrap();

    let unfinished: Vec<Uuid> = store
        .list_by_status(&[VariantStatus::Pending, VariantStatus::Processing])
        .await
        .unwrap()
        .into_iter()
        .map(|asset| asset.id)
        .collect();
    assert_eq!(unfinished, vec![first, second]);

    assert!(store.list_by_status(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn touch_is_strictly_increasing() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = &db.store;
    let id = Uuid::new_v4();
    let asset = store
        .register_asset(id, "media/scan.tiff", "image/tiff")
        .await
        .unwrap();

    let mut previous = asset.updated_at;
    for _ in 0..5 {
        let next = store.touch(id, None).await.unwrap();
        assert!(next > previous);
        previous = next;
    }

    let changed = store.touch(id, Some("image/png")).await.unwrap();
    let stored = store.get_asset(id).await.unwrap().unwrap();
    assert_eq!(stored.updated_at, changed);
    assert_eq!(stored.mime_type, "image/png");

    assert!(matches!(
        store.touch(Uuid::new_v4(), None).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn lease_is_exclusive_until_released() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = &db.store;
    let asset = Uuid::new_v4();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let ttl = Duration::from_secs(60);

    assert!(store.try_acquire_lease(asset, a, ttl).await.unwrap());
    assert!(!store.try_acquire_lease(asset, b, ttl).await.unwrap());

    // Only the holder can release.
    store.release_lease(asset, b).await.unwrap();
    assert!(!store.try_acquire_lease(asset, b, ttl).await.unwrap());

    store.release_lease(asset, a).await.unwrap();
    assert!(store.try_acquire_lease(asset, b, ttl).await.unwrap());

    // Leases on other assets are independent.
    assert!(store
        .try_acquire_lease(Uuid::new_v4(), a, ttl)
        .await
        .unwrap());
}

#[tokio::test]
async fn expired_lease_can_be_taken_over() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = &db.store;
    let asset = Uuid::new_v4();
    let (crashed, next) = (Uuid::new_v4(), Uuid::new_v4());

    assert!(store
        .try_acquire_lease(asset, crashed, Duration::from_millis(50))
        .await
        .unwrap());
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(store
        .try_acquire_lease(asset, next, Duration::from_secs(60))
        .await
        .unwrap());

    // The stale holder's release must not drop the new lease.
    store.release_lease(asset, crashed).await.unwrap();
    assert!(!store
        .try_acquire_lease(asset, crashed, Duration::from_secs(60))
        .await
        .unwrap());
}

#[tokio::test]
async fn concurrent_acquires_have_one_winner() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let asset = Uuid::new_v4();

    let attempts = (0..8).map(|_| {
        let store = db.store.clone();
        tokio::spawn(async move {
            store
                .try_acquire_lease(asset, Uuid::new_v4(), Duration::from_secs(60))
                .await
                .unwrap()
        })
    });
    let mut winners = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        if attempt.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let (held,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM asset_leases WHERE asset_id = $1")
        .bind(asset)
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(held, 1);
}
