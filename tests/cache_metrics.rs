use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;

use delivery_cache::cache::{
    CacheConfig, CacheKey, CacheManager, Dependencies, ITEM_CATEGORY, SubjectKey,
};
use metrics_util::debugging::DebuggingRecorder;

fn on_roasts(_: &String) -> Dependencies {
    Dependencies::from([SubjectKey::new(ITEM_CATEGORY, "on_roasts")])
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let manager = Arc::new(CacheManager::new(CacheConfig::default()));
    let key = CacheKey::new(["item", "on_roasts"]);

    // Miss, then hit.
    for _ in 0..2 {
        manager
            .get_or_create(
                &key,
                || async { Ok::<_, Infallible>("v1".to_string()) },
                on_roasts,
            )
            .await
            .expect("infallible");
    }

    // Invalidation, then a fetch that races one and is discarded.
    manager.invalidate(&SubjectKey::new(ITEM_CATEGORY, "on_roasts"));
    manager
        .get_or_create(
            &key,
            || {
                let manager = Arc::clone(&manager);
                async move {
                    manager.invalidate(&SubjectKey::new(ITEM_CATEGORY, "on_roasts"));
                    Ok::<_, Infallible>("v2".to_string())
                }
            },
            on_roasts,
        )
        .await
        .expect("infallible");

    let report = manager.sweep();
    assert_eq!(report.entries_remaining, 0);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "delivery_cache_hit_total",
        "delivery_cache_miss_total",
        "delivery_cache_discarded_total",
        "delivery_cache_invalidate_total",
        "delivery_cache_fetch_ms",
        "delivery_cache_entries",
        "delivery_cache_tags",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
