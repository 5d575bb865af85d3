/// Persistence service tests
///
/// CRUD behaviour of `PersistenceService` against the in-process store.
/// Run with: cargo test --test persistence_service_tests
use std::sync::Arc;
use std::time::Duration;
use tenant_docstore::core::document_from_json;
use tenant_docstore::entities::alerts::{self, AlertStatus};
use tenant_docstore::entities::tvs::{ClaimState, TvService};
use tenant_docstore::{
    ConnectOptions, DataSource, FindOneAndUpdateOptions, FindOptions, ModelError, PersistenceService, Record,
    RequestContext, ReturnDocument, SortDirection, StoreError, record,
};

const MISSING_ID: &str = "507f1f77bcf86cd799439011";

async fn connected() -> Arc<DataSource> {
    let source = Arc::new(DataSource::in_memory());
    source
        .connect("memdb://localhost", "service_tests", ConnectOptions::new())
        .await
        .unwrap();
    source
}

fn alert_input(target: &str, title: &str) -> Record {
    record!({"targetType": "user", "targetId": target, "title": title, "description": "Body"})
}

#[tokio::test]
async fn test_insert_then_find_by_id_round_trips() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    service.init(&ctx).await.unwrap();

    let created = service.insert_one(&ctx, alert_input("u1", "Welcome")).await.unwrap();
    assert_eq!(created.id.len(), 24);
    assert_eq!(created.status, AlertStatus::Unread);
    assert_eq!(created.created_at, created.updated_at);

    let found = service.find_one(&ctx, &record!({"id": created.id.clone()})).await.unwrap();
    assert_eq!(found, Some(created.clone()));

    let raw: PersistenceService = PersistenceService::shared(alerts::definition(), Arc::clone(service.source()));
    let record = raw.get_or_fail(&ctx, &record!({"id": created.id})).await.unwrap();
    assert!(record.contains_key("id"));
    assert!(!record.contains_key("_id"));
    assert_eq!(record["extras"], serde_json::json!({}));
}

#[tokio::test]
async fn test_malformed_id_rejected_everywhere() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    let filter = record!({"id": "not-an-id"});
    let update = record!({"$set": {"status": "read"}});
    let opts = FindOneAndUpdateOptions::new();

    let errors = vec![
        service.find_one(&ctx, &filter).await.unwrap_err(),
        service.get_or_fail(&ctx, &filter).await.unwrap_err(),
        service.find(&ctx, &filter, &FindOptions::new()).await.unwrap_err(),
        service.count(&ctx, &filter).await.unwrap_err(),
        service.find_one_and_update(&ctx, &filter, &update, &opts).await.unwrap_err(),
        service.delete_one(&ctx, &filter).await.unwrap_err(),
        service.delete_many(&ctx, &filter).await.unwrap_err(),
        service
            .insert_if_not_exists(&ctx, &filter, alert_input("u1", "x"))
            .await
            .unwrap_err(),
    ];
    for err in errors {
        assert_eq!(err, ModelError::InvalidIdentifier { value: "not-an-id".into() });
    }
}

#[tokio::test]
async fn test_absence_is_none_or_not_found() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    let filter = record!({"id": MISSING_ID});

    assert_eq!(service.find_one(&ctx, &filter).await.unwrap(), None);
    let err = service.get_or_fail(&ctx, &filter).await.unwrap_err();
    assert_eq!(err, ModelError::NotFound { filter: filter.clone() });
    assert!(err.is_client_facing());
}

#[tokio::test]
async fn test_mark_alert_read() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    service.init(&ctx).await.unwrap();
    let created = service.insert_one(&ctx, alert_input("u1", "Invite")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let updated = service
        .find_one_and_update(
            &ctx,
            &record!({"id": created.id.clone()}),
            &record!({"$set": {"status": "read"}}),
            &FindOneAndUpdateOptions::new(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.status, AlertStatus::Read);
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.title, created.title);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at > created.updated_at);
}

#[tokio::test]
async fn test_update_returns_previous_document_on_request() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    let created = service.insert_one(&ctx, alert_input("u1", "Invite")).await.unwrap();

    let before = service
        .find_one_and_update(
            &ctx,
            &record!({"id": created.id.clone()}),
            &record!({"$set": {"title": "Renamed"}}),
            &FindOneAndUpdateOptions::new().return_document(ReturnDocument::Before),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.title, "Invite");

    let stored = service.get_or_fail(&ctx, &record!({"id": created.id})).await.unwrap();
    assert_eq!(stored.title, "Renamed");
}

#[tokio::test]
async fn test_update_without_set_still_refreshes_timestamp() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    let created = service.insert_one(&ctx, alert_input("u1", "Invite")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let updated = service
        .find_one_and_update(
            &ctx,
            &record!({"id": created.id.clone()}),
            &Record::new(),
            &FindOneAndUpdateOptions::new(),
        )
        .await
        .unwrap()
        .unwrap();
    assert!(updated.updated_at > created.updated_at);
    assert_eq!(updated.status, created.status);
}

#[tokio::test]
async fn test_update_rejects_immutable_and_unknown_fields() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    let created = service.insert_one(&ctx, alert_input("u1", "Invite")).await.unwrap();
    let filter = record!({"id": created.id.clone()});
    let opts = FindOneAndUpdateOptions::new();

    let Err(ModelError::Validation(err)) = service
        .find_one_and_update(&ctx, &filter, &record!({"$set": {"id": MISSING_ID}}), &opts)
        .await
    else {
        panic!("expected validation error");
    };
    assert_eq!(err.messages_at("id"), vec!["field is immutable"]);

    let err = service
        .find_one_and_update(&ctx, &filter, &record!({"$set": {"createdAt": "2020-01-01T00:00:00Z"}}), &opts)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let err = service
        .find_one_and_update(&ctx, &filter, &record!({"$set": {"status": "archived"}}), &opts)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let stored = service.get_or_fail(&ctx, &filter).await.unwrap();
    assert_eq!(stored, created);
}

#[tokio::test]
async fn test_update_operators_respect_field_kinds() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    let created = service.insert_one(&ctx, alert_input("u1", "Invite")).await.unwrap();
    let filter = record!({"id": created.id.clone()});
    let opts = FindOneAndUpdateOptions::new();

    let Err(ModelError::Validation(err)) = service
        .find_one_and_update(&ctx, &filter, &record!({"$inc": {"landingUrl": 5}}), &opts)
        .await
    else {
        panic!("$inc on a string field must fail validation");
    };
    assert_eq!(err.messages_at("landingUrl"), vec!["Cannot apply $inc to a non-numeric field"]);

    let Err(ModelError::Validation(err)) = service
        .find_one_and_update(&ctx, &filter, &record!({"$push": {"title": "x"}}), &opts)
        .await
    else {
        panic!("$push on a string field must fail validation");
    };
    assert_eq!(err.messages_at("title"), vec!["Cannot apply $push to a non-array field"]);

    let Err(ModelError::Validation(err)) = service
        .find_one_and_update(&ctx, &filter, &record!({"$unset": {"title": ""}}), &opts)
        .await
    else {
        panic!("unsetting a required field must fail validation");
    };
    assert_eq!(err.messages_at("title"), vec!["Required field cannot be unset"]);

    assert_eq!(service.get_or_fail(&ctx, &filter).await.unwrap(), created);

    let updated = service
        .find_one_and_update(
            &ctx,
            &filter,
            &record!({"$set": {"landingUrl": "https://example.com"}}),
            &opts.clone().return_document(ReturnDocument::After),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.landing_url.as_deref(), Some("https://example.com"));
    let updated = service
        .find_one_and_update(
            &ctx,
            &filter,
            &record!({"$unset": {"landingUrl": ""}}),
            &opts.clone().return_document(ReturnDocument::After),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.landing_url, None);
}

#[tokio::test]
async fn test_malformed_filter_fails_even_when_nothing_matches() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    service.insert_one(&ctx, alert_input("u1", "Invite")).await.unwrap();

    for filter in [
        record!({"title": {"$regex": "a"}}),
        record!({"landingUrl": "zzz", "title": {"$regex": "a"}}),
        record!({"$or": [{"targetId": "u1"}, {"title": {"$regex": "a"}}]}),
    ] {
        let err = service.find_one(&ctx, &filter).await.unwrap_err();
        assert!(matches!(err, ModelError::Store(StoreError::BadQuery(_))), "{filter:?}: {err:?}");
        assert!(service.count(&ctx, &filter).await.is_err());
    }
}

#[tokio::test]
async fn test_filter_on_store_key_is_rejected() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    let created = service.insert_one(&ctx, alert_input("u1", "Invite")).await.unwrap();

    let Err(ModelError::Validation(err)) = service.find_one(&ctx, &record!({"_id": created.id.clone()})).await else {
        panic!("expected validation error");
    };
    assert!(err.has_issue_at("_id"));
    assert_eq!(service.find_one(&ctx, &record!({"id": created.id})).await.unwrap().map(|a| a.title), Some("Invite".into()));
}

#[tokio::test]
async fn test_update_without_match_returns_none() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    let updated = service
        .find_one_and_update(
            &ctx,
            &record!({"id": MISSING_ID}),
            &record!({"$set": {"status": "read"}}),
            &FindOneAndUpdateOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(updated, None);
}

#[tokio::test]
async fn test_find_passes_options_through() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    for title in ["a", "b", "c", "d", "e"] {
        service.insert_one(&ctx, alert_input("u1", title)).await.unwrap();
    }
    service.insert_one(&ctx, alert_input("u2", "z")).await.unwrap();

    let page = service
        .find(
            &ctx,
            &record!({"targetId": "u1"}),
            &FindOptions::new().sort_by("title", SortDirection::Descending).skip(1).limit(2),
        )
        .await
        .unwrap();
    let titles: Vec<&str> = page.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["d", "c"]);

    let none = service.find(&ctx, &record!({"targetId": "nobody"}), &FindOptions::new()).await.unwrap();
    assert!(none.is_empty());
    assert_eq!(service.count(&ctx, &record!({"title": {"$in": ["a", "z"]}})).await.unwrap(), 2);
}

#[tokio::test]
async fn test_insert_many_runs_hooks_and_keeps_order() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();

    let created = service
        .insert_many(&ctx, vec![alert_input("u1", "first"), alert_input("u1", "second")])
        .await
        .unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].title, "first");
    assert_eq!(created[1].title, "second");
    assert!(created.iter().all(|a| a.status == AlertStatus::Unread));
    assert_ne!(created[0].id, created[1].id);

    let err = service
        .insert_many(&ctx, vec![alert_input("u1", "third"), record!({"title": "broken"})])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert_eq!(service.count(&ctx, &Record::new()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_delete_counts() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    let first = service.insert_one(&ctx, alert_input("u1", "a")).await.unwrap();
    service.insert_one(&ctx, alert_input("u1", "b")).await.unwrap();
    service.insert_one(&ctx, alert_input("u2", "c")).await.unwrap();

    assert_eq!(service.delete_one(&ctx, &record!({"id": first.id})).await.unwrap(), 1);
    assert_eq!(service.delete_one(&ctx, &record!({"id": MISSING_ID})).await.unwrap(), 0);
    assert_eq!(service.delete_many(&ctx, &record!({"targetId": "u1"})).await.unwrap(), 1);
    assert_eq!(service.delete_many(&ctx, &Record::new()).await.unwrap(), 1);
    assert_eq!(service.count(&ctx, &Record::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_devices_start_unclaimed_and_are_unique() {
    let tvs = TvService::new(connected().await);
    let ctx = RequestContext::new();
    tvs.init(&ctx).await.unwrap();

    let tv = tvs
        .insert_one(&ctx, record!({"thingId": "thing-1", "model": "X1", "claimState": "claimed"}))
        .await
        .unwrap();
    assert_eq!(tv.claim_state, Some(ClaimState::Unclaimed));
    assert!(tv.is_fake);

    let err = tvs
        .insert_one(&ctx, record!({"thingId": "thing-1", "model": "X2"}))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ModelError::DuplicateKey {
            fields: vec!["thingId".into()],
            message: "Duplicate value received for unique field thingId.".into(),
        }
    );
}

#[tokio::test]
async fn test_insert_if_not_exists_returns_same_record() {
    let tvs = TvService::new(connected().await);
    let ctx = RequestContext::new();
    tvs.init(&ctx).await.unwrap();

    let first = tvs.login(&ctx, "thing-9", "X1").await.unwrap();
    let second = tvs.login(&ctx, "thing-9", "ignored").await.unwrap();
    assert_eq!(first, second);
    assert!(!first.is_fake);
    assert_eq!(tvs.count(&ctx, &Record::new()).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_insert_if_not_exists_converges() {
    let tvs = TvService::new(connected().await);
    let ctx = RequestContext::new();
    tvs.init(&ctx).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tvs = tvs.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { tvs.login(&ctx, "thing-race", "X1").await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(tvs.count(&ctx, &Record::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let source = connected().await;
    let service = alerts::service(source.clone());
    let ctx = RequestContext::new();
    service.init(&ctx).await.unwrap();
    service.init(&ctx).await.unwrap();

    let conn = source.database().await.unwrap().connection().await.unwrap();
    let ns = conn.namespace("public.alerts");
    let mut names: Vec<String> = conn
        .store()
        .list_indexes(&ns)
        .await
        .unwrap()
        .iter()
        .map(|spec| spec.name())
        .collect();
    names.sort();
    assert_eq!(names, vec!["_id_", "createdAt_-1", "targetId_1", "targetType_1", "updatedAt_-1"]);
}

#[tokio::test]
async fn test_store_ruleset_guards_direct_writes() {
    let source = connected().await;
    alerts::service(source.clone()).init(&RequestContext::new()).await.unwrap();

    let conn = source.database().await.unwrap().connection().await.unwrap();
    let ns = conn.namespace("public.alerts");
    let err = conn
        .store()
        .insert_one(&ns, document_from_json(record!({"title": "no target"})))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DocumentValidation(_)));
}

#[tokio::test]
async fn test_unrecognized_store_errors_propagate_unchanged() {
    let service = alerts::service(connected().await);
    let ctx = RequestContext::new();
    service.insert_one(&ctx, alert_input("u1", "a")).await.unwrap();

    let err = service
        .find_one(&ctx, &record!({"title": {"$where": "1"}}))
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Store(StoreError::BadQuery(_))));
    assert!(!err.is_client_facing());
}

#[tokio::test]
async fn test_operations_require_connection() {
    let service = alerts::service(Arc::new(DataSource::in_memory()));
    let ctx = RequestContext::new();

    assert_eq!(service.init(&ctx).await.unwrap_err(), ModelError::NotInitialized);
    assert_eq!(
        service.find_one(&ctx, &Record::new()).await.unwrap_err(),
        ModelError::NotInitialized
    );
    assert_eq!(
        service.insert_one(&ctx, alert_input("u1", "a")).await.unwrap_err(),
        ModelError::NotInitialized
    );
}
