//! Integration tests for the in-memory CRUD store.

mod support;

use std::sync::Arc;

use crud_rust::{
    CancellationToken, ClaimAndRead, Create, CrudError, CrudMemory, Delete, Read, Search,
    SearchDetails, Update,
};
use serde_json::json;
use support::{init_tracing, Account, Person, Tally};
use uuid::Uuid;

#[tokio::test]
async fn create_assigns_id_and_read_returns_copy() {
    init_tracing();
    let store = CrudMemory::<Person>::default();
    let cancel = CancellationToken::new();

    let id = store.create(Person::new("Ann", 40), &cancel).await.unwrap();
    assert!(!id.is_nil());

    let mut first = store.read(&id, &cancel).await.unwrap().unwrap();
    assert_eq!(first.id, id);
    assert_eq!(first.name, "Ann");
    assert!(first.created_at.is_some());
    assert!(!first.etag.is_empty());

    // Changing the copy does not reach the store.
    first.name = "Changed".into();
    let second = store.read(&id, &cancel).await.unwrap().unwrap();
    assert_eq!(second.name, "Ann");
}

#[tokio::test]
async fn read_of_missing_id_is_none() {
    let store = CrudMemory::<Tally>::default();
    let cancel = CancellationToken::new();
    assert_eq!(store.read(&99, &cancel).await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_with_same_id_conflict() {
    let store = Arc::new(CrudMemory::<Tally>::default());
    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let store = store.clone();
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                store
                    .create_with_specified_id(&7, Tally::new("seven", n), &cancel)
                    .await
            })
        })
        .collect();

    let mut created = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => created += 1,
            Err(CrudError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(store.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unique_constraint_holds_under_concurrent_creates() {
    let store = Arc::new(
        CrudMemory::<Tally>::default().with_unique_constraint("label", |item, others| {
            others.iter().all(|other| other.label != item.label)
        }),
    );
    let tasks: Vec<_> = (0..16)
        .map(|n| {
            let store = store.clone();
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                store.create(Tally::new("shared", n), &cancel).await
            })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(CrudError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_with_one_token_let_one_win() {
    let store = Arc::new(CrudMemory::<Person>::default());
    let cancel = CancellationToken::new();
    let id = store.create(Person::new("Ann", 40), &cancel).await.unwrap();
    let read = store.read(&id, &cancel).await.unwrap().unwrap();

    let tasks: Vec<_> = [41, 42]
        .into_iter()
        .map(|age| {
            let store = store.clone();
            let mut edit = read.clone();
            edit.age = age;
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                store.update_and_return(&id, edit, &cancel).await
            })
        })
        .collect();

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(person) => winners.push(person),
            Err(CrudError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 1);
    assert_eq!(store.read(&id, &cancel).await.unwrap().unwrap(), winners[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unique_constraint_holds_under_concurrent_updates() {
    let store = Arc::new(
        CrudMemory::<Tally>::default().with_unique_constraint("label", |item, others| {
            others.iter().all(|other| other.label != item.label)
        }),
    );
    let cancel = CancellationToken::new();
    let a = store.create(Tally::new("a", 1), &cancel).await.unwrap();
    let b = store.create(Tally::new("b", 2), &cancel).await.unwrap();

    let tasks: Vec<_> = [(a, 1), (b, 2)]
        .into_iter()
        .map(|(id, count)| {
            let store = store.clone();
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                store.update(&id, Tally::new("shared", count), &cancel).await
            })
        })
        .collect();

    let mut updated = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => updated += 1,
            Err(CrudError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
    assert_eq!(updated, 1);
    let shared = store
        .search(&SearchDetails::all().where_eq("Label", "shared"), 0, 10, &cancel)
        .await
        .unwrap();
    assert_eq!(shared.total(), 1);
}

#[tokio::test]
async fn stale_etag_is_rejected_and_item_unchanged() {
    let store = CrudMemory::<Person>::default();
    let cancel = CancellationToken::new();
    let id = store.create(Person::new("Ann", 40), &cancel).await.unwrap();
    let stored = store.read(&id, &cancel).await.unwrap().unwrap();

    let mut stale = stored.clone();
    stale.etag = "not-the-current-token".into();
    stale.age = 41;
    let err = store.update(&id, stale, &cancel).await.unwrap_err();
    assert!(matches!(err, CrudError::Conflict(_)));

    assert_eq!(store.read(&id, &cancel).await.unwrap().unwrap(), stored);
}

#[tokio::test]
async fn every_update_issues_a_new_token() {
    let store = CrudMemory::<Person>::default();
    let cancel = CancellationToken::new();
    let created = store
        .create_and_return(Person::new("Ann", 40), &cancel)
        .await
        .unwrap();

    let mut change = created.clone();
    change.age = 41;
    let updated = store
        .update_and_return(&created.id, change, &cancel)
        .await
        .unwrap();
    assert_ne!(updated.etag, created.etag);
    assert_eq!(updated.age, 41);

    // The token the first update used is now stale.
    let mut replay = created.clone();
    replay.age = 42;
    let err = store.update(&created.id, replay, &cancel).await.unwrap_err();
    assert!(matches!(err, CrudError::Conflict(_)));
}

#[tokio::test]
async fn etag_match_ignores_case() {
    let store = CrudMemory::<Person>::default();
    let cancel = CancellationToken::new();
    let created = store
        .create_and_return(Person::new("Ann", 40), &cancel)
        .await
        .unwrap();

    let mut change = created.clone();
    change.etag = created.etag.to_uppercase();
    store.update(&created.id, change, &cancel).await.unwrap();
}

#[tokio::test]
async fn row_version_tokens_round_trip_as_text() {
    let store = CrudMemory::<Account>::default();
    let cancel = CancellationToken::new();
    let created = store
        .create_and_return(Account::new("ann", 10), &cancel)
        .await
        .unwrap();
    assert_eq!(created.id, 1);
    assert_ne!(created.row_version, "AAAAAAAAAAA=");

    let mut change = created.clone();
    change.balance = 20;
    let updated = store
        .update_and_return(&created.id, change, &cancel)
        .await
        .unwrap();
    assert_ne!(updated.row_version, created.row_version);

    let mut stale = created.clone();
    stale.balance = 30;
    assert!(matches!(
        store.update(&created.id, stale, &cancel).await,
        Err(CrudError::Conflict(_))
    ));
}

#[tokio::test]
async fn update_of_missing_item_is_not_found() {
    let store = CrudMemory::<Tally>::default();
    let cancel = CancellationToken::new();
    let err = store.update(&3, Tally::new("x", 1), &cancel).await.unwrap_err();
    assert!(matches!(err, CrudError::NotFound(_)));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let store = CrudMemory::<Tally>::default();
    let cancel = CancellationToken::new();
    store.delete(&12345, &cancel).await.unwrap();

    let id = store.create(Tally::new("a", 1), &cancel).await.unwrap();
    store.delete(&id, &cancel).await.unwrap();
    store.delete(&id, &cancel).await.unwrap();
    assert_eq!(store.read(&id, &cancel).await.unwrap(), None);
}

#[tokio::test]
async fn delete_all_empties_store() {
    let store = CrudMemory::<Tally>::default();
    let cancel = CancellationToken::new();
    for n in 0..5 {
        store.create(Tally::new("t", n), &cancel).await.unwrap();
    }
    store.delete_all(&cancel).await.unwrap();
    assert!(store.is_empty());
}

#[tokio::test]
async fn default_ids_are_contract_errors() {
    let store = CrudMemory::<Person>::default();
    let cancel = CancellationToken::new();
    let err = store
        .create_with_specified_id(&Uuid::nil(), Person::new("Ann", 1), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CrudError::Contract(_)));
    assert!(matches!(
        store.read(&Uuid::nil(), &cancel).await,
        Err(CrudError::Contract(_))
    ));
}

#[tokio::test]
async fn read_all_with_paging_reports_total() {
    let store = CrudMemory::<Tally>::default();
    let cancel = CancellationToken::new();
    for n in 0..7 {
        store.create(Tally::new("t", n), &cancel).await.unwrap();
    }

    let page = store.read_all_with_paging(5, 5, &cancel).await.unwrap();
    assert_eq!(page.page_info.total, 7);
    assert_eq!(page.page_info.returned, 2);
    assert_eq!(page.data.iter().map(|t| t.id).collect::<Vec<_>>(), vec![6, 7]);

    let beyond = store.read_all_with_paging(100, 5, &cancel).await.unwrap();
    assert_eq!(beyond.page_info.returned, 0);
    assert!(beyond.data.is_empty());

    assert!(matches!(
        store.read_all_with_paging(0, 0, &cancel).await,
        Err(CrudError::Contract(_))
    ));
}

#[tokio::test]
async fn read_all_spans_pages() {
    let store = CrudMemory::<Tally>::new(
        crud_rust::StoreOptions::default().with_default_page_limit(std::num::NonZeroUsize::new(3).unwrap()),
    );
    let cancel = CancellationToken::new();
    for n in 0..10 {
        store.create(Tally::new("t", n), &cancel).await.unwrap();
    }
    assert_eq!(store.read_all(100, &cancel).await.unwrap().len(), 10);
    assert_eq!(store.read_all(4, &cancel).await.unwrap().len(), 4);
}

#[tokio::test]
async fn search_filters_orders_and_pages() {
    let store = CrudMemory::<Person>::default();
    let cancel = CancellationToken::new();
    for (name, age) in [("Ann", 40), ("Bob", 25), ("Ann", 31), ("Cid", 52)] {
        store.create(Person::new(name, age), &cancel).await.unwrap();
    }

    let details = SearchDetails::all().where_eq("Name", "Ann").order("Age", true);
    let page = store.search(&details, 0, 10, &cancel).await.unwrap();
    assert_eq!(page.page_info.total, 2);
    assert_eq!(page.data.iter().map(|p| p.age).collect::<Vec<_>>(), vec![31, 40]);

    let oldest = store
        .search_first(&SearchDetails::all().order("Age", false), &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(oldest.name, "Cid");

    let bob = store
        .find_unique(&SearchDetails::matching(&json!({"Name": "Bob"})).unwrap(), &cancel)
        .await
        .unwrap();
    assert_eq!(bob.age, 25);

    assert!(matches!(
        store.find_unique(&SearchDetails::all().where_eq("Name", "Ann"), &cancel).await,
        Err(CrudError::Contract(_))
    ));
    assert!(matches!(
        store.find_unique(&SearchDetails::all().where_eq("Name", "Zed"), &cancel).await,
        Err(CrudError::NotFound(_))
    ));
}

#[tokio::test]
async fn search_all_collects_every_match() {
    let store = CrudMemory::<Tally>::default();
    let cancel = CancellationToken::new();
    for n in 0..9 {
        let label = if n % 3 == 0 { "fizz" } else { "plain" };
        store.create(Tally::new(label, n), &cancel).await.unwrap();
    }
    let fizz = store
        .search_all(&SearchDetails::all().where_eq("Label", "fizz"), 2, 100, &cancel)
        .await
        .unwrap();
    assert_eq!(fizz.len(), 3);
}

#[tokio::test]
async fn search_on_unknown_field_is_contract_error() {
    let store = CrudMemory::<Tally>::default();
    let cancel = CancellationToken::new();
    store.create(Tally::new("a", 1), &cancel).await.unwrap();
    let err = store
        .search(&SearchDetails::all().where_eq("Colour", "red"), 0, 10, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CrudError::Contract(_)));
}

#[tokio::test]
async fn transaction_lock_and_read_returns_item() {
    let store = CrudMemory::<Tally>::default();
    let cancel = CancellationToken::new();
    let id = store.create(Tally::new("a", 1), &cancel).await.unwrap();
    let item = store
        .claim_transaction_lock_and_read(&id, &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.label, "a");
}

#[tokio::test]
async fn cancelled_operations_have_no_effect() {
    let store = CrudMemory::<Tally>::default();
    let cancel = CancellationToken::new();
    let id = store.create(Tally::new("a", 1), &cancel).await.unwrap();

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert_eq!(
        store.update(&id, Tally::new("b", 2), &cancelled).await,
        Err(CrudError::Cancelled)
    );
    assert_eq!(
        store.search(&SearchDetails::all(), 0, 10, &cancelled).await.map(|_| ()),
        Err(CrudError::Cancelled)
    );
    assert_eq!(store.delete(&id, &cancelled).await, Err(CrudError::Cancelled));
    assert_eq!(store.read(&id, &cancel).await.unwrap().unwrap().label, "a");
}

#[tokio::test]
async fn missing_values_sort_last_ascending() {
    let store = CrudMemory::<Person>::default();
    let cancel = CancellationToken::new();
    for (name, nickname) in [("Ann", None), ("Bob", Some("Bobby")), ("Cid", Some("Al"))] {
        let mut person = Person::new(name, 30);
        person.nickname = nickname.map(str::to_string);
        store.create(person, &cancel).await.unwrap();
    }

    let names = |page: crud_rust::PageEnvelope<Person>| {
        page.data.into_iter().map(|p| p.name).collect::<Vec<_>>()
    };
    let ascending = store
        .search(&SearchDetails::all().order("Nickname", true), 0, 10, &cancel)
        .await
        .unwrap();
    assert_eq!(names(ascending), vec!["Cid", "Bob", "Ann"]);

    let descending = store
        .search(&SearchDetails::all().order("Nickname", false), 0, 10, &cancel)
        .await
        .unwrap();
    assert_eq!(names(descending), vec!["Ann", "Bob", "Cid"]);
}
