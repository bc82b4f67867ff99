//! Paging completeness: walking all pages yields every item exactly once.

mod support;

use std::collections::HashSet;

use crud_rust::search::PageReader;
use crud_rust::{CancellationToken, Create, CrudMemory, Read, Search, SearchDetails};
use proptest::prelude::*;
use support::Tally;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime")
}

async fn filled_store(labels: &[u8]) -> CrudMemory<Tally> {
    let store = CrudMemory::<Tally>::default();
    let cancel = CancellationToken::new();
    for (n, label) in labels.iter().enumerate() {
        store
            .create(Tally::new(&format!("l{}", label), n as i64), &cancel)
            .await
            .unwrap();
    }
    store
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn all_pages_cover_collection_once(
        labels in prop::collection::vec(0u8..4, 0..40),
        page_limit in 1usize..9,
    ) {
        let (items, total) = runtime().block_on(async {
            let store = filled_store(&labels).await;
            let cancel = CancellationToken::new();
            let mut reader = PageReader::new(
                |offset, limit| store.read_all_with_paging(offset, limit, &cancel),
                page_limit,
            );
            let mut items = Vec::new();
            let mut total = 0;
            while let Some(page) = reader.next_page().await.unwrap() {
                assert!(page.page_info.returned <= page_limit);
                total = page.page_info.total;
                items.extend(page.data);
            }
            (items, total)
        });

        prop_assert_eq!(items.len(), labels.len());
        if !labels.is_empty() {
            prop_assert_eq!(total, labels.len());
        }
        let ids: HashSet<i64> = items.iter().map(|t| t.id).collect();
        prop_assert_eq!(ids.len(), items.len());
    }

    #[test]
    fn filtered_pages_cover_matches_once(
        labels in prop::collection::vec(0u8..4, 0..40),
        wanted in 0u8..4,
        page_limit in 1usize..9,
    ) {
        let expected = labels.iter().filter(|label| **label == wanted).count();
        let found = runtime().block_on(async {
            let store = filled_store(&labels).await;
            let cancel = CancellationToken::new();
            let details = SearchDetails::all()
                .where_eq("Label", format!("l{}", wanted))
                .order("Count", false);
            store.search_all(&details, page_limit, usize::MAX, &cancel).await.unwrap()
        });

        prop_assert_eq!(found.len(), expected);
        let ids: HashSet<i64> = found.iter().map(|t| t.id).collect();
        prop_assert_eq!(ids.len(), expected);
        prop_assert!(found.windows(2).all(|w| w[0].count > w[1].count));
    }
}
