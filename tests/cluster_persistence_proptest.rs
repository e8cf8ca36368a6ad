//! Property-based round-trip checks for the Clustered Store's on-disk
//! layout: whatever a property inserts and saves must come back unchanged
//! after a fresh `load()`.

use proptest::prelude::*;
use shardvec::cluster::ClusteredStore;
use shardvec::config::ClusterOptions;

fn vector_strategy(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(proptest::num::f32::NORMAL, dim)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_save_then_load_roundtrips_every_vector(
        vectors in proptest::collection::vec(vector_strategy(4), 1..40)
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = ClusteredStore::with_path(dir.path(), ClusterOptions::default(), false);

        let mut ids = Vec::new();
        for v in &vectors {
            let id = store.add_vector(None, v.clone(), None).expect("add_vector");
            ids.push(id);
        }
        store.save().expect("save");

        let mut reloaded = ClusteredStore::with_path(dir.path(), ClusterOptions::default(), false);
        reloaded.load().expect("load");

        prop_assert_eq!(reloaded.len(), vectors.len());
        for (id, original) in ids.iter().zip(vectors.iter()) {
            let recovered = reloaded.get_vector(id).expect("vector present after reload");
            prop_assert_eq!(recovered, original.as_slice());
        }
    }

    #[test]
    fn prop_deleted_vectors_never_reappear_after_reload(
        vectors in proptest::collection::vec(vector_strategy(3), 2..30)
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = ClusteredStore::with_path(dir.path(), ClusterOptions::default(), false);

        let ids: Vec<_> = vectors
            .iter()
            .map(|v| store.add_vector(None, v.clone(), None).expect("add_vector"))
            .collect();

        // Delete every other vector before the first save.
        let mut deleted = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            if i % 2 == 0 {
                store.delete_vector(id).expect("delete_vector");
                deleted.push(id.clone());
            }
        }
        store.save().expect("save");

        let mut reloaded = ClusteredStore::with_path(dir.path(), ClusterOptions::default(), false);
        reloaded.load().expect("load");

        for id in &deleted {
            prop_assert!(reloaded.get_vector(id).is_none());
        }
        prop_assert_eq!(reloaded.len(), vectors.len() - deleted.len());
    }
}
