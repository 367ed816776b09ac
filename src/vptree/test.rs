use crate::points::PointStore;
use crate::vptree::distance::{DistanceMetric, EuclideanDistance};
use crate::vptree::{VpTree, VpTreeBuilder, VpTreeIndex, VpTreeRef};
use crate::MetricIndexError;

fn points() -> Vec<(f64, f64)> {
    let coords: Vec<[i32; 2]> = vec![
        [54, 1],
        [97, 21],
        [65, 35],
        [33, 54],
        [95, 39],
        [54, 3],
        [53, 54],
        [84, 72],
        [33, 34],
        [43, 15],
        [52, 83],
        [81, 23],
        [1, 61],
        [38, 74],
        [11, 91],
        [24, 56],
        [90, 31],
        [25, 57],
        [46, 61],
        [29, 69],
        [49, 60],
        [4, 98],
        [71, 15],
        [60, 25],
        [38, 84],
        [52, 38],
        [94, 51],
        [13, 25],
        [77, 73],
        [88, 87],
        [6, 27],
        [58, 22],
        [53, 28],
        [27, 91],
        [96, 98],
        [93, 14],
        [22, 93],
        [45, 94],
        [18, 28],
        [35, 15],
        [19, 81],
        [20, 81],
        [67, 53],
        [43, 3],
        [47, 66],
        [48, 34],
        [46, 12],
        [32, 38],
        [43, 12],
        [39, 94],
        [88, 62],
        [66, 14],
        [84, 30],
        [72, 81],
        [41, 92],
        [26, 4],
        [6, 76],
        [47, 21],
        [57, 70],
        [71, 82],
        [50, 68],
        [96, 18],
        [40, 31],
        [78, 53],
        [71, 90],
        [32, 14],
        [55, 6],
        [32, 88],
        [62, 32],
        [21, 67],
        [73, 81],
        [44, 64],
        [29, 50],
        [70, 5],
        [6, 22],
        [68, 3],
        [11, 23],
        [20, 42],
        [21, 73],
        [63, 86],
        [9, 40],
        [99, 2],
        [99, 76],
        [56, 77],
        [83, 6],
        [21, 72],
        [78, 30],
        [75, 53],
        [41, 11],
        [95, 20],
        [30, 38],
        [96, 82],
        [65, 48],
        [33, 18],
        [87, 28],
        [10, 10],
        [40, 34],
        [10, 20],
        [47, 29],
        [46, 78],
    ];

    coords
        .into_iter()
        .map(|[x, y]| (x.into(), y.into()))
        .collect()
}

fn coords() -> Vec<f64> {
    points().into_iter().flat_map(|(x, y)| [x, y]).collect()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    EuclideanDistance.distance(a, b)
}

/// Brute-force distances from every point to the query, by item index.
fn all_distances(coords: &[f64], query: &[f64]) -> Vec<f64> {
    coords.chunks(2).map(|p| distance(p, query)).collect()
}

fn subtree_items<T: VpTreeIndex<f64>>(tree: &T, node: i32, out: &mut Vec<u32>) {
    if node == -1 {
        return;
    }
    let node = node as usize;
    out.push(tree.node_items()[node]);
    subtree_items(tree, tree.left_children()[node], out);
    subtree_items(tree, tree.right_children()[node], out);
}

fn sorted_f64(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    values
}

#[test]
fn creates_an_index() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();

    assert_eq!(tree.num_items(), 100);
    assert_eq!(tree.num_dims(), 2);
    assert_eq!(tree.root().unwrap().index(), 0);

    // Every item appears in exactly one node.
    let mut node_items = tree.node_items().to_vec();
    node_items.sort_unstable();
    assert_eq!(node_items, (0..100).collect::<Vec<u32>>());
}

#[test]
fn partition_invariant_holds() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();

    for node in 0..tree.num_items() {
        let vantage = store.point(tree.node_items()[node] as usize);
        let threshold = tree.thresholds()[node];

        let mut left_items = vec![];
        subtree_items(&tree, tree.left_children()[node], &mut left_items);
        for item in left_items {
            assert!(
                distance(store.point(item as usize), vantage) < threshold,
                "left subtree of node {} leaked past its threshold",
                node
            );
        }

        let mut right_items = vec![];
        subtree_items(&tree, tree.right_children()[node], &mut right_items);
        for item in right_items {
            assert!(
                distance(store.point(item as usize), vantage) >= threshold,
                "right subtree of node {} fell inside its threshold",
                node
            );
        }
    }
}

#[test]
fn radius_search() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();

    let query = [50.0, 50.0];
    let r = 20.0;

    let result = tree.within(&query, r, false).unwrap();

    let brute = all_distances(&coords, &query);
    let mut expected: Vec<u32> = (0..100u32)
        .filter(|&i| brute[i as usize] <= r)
        .collect();

    let mut found = result.items.clone();
    found.sort_unstable();
    expected.sort_unstable();
    assert_eq!(found, expected, "returns exactly the items within range");

    // Reported distances are the true distances.
    for (item, d) in result.iter() {
        assert_eq!(d, brute[item as usize]);
    }
}

#[test]
fn radius_search_sorted() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();

    let result = tree.within(&[50.0, 50.0], 30.0, true).unwrap();
    for pair in result.distances.windows(2) {
        assert!(pair[0] <= pair[1], "distances are ascending");
    }

    let unsorted = tree.within(&[50.0, 50.0], 30.0, false).unwrap();
    let mut membership = unsorted.items.clone();
    membership.sort_unstable();
    let mut sorted_membership = result.items.clone();
    sorted_membership.sort_unstable();
    assert_eq!(membership, sorted_membership, "sorting only reorders");
}

#[test]
fn radius_search_excludes_self() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();

    let item = 25;
    let r = 15.0;
    let result = tree.within_item(item, r, true, true).unwrap();
    assert!(!result.items.contains(&(item as u32)));

    let brute = all_distances(&coords, store.point(item));
    let mut expected: Vec<u32> = (0..100u32)
        .filter(|&i| i as usize != item && brute[i as usize] <= r)
        .collect();
    let mut found = result.items.clone();
    found.sort_unstable();
    expected.sort_unstable();
    assert_eq!(found, expected);
}

#[test]
fn radius_zero_returns_the_query_point() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();

    let result = tree.within_item(0, 0.0, false, false).unwrap();
    assert!(result.items.contains(&0));
    assert!(result.distances.iter().all(|&d| d == 0.0));
}

#[test]
fn nearest_neighbors_match_brute_force() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();

    let query = [50.0, 50.0];
    let k = 10;
    let result = tree.neighbors(&query, k).unwrap();
    assert_eq!(result.len(), k);

    for pair in result.distances.windows(2) {
        assert!(pair[0] <= pair[1], "distances are ascending");
    }

    // Compare distance multisets so equidistant items cannot flake.
    let brute = sorted_f64(all_distances(&coords, &query));
    assert_eq!(result.distances, &brute[..k]);

    // Reported distances are the true distances of the returned items.
    for (item, d) in result.iter() {
        assert_eq!(d, distance(store.point(item as usize), &query));
    }
}

#[test]
fn nearest_neighbors_exclude_self() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();

    let item = 42;
    let k = 5;
    let result = tree.neighbors_item(item, k, true).unwrap();
    assert_eq!(result.len(), k);
    assert!(!result.items.contains(&(item as u32)));

    let mut brute = all_distances(&coords, store.point(item));
    brute.remove(item);
    let brute = sorted_f64(brute);
    assert_eq!(result.distances, &brute[..k]);
}

#[test]
fn k_of_at_least_n_returns_everything() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();

    let result = tree.neighbors(&[0.0, 0.0], 250).unwrap();
    assert_eq!(result.len(), 100);
    for pair in result.distances.windows(2) {
        assert!(pair[0] <= pair[1]);
    }

    let mut membership = result.items.clone();
    membership.sort_unstable();
    assert_eq!(membership, (0..100).collect::<Vec<u32>>());
}

#[test]
fn close_neighbors() {
    let coords: Vec<f64> = vec![0., 0., 1., 0., 0., 1., 5., 5.];
    let store = PointStore::try_new(&coords, 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();

    let nearest = tree.neighbors(&[0.0, 0.0], 2).unwrap();
    assert_eq!(nearest.distances, vec![0.0, 1.0]);
    assert_eq!(nearest.items[0], 0);
    assert!(nearest.items[1] == 1 || nearest.items[1] == 2);

    let close = tree.within_item(0, 1.5, true, true).unwrap();
    let mut found = close.items.clone();
    found.sort_unstable();
    assert_eq!(found, vec![1, 2], "the far point stays out");
    assert_eq!(close.distances, vec![1.0, 1.0]);
}

#[test]
fn empty_tree_answers_empty() {
    let store = PointStore::<f64>::try_new(&[], 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();

    assert_eq!(tree.num_items(), 0);
    assert!(tree.root().is_none());
    assert!(tree.within(&[1.0, 2.0], 10.0, false).unwrap().is_empty());
    assert!(tree.neighbors(&[1.0, 2.0], 3).unwrap().is_empty());

    // The header-only buffer round-trips.
    let reloaded = VpTree::try_new(store, tree.into_inner()).unwrap();
    assert!(reloaded.neighbors(&[0.0, 0.0], 1).unwrap().is_empty());
}

#[test]
fn rejects_bad_queries() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();

    let invalid = |result: crate::error::Result<_>| {
        assert!(matches!(
            result.unwrap_err(),
            MetricIndexError::InvalidInput(_)
        ));
    };

    invalid(tree.neighbors(&[1.0, 2.0], 0));
    invalid(tree.within(&[1.0, 2.0], -1.0, false));
    invalid(tree.within(&[1.0, 2.0], f64::NAN, false));
    invalid(tree.within(&[1.0, 2.0, 3.0], 5.0, false));
    invalid(tree.neighbors(&[f64::NAN, 0.0], 1));
    invalid(tree.within_item(100, 5.0, false, false));
    invalid(tree.neighbors_item(100, 1, false));
}

#[test]
fn rejects_non_finite_coordinates() {
    assert!(matches!(
        PointStore::try_new(&[0.0, f64::NAN], 2).unwrap_err(),
        MetricIndexError::InvalidInput(_)
    ));
}

#[test]
fn round_trips_through_the_buffer() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();

    let query = [37.0, 61.0];
    let expected_within = tree.within(&query, 25.0, true).unwrap();
    let expected_nearest = tree.neighbors(&query, 8).unwrap();

    let buffer = tree.into_inner();

    let reloaded = VpTree::try_new(store, buffer.clone()).unwrap();
    assert_eq!(reloaded.within(&query, 25.0, true).unwrap(), expected_within);
    assert_eq!(reloaded.neighbors(&query, 8).unwrap(), expected_nearest);

    let view = VpTreeRef::try_new(store, &buffer).unwrap();
    assert_eq!(view.within(&query, 25.0, true).unwrap(), expected_within);
    assert_eq!(view.neighbors(&query, 8).unwrap(), expected_nearest);
}

#[test]
fn same_seed_same_buffer() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();

    let a = VpTreeBuilder::new(store).seed(7).finish().unwrap();
    let b = VpTreeBuilder::new(store).seed(7).finish().unwrap();
    assert_eq!(a.into_inner(), b.into_inner());
}

#[test]
fn different_seeds_agree_on_results() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();

    let a = VpTreeBuilder::new(store).seed(1).finish().unwrap();
    let b = VpTreeBuilder::new(store).seed(2).finish().unwrap();

    let query = [62.0, 33.0];
    assert_eq!(
        a.within(&query, 18.0, true).unwrap(),
        b.within(&query, 18.0, true).unwrap()
    );
    assert_eq!(
        a.neighbors(&query, 6).unwrap().distances,
        b.neighbors(&query, 6).unwrap().distances
    );
}

#[test]
fn rejects_corrupt_buffers() {
    let coords = coords();
    let store = PointStore::try_new(&coords, 2).unwrap();
    let tree = VpTreeBuilder::new(store).finish().unwrap();
    let buffer = tree.into_inner();

    let corrupt = |result: crate::error::Result<VpTree<f64>>| {
        assert!(matches!(
            result.unwrap_err(),
            MetricIndexError::CorruptState(_)
        ));
    };

    // Truncated.
    corrupt(VpTree::try_new(store, buffer[..buffer.len() - 4].to_vec()));

    // Wrong magic byte.
    let mut bad = buffer.clone();
    bad[0] = 0;
    corrupt(VpTree::try_new(store, bad));

    // Wrong version nibble.
    let mut bad = buffer.clone();
    bad[1] = (15 << 4) + (bad[1] & 0x0f);
    corrupt(VpTree::try_new(store, bad));

    // A node pointing at an item the store does not have. The items
    // section starts right after the thresholds.
    let mut bad = buffer.clone();
    let items_start = 8 + 100 * 8;
    bad[items_start..items_start + 4].copy_from_slice(&1000u32.to_ne_bytes());
    corrupt(VpTree::try_new(store, bad));

    // A child index past the node array. The left-children section
    // follows the items.
    let mut bad = buffer.clone();
    let lefts_start = 8 + 100 * 8 + 100 * 4;
    bad[lefts_start..lefts_start + 4].copy_from_slice(&250i32.to_ne_bytes());
    corrupt(VpTree::try_new(store, bad));

    // A store that does not match the header.
    let other_coords: Vec<f64> = vec![0., 0., 1., 1.];
    let other_store = PointStore::try_new(&other_coords, 2).unwrap();
    corrupt(VpTree::try_new(other_store, buffer));
}
