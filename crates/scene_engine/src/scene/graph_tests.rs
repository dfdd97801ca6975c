//! Scene graph integration tests
//!
//! Exercises the structural contract end to end: counter invariants
//! against a traversal oracle, world bounds against a naive matrix
//! product, lazy-update idempotence, attribute scoping, and the error
//! taxonomy for illegal edits.

use crate::foundation::math::{Mat4, Vec3};
use crate::scene::{
    Aabb, BoundingVolume, LightSource, NodeAttribute, NodeFlags, NodeKey, SceneError, SceneGraph,
    Visit,
};
use approx::assert_relative_eq;

fn unit_box() -> BoundingVolume {
    BoundingVolume::Aabb(Aabb::from_center_extents(
        Vec3::zeros(),
        Vec3::new(1.0, 1.0, 1.0),
    ))
}

/// Independent full-traversal count of (descendants, leaf descendants)
fn count_oracle(graph: &SceneGraph, root: NodeKey) -> (usize, usize) {
    let mut nodes = 0;
    let mut leaves = 0;
    graph.traverse(root, |key, node| {
        if key != root {
            nodes += 1;
            if !node.is_group() {
                leaves += 1;
            }
        }
        Visit::Continue
    });
    (nodes, leaves)
}

fn assert_counts_consistent(graph: &SceneGraph, root: NodeKey) {
    let mut groups = Vec::new();
    graph.traverse(root, |key, node| {
        if node.is_group() {
            groups.push(key);
        }
        Visit::Continue
    });
    for group in groups {
        let (nodes, leaves) = count_oracle(graph, group);
        assert_eq!(graph.descendant_count(group), nodes, "descendant count drift");
        assert_eq!(graph.leaf_count(group), leaves, "leaf count drift");
    }
}

#[test]
fn test_counts_match_traversal_oracle_under_edits() {
    let mut graph = SceneGraph::new();
    let root = graph.add_root(Some("root"));
    let g1 = graph.add_group(Some("g1"));
    let g2 = graph.add_transform_group(Some("g2"));

    graph.add_child(root, g1, 0).unwrap();
    assert_counts_consistent(&graph, root);

    graph.add_child(root, g2, 1).unwrap();
    assert_counts_consistent(&graph, root);

    let mut leaves = Vec::new();
    for i in 0..5 {
        let leaf = graph.add_leaf(Some(&format!("leaf{i}")));
        leaves.push(leaf);
    }
    graph.add_child(g1, leaves[0], 0).unwrap();
    graph.add_child(g1, leaves[1], 1).unwrap();
    graph.add_child(g2, leaves[2], 0).unwrap();
    assert_counts_consistent(&graph, root);

    // Attach a pre-built subtree in one step.
    let sub = graph.add_group(Some("sub"));
    graph.add_child(sub, leaves[3], 0).unwrap();
    graph.add_child(sub, leaves[4], 1).unwrap();
    graph.add_child(g2, sub, 1).unwrap();
    assert_counts_consistent(&graph, root);

    // Remove a leaf, then a whole subtree.
    graph.remove_child(g1, 0).unwrap();
    assert_counts_consistent(&graph, root);

    let detached = graph.remove_child(g2, 1).unwrap();
    assert_eq!(detached, sub);
    assert_counts_consistent(&graph, root);
    // The detached subtree stays internally consistent too.
    assert_counts_consistent(&graph, sub);

    // Reattach elsewhere.
    graph.add_child(g1, sub, 0).unwrap();
    assert_counts_consistent(&graph, root);
}

#[test]
fn test_insertion_order_is_preserved() {
    let mut graph = SceneGraph::new();
    let root = graph.add_root(None);
    let a = graph.add_leaf(Some("a"));
    let b = graph.add_leaf(Some("b"));
    let c = graph.add_leaf(Some("c"));

    graph.add_child(root, a, 0).unwrap();
    graph.add_child(root, c, 1).unwrap();
    // Insert in the middle: c shifts right.
    graph.add_child(root, b, 1).unwrap();

    let children: Vec<NodeKey> = graph.node(root).unwrap().children().to_vec();
    assert_eq!(children, vec![a, b, c]);

    graph.remove_child(root, 1).unwrap();
    let children: Vec<NodeKey> = graph.node(root).unwrap().children().to_vec();
    assert_eq!(children, vec![a, c]);
}

#[test]
fn test_world_bounds_matches_matrix_oracle() {
    let mut graph = SceneGraph::new();
    let root = graph.add_root(None);
    let t1 = graph.add_transform_group(Some("t1"));
    let t2 = graph.add_transform_group(Some("t2"));
    let leaf = graph.add_leaf(Some("leaf"));

    graph.set_local_bounds(leaf, unit_box()).unwrap();
    graph.add_child(root, t1, 0).unwrap();
    graph.add_child(t1, t2, 0).unwrap();
    graph.add_child(t2, leaf, 0).unwrap();

    let m1 = Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0));
    let m2 = Mat4::new_rotation(Vec3::y() * std::f32::consts::FRAC_PI_2)
        * Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 1.0, 1.0));
    graph.set_local_transform(t1, m1).unwrap();
    graph.set_local_transform(t2, m2).unwrap();

    graph.update_bounds(root, false);

    // Oracle: transform the local volume by the naive matrix product.
    let expected = unit_box().transformed(&(m1 * m2));
    let actual = graph.world_bounds(leaf);
    let (expected, actual) = (expected.as_aabb().unwrap(), actual.as_aabb().unwrap());
    assert_relative_eq!(actual.min, expected.min, epsilon = 1e-4);
    assert_relative_eq!(actual.max, expected.max, epsilon = 1e-4);

    // And the composed world transform matches the product directly.
    let world = graph.world_transform(t2);
    assert_relative_eq!(world, m1 * m2, epsilon = 1e-5);
}

#[test]
fn test_update_bounds_only_dirty_is_idempotent() {
    let mut graph = SceneGraph::new();
    let root = graph.add_root(None);
    let group = graph.add_transform_group(None);
    let leaf = graph.add_leaf(None);

    graph.set_local_bounds(leaf, unit_box()).unwrap();
    graph.add_child(group, leaf, 0).unwrap();
    graph.add_child(root, group, 0).unwrap();

    graph.update_bounds(root, true);
    let first = graph.world_bounds(leaf);
    let after_first = graph.stats().bounds_recomputed;

    // No intervening mutation: the second pass must do zero work and
    // produce bit-identical bounds.
    graph.update_bounds(root, true);
    let second = graph.world_bounds(leaf);
    assert_eq!(graph.stats().bounds_recomputed, after_first);
    assert_eq!(first, second);

    // A mutation re-dirties exactly the affected path.
    graph
        .set_local_transform(group, Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)))
        .unwrap();
    graph.update_bounds(root, true);
    assert!(graph.stats().bounds_recomputed > after_first);
}

#[test]
fn test_double_attach_fails_in_both_orders() {
    let mut graph = SceneGraph::new();
    let g1 = graph.add_group(Some("g1"));
    let g2 = graph.add_group(Some("g2"));

    let leaf = graph.add_leaf(None);
    graph.add_child(g1, leaf, 0).unwrap();
    assert_eq!(graph.add_child(g2, leaf, 0), Err(SceneError::AlreadyParented));

    let leaf2 = graph.add_leaf(None);
    graph.add_child(g2, leaf2, 0).unwrap();
    assert_eq!(graph.add_child(g1, leaf2, 0), Err(SceneError::AlreadyParented));

    // Failed attach must not have linked anything.
    assert_eq!(graph.node(leaf).unwrap().parent(), Some(g1));
    assert_eq!(graph.descendant_count(g2), 1);
}

#[test]
fn test_structural_invariant_errors() {
    let mut graph = SceneGraph::new();
    let root = graph.add_root(None);
    let group = graph.add_group(None);
    let leaf = graph.add_leaf(None);
    graph.add_child(root, group, 0).unwrap();

    // Self-attachment.
    assert_eq!(graph.add_child(group, group, 0), Err(SceneError::SelfAttachment));

    // Roots may not be nested.
    let other_root = graph.add_root(None);
    assert_eq!(graph.add_child(group, other_root, 0), Err(SceneError::RootNested));

    // Out-of-range insertion index.
    assert_eq!(
        graph.add_child(group, leaf, 3),
        Err(SceneError::ChildIndexOutOfRange { index: 3, len: 0 })
    );

    // Out-of-range removal.
    graph.add_child(group, leaf, 0).unwrap();
    assert_eq!(
        graph.remove_child(group, 5),
        Err(SceneError::ChildIndexOutOfRange { index: 5, len: 1 })
    );

    // Leaves cannot take children.
    let orphan = graph.add_leaf(None);
    assert_eq!(graph.add_child(leaf, orphan, 0), Err(SceneError::NotAGroup));

    // Attaching an ancestor under its own descendant would close a cycle.
    assert_eq!(graph.add_child(group, root, 0), Err(SceneError::RootNested));
    let mid = graph.add_group(None);
    graph.add_child(group, mid, 1).unwrap();
    assert_eq!(graph.add_child(mid, group, 0), Err(SceneError::AlreadyParented));
}

#[test]
fn test_change_tracking_composite_aggregation() {
    let mut graph = SceneGraph::new();
    let group = graph.add_transform_group(None);
    graph.clear_changed(group);
    assert!(!graph.is_changed(group));

    // Dirtying an owned attribute (the transform) makes the composite
    // report changed without touching the node's own flag.
    graph
        .edit_transform(group, |t| t.translate(Vec3::new(1.0, 0.0, 0.0)))
        .unwrap();
    assert!(graph.is_changed(group));

    // Committing clears the composite and the owned attribute.
    graph.clear_changed(group);
    assert!(!graph.is_changed(group));
    assert!(!graph
        .local_transform(group)
        .unwrap()
        .change_flag()
        .is_changed());
}

#[test]
fn test_change_ids_are_monotonic_epochs() {
    let mut graph = SceneGraph::new();
    let a = graph.add_leaf(None);
    let b = graph.add_leaf(None);

    graph.mark_changed(a);
    let id_a = graph.verify_change(a, 0).expect("first observation differs");

    // Same epoch while still dirty: nothing new to re-derive.
    assert_eq!(graph.verify_change(a, id_a), None);

    // A clean node keeps its last id.
    graph.clear_changed(a);
    assert_eq!(graph.verify_change(a, id_a), None);

    // The next clean-to-dirty transition issues a strictly larger id.
    graph.mark_changed(b);
    let id_b = graph.verify_change(b, 0).expect("b observed dirty");
    assert!(id_b > id_a);

    graph.mark_changed(a);
    let id_a2 = graph.verify_change(a, id_a).expect("a dirtied again");
    assert!(id_a2 > id_b);
}

#[test]
fn test_light_scope_merges_and_unmerges() {
    let mut graph = SceneGraph::new();
    let root = graph.add_root(None);
    let group = graph.add_group(Some("lit"));
    let a = graph.add_leaf(Some("a"));
    let b = graph.add_leaf(Some("b"));
    graph.add_child(root, group, 0).unwrap();
    graph.add_child(group, a, 0).unwrap();
    graph.add_child(group, b, 1).unwrap();

    let light = graph.add_leaf(Some("key-light"));
    graph
        .set_attribute(
            light,
            Some(NodeAttribute::Light(LightSource {
                color: Vec3::new(1.0, 1.0, 1.0),
                intensity: 2.0,
            })),
        )
        .unwrap();

    // Attaching the carrier illuminates the whole subtree of its group.
    graph.add_child(group, light, 2).unwrap();
    for key in [group, a, b] {
        assert!(
            graph.node(key).unwrap().inherited().lights.contains(&light),
            "light should cover the scope"
        );
    }
    // Nodes outside the scope are not lit.
    assert!(!graph.node(root).unwrap().inherited().lights.contains(&light));

    // A node attached later joins the existing scope.
    let late = graph.add_leaf(Some("late"));
    graph.add_child(group, late, 0).unwrap();
    assert!(graph.node(late).unwrap().inherited().lights.contains(&light));

    // Detaching the carrier unmerges it everywhere.
    let idx = graph
        .node(group)
        .unwrap()
        .children()
        .iter()
        .position(|&k| k == light)
        .unwrap();
    graph.remove_child(group, idx).unwrap();
    for key in [group, a, b, late] {
        assert!(!graph.node(key).unwrap().inherited().lights.contains(&light));
    }
}

#[test]
fn test_detached_subtree_keeps_interior_scope() {
    let mut graph = SceneGraph::new();
    let root = graph.add_root(None);
    let group = graph.add_group(None);
    let inner = graph.add_leaf(None);
    let inner_light = graph.add_leaf(None);
    graph
        .set_attribute(
            inner_light,
            Some(NodeAttribute::Light(LightSource {
                color: Vec3::new(1.0, 0.0, 0.0),
                intensity: 1.0,
            })),
        )
        .unwrap();

    let outer_light = graph.add_leaf(None);
    graph
        .set_attribute(
            outer_light,
            Some(NodeAttribute::Light(LightSource {
                color: Vec3::new(0.0, 1.0, 0.0),
                intensity: 1.0,
            })),
        )
        .unwrap();

    graph.add_child(group, inner, 0).unwrap();
    graph.add_child(group, inner_light, 1).unwrap();
    graph.add_child(root, group, 0).unwrap();
    graph.add_child(root, outer_light, 1).unwrap();

    let inherited = graph.node(inner).unwrap().inherited();
    assert!(inherited.lights.contains(&inner_light));
    assert!(inherited.lights.contains(&outer_light));

    // Detach the group: the interior light stays, the outer one leaves.
    graph.remove_child(root, 0).unwrap();
    let inherited = graph.node(inner).unwrap().inherited();
    assert!(inherited.lights.contains(&inner_light));
    assert!(!inherited.lights.contains(&outer_light));
}

#[test]
fn test_ignore_bounds_excludes_from_aggregation() {
    let mut graph = SceneGraph::new();
    let root = graph.add_root(None);
    let near = graph.add_leaf(None);
    let far = graph.add_leaf(None);

    graph.set_local_bounds(near, unit_box()).unwrap();
    graph
        .set_local_bounds(
            far,
            BoundingVolume::Aabb(Aabb::from_center_extents(
                Vec3::new(100.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 1.0),
            )),
        )
        .unwrap();
    graph.add_child(root, near, 0).unwrap();
    graph.add_child(root, far, 1).unwrap();

    graph.set_flag(far, NodeFlags::IGNORE_BOUNDS, true).unwrap();
    let bounds = graph.world_bounds(root).as_aabb().unwrap();
    assert!(bounds.max.x <= 1.0 + 1e-6, "ignored node leaked into bounds");

    // Re-including the node grows the aggregate again.
    graph.set_flag(far, NodeFlags::IGNORE_BOUNDS, false).unwrap();
    let bounds = graph.world_bounds(root).as_aabb().unwrap();
    assert!(bounds.max.x >= 100.0);
}

#[test]
fn test_empty_group_collapses_to_empty_bounds() {
    let mut graph = SceneGraph::new();
    let root = graph.add_root(None);
    let group = graph.add_group(None);
    graph.add_child(root, group, 0).unwrap();

    graph.update_bounds(root, false);
    assert!(graph.world_bounds(group).is_empty());
    assert!(graph.world_bounds(root).is_empty());
}

#[test]
fn test_traversal_veto_and_abort() {
    let mut graph = SceneGraph::new();
    let root = graph.add_root(Some("root"));
    let g1 = graph.add_group(Some("g1"));
    let g2 = graph.add_group(Some("g2"));
    let l1 = graph.add_leaf(Some("l1"));
    let l2 = graph.add_leaf(Some("l2"));
    let l3 = graph.add_leaf(Some("l3"));
    graph.add_child(g1, l1, 0).unwrap();
    graph.add_child(g1, l2, 1).unwrap();
    graph.add_child(g2, l3, 0).unwrap();
    graph.add_child(root, g1, 0).unwrap();
    graph.add_child(root, g2, 1).unwrap();

    // Veto descent into g1: its leaves are skipped, g2's are not.
    let mut visited = Vec::new();
    graph.traverse(root, |key, _| {
        visited.push(key);
        if key == g1 {
            Visit::SkipSubtree
        } else {
            Visit::Continue
        }
    });
    assert_eq!(visited, vec![root, g1, g2, l3]);

    // Abort stops the whole walk immediately.
    let mut visited = Vec::new();
    graph.traverse(root, |key, _| {
        visited.push(key);
        if key == g1 {
            Visit::Stop
        } else {
            Visit::Continue
        }
    });
    assert_eq!(visited, vec![root, g1]);

    assert_eq!(graph.find_by_name(root, "l3"), Some(l3));
    assert_eq!(graph.find_by_name(root, "absent"), None);
}

#[test]
fn test_liveness_follows_root_reachability() {
    let mut graph = SceneGraph::new();
    let root = graph.add_root(None);
    let group = graph.add_group(None);
    let leaf = graph.add_leaf(None);
    graph.add_child(group, leaf, 0).unwrap();

    assert!(!graph.is_live(leaf));
    graph.add_child(root, group, 0).unwrap();
    assert!(graph.is_live(leaf));
    graph.remove_child(root, 0).unwrap();
    assert!(!graph.is_live(leaf));
}

#[test]
fn test_replace_child_swaps_in_place() {
    let mut graph = SceneGraph::new();
    let root = graph.add_root(None);
    let a = graph.add_leaf(Some("a"));
    let b = graph.add_leaf(Some("b"));
    let c = graph.add_leaf(Some("c"));
    graph.add_child(root, a, 0).unwrap();
    graph.add_child(root, b, 1).unwrap();

    let old = graph.replace_child(root, 0, c).unwrap();
    assert_eq!(old, a);
    let children: Vec<NodeKey> = graph.node(root).unwrap().children().to_vec();
    assert_eq!(children, vec![c, b]);
    assert_eq!(graph.node(a).unwrap().parent(), None);

    // Replacement validates the incoming child before detaching anything.
    assert_eq!(graph.replace_child(root, 0, b), Err(SceneError::AlreadyParented));
    assert_eq!(graph.node(root).unwrap().children().len(), 2);
}

#[test]
fn test_ignore_bounds_scope_applies_to_new_nodes() {
    let mut graph = SceneGraph::new();
    let root = graph.add_root(None);

    let ghost = {
        let mut scope = graph.ignore_bounds_scope();
        scope.add_leaf(Some("ghost"))
    };
    let solid = graph.add_leaf(Some("solid"));

    assert!(graph.node(ghost).unwrap().flags().contains(NodeFlags::IGNORE_BOUNDS));
    assert!(!graph.node(solid).unwrap().flags().contains(NodeFlags::IGNORE_BOUNDS));

    graph.set_local_bounds(ghost, unit_box()).unwrap();
    graph.set_local_bounds(solid, unit_box()).unwrap();
    graph.add_child(root, ghost, 0).unwrap();
    graph.add_child(root, solid, 1).unwrap();

    // Only the solid leaf contributes to the aggregate.
    let bounds = graph.world_bounds(root).as_aabb().unwrap();
    assert_relative_eq!(bounds.min, Vec3::new(-1.0, -1.0, -1.0), epsilon = 1e-6);
    assert_relative_eq!(bounds.max, Vec3::new(1.0, 1.0, 1.0), epsilon = 1e-6);
}
