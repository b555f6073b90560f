// SPDX-License-Identifier: AGPL-3.0-or-later
// QuiverDB - Concurrent Vector Search Engine
// Copyright (C) 2026 QuiverDB contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Graph construction test suite.
//!
//! Covers the neighbor-diversity behavior with hand-checked geometric
//! fixtures, order-insensitive graph assembly, initialization from an
//! existing graph, and the incremental RAM accounting.

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use quiver_core::{QuiverError, SliceVectorSource, VectorSource};
use quiver_index::{ConcurrentGraph, GraphBuilder, IndexConfig};
use quiver_core::Similarity;

fn unit_vector_2d(pi_radians: f64) -> Vec<f32> {
    vec![
        (std::f64::consts::PI * pi_radians).cos() as f32,
        (std::f64::consts::PI * pi_radians).sin() as f32,
    ]
}

fn config(m: usize, beam_width: usize, similarity: Similarity) -> IndexConfig {
    IndexConfig {
        max_connections: m,
        beam_width,
        similarity,
        seed: 1337,
    }
}

/// Insert ordinals one at a time on the calling thread.
fn insert_sequential(builder: &GraphBuilder<SliceVectorSource>, count: u32) {
    let mut cursor = builder.source().cursor();
    for node in 0..count {
        builder
            .add_graph_node(node, &mut cursor)
            .expect("insert should succeed");
    }
}

fn assert_level0_neighbors(graph: &ConcurrentGraph, node: u32, expected: &[u32]) {
    let mut actual: Vec<u32> = graph
        .neighbors(0, node)
        .unwrap_or_else(|| panic!("node {node} missing at level 0"))
        .snapshot()
        .nodes()
        .collect();
    actual.sort();
    let mut expected = expected.to_vec();
    expected.sort();
    assert_eq!(
        actual, expected,
        "level-0 neighbors of node {node} differ"
    );
}

// =============================================================================
// Diversity: 2d unit circle
// =============================================================================
//
// Hand-checked case: every node tries to attach every other node, and the
// relative-neighborhood rule decides who sticks. The intermediate states
// after each insertion are part of the contract.

#[test]
fn test_diversity_2d_circle() {
    let values: Vec<Vec<f32>> = [0.5, 0.75, 0.2, 0.9, 0.8, 0.77, 0.6]
        .iter()
        .map(|&a| unit_vector_2d(a))
        .collect();
    let source = SliceVectorSource::from_f32(values).unwrap();
    let builder =
        GraphBuilder::new(source.clone(), config(2, 10, Similarity::DotProduct)).unwrap();
    let graph = builder.graph();
    let mut cursor = source.cursor();

    for node in 0..3 {
        builder.add_graph_node(node, &mut cursor).unwrap();
    }
    // Everybody tried to attach everybody; the diversity check thinned it.
    assert_level0_neighbors(&graph, 0, &[1, 2]);
    assert_level0_neighbors(&graph, 1, &[0]);
    assert_level0_neighbors(&graph, 2, &[0]);

    builder.add_graph_node(3, &mut cursor).unwrap();
    assert_level0_neighbors(&graph, 0, &[1, 2]);
    assert_level0_neighbors(&graph, 1, &[0, 3]);
    assert_level0_neighbors(&graph, 2, &[0]);
    assert_level0_neighbors(&graph, 3, &[1]);

    builder.add_graph_node(4, &mut cursor).unwrap();
    assert_level0_neighbors(&graph, 0, &[1, 2]);
    assert_level0_neighbors(&graph, 1, &[0, 3, 4]);
    assert_level0_neighbors(&graph, 2, &[0]);
    assert_level0_neighbors(&graph, 3, &[1, 4]);
    assert_level0_neighbors(&graph, 4, &[1, 3]);

    builder.add_graph_node(5, &mut cursor).unwrap();
    assert_level0_neighbors(&graph, 0, &[1, 2]);
    assert_level0_neighbors(&graph, 1, &[0, 3, 4, 5]);
    assert_level0_neighbors(&graph, 2, &[0]);
    // 5 is closer to 3 than 4 is, but 3 is not a neighbor of 5, so nothing
    // about 3's list changes.
    assert_level0_neighbors(&graph, 3, &[1, 4]);
    assert_level0_neighbors(&graph, 4, &[1, 3, 5]);
    assert_level0_neighbors(&graph, 5, &[1, 4]);

    graph.validate().unwrap();
}

// =============================================================================
// Diversity fallback: drop the farthest when everyone stays diverse
// =============================================================================

#[test]
fn test_diversity_fallback() {
    // A new neighbor displaces an existing one by being closer to the
    // target while all existing members remain diverse: the farthest one
    // is simply dropped.
    let values = vec![
        vec![0.0, 0.0, 0.0],
        vec![0.0, 10.0, 0.0],
        vec![0.0, 0.0, 20.0],
        vec![10.0, 0.0, 0.0],
        vec![0.0, 4.0, 0.0],
    ];
    let source = SliceVectorSource::from_f32(values).unwrap();
    let builder =
        GraphBuilder::new(source.clone(), config(1, 10, Similarity::Euclidean)).unwrap();
    let graph = builder.graph();
    let mut cursor = source.cursor();

    for node in 0..3 {
        builder.add_graph_node(node, &mut cursor).unwrap();
    }
    assert_level0_neighbors(&graph, 0, &[1, 2]);
    // 2 is closer to 0 than to 1, and 1 closer to 0 than to 2: mutual
    // exclusion on the spoke nodes.
    assert_level0_neighbors(&graph, 1, &[0]);
    assert_level0_neighbors(&graph, 2, &[0]);

    builder.add_graph_node(3, &mut cursor).unwrap();
    // 2 has been displaced by 3.
    assert_level0_neighbors(&graph, 0, &[1, 3]);
    assert_level0_neighbors(&graph, 1, &[0]);
    assert_level0_neighbors(&graph, 2, &[0]);
    assert_level0_neighbors(&graph, 3, &[0]);
}

// =============================================================================
// Diversity revisit: a member *becomes* non-diverse when a better one lands
// =============================================================================

#[test]
fn test_diversity_3d_displacement() {
    let values = vec![
        vec![0.0, 0.0, 0.0],
        vec![0.0, 10.0, 0.0],
        vec![0.0, 0.0, 20.0],
        vec![0.0, 9.0, 0.0],
    ];
    let source = SliceVectorSource::from_f32(values).unwrap();
    let builder =
        GraphBuilder::new(source.clone(), config(1, 10, Similarity::Euclidean)).unwrap();
    let graph = builder.graph();
    let mut cursor = source.cursor();

    for node in 0..3 {
        builder.add_graph_node(node, &mut cursor).unwrap();
    }
    assert_level0_neighbors(&graph, 0, &[1, 2]);
    assert_level0_neighbors(&graph, 1, &[0]);
    assert_level0_neighbors(&graph, 2, &[0]);

    builder.add_graph_node(3, &mut cursor).unwrap();
    // 3 sits between 0 and 1: on 0's list it makes 1 non-diverse.
    assert_level0_neighbors(&graph, 0, &[2, 3]);
    assert_level0_neighbors(&graph, 1, &[0, 3]);
    assert_level0_neighbors(&graph, 2, &[0]);
    assert_level0_neighbors(&graph, 3, &[0, 1]);
}

// =============================================================================
// Order-insensitive graph assembly
// =============================================================================
//
// Four population orders (bottom-up, bottom-up reversed, top-down reversed,
// top-down shuffled) must produce the same structure.

fn sorted_nodes_on_level(graph: &ConcurrentGraph, level: usize) -> Vec<u32> {
    let mut nodes: Vec<u32> = graph.nodes_on_level(level).collect();
    nodes.sort();
    nodes
}

fn assert_graph_structure_equal(expected: &ConcurrentGraph, actual: &ConcurrentGraph) {
    assert_eq!(expected.num_levels(), actual.num_levels(), "level counts differ");
    assert_eq!(expected.size(), actual.size(), "sizes differ");
    for level in 0..expected.num_levels() {
        assert_eq!(
            sorted_nodes_on_level(expected, level),
            sorted_nodes_on_level(actual, level),
            "nodes differ on level {level}"
        );
    }
    // Neighbor arcs via the seek/next cursor on one side and the snapshot
    // API on the other, so both read paths are exercised.
    for level in 0..expected.num_levels() {
        for node in expected.nodes_on_level(level) {
            let mut expected_view = expected.view();
            expected_view.seek(level, node).unwrap();
            let mut lhs = vec![];
            while let Some(n) = expected_view.next_neighbor() {
                lhs.push(n);
            }
            lhs.sort();
            let mut rhs: Vec<u32> = actual
                .view()
                .neighbor_snapshot(level, node)
                .unwrap()
                .nodes()
                .collect();
            rhs.sort();
            assert_eq!(lhs, rhs, "arcs differ for node {node} on level {level}");
        }
    }
}

#[test]
fn test_out_of_order_graph_assembly() {
    let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
    let max_levels: usize = rng.gen_range(2..10);
    let node_count: u32 = rng.gen_range(1..100);

    let mut nodes_per_level: Vec<Vec<u32>> = vec![Vec::new(); max_levels];
    let mut num_levels = 0;
    for node in 0..node_count {
        let node_max_level = rng.gen_range(1..=max_levels);
        num_levels = num_levels.max(node_max_level);
        for level in 0..node_max_level {
            nodes_per_level[level].push(node);
        }
    }

    let bottom_up = ConcurrentGraph::new(10);
    for level in 0..num_levels {
        for &node in &nodes_per_level[level] {
            bottom_up.add_node(level, node);
        }
    }

    let bottom_up_reversed = ConcurrentGraph::new(10);
    for level in 0..num_levels {
        for &node in nodes_per_level[level].iter().rev() {
            bottom_up_reversed.add_node(level, node);
        }
    }

    let top_down_reversed = ConcurrentGraph::new(10);
    for level in (0..num_levels).rev() {
        for &node in nodes_per_level[level].iter().rev() {
            top_down_reversed.add_node(level, node);
        }
    }

    let top_down_shuffled = ConcurrentGraph::new(10);
    for level in (0..num_levels).rev() {
        let mut shuffled = nodes_per_level[level].clone();
        for i in (1..shuffled.len()).rev() {
            shuffled.swap(i, rng.gen_range(0..=i));
        }
        for &node in &shuffled {
            top_down_shuffled.add_node(level, node);
        }
    }

    assert_eq!(node_count as usize, bottom_up.nodes_on_level(0).len());
    for &node in &nodes_per_level[0] {
        assert_eq!(0, bottom_up.neighbors(0, node).unwrap().len());
    }
    for level in 0..num_levels {
        assert_eq!(nodes_per_level[level], sorted_nodes_on_level(&bottom_up, level));
    }

    assert_graph_structure_equal(&bottom_up, &bottom_up_reversed);
    assert_graph_structure_equal(&bottom_up, &top_down_reversed);
    assert_graph_structure_equal(&bottom_up, &top_down_shuffled);
}

// =============================================================================
// Invalid construction parameters
// =============================================================================

#[test]
fn test_builder_rejects_invalid_parameters() {
    let source = SliceVectorSource::from_f32(vec![vec![1.0]]).unwrap();

    let result = GraphBuilder::new(source.clone(), config(0, 10, Similarity::Euclidean));
    assert!(matches!(result, Err(QuiverError::InvalidArgument(_))));

    let result = GraphBuilder::new(source, config(10, 0, Similarity::Euclidean));
    assert!(matches!(result, Err(QuiverError::InvalidArgument(_))));
}

// =============================================================================
// Incremental RAM accounting
// =============================================================================

#[test]
fn test_ram_usage_incremental_estimate() {
    let mut rng = SmallRng::seed_from_u64(7);
    let size = 400;
    let dim = 32;
    let rows: Vec<Vec<f32>> = (0..size)
        .map(|_| (0..dim).map(|_| rng.r#gen::<f32>() - 0.5).collect())
        .collect();
    let source = SliceVectorSource::from_f32(rows).unwrap();
    let builder =
        GraphBuilder::new(source.clone(), config(8, 30, Similarity::Euclidean)).unwrap();
    let graph = builder.graph();

    let mut incremental = graph.ram_bytes_used();
    let mut cursor = source.cursor();
    for node in 0..size {
        incremental += builder.add_graph_node(node, &mut cursor).unwrap();
    }
    let actual = graph.ram_bytes_used();
    // The running total lags the graph only by the per-level map headers.
    assert!(incremental <= actual);
    let slack = actual - incremental;
    assert!(
        slack < graph.num_levels() * 128,
        "incremental estimate drifted by {slack} bytes"
    );
}

// =============================================================================
// Initialization from an existing graph
// =============================================================================

fn random_rows(rng: &mut SmallRng, size: usize, dim: usize) -> Vec<Vec<f32>> {
    (0..size)
        .map(|_| {
            let mut row: Vec<f32> = (0..dim)
                .map(|_| {
                    let v: f32 = rng.r#gen();
                    if rng.r#gen::<bool>() { v } else { -v }
                })
                .collect();
            quiver_core::l2_normalize(&mut row);
            row
        })
        .collect()
}

fn offset_ord_map(initializer_size: u32, offset: u32) -> BTreeMap<u32, u32> {
    (0..initializer_size).map(|i| (i, i + offset)).collect()
}

fn init_from_graph_case(offset: u32) {
    let mut rng = SmallRng::seed_from_u64(0xBEEF + offset as u64);
    let initializer_size = 40u32;
    let total_size = 120u32;
    let dim = 16;

    let initializer_rows = random_rows(&mut rng, initializer_size as usize, dim);
    let mut final_rows = random_rows(&mut rng, total_size as usize, dim);
    for (i, row) in initializer_rows.iter().enumerate() {
        final_rows[offset as usize + i] = row.clone();
    }

    let cfg = config(10, 30, Similarity::DotProduct);
    let init_source = SliceVectorSource::from_f32(initializer_rows).unwrap();
    let init_builder = GraphBuilder::new(init_source, cfg.clone()).unwrap();
    insert_sequential(&init_builder, initializer_size);
    let init_graph = init_builder.graph();

    let ord_map = offset_ord_map(initializer_size, offset);
    let final_source = SliceVectorSource::from_f32(final_rows).unwrap();
    let final_builder =
        GraphBuilder::from_initializer(final_source, cfg, &init_graph, &ord_map).unwrap();
    let final_graph = final_builder.graph();

    // Before any insertion the new graph is the initializer, remapped.
    assert_eq!(init_graph.num_levels(), final_graph.num_levels());
    for level in 0..init_graph.num_levels() {
        let mapped: Vec<u32> = {
            let mut v: Vec<u32> = init_graph
                .nodes_on_level(level)
                .map(|n| ord_map[&n])
                .collect();
            v.sort();
            v
        };
        assert_eq!(mapped, sorted_nodes_on_level(&final_graph, level));
    }
    for level in 0..init_graph.num_levels() {
        for old in init_graph.nodes_on_level(level) {
            let mut expected: Vec<u32> = init_graph
                .neighbors(level, old)
                .unwrap()
                .snapshot()
                .nodes()
                .map(|n| ord_map[&n])
                .collect();
            expected.sort();
            let mut actual: Vec<u32> = final_graph
                .neighbors(level, ord_map[&old])
                .unwrap()
                .snapshot()
                .nodes()
                .collect();
            actual.sort();
            assert_eq!(expected, actual, "arcs differ for initializer node {old}");
        }
    }

    // After the build, every initializer node is still present per level.
    final_builder.build(1).unwrap();
    assert_eq!(final_graph.size(), total_size as usize);
    for level in 0..init_graph.num_levels() {
        let on_level: Vec<u32> = sorted_nodes_on_level(&final_graph, level);
        for old in init_graph.nodes_on_level(level) {
            assert!(
                on_level.binary_search(&ord_map[&old]).is_ok(),
                "initializer node {old} missing from level {level} after build"
            );
        }
    }
    final_graph.validate().unwrap();
}

#[test]
fn test_init_from_graph_with_offset_zero() {
    init_from_graph_case(0);
}

#[test]
fn test_init_from_graph_with_nonzero_offset() {
    init_from_graph_case(17);
}

#[test]
fn test_init_from_graph_rejects_non_monotone_map() {
    let rows = random_rows(&mut SmallRng::seed_from_u64(3), 8, 4);
    let source = SliceVectorSource::from_f32(rows).unwrap();
    let cfg = config(4, 10, Similarity::DotProduct);
    let init_builder = GraphBuilder::new(source.clone(), cfg.clone()).unwrap();
    insert_sequential(&init_builder, 4);

    let mut ord_map = BTreeMap::new();
    ord_map.insert(0u32, 5u32);
    ord_map.insert(1u32, 4u32);
    ord_map.insert(2u32, 6u32);
    ord_map.insert(3u32, 7u32);
    let result =
        GraphBuilder::from_initializer(source, cfg, &init_builder.graph(), &ord_map);
    assert!(matches!(result, Err(QuiverError::InvalidArgument(_))));
}
