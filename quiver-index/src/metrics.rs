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

//! Prometheus metrics for the graph index.

use lazy_static::lazy_static;
use prometheus::{Counter, Histogram, register_counter, register_histogram};

lazy_static! {
    pub static ref INSERT_COUNT: Counter = register_counter!(
        "quiver_insert_total",
        "Total number of graph node insertions"
    )
    .unwrap();

    pub static ref SEARCH_COUNT: Counter = register_counter!(
        "quiver_search_total",
        "Total number of searches performed"
    )
    .unwrap();

    pub static ref CAS_RETRY_TOTAL: Counter = register_counter!(
        "quiver_neighbor_cas_retries_total",
        "Neighbor-list publications retried after losing a compare-and-swap race"
    )
    .unwrap();

    pub static ref INSERT_LATENCY: Histogram = register_histogram!(
        "quiver_insert_duration_seconds",
        "Node insertion latency in seconds",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    )
    .unwrap();

    pub static ref SEARCH_LATENCY: Histogram = register_histogram!(
        "quiver_search_duration_seconds",
        "Search latency in seconds",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    )
    .unwrap();
}
