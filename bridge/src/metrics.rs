// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, IntCounter, IntCounterVec, IntGauge, Registry,
};

/// Agent-wide metrics, registered once and shared by every long-lived
/// component.
#[derive(Clone, Debug)]
pub struct BridgeMetrics {
    pub(crate) last_published_block: IntGauge,
    pub(crate) blocks_published: IntCounter,
    pub(crate) publisher_errors: IntCounter,

    pub(crate) blocks_processed: IntCounter,
    pub(crate) workflows_created: IntCounter,

    pub(crate) transitions: IntCounterVec,
    pub(crate) transition_errors: IntCounterVec,
    pub(crate) workflows_terminal: IntCounterVec,

    pub(crate) requests_received: IntCounterVec,
    pub(crate) requests_ok: IntCounterVec,
    pub(crate) err_requests: IntCounterVec,
}

impl BridgeMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            last_published_block: register_int_gauge_with_registry!(
                "bridge_last_published_block",
                "Last finalized source block handed to the processor",
                registry,
            )
            .unwrap(),
            blocks_published: register_int_counter_with_registry!(
                "bridge_blocks_published_total",
                "Finalized source blocks published",
                registry,
            )
            .unwrap(),
            publisher_errors: register_int_counter_with_registry!(
                "bridge_publisher_errors_total",
                "Transient block publisher failures",
                registry,
            )
            .unwrap(),
            blocks_processed: register_int_counter_with_registry!(
                "bridge_blocks_processed_total",
                "Blocks scanned for deposits",
                registry,
            )
            .unwrap(),
            workflows_created: register_int_counter_with_registry!(
                "bridge_workflows_created_total",
                "Deposit workflows seeded by the block processor",
                registry,
            )
            .unwrap(),
            transitions: register_int_counter_vec_with_registry!(
                "bridge_workflow_transitions_total",
                "Workflow transition outcomes",
                &["result"],
                registry,
            )
            .unwrap(),
            transition_errors: register_int_counter_vec_with_registry!(
                "bridge_workflow_transition_errors_total",
                "Workflow transition errors by kind",
                &["error_type"],
                registry,
            )
            .unwrap(),
            workflows_terminal: register_int_counter_vec_with_registry!(
                "bridge_workflows_terminal_total",
                "Workflows reaching a terminal state",
                &["outcome"],
                registry,
            )
            .unwrap(),
            requests_received: register_int_counter_vec_with_registry!(
                "bridge_requests_received_total",
                "API requests received",
                &["route"],
                registry,
            )
            .unwrap(),
            requests_ok: register_int_counter_vec_with_registry!(
                "bridge_requests_ok_total",
                "API requests served successfully",
                &["route"],
                registry,
            )
            .unwrap(),
            err_requests: register_int_counter_vec_with_registry!(
                "bridge_requests_err_total",
                "API requests that failed",
                &["route"],
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Arc<Self> {
        Arc::new(Self::new(&Registry::new()))
    }
}
