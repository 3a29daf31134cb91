// SPDX-License-Identifier: GPL-2.0-or-later

//! Delegate callbacks invoked by a supervisor on its owner. Maps directly to
//! the source design's `onStateChanged`/`onBusEvent` pair: the delegate never
//! owns the supervisor, it only reacts to it.

use crate::runtime::BusMessage;
use async_trait::async_trait;
use common::{ChannelName, PipelineState};
use std::sync::Arc;

#[async_trait]
pub trait SupervisorHooks: Send + Sync {
    /// Invoked on every state transition, in order.
    async fn on_state_changed(&self, name: &ChannelName, state: PipelineState);

    /// Invoked for every bus message, in the order the runtime emits them.
    async fn on_bus_event(&self, _name: &ChannelName, _msg: &BusMessage) {}
}

pub struct DummyHooks;

#[async_trait]
impl SupervisorHooks for DummyHooks {
    async fn on_state_changed(&self, _name: &ChannelName, _state: PipelineState) {}
}

#[must_use]
pub fn dummy_hooks() -> Arc<dyn SupervisorHooks> {
    Arc::new(DummyHooks)
}
