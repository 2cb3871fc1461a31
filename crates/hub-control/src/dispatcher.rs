//! Inbound message handling and outbound commands.

use std::sync::Arc;

use tracing::{debug, info, warn};

use hmip_device_state::{DeviceStateSnapshot, StateStore};
use hmip_hub_connection::{HandlerFuture, MessageHandler, Outbound};
use hmip_protocol::messages::{self, SetSwitchState, SystemResponse};
use hmip_protocol::{Message, MessageType};

use crate::error::CommandError;

/// Routes hub traffic to the state store and caller intents to the hub.
pub struct CommandDispatcher<O> {
    outbound: O,
    store: Arc<StateStore>,
    plugin_id: String,
    friendly_name: String,
    request_state_on_connect: bool,
}

impl<O: Outbound> CommandDispatcher<O> {
    pub fn new(
        outbound: O,
        store: Arc<StateStore>,
        plugin_id: impl Into<String>,
        friendly_name: impl Into<String>,
    ) -> Self {
        Self {
            outbound,
            store,
            plugin_id: plugin_id.into(),
            friendly_name: friendly_name.into(),
            request_state_on_connect: true,
        }
    }

    /// Whether to ask for the full system state each time a session comes
    /// up. Enabled by default.
    pub fn request_state_on_connect(mut self, enabled: bool) -> Self {
        self.request_state_on_connect = enabled;
        self
    }

    /// Asks the hub for its full system state. Returns the request's
    /// correlation id; the answer arrives later as a system response.
    pub fn request_system_state(&self) -> Result<String, CommandError> {
        self.ensure_connected()?;
        let msg = messages::get_system_state(&self.plugin_id)?;
        let id = msg.id.clone();
        self.outbound.send(msg)?;
        debug!(%id, "requested system state");
        Ok(id)
    }

    /// Switches one channel of a device. Returns the request's correlation
    /// id without waiting for the hub to acknowledge.
    pub fn set_switch(
        &self,
        device_id: &str,
        on: bool,
        channel_index: u32,
    ) -> Result<String, CommandError> {
        self.ensure_connected()?;
        let msg = messages::set_switch_state(
            &self.plugin_id,
            &SetSwitchState {
                on,
                channel_index,
                device_id: device_id.to_string(),
            },
        )?;
        let id = msg.id.clone();
        self.outbound.send(msg)?;
        info!(device = %device_id, on, channel = channel_index, %id, "switch command sent");
        Ok(id)
    }

    /// Latest device snapshot, if the hub has sent one.
    pub fn snapshot(&self) -> Option<Arc<DeviceStateSnapshot>> {
        self.store.current()
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.is_connected()
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    fn ensure_connected(&self) -> Result<(), CommandError> {
        if self.outbound.is_connected() {
            Ok(())
        } else {
            Err(CommandError::NotConnected)
        }
    }

    fn handle(&self, msg: Message) {
        match &msg.msg_type {
            MessageType::PluginStateRequest => self.answer_state_request(&msg),
            MessageType::SystemResponse => self.apply_system_response(&msg),
            other => debug!(msg_type = %other, id = %msg.id, "ignoring message"),
        }
    }

    fn answer_state_request(&self, request: &Message) {
        let reply = match messages::plugin_ready_reply(request, &self.plugin_id, &self.friendly_name)
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(id = %request.id, "failed to build readiness reply: {e}");
                return;
            }
        };
        match self.outbound.send(reply) {
            Ok(()) => debug!(id = %request.id, "answered plugin state request"),
            Err(e) => warn!(id = %request.id, "failed to answer plugin state request: {e}"),
        }
    }

    fn apply_system_response(&self, msg: &Message) {
        let response: SystemResponse = match msg.parse_body() {
            Ok(r) => r,
            Err(e) => {
                warn!(id = %msg.id, "malformed system response body: {e}");
                return;
            }
        };
        let code = response.code;
        match response
            .into_system_state()
            .and_then(DeviceStateSnapshot::from_system_state)
        {
            Some(snapshot) => {
                let snapshot = self.store.replace(snapshot);
                info!(devices = snapshot.device_count(), "device state updated");
                self.persist_snapshot();
            }
            None => debug!(id = %msg.id, ?code, "system response without state"),
        }
    }

    /// Mirrors the store to disk without stalling the receive loop.
    fn persist_snapshot(&self) {
        if self.store.path().is_none() {
            return;
        }
        let store = self.store.clone();
        let write = move || {
            if let Err(e) = store.persist_current() {
                warn!("failed to persist device snapshot: {e}");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }
}

impl<O: Outbound + 'static> MessageHandler for CommandDispatcher<O> {
    fn on_message(&self, msg: Message) -> HandlerFuture<'_> {
        self.handle(msg);
        Box::pin(async {})
    }

    fn on_connected(&self) -> HandlerFuture<'_> {
        if self.request_state_on_connect
            && let Err(e) = self.request_system_state()
        {
            warn!("failed to request system state after connect: {e}");
        }
        Box::pin(async {})
    }
}
