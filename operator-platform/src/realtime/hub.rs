//! ConnectionHub - live observer fan-out
//!
//! Observers are grouped by tenant. Each user has at most one current
//! connection: connecting again closes the previous one. Broadcasts work on
//! a snapshot of the tenant's set, so connects and disconnects never race
//! with an in-flight pass; connections whose send fails are pruned once the
//! pass is over.

use camwatch_common::{AlertPayload, CameraStatusUpdate, DetectionEvent, Envelope};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::transport::{ChannelTransport, ObserverTransport};
use crate::error::Result;

pub type ConnectionId = Uuid;

struct Connection {
    id: ConnectionId,
    tenant_id: String,
    user_id: String,
    transport: Arc<dyn ObserverTransport>,
}

/// A registered observer connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Connection>,
}

impl ConnectionHandle {
    fn new(transport: Arc<dyn ObserverTransport>, tenant_id: &str, user_id: &str) -> Self {
        Self {
            inner: Arc::new(Connection {
                id: Uuid::new_v4(),
                tenant_id: tenant_id.to_string(),
                user_id: user_id.to_string(),
                transport,
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn tenant_id(&self) -> &str {
        &self.inner.tenant_id
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    /// Serialize and send straight to this connection, bypassing the hub.
    pub fn send(&self, envelope: &Envelope) -> Result<()> {
        let text = envelope.to_text()?;
        self.send_text(&text)
    }

    fn send_text(&self, text: &str) -> Result<()> {
        self.inner.transport.send_text(text)
    }

    fn close(&self) {
        self.inner.transport.close();
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("tenant_id", &self.inner.tenant_id)
            .field("user_id", &self.inner.user_id)
            .finish()
    }
}

pub struct ConnectionHub {
    tenants: DashMap<String, Vec<ConnectionHandle>>,
    users: DashMap<String, ConnectionHandle>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self {
            tenants: DashMap::new(),
            users: DashMap::new(),
        }
    }

    /// Register a connection for `user_id` under `tenant_id`. A connection
    /// the user already had is closed and dropped from its tenant set.
    pub fn connect(
        &self,
        transport: Arc<dyn ObserverTransport>,
        tenant_id: &str,
        user_id: &str,
    ) -> ConnectionHandle {
        let handle = ConnectionHandle::new(transport, tenant_id, user_id);

        // Join the tenant set before taking over the user slot, so whichever
        // connect supersedes this one always finds it there to remove.
        self.tenants
            .entry(tenant_id.to_string())
            .or_default()
            .push(handle.clone());

        if let Some(previous) = self.users.insert(user_id.to_string(), handle.clone()) {
            self.remove_from_tenant(previous.tenant_id(), &[previous.id()]);
            previous.close();
            tracing::info!(
                user_id,
                connection_id = %previous.id(),
                "Closed superseded observer connection"
            );
        }

        tracing::info!(tenant_id, user_id, connection_id = %handle.id(), "Observer connected");
        handle
    }

    /// Connect over a [`ChannelTransport`]. The receiver feeds the task that
    /// writes to the observer's socket.
    pub fn connect_channel(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<String>) {
        let (transport, rx) = ChannelTransport::new();
        (self.connect(Arc::new(transport), tenant_id, user_id), rx)
    }

    /// Forget a connection. Safe to call more than once, or for a connection
    /// that was already pruned or superseded.
    pub fn disconnect(&self, handle: &ConnectionHandle) {
        let removed = self.remove_from_tenant(handle.tenant_id(), &[handle.id()]) > 0;
        // A newer connection for the same user stays registered.
        let unmapped = self
            .users
            .remove_if(handle.user_id(), |_, current| current.id() == handle.id())
            .is_some();

        if removed || unmapped {
            tracing::info!(
                tenant_id = handle.tenant_id(),
                user_id = handle.user_id(),
                connection_id = %handle.id(),
                "Observer disconnected"
            );
        }
    }

    /// Best-effort direct delivery. Returns whether the message went out.
    /// A failed send is logged; the registration stays.
    pub fn send_to_user(&self, envelope: &Envelope, user_id: &str) -> bool {
        let Some(handle) = self.users.get(user_id).map(|h| h.value().clone()) else {
            tracing::debug!(user_id, "No live connection for user");
            return false;
        };

        match handle.send(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    user_id,
                    connection_id = %handle.id(),
                    message_type = envelope.message_type(),
                    error = %e,
                    "Failed to send message to user"
                );
                false
            }
        }
    }

    /// Send to every connection of the tenant. Returns how many sends
    /// succeeded; failed connections are removed afterwards.
    pub fn broadcast_to_tenant(&self, envelope: &Envelope, tenant_id: &str) -> usize {
        let json = match envelope.to_text() {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return 0;
            }
        };

        let snapshot: Vec<ConnectionHandle> = match self.tenants.get(tenant_id) {
            Some(set) => set.value().clone(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for conn in &snapshot {
            match conn.send_text(&json) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(connection_id = %conn.id(), error = %e, "Failed to send message");
                    failed.push(conn.clone());
                }
            }
        }

        if !failed.is_empty() {
            let ids: Vec<ConnectionId> = failed.iter().map(|c| c.id()).collect();
            self.remove_from_tenant(tenant_id, &ids);
            for conn in &failed {
                self.users
                    .remove_if(conn.user_id(), |_, current| current.id() == conn.id());
            }
            tracing::info!(tenant_id, pruned = failed.len(), "Pruned dead observer connections");
        }

        tracing::debug!(
            tenant_id,
            message_type = envelope.message_type(),
            delivered,
            "Broadcast message to tenant"
        );
        delivered
    }

    pub fn broadcast_event(&self, event: &DetectionEvent) -> usize {
        self.broadcast_to_tenant(&Envelope::Event(event.clone()), &event.tenant_id)
    }

    pub fn broadcast_alert(&self, alert: AlertPayload, tenant_id: &str) -> usize {
        self.broadcast_to_tenant(&Envelope::Alert(alert), tenant_id)
    }

    pub fn broadcast_camera_status(&self, update: CameraStatusUpdate, tenant_id: &str) -> usize {
        self.broadcast_to_tenant(&Envelope::CameraStatus(update), tenant_id)
    }

    /// Live connections for the tenant, zero if unknown.
    pub fn connection_count(&self, tenant_id: &str) -> usize {
        self.tenants.get(tenant_id).map(|set| set.len()).unwrap_or(0)
    }

    pub fn total_connections(&self) -> usize {
        self.tenants.iter().map(|set| set.len()).sum()
    }

    /// Tenants with at least one live connection, sorted.
    pub fn tenant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tenants.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn is_connected(&self, handle: &ConnectionHandle) -> bool {
        self.tenants
            .get(handle.tenant_id())
            .is_some_and(|set| set.iter().any(|c| c.id() == handle.id()))
    }

    /// Close every transport and forget every connection.
    pub fn close_all(&self) {
        let tenants: Vec<String> = self.tenants.iter().map(|entry| entry.key().clone()).collect();
        let mut closed = 0;
        for tenant_id in tenants {
            if let Some((_, set)) = self.tenants.remove(&tenant_id) {
                for conn in set {
                    conn.close();
                    closed += 1;
                }
            }
        }
        self.users.clear();
        tracing::info!(closed, "Closed all observer connections");
    }

    /// Remove the given ids from a tenant's set, pruning the set if it ends
    /// up empty. Returns how many were removed.
    fn remove_from_tenant(&self, tenant_id: &str, ids: &[ConnectionId]) -> usize {
        let removed = match self.tenants.get_mut(tenant_id) {
            Some(mut set) => {
                let before = set.len();
                set.retain(|c| !ids.contains(&c.id()));
                before - set.len()
            }
            None => 0,
        };
        self.tenants.remove_if(tenant_id, |_, set| set.is_empty());
        removed
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tenant_set_is_pruned() {
        let hub = ConnectionHub::new();
        let (handle, _rx) = hub.connect_channel("tenant-a", "alice");
        assert_eq!(hub.tenant_ids(), vec!["tenant-a".to_string()]);

        hub.disconnect(&handle);
        assert!(hub.tenant_ids().is_empty());
        assert_eq!(hub.connection_count("tenant-a"), 0);
        assert!(!hub.is_connected(&handle));
    }

    #[test]
    fn test_unknown_tenant_broadcast_is_noop() {
        let hub = ConnectionHub::new();
        assert_eq!(hub.broadcast_to_tenant(&Envelope::pong(), "nobody"), 0);
        assert!(!hub.send_to_user(&Envelope::pong(), "nobody"));
    }
}
