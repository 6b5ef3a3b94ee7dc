//! The shared snapshot and the set of connected peers.
//!
//! [`Hub`] is plain synchronous state: it never touches a socket. Each peer
//! is represented by the sending half of its outbound queue; the peer's
//! socket task drains the queue. Callers wrap the hub in a mutex (see
//! [`AppState`](crate::state::AppState)) so that applying a mutation and
//! fanning it out is one atomic step.

use std::collections::BTreeMap;

use lagekarte_store::{StoreChange, merge};
use lagekarte_types::{ProtocolError, SyncMessage, SyncState};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifier for one connected peer socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Create a new random peer identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PeerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A frame queued for one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A JSON text frame.
    Text(String),
    /// Close the connection.
    Close,
}

/// Sending half of a peer's outbound queue.
pub type PeerSender = mpsc::UnboundedSender<Outbound>;

/// Shared snapshot plus the broadcast set.
#[derive(Debug, Default)]
pub struct Hub {
    state: SyncState,
    peers: BTreeMap<PeerId, PeerSender>,
    closed: bool,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot.
    pub const fn state(&self) -> &SyncState {
        &self.state
    }

    /// Number of peers in the broadcast set.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Whether [`Hub::close_all`] ran and no [`Hub::reopen`] followed.
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Admit a peer: push the full snapshot to it alone, then add it to the
    /// broadcast set.
    ///
    /// A closed hub turns the peer away with [`Outbound::Close`].
    pub fn join(&mut self, peer: PeerId, sender: PeerSender) {
        if self.closed {
            debug!(%peer, "Refusing peer while the hub is closed");
            let _ = sender.send(Outbound::Close);
            return;
        }
        match encode(&SyncMessage::sync_data(self.state.clone())) {
            Some(frame) => {
                if sender.send(Outbound::Text(frame)).is_err() {
                    debug!(%peer, "Peer went away before joining");
                    return;
                }
            }
            None => return,
        }
        self.peers.insert(peer, sender);
        debug!(%peer, peers = self.peers.len(), "Peer joined");
    }

    /// Remove a peer from the broadcast set. No other side effects.
    pub fn leave(&mut self, peer: PeerId) {
        if self.peers.remove(&peer).is_some() {
            debug!(%peer, peers = self.peers.len(), "Peer left");
        }
    }

    /// Handle one inbound text frame from `from`.
    ///
    /// Mutations are applied to the snapshot and rebroadcast to every peer
    /// except the sender; the applied message is returned so the host can
    /// mirror it locally. The frame is forwarded as received unless the
    /// merge assigned an id, in which case the update is re-encoded with it.
    /// A `sync_request` is answered with the snapshot to the sender only.
    /// Malformed or unexpected frames are logged and dropped.
    pub fn handle_text(&mut self, from: PeerId, text: &str) -> Option<SyncMessage> {
        let message = match SyncMessage::decode(text) {
            Ok(message) => message,
            Err(ProtocolError::UnknownType(kind)) => {
                warn!(peer = %from, kind, "Dropping message of unknown type");
                return None;
            }
            Err(e) => {
                warn!(peer = %from, error = %e, "Dropping malformed message");
                return None;
            }
        };
        self.dispatch(from, message, Some(text))
    }

    /// Handle one decoded message from `from`. See [`Hub::handle_text`].
    pub fn handle_message(&mut self, from: PeerId, message: SyncMessage) -> Option<SyncMessage> {
        self.dispatch(from, message, None)
    }

    fn dispatch(
        &mut self,
        from: PeerId,
        message: SyncMessage,
        raw: Option<&str>,
    ) -> Option<SyncMessage> {
        match message {
            SyncMessage::SyncRequest { .. } => {
                let reply = SyncMessage::sync_data(self.state.clone());
                self.send_to(from, &reply);
                None
            }
            SyncMessage::SyncData { .. } => {
                warn!(peer = %from, "Ignoring sync_data sent by a peer");
                None
            }
            message => {
                let change = merge::apply_message(&mut self.state, message.clone());
                let (outbound, assigned) = with_assigned_ids(message, change);
                match raw {
                    Some(frame) if !assigned => self.broadcast_frame(frame, Some(from)),
                    _ => self.broadcast(&outbound, Some(from)),
                }
                Some(outbound)
            }
        }
    }

    /// Replace the snapshot wholesale and push it to every peer.
    pub fn replace_state(&mut self, state: SyncState) {
        merge::replace_all(&mut self.state, state);
        let message = SyncMessage::sync_data(self.state.clone());
        self.broadcast(&message, None);
    }

    /// Ask every peer to close, empty the broadcast set, and turn away
    /// later joins until [`Hub::reopen`].
    pub fn close_all(&mut self) {
        self.closed = true;
        for (peer, sender) in std::mem::take(&mut self.peers) {
            if sender.send(Outbound::Close).is_err() {
                debug!(%peer, "Peer already gone while closing");
            }
        }
    }

    /// Admit peers again after [`Hub::close_all`].
    pub fn reopen(&mut self) {
        self.closed = false;
    }

    fn send_to(&mut self, peer: PeerId, message: &SyncMessage) {
        let Some(frame) = encode(message) else {
            return;
        };
        let delivered = self
            .peers
            .get(&peer)
            .is_some_and(|sender| sender.send(Outbound::Text(frame)).is_ok());
        if !delivered {
            self.leave(peer);
        }
    }

    /// Send `message` to every peer except `exclude`, dropping peers whose
    /// queue is closed.
    fn broadcast(&mut self, message: &SyncMessage, exclude: Option<PeerId>) {
        if let Some(frame) = encode(message) {
            self.broadcast_frame(&frame, exclude);
        }
    }

    fn broadcast_frame(&mut self, frame: &str, exclude: Option<PeerId>) {
        let mut gone = Vec::new();
        for (peer, sender) in &self.peers {
            if Some(*peer) == exclude {
                continue;
            }
            if sender.send(Outbound::Text(frame.to_owned())).is_err() {
                gone.push(*peer);
            }
        }
        for peer in gone {
            self.leave(peer);
        }
    }
}

fn encode(message: &SyncMessage) -> Option<String> {
    match message.encode() {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(kind = message.kind(), error = %e, "Failed to encode message");
            None
        }
    }
}

/// Swap in the id the merge assigned to an update that came without one,
/// so every peer stores the entity under the same id. The flag tells
/// whether an id was assigned.
fn with_assigned_ids(message: SyncMessage, change: Option<StoreChange>) -> (SyncMessage, bool) {
    match (message, change) {
        (SyncMessage::StationUpdate { station: sent }, Some(StoreChange::StationUpdated(station)))
            if sent.id != station.id =>
        {
            (SyncMessage::StationUpdate { station }, true)
        }
        (SyncMessage::VehicleUpdate { vehicle: sent }, Some(StoreChange::VehicleUpdated(vehicle)))
            if sent.id != vehicle.id =>
        {
            (SyncMessage::VehicleUpdate { vehicle }, true)
        }
        (message, _) => (message, false),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lagekarte_types::{Station, StationId, Vehicle, VehicleId};

    use super::*;

    fn peer(hub: &mut Hub) -> (PeerId, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = PeerId::new();
        hub.join(id, tx);
        (id, rx)
    }

    fn next_message(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Option<SyncMessage> {
        match rx.try_recv() {
            Ok(Outbound::Text(text)) => SyncMessage::decode(&text).ok(),
            _ => None,
        }
    }

    fn vehicle_update(id: &str) -> String {
        let mut v = Vehicle::new("HLF 20", "HLF");
        v.id = VehicleId::from(id);
        SyncMessage::VehicleUpdate { vehicle: v }.encode().unwrap()
    }

    #[test]
    fn join_sends_snapshot_to_joiner_only() {
        let mut hub = Hub::new();
        hub.replace_state(SyncState::new(vec![Station::new("A", 1.0, 1.0)], Vec::new()));
        let (_a, mut rx_a) = peer(&mut hub);
        let (_b, mut rx_b) = peer(&mut hub);

        assert!(matches!(
            next_message(&mut rx_a),
            Some(SyncMessage::SyncData { ref data }) if data.stations.len() == 1
        ));
        assert!(rx_a.try_recv().is_err(), "peer A saw B's join");
        assert!(matches!(next_message(&mut rx_b), Some(SyncMessage::SyncData { .. })));
        assert_eq!(hub.peer_count(), 2);
    }

    #[test]
    fn mutation_is_rebroadcast_to_everyone_but_sender() {
        let mut hub = Hub::new();
        let (a, mut rx_a) = peer(&mut hub);
        let (_b, mut rx_b) = peer(&mut hub);
        let (_c, mut rx_c) = peer(&mut hub);
        for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
            let _ = next_message(rx);
        }

        let applied = hub.handle_text(a, &vehicle_update("v1"));
        assert!(matches!(applied, Some(SyncMessage::VehicleUpdate { .. })));
        assert_eq!(hub.state().vehicles.len(), 1);

        assert!(rx_a.try_recv().is_err(), "sender received its own echo");
        assert!(matches!(next_message(&mut rx_b), Some(SyncMessage::VehicleUpdate { .. })));
        assert!(matches!(next_message(&mut rx_c), Some(SyncMessage::VehicleUpdate { .. })));
    }

    #[test]
    fn sync_request_replies_to_requester_only() {
        let mut hub = Hub::new();
        let (a, mut rx_a) = peer(&mut hub);
        let (_b, mut rx_b) = peer(&mut hub);
        let _ = next_message(&mut rx_a);
        let _ = next_message(&mut rx_b);

        let request = SyncMessage::sync_request().encode().unwrap();
        assert!(hub.handle_text(a, &request).is_none());
        assert!(matches!(next_message(&mut rx_a), Some(SyncMessage::SyncData { .. })));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn malformed_and_unknown_frames_are_dropped() {
        let mut hub = Hub::new();
        let (a, mut rx_a) = peer(&mut hub);
        let (_b, mut rx_b) = peer(&mut hub);
        let _ = next_message(&mut rx_a);
        let _ = next_message(&mut rx_b);

        assert!(hub.handle_text(a, "{oops").is_none());
        assert!(hub.handle_text(a, r#"{"type":"chat"}"#).is_none());
        assert!(rx_b.try_recv().is_err());
        assert_eq!(hub.peer_count(), 2, "bad frames must not drop the peer");
    }

    #[test]
    fn replace_state_broadcasts_to_all() {
        let mut hub = Hub::new();
        let (_a, mut rx_a) = peer(&mut hub);
        let (_b, mut rx_b) = peer(&mut hub);
        let _ = next_message(&mut rx_a);
        let _ = next_message(&mut rx_b);

        let mut station = Station::new("Wache 1", 51.0, 10.0);
        station.id = StationId::from("s1");
        hub.replace_state(SyncState::new(vec![station], Vec::new()));

        for rx in [&mut rx_a, &mut rx_b] {
            assert!(matches!(
                next_message(rx),
                Some(SyncMessage::SyncData { ref data }) if data.stations.len() == 1
            ));
        }
    }

    #[test]
    fn closed_queue_is_pruned_on_broadcast() {
        let mut hub = Hub::new();
        let (a, _rx_a) = peer(&mut hub);
        let (_b, rx_b) = peer(&mut hub);
        drop(rx_b);

        hub.handle_text(a, &vehicle_update("v2"));
        assert_eq!(hub.peer_count(), 1);
    }

    #[test]
    fn update_without_id_is_rebroadcast_with_assigned_id() {
        let mut hub = Hub::new();
        let (a, _rx_a) = peer(&mut hub);
        let frame = SyncMessage::StationUpdate {
            station: Station::new("Neu", 50.0, 9.0),
        }
        .encode()
        .unwrap();

        let station = hub
            .handle_text(a, &frame)
            .and_then(|m| match m {
                SyncMessage::StationUpdate { station } => Some(station),
                _ => None,
            })
            .unwrap();
        assert!(!station.id.is_unassigned());
        assert_eq!(hub.state().stations.first().map(|s| &s.id), Some(&station.id));
    }

    #[test]
    fn update_with_null_id_gets_an_id() {
        let mut hub = Hub::new();
        let (a, mut rx_a) = peer(&mut hub);
        let (_b, mut rx_b) = peer(&mut hub);
        let _ = next_message(&mut rx_a);
        let _ = next_message(&mut rx_b);

        let frame = r#"{"type":"station_update","station":{"id":null,"name":"FW Nord","lat":51.0,"lng":10.0}}"#;
        assert!(hub.handle_text(a, frame).is_some());

        let assigned = hub.state().stations.first().map(|s| s.id.clone()).unwrap();
        assert!(!assigned.is_unassigned());
        assert!(matches!(
            next_message(&mut rx_b),
            Some(SyncMessage::StationUpdate { ref station }) if station.id == assigned
        ));
    }

    #[test]
    fn close_all_empties_broadcast_set() {
        let mut hub = Hub::new();
        let (_a, mut rx_a) = peer(&mut hub);
        let _ = next_message(&mut rx_a);
        hub.close_all();
        assert_eq!(hub.peer_count(), 0);
        assert!(matches!(rx_a.try_recv(), Ok(Outbound::Close)));
    }

    #[test]
    fn join_after_close_all_is_refused_until_reopen() {
        let mut hub = Hub::new();
        hub.close_all();

        let (_late, mut rx_late) = peer(&mut hub);
        assert!(matches!(rx_late.try_recv(), Ok(Outbound::Close)));
        assert_eq!(hub.peer_count(), 0);

        hub.reopen();
        let (_next, mut rx_next) = peer(&mut hub);
        assert!(matches!(next_message(&mut rx_next), Some(SyncMessage::SyncData { .. })));
        assert_eq!(hub.peer_count(), 1);
    }

    #[test]
    fn update_with_id_is_forwarded_verbatim() {
        let mut hub = Hub::new();
        let (a, mut rx_a) = peer(&mut hub);
        let (_b, mut rx_b) = peer(&mut hub);
        let _ = next_message(&mut rx_a);
        let _ = next_message(&mut rx_b);

        let frame = r#"{"type":"vehicle_position","vehicleId":"v1","position":{"lat":51.1,"lng":10.2},"deploymentInfo":null,"timestamp":1712000000000,"sender":"client_1_abc"}"#;
        hub.handle_text(a, &vehicle_update("v1"));
        let _ = rx_b.try_recv();

        assert!(hub.handle_text(a, frame).is_some());
        assert_eq!(rx_b.try_recv(), Ok(Outbound::Text(String::from(frame))));
    }
}
