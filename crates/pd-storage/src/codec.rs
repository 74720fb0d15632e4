//! Wire framing for persisted records (spec.md §4.B): protobuf for
//! stores/regions/cluster meta, JSON for scheduler configs and placement
//! rules. The protobuf messages are hand-derived with `prost::Message`
//! rather than generated from `.proto` files, since nothing in this crate
//! needs a schema registry shared outside the workspace.

use pd_api::storage::StorageError;
use pd_types::{DownPeer, Peer, PeerRole, Region, RegionEpoch, Store, StoreState};
use prost::Message;
use std::collections::BTreeMap;

#[derive(Clone, PartialEq, Message)]
struct WirePeer {
    #[prost(uint64, tag = "1")]
    id: u64,
    #[prost(uint64, tag = "2")]
    store_id: u64,
    #[prost(enumeration = "WirePeerRole", tag = "3")]
    role: i32,
}

#[derive(Clone, Copy, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
enum WirePeerRole {
    Voter = 0,
    Learner = 1,
    IncomingVoter = 2,
    DemotingVoter = 3,
}

impl From<PeerRole> for WirePeerRole {
    fn from(r: PeerRole) -> Self {
        match r {
            PeerRole::Voter => WirePeerRole::Voter,
            PeerRole::Learner => WirePeerRole::Learner,
            PeerRole::IncomingVoter => WirePeerRole::IncomingVoter,
            PeerRole::DemotingVoter => WirePeerRole::DemotingVoter,
        }
    }
}

impl From<WirePeerRole> for PeerRole {
    fn from(r: WirePeerRole) -> Self {
        match r {
            WirePeerRole::Voter => PeerRole::Voter,
            WirePeerRole::Learner => PeerRole::Learner,
            WirePeerRole::IncomingVoter => PeerRole::IncomingVoter,
            WirePeerRole::DemotingVoter => PeerRole::DemotingVoter,
        }
    }
}

impl From<Peer> for WirePeer {
    fn from(p: Peer) -> Self {
        WirePeer { id: p.id.get(), store_id: p.store_id.get(), role: WirePeerRole::from(p.role) as i32 }
    }
}

impl WirePeer {
    fn into_peer(self) -> Peer {
        let role = WirePeerRole::from_i32(self.role).unwrap_or(WirePeerRole::Voter);
        Peer { id: pd_types::PeerId::new(self.id), store_id: pd_types::StoreId::new(self.store_id), role: role.into() }
    }
}

#[derive(Clone, PartialEq, Message)]
struct WireDownPeer {
    #[prost(message, required, tag = "1")]
    peer: WirePeer,
    #[prost(uint64, tag = "2")]
    down_seconds: u64,
}

#[derive(Clone, PartialEq, Message)]
struct WireRegion {
    #[prost(uint64, tag = "1")]
    id: u64,
    #[prost(bytes, tag = "2")]
    start_key: Vec<u8>,
    #[prost(bytes, tag = "3")]
    end_key: Vec<u8>,
    #[prost(uint64, tag = "4")]
    conf_ver: u64,
    #[prost(uint64, tag = "5")]
    version: u64,
    #[prost(message, repeated, tag = "6")]
    peers: Vec<WirePeer>,
    #[prost(message, optional, tag = "7")]
    leader: Option<WirePeer>,
    #[prost(message, repeated, tag = "8")]
    down_peers: Vec<WireDownPeer>,
    #[prost(message, repeated, tag = "9")]
    pending_peers: Vec<WirePeer>,
    #[prost(uint64, tag = "10")]
    approximate_size: u64,
    #[prost(uint64, tag = "11")]
    approximate_keys: u64,
    #[prost(uint64, tag = "12")]
    bytes_written: u64,
    #[prost(uint64, tag = "13")]
    bytes_read: u64,
    #[prost(uint64, tag = "14")]
    keys_written: u64,
    #[prost(uint64, tag = "15")]
    keys_read: u64,
}

pub fn encode_region(region: &Region) -> Vec<u8> {
    let wire = WireRegion {
        id: region.id.get(),
        start_key: region.start_key.clone(),
        end_key: region.end_key.clone(),
        conf_ver: region.epoch.conf_ver,
        version: region.epoch.version,
        peers: region.peers.iter().copied().map(WirePeer::from).collect(),
        leader: region.leader.map(WirePeer::from),
        down_peers: region
            .down_peers
            .iter()
            .map(|d| WireDownPeer { peer: WirePeer::from(d.peer), down_seconds: d.down_seconds })
            .collect(),
        pending_peers: region.pending_peers.iter().copied().map(WirePeer::from).collect(),
        approximate_size: region.approximate_size,
        approximate_keys: region.approximate_keys,
        bytes_written: region.bytes_written,
        bytes_read: region.bytes_read,
        keys_written: region.keys_written,
        keys_read: region.keys_read,
    };
    wire.encode_to_vec()
}

pub fn decode_region(bytes: &[u8]) -> Result<Region, StorageError> {
    let wire = WireRegion::decode(bytes).map_err(|e| StorageError::Decode(e.to_string()))?;
    Ok(Region {
        id: pd_types::RegionId::new(wire.id),
        start_key: wire.start_key,
        end_key: wire.end_key,
        epoch: RegionEpoch::new(wire.conf_ver, wire.version),
        peers: wire.peers.into_iter().map(WirePeer::into_peer).collect(),
        leader: wire.leader.map(WirePeer::into_peer),
        down_peers: wire
            .down_peers
            .into_iter()
            .map(|d| DownPeer { peer: d.peer.into_peer(), down_seconds: d.down_seconds })
            .collect(),
        pending_peers: wire.pending_peers.into_iter().map(WirePeer::into_peer).collect(),
        approximate_size: wire.approximate_size,
        approximate_keys: wire.approximate_keys,
        bytes_written: wire.bytes_written,
        bytes_read: wire.bytes_read,
        keys_written: wire.keys_written,
        keys_read: wire.keys_read,
    })
}

#[derive(Clone, PartialEq, Message)]
struct WireLabel {
    #[prost(string, tag = "1")]
    key: String,
    #[prost(string, tag = "2")]
    value: String,
}

#[derive(Clone, PartialEq, Message)]
struct WireStore {
    #[prost(uint64, tag = "1")]
    id: u64,
    #[prost(string, tag = "2")]
    address: String,
    #[prost(message, repeated, tag = "3")]
    labels: Vec<WireLabel>,
    #[prost(enumeration = "WireStoreState", tag = "4")]
    state: i32,
    #[prost(uint64, tag = "5")]
    capacity_bytes: u64,
    #[prost(uint64, tag = "6")]
    used_bytes: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
enum WireStoreState {
    Up = 0,
    Offline = 1,
    Tombstone = 2,
}

impl From<StoreState> for WireStoreState {
    fn from(s: StoreState) -> Self {
        match s {
            StoreState::Up => WireStoreState::Up,
            StoreState::Offline => WireStoreState::Offline,
            StoreState::Tombstone => WireStoreState::Tombstone,
        }
    }
}

impl From<WireStoreState> for StoreState {
    fn from(s: WireStoreState) -> Self {
        match s {
            WireStoreState::Up => StoreState::Up,
            WireStoreState::Offline => StoreState::Offline,
            WireStoreState::Tombstone => StoreState::Tombstone,
        }
    }
}

/// Encodes the wire-order labels (spec.md's `Vec<(String, String)>` on the
/// wire, `BTreeMap` in the cluster model per SPEC_FULL.md §2) plus the
/// fields that matter for persistence; transient heartbeat-derived fields
/// (load/snapshot counters, rate limiter state) are not persisted — they are
/// rebuilt from the next heartbeat after a restart.
pub fn encode_store(store: &Store) -> Vec<u8> {
    let wire = WireStore {
        id: store.id.get(),
        address: store.address.clone(),
        labels: store.labels.iter().map(|(k, v)| WireLabel { key: k.clone(), value: v.clone() }).collect(),
        state: WireStoreState::from(store.state) as i32,
        capacity_bytes: store.capacity_bytes,
        used_bytes: store.used_bytes,
    };
    wire.encode_to_vec()
}

pub fn decode_store(bytes: &[u8]) -> Result<Store, StorageError> {
    let wire = WireStore::decode(bytes).map_err(|e| StorageError::Decode(e.to_string()))?;
    let mut store = Store::new(pd_types::StoreId::new(wire.id), wire.address);
    store.labels = wire.labels.into_iter().map(|l| (l.key, l.value)).collect::<BTreeMap<_, _>>();
    store.state = WireStoreState::from_i32(wire.state).unwrap_or(WireStoreState::Up).into();
    store.capacity_bytes = wire.capacity_bytes;
    store.used_bytes = wire.used_bytes;
    Ok(store)
}

/// JSON framing for scheduler configs and placement rules (spec.md §4.B).
pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|e| StorageError::Encode(e.to_string()))
}

pub fn decode_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd_types::{PeerId, RegionId, StoreId};

    #[test]
    fn region_round_trips_through_wire_encoding() {
        let mut region = Region::new(RegionId::new(7), b"a".to_vec(), b"z".to_vec());
        region.epoch = RegionEpoch::new(2, 3);
        region.peers.push(Peer::new_voter(PeerId::new(1), StoreId::new(1)));
        region.peers.push(Peer::new_learner(PeerId::new(2), StoreId::new(2)));
        region.leader = Some(region.peers[0]);
        region.approximate_size = 1024;

        let decoded = decode_region(&encode_region(&region)).expect("decode");
        assert_eq!(decoded.id, region.id);
        assert_eq!(decoded.epoch, region.epoch);
        assert_eq!(decoded.peers.len(), 2);
        assert_eq!(decoded.peers[1].role, PeerRole::Learner);
        assert_eq!(decoded.leader.map(|p| p.id), Some(PeerId::new(1)));
    }

    #[test]
    fn store_round_trips_labels_and_state() {
        let mut store = Store::new(StoreId::new(3), "127.0.0.1:2380");
        store.labels.insert("zone".to_string(), "z1".to_string());
        store.state = StoreState::Offline;
        store.capacity_bytes = 500;

        let decoded = decode_store(&encode_store(&store)).expect("decode");
        assert_eq!(decoded.label("zone"), Some("z1"));
        assert_eq!(decoded.state, StoreState::Offline);
        assert_eq!(decoded.capacity_bytes, 500);
    }
}
