use crate::peer::Peer;
use log::debug;
use parking_lot::Mutex;

/// Outbound message delivery.
pub trait NetworkBroadcast: Send + Sync {
    /// Broadcast one message to every peer in the list.
    fn send_to_peers(&self, peers: &[Peer], message: &[u8]);

    /// Send a message to the lookup tier.
    fn send_to_lookup_tier(&self, message: &[u8]);
}

/// Peer whitelist maintained by the transport layer.
pub trait ShardWhitelist: Send + Sync {
    /// Re-read the shard whitelist after committee membership changed.
    fn update_shard_whitelist(&self);
}

/// A message recorded by [`RecordingBroadcast`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Peers { peers: Vec<Peer>, message: Vec<u8> },
    LookupTier { message: Vec<u8> },
}

/// Broadcaster that records every dispatch instead of sending it.
#[derive(Default)]
pub struct RecordingBroadcast {
    sent: Mutex<Vec<Dispatch>>,
    whitelist_updates: Mutex<usize>,
}

impl RecordingBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.sent.lock().clone()
    }

    pub fn lookup_messages(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .iter()
            .filter_map(|dispatch| match dispatch {
                Dispatch::LookupTier { message } => Some(message.clone()),
                Dispatch::Peers { .. } => None,
            })
            .collect()
    }

    pub fn peer_messages(&self) -> Vec<(Vec<Peer>, Vec<u8>)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|dispatch| match dispatch {
                Dispatch::Peers { peers, message } => Some((peers.clone(), message.clone())),
                Dispatch::LookupTier { .. } => None,
            })
            .collect()
    }

    pub fn whitelist_updates(&self) -> usize {
        *self.whitelist_updates.lock()
    }
}

impl NetworkBroadcast for RecordingBroadcast {
    fn send_to_peers(&self, peers: &[Peer], message: &[u8]) {
        debug!("Recording broadcast of {} bytes to {} peers", message.len(), peers.len());
        self.sent.lock().push(Dispatch::Peers {
            peers: peers.to_vec(),
            message: message.to_vec(),
        });
    }

    fn send_to_lookup_tier(&self, message: &[u8]) {
        debug!("Recording {} bytes for the lookup tier", message.len());
        self.sent.lock().push(Dispatch::LookupTier {
            message: message.to_vec(),
        });
    }
}

impl ShardWhitelist for RecordingBroadcast {
    fn update_shard_whitelist(&self) {
        *self.whitelist_updates.lock() += 1;
    }
}
