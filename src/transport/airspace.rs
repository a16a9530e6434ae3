//! In-memory proximity medium.
//!
//! [`Airspace`] stands in for the radio layer: every device opened on the
//! same airspace can discover every other device advertising the same
//! service. Invitations are accepted immediately and data is delivered
//! reliably and in order. Used to run the proximity protocol without radios.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use super::error::{TransportError, TransportResult};
use super::proximity::{Advertisement, LinkEvent, PeerState, ProximityLink, ProximityRadio};

#[derive(Debug)]
struct Station {
    advertisement: Advertisement,
    events: mpsc::UnboundedSender<LinkEvent>,
    connected: HashSet<String>,
}

impl Station {
    fn deliver(&self, event: LinkEvent) {
        // A closed receiver just means the device went away.
        let _ = self.events.send(event);
    }
}

/// A shared in-memory medium for proximity links.
#[derive(Debug, Clone, Default)]
pub struct Airspace {
    stations: Arc<Mutex<HashMap<String, Station>>>,
}

impl Airspace {
    /// Create an empty airspace.
    pub fn new() -> Self {
        Self::default()
    }

    fn stations(&self) -> MutexGuard<'_, HashMap<String, Station>> {
        self.stations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Peers connected to the given device.
    pub fn connected_peers(&self, peer_id: &str) -> Vec<String> {
        let stations = self.stations();
        let mut peers: Vec<_> = stations
            .get(peer_id)
            .map(|s| s.connected.iter().cloned().collect())
            .unwrap_or_default();
        peers.sort();
        peers
    }

    /// Number of devices currently on the air.
    pub fn station_count(&self) -> usize {
        self.stations().len()
    }

    fn connect(&self, a: &str, b: &str) {
        let mut stations = self.stations();
        if !stations.contains_key(a) || !stations.contains_key(b) || a == b {
            return;
        }
        let already = stations
            .get(a)
            .is_some_and(|s| s.connected.contains(b));
        if already {
            return;
        }
        for (this, that) in [(a, b), (b, a)] {
            if let Some(station) = stations.get_mut(this) {
                station.connected.insert(that.to_string());
            }
        }
        // Both sides must see each other as connected before either hears about it.
        for (this, that) in [(a, b), (b, a)] {
            if let Some(station) = stations.get(this) {
                station.deliver(LinkEvent::PeerState {
                    peer: that.to_string(),
                    state: PeerState::Connected,
                });
            }
        }
    }

    fn remove(&self, peer_id: &str) {
        let mut stations = self.stations();
        let Some(gone) = stations.remove(peer_id) else {
            return;
        };
        for station in stations.values_mut() {
            if station.connected.remove(peer_id) {
                station.deliver(LinkEvent::PeerState {
                    peer: peer_id.to_string(),
                    state: PeerState::NotConnected,
                });
            }
            if station.advertisement.service == gone.advertisement.service {
                station.deliver(LinkEvent::PeerLost {
                    peer: peer_id.to_string(),
                });
            }
        }
    }
}

impl ProximityRadio for Airspace {
    fn open(
        &self,
        advertisement: Advertisement,
    ) -> TransportResult<(Arc<dyn ProximityLink>, mpsc::UnboundedReceiver<LinkEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer_id = advertisement.peer_id.clone();
        let mut stations = self.stations();
        if stations.contains_key(&peer_id) {
            return Err(TransportError::Discovery(format!(
                "peer id {peer_id} already on the air"
            )));
        }

        let station = Station {
            advertisement,
            events: tx,
            connected: HashSet::new(),
        };
        for other in stations.values() {
            if other.advertisement.service != station.advertisement.service {
                continue;
            }
            other.deliver(LinkEvent::PeerFound {
                peer: peer_id.clone(),
                info: station.advertisement.info.clone(),
            });
            station.deliver(LinkEvent::PeerFound {
                peer: other.advertisement.peer_id.clone(),
                info: other.advertisement.info.clone(),
            });
        }
        stations.insert(peer_id.clone(), station);
        drop(stations);

        let link = AirspaceLink {
            airspace: self.clone(),
            peer_id,
        };
        Ok((Arc::new(link), rx))
    }
}

struct AirspaceLink {
    airspace: Airspace,
    peer_id: String,
}

impl ProximityLink for AirspaceLink {
    fn invite(&self, peer: &str, _timeout: Duration) {
        let stations = self.airspace.stations();
        if let Some(station) = stations.get(peer) {
            station.deliver(LinkEvent::Invitation {
                peer: self.peer_id.clone(),
            });
        }
    }

    fn accept(&self, peer: &str) {
        self.airspace.connect(&self.peer_id, peer);
    }

    fn connected_peers(&self) -> Vec<String> {
        self.airspace.connected_peers(&self.peer_id)
    }

    fn send(&self, data: &[u8], peers: &[String]) -> TransportResult<()> {
        let stations = self.airspace.stations();
        let me = stations.get(&self.peer_id).ok_or(TransportError::NotConnected)?;
        for peer in peers {
            if !me.connected.contains(peer) {
                return Err(TransportError::Send(format!("peer {peer} is not connected")));
            }
            if let Some(station) = stations.get(peer) {
                station.deliver(LinkEvent::Data {
                    peer: self.peer_id.clone(),
                    bytes: data.to_vec(),
                });
            }
        }
        Ok(())
    }

    fn stop(&self) {
        self.airspace.remove(&self.peer_id);
    }
}
