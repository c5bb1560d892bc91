//! Peer records and the peer table
//!
//! The controller owns the authoritative table; each client owns a local
//! view holding every *other* member it has been told about. Both use the
//! same structure. Records are value types inside their owning table;
//! nothing shares them across component boundaries.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fmt::Display;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use ipnet::Ipv4Net;

/// Default table capacity
pub const MAX_PEERS: usize = 256;

/// Peer table errors
#[derive(Debug, PartialEq, Eq)]
pub enum PeerError {
    /// A record with this id is already in the table
    DuplicateId(u64),
    /// A record with this virtual IP is already in the table
    DuplicateAddress(Ipv4Addr),
    /// Every candidate host address in the subnet is taken
    AddressSpaceExhausted,
    /// The table is at capacity
    TableFull,
    /// No record with this id
    UnknownPeer(u64),
}

impl std::error::Error for PeerError {}

impl Display for PeerError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PeerError::DuplicateId(id) => write!(fmt, "peer {} already present", id),
            PeerError::DuplicateAddress(ip) => write!(fmt, "virtual ip {} already assigned", ip),
            PeerError::AddressSpaceExhausted => "no free virtual ip in subnet".fmt(fmt),
            PeerError::TableFull => "peer table at capacity".fmt(fmt),
            PeerError::UnknownPeer(id) => write!(fmt, "unknown peer {}", id),
        }
    }
}

/// One member of the overlay
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// Globally unique per live process
    pub id: u64,
    /// Public endpoint as most recently observed from incoming packets
    pub endpoint: SocketAddr,
    /// Overlay address, assigned once at join
    pub virtual_ip: Ipv4Addr,
    /// Monotonic timestamp of the last packet received from this id
    pub last_seen: Instant,
    /// Cleared by the maintenance sweep once `last_seen` goes stale
    pub active: bool,
    /// True once a direct peer-to-peer packet has arrived from this peer
    pub reachable: bool,
    /// Long-term public key material, unused in the default configuration
    pub public_key: Option<[u8; 32]>,
}

impl PeerRecord {
    pub fn new(id: u64, endpoint: SocketAddr, virtual_ip: Ipv4Addr) -> Self {
        PeerRecord {
            id,
            endpoint,
            virtual_ip,
            last_seen: Instant::now(),
            active: true,
            reachable: false,
            public_key: None,
        }
    }

    /// Age of the last packet from this peer
    pub fn age(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

/// What one maintenance sweep did
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Ids newly marked inactive this sweep
    pub marked_inactive: Vec<u64>,
    /// Ids removed after the grace period
    pub removed: Vec<u64>,
}

/// In-memory set of peer records, indexed by id and by virtual IP
///
/// Iteration order is id order, so gossip and timeout passes are
/// deterministic. Insertion enforces both uniqueness invariants.
pub struct PeerTable {
    peers: BTreeMap<u64, PeerRecord>,
    by_ip: HashMap<Ipv4Addr, u64>,
    capacity: usize,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::with_capacity(MAX_PEERS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        PeerTable {
            peers: BTreeMap::new(),
            by_ip: HashMap::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.peers.contains_key(&id)
    }

    pub fn get(&self, id: u64) -> Option<&PeerRecord> {
        self.peers.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut PeerRecord> {
        self.peers.get_mut(&id)
    }

    /// Looks up the record whose overlay address is `ip`
    pub fn get_by_ip(&self, ip: Ipv4Addr) -> Option<&PeerRecord> {
        self.by_ip.get(&ip).and_then(|id| self.peers.get(id))
    }

    /// Iterates records in id order
    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    /// Inserts a new record, enforcing both uniqueness invariants
    pub fn insert(&mut self, record: PeerRecord) -> Result<(), PeerError> {
        if self.peers.len() >= self.capacity {
            return Err(PeerError::TableFull);
        }
        if self.peers.contains_key(&record.id) {
            return Err(PeerError::DuplicateId(record.id));
        }
        if self.by_ip.contains_key(&record.virtual_ip) {
            return Err(PeerError::DuplicateAddress(record.virtual_ip));
        }
        self.by_ip.insert(record.virtual_ip, record.id);
        self.peers.insert(record.id, record);
        Ok(())
    }

    /// Removes the record for `id`, freeing its virtual IP
    pub fn remove(&mut self, id: u64) -> Option<PeerRecord> {
        let record = self.peers.remove(&id)?;
        self.by_ip.remove(&record.virtual_ip);
        Some(record)
    }

    /// Refreshes `last_seen` for `id`, reviving an inactive record
    ///
    /// Returns false when the id is not in the table.
    pub fn touch(&mut self, id: u64) -> bool {
        match self.peers.get_mut(&id) {
            Some(record) => {
                record.last_seen = Instant::now();
                record.active = true;
                true
            }
            None => false,
        }
    }

    /// Records the endpoint a packet from `id` actually came from
    ///
    /// This is how endpoints learned through NAT rebinding stay fresh.
    pub fn update_endpoint(&mut self, id: u64, endpoint: SocketAddr) {
        if let Some(record) = self.peers.get_mut(&id) {
            if record.endpoint != endpoint {
                tracing::info!("peer {} moved {} -> {}", id, record.endpoint, endpoint);
                record.endpoint = endpoint;
            }
        }
    }

    /// Picks the first free host address in `subnet`
    ///
    /// Scans candidates in address order, skipping the first host (the
    /// controller's reserve); the network and broadcast addresses are
    /// never candidates. First-free rather than a count-based formula so
    /// addresses freed by departures are handed out again.
    pub fn allocate_ip(&self, subnet: Ipv4Net) -> Result<Ipv4Addr, PeerError> {
        for candidate in subnet.hosts().skip(1) {
            if !self.by_ip.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(PeerError::AddressSpaceExhausted)
    }

    /// One maintenance pass over the table
    ///
    /// Marks records older than `timeout` inactive; removes records older
    /// than `timeout + grace`. Two passes: collect ids first, then act,
    /// since the table cannot be mutated mid-iteration.
    pub fn sweep(&mut self, timeout: Duration, grace: Duration) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        for record in self.peers.values() {
            let age = record.age();
            if age > timeout + grace {
                outcome.removed.push(record.id);
            } else if age > timeout && record.active {
                outcome.marked_inactive.push(record.id);
            }
        }

        for id in &outcome.marked_inactive {
            if let Some(record) = self.peers.get_mut(id) {
                record.active = false;
            }
        }
        for id in &outcome.removed {
            self.remove(*id);
        }
        outcome
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}
