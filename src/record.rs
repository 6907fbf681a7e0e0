use crate::role::NetEntityRole;
use crate::serialization::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Replication channel a property belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReplicationDirection {
    AuthorityToClient = 0,
    AuthorityToAutonomous = 1,
    AutonomousToAuthority = 2,
}

impl ReplicationDirection {
    pub const ALL: [ReplicationDirection; 3] = [
        ReplicationDirection::AuthorityToClient,
        ReplicationDirection::AuthorityToAutonomous,
        ReplicationDirection::AutonomousToAuthority,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Position of one property inside a record. Assigned once when components
/// attach and never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordSlot {
    pub direction: ReplicationDirection,
    pub index: u16,
}

impl RecordSlot {
    pub fn new(direction: ReplicationDirection, index: u16) -> Self {
        Self { direction, index }
    }
}

impl fmt::Display for RecordSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}]", self.direction, self.index)
    }
}

/// Growable bit array. Bits past `len` read as unset.
#[derive(Debug, Clone, Default)]
struct BitSet {
    bytes: Vec<u8>,
    len: usize,
}

impl BitSet {
    fn get(&self, index: usize) -> bool {
        self.bytes
            .get(index / 8)
            .map(|byte| byte & (1 << (index % 8)) != 0)
            .unwrap_or(false)
    }

    fn grow(&mut self, len: usize) {
        if len > self.len {
            self.len = len;
            self.bytes.resize(len.div_ceil(8), 0);
        }
    }

    fn set(&mut self, index: usize) {
        self.grow(index + 1);
        self.bytes[index / 8] |= 1 << (index % 8);
    }

    fn unset(&mut self, index: usize) {
        if let Some(byte) = self.bytes.get_mut(index / 8) {
            *byte &= !(1 << (index % 8));
        }
    }

    fn clear(&mut self) {
        self.bytes.iter_mut().for_each(|byte| *byte = 0);
    }

    fn any(&self) -> bool {
        self.bytes.iter().any(|byte| *byte != 0)
    }

    fn count(&self) -> usize {
        self.bytes.iter().map(|byte| byte.count_ones() as usize).sum()
    }

    fn or(&mut self, other: &BitSet) {
        self.grow(other.len);
        for (mine, theirs) in self.bytes.iter_mut().zip(other.bytes.iter()) {
            *mine |= *theirs;
        }
    }

    fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |index| self.get(*index))
    }
}

impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        let longest = self.bytes.len().max(other.bytes.len());
        (0..longest).all(|i| {
            self.bytes.get(i).copied().unwrap_or(0) == other.bytes.get(i).copied().unwrap_or(0)
        })
    }
}

impl Eq for BitSet {}

/// Per-entity change ledger: one dirty bit and one consumed bit per property
/// slot, for each replication direction.
///
/// Dirty bits are only set by mutation and only cleared by [`clear`],
/// [`clear_dirty`] (reconciliation) or a serializer read. Consumed bits mark
/// slots already visited during the current pass and are independent of the
/// dirty bits, so the same record can be walked once to serialize and again
/// to notify after [`reset_consumed_bits`].
///
/// The record is scoped to the role it replicates to, which selects the
/// directions carried on the wire and visited by [`consume`].
///
/// [`clear`]: ReplicationRecord::clear
/// [`clear_dirty`]: ReplicationRecord::clear_dirty
/// [`reset_consumed_bits`]: ReplicationRecord::reset_consumed_bits
/// [`consume`]: ReplicationRecord::consume
#[derive(Debug, Clone)]
pub struct ReplicationRecord {
    role: NetEntityRole,
    dirty: [BitSet; 3],
    consumed: [BitSet; 3],
}

impl ReplicationRecord {
    pub fn new(role: NetEntityRole) -> Self {
        Self {
            role,
            dirty: Default::default(),
            consumed: Default::default(),
        }
    }

    pub fn role(&self) -> NetEntityRole {
        self.role
    }

    /// Directions replicated to an entity in this record's role.
    pub fn contains_direction(&self, direction: ReplicationDirection) -> bool {
        match self.role {
            NetEntityRole::Client => direction == ReplicationDirection::AuthorityToClient,
            NetEntityRole::Autonomous => direction != ReplicationDirection::AutonomousToAuthority,
            NetEntityRole::Authority => direction == ReplicationDirection::AutonomousToAuthority,
            NetEntityRole::Server => true,
        }
    }

    pub fn mark_dirty(&mut self, slot: RecordSlot) {
        self.dirty[slot.direction.index()].set(slot.index as usize);
    }

    pub fn is_dirty(&self, slot: RecordSlot) -> bool {
        self.dirty[slot.direction.index()].get(slot.index as usize)
    }

    /// Drops a claimed change, used when a received value matches local state.
    pub fn clear_dirty(&mut self, slot: RecordSlot) {
        self.dirty[slot.direction.index()].unset(slot.index as usize);
    }

    /// Returns true the first time a dirty, in-scope slot is visited during
    /// the current pass.
    pub fn consume(&mut self, slot: RecordSlot) -> bool {
        if !self.contains_direction(slot.direction) || !self.is_dirty(slot) {
            return false;
        }

        let consumed = &mut self.consumed[slot.direction.index()];
        if consumed.get(slot.index as usize) {
            return false;
        }
        consumed.set(slot.index as usize);
        true
    }

    pub fn reset_consumed_bits(&mut self) {
        self.consumed.iter_mut().for_each(BitSet::clear);
    }

    pub fn clear(&mut self) {
        self.dirty.iter_mut().for_each(BitSet::clear);
        self.reset_consumed_bits();
    }

    pub fn has_changes(&self) -> bool {
        self.dirty.iter().any(BitSet::any)
    }

    /// True if any dirty bit falls in a direction this record replicates.
    pub fn has_changes_in_scope(&self) -> bool {
        ReplicationDirection::ALL
            .iter()
            .any(|direction| self.contains_direction(*direction) && self.dirty[direction.index()].any())
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.iter().map(BitSet::count).sum()
    }

    pub fn dirty_slots(&self) -> impl Iterator<Item = RecordSlot> + '_ {
        ReplicationDirection::ALL.into_iter().flat_map(move |direction| {
            self.dirty[direction.index()]
                .ones()
                .map(move |index| RecordSlot::new(direction, index as u16))
        })
    }

    /// OR-merges the dirty bits of `other` into this record.
    pub fn append(&mut self, other: &ReplicationRecord) {
        for (mine, theirs) in self.dirty.iter_mut().zip(other.dirty.iter()) {
            mine.or(theirs);
        }
    }

    /// Writes or reads the record header: for every in-scope direction, the
    /// slot count followed by the packed dirty bits. Headers announcing more
    /// than `max_slots` slots in a direction, or setting bits past the count,
    /// invalidate the serializer.
    pub fn serialize(&mut self, serializer: &mut dyn Serializer, max_slots: usize) -> bool {
        for direction in ReplicationDirection::ALL {
            if !self.contains_direction(direction) {
                continue;
            }

            let bits = &mut self.dirty[direction.index()];
            let mut len = bits.len as u32;
            if !serializer.serialize_u32(&mut len, "slotCount") {
                return false;
            }

            let len = len as usize;
            if len > max_slots {
                log::warn!(
                    "Replication header claims {} {:?} slots, limit is {}",
                    len,
                    direction,
                    max_slots
                );
                serializer.invalidate();
                return false;
            }

            let mut bytes = bits.bytes.clone();
            if !serializer.serialize_bytes(&mut bytes, "dirtyBits") {
                return false;
            }

            if bytes.len() != len.div_ceil(8) {
                serializer.invalidate();
                return false;
            }

            let tail = len % 8;
            if tail != 0 && bytes.last().is_some_and(|last| last >> tail != 0) {
                log::warn!("Replication header marks {:?} slots past its count of {}", direction, len);
                serializer.invalidate();
                return false;
            }

            bits.len = len;
            bits.bytes = bytes;
            self.consumed[direction.index()] = BitSet::default();
        }

        serializer.is_valid()
    }
}

impl PartialEq for ReplicationRecord {
    fn eq(&self, other: &Self) -> bool {
        self.role == other.role && self.dirty == other.dirty
    }
}

impl Eq for ReplicationRecord {}

impl fmt::Display for ReplicationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.role)?;
        for direction in ReplicationDirection::ALL {
            let bits = &self.dirty[direction.index()];
            f.write_str(" ")?;
            for index in 0..bits.len {
                f.write_str(if bits.get(index) { "1" } else { "0" })?;
            }
            if bits.len == 0 {
                f.write_str("-")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{BinaryFormat, ByteReader, ByteWriter};

    fn a2c(index: u16) -> RecordSlot {
        RecordSlot::new(ReplicationDirection::AuthorityToClient, index)
    }

    fn a2auto(index: u16) -> RecordSlot {
        RecordSlot::new(ReplicationDirection::AuthorityToAutonomous, index)
    }

    fn auto2a(index: u16) -> RecordSlot {
        RecordSlot::new(ReplicationDirection::AutonomousToAuthority, index)
    }

    fn record_with(slots: &[RecordSlot]) -> ReplicationRecord {
        let mut record = ReplicationRecord::new(NetEntityRole::Server);
        for slot in slots {
            record.mark_dirty(*slot);
        }
        record
    }

    #[test]
    fn test_append_is_order_independent() {
        let a = record_with(&[a2c(0), a2c(9), auto2a(1)]);
        let b = record_with(&[a2c(3), a2auto(2), a2c(9)]);

        let mut ab = ReplicationRecord::new(NetEntityRole::Server);
        ab.append(&a);
        ab.append(&b);

        let mut ba = ReplicationRecord::new(NetEntityRole::Server);
        ba.append(&b);
        ba.append(&a);

        assert_eq!(ab, ba);
        assert_eq!(ab.dirty_count(), 5);
    }

    #[test]
    fn test_append_is_idempotent_and_non_destructive() {
        let source = record_with(&[a2c(4), a2auto(0)]);
        let mut target = ReplicationRecord::new(NetEntityRole::Server);

        target.append(&source);
        let once = target.clone();
        target.append(&source);

        assert_eq!(target, once);
        assert!(source.is_dirty(a2c(4)));
        assert!(source.is_dirty(a2auto(0)));
    }

    #[test]
    fn test_clear_and_has_changes() {
        let mut record = ReplicationRecord::new(NetEntityRole::Client);
        assert!(!record.has_changes());

        record.mark_dirty(a2auto(12));
        assert!(record.has_changes());

        record.clear();
        assert!(!record.has_changes());
        assert_eq!(record, ReplicationRecord::new(NetEntityRole::Client));
    }

    #[test]
    fn test_consume_walks_each_slot_once_per_pass() {
        let mut record = record_with(&[a2c(1), a2c(2)]);

        assert!(record.consume(a2c(1)));
        assert!(!record.consume(a2c(1)));
        assert!(!record.consume(a2c(5)));
        assert!(record.is_dirty(a2c(1)));

        record.reset_consumed_bits();
        assert!(record.consume(a2c(1)));
        assert!(record.consume(a2c(2)));
    }

    #[test]
    fn test_consume_respects_role_scope() {
        let mut record = ReplicationRecord::new(NetEntityRole::Client);
        record.mark_dirty(a2c(0));
        record.mark_dirty(a2auto(0));

        assert!(record.consume(a2c(0)));
        assert!(!record.consume(a2auto(0)));
        assert!(record.has_changes_in_scope());

        let mut authority = ReplicationRecord::new(NetEntityRole::Authority);
        authority.mark_dirty(a2c(0));
        assert!(authority.has_changes());
        assert!(!authority.has_changes_in_scope());
    }

    #[test]
    fn test_clear_dirty_reconciles_single_slot() {
        let mut record = record_with(&[a2c(0), a2c(1)]);
        record.clear_dirty(a2c(0));

        assert!(!record.is_dirty(a2c(0)));
        assert!(record.is_dirty(a2c(1)));
        assert_eq!(record.dirty_slots().collect::<Vec<_>>(), vec![a2c(1)]);
    }

    #[test]
    fn test_header_transfers_only_scoped_directions() {
        let mut outgoing = ReplicationRecord::new(NetEntityRole::Autonomous);
        outgoing.mark_dirty(a2c(3));
        outgoing.mark_dirty(a2auto(10));
        outgoing.mark_dirty(auto2a(1));

        let mut writer = ByteWriter::new(BinaryFormat::Bincode);
        assert!(outgoing.serialize(&mut writer, 64));

        let mut incoming = ReplicationRecord::new(NetEntityRole::Autonomous);
        let mut reader = ByteReader::new(BinaryFormat::Bincode, writer.into_bytes());
        assert!(incoming.serialize(&mut reader, 64));

        assert!(incoming.is_dirty(a2c(3)));
        assert!(incoming.is_dirty(a2auto(10)));
        assert!(!incoming.is_dirty(auto2a(1)));
        assert_eq!(incoming.dirty_count(), 2);
    }

    #[test]
    fn test_oversized_header_is_malformed() {
        let mut outgoing = ReplicationRecord::new(NetEntityRole::Client);
        outgoing.mark_dirty(a2c(100));

        let mut writer = ByteWriter::new(BinaryFormat::Bincode);
        assert!(outgoing.serialize(&mut writer, 1024));

        let mut incoming = ReplicationRecord::new(NetEntityRole::Client);
        let mut reader = ByteReader::new(BinaryFormat::Bincode, writer.into_bytes());
        assert!(!incoming.serialize(&mut reader, 16));
        assert!(!reader.is_valid());
        assert!(!incoming.has_changes());
    }

    #[test]
    fn test_bits_past_slot_count_are_malformed() {
        let mut writer = ByteWriter::new(BinaryFormat::Bincode);
        let mut len = 1u32;
        let mut bits = vec![0xFFu8];
        assert!(writer.serialize_u32(&mut len, "slotCount"));
        assert!(writer.serialize_bytes(&mut bits, "dirtyBits"));

        let mut incoming = ReplicationRecord::new(NetEntityRole::Client);
        let mut reader = ByteReader::new(BinaryFormat::Bincode, writer.into_bytes());
        assert!(!incoming.serialize(&mut reader, 64));
        assert!(!reader.is_valid());
        assert!(!incoming.has_changes());
        assert!(!incoming.is_dirty(a2c(5)));
    }

    #[test]
    fn test_display_renders_bits() {
        let record = record_with(&[a2c(0), a2c(2)]);
        assert_eq!(record.to_string(), "Server: 101 - -");
    }
}
