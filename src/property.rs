use crate::protocol::NetComponentId;
use crate::record::{RecordSlot, ReplicationDirection, ReplicationRecord};
use crate::serialization::{decode_value, encode_value, Serializer, SerializerMode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Whether the receiving role may predict a property locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predictability {
    Unpredictable,
    Predictable,
}

/// Hands out record slots while components attach to an entity.
///
/// Slots are allocated per direction in component serialization order, so two
/// hosts attaching the same component set arrive at the same layout.
pub struct PropertyRegistrar<'a> {
    component_id: NetComponentId,
    next_index: &'a mut [u16; 3],
    current: &'a mut ReplicationRecord,
    predictable: &'a mut ReplicationRecord,
}

impl<'a> PropertyRegistrar<'a> {
    pub(crate) fn new(
        component_id: NetComponentId,
        next_index: &'a mut [u16; 3],
        current: &'a mut ReplicationRecord,
        predictable: &'a mut ReplicationRecord,
    ) -> Self {
        Self {
            component_id,
            next_index,
            current,
            predictable,
        }
    }

    pub fn component_id(&self) -> NetComponentId {
        self.component_id
    }

    pub fn add_property(
        &mut self,
        direction: ReplicationDirection,
        predictability: Predictability,
    ) -> RecordSlot {
        let counter = &mut self.next_index[direction as usize];
        let slot = RecordSlot::new(direction, *counter);
        *counter += 1;

        if predictability == Predictability::Predictable {
            self.predictable.mark_dirty(slot);
        }
        log::trace!(
            "Component {} attached {:?} property at {}",
            self.component_id,
            predictability,
            slot
        );
        slot
    }

    /// Marks an attached slot dirty so its initial value joins the baseline.
    pub fn mark_dirty(&mut self, slot: RecordSlot) {
        self.current.mark_dirty(slot);
    }
}

/// A replicated value bound to one record slot.
#[derive(Debug, Clone)]
pub struct NetworkProperty<T> {
    value: T,
    slot: Option<RecordSlot>,
}

impl<T> NetworkProperty<T>
where
    T: Serialize + DeserializeOwned + PartialEq,
{
    pub fn new(value: T) -> Self {
        Self { value, slot: None }
    }

    /// Binds the property to a fresh slot and marks it dirty. Attaching twice
    /// is a contract violation.
    pub fn attach(
        &mut self,
        registrar: &mut PropertyRegistrar<'_>,
        direction: ReplicationDirection,
        predictability: Predictability,
    ) -> RecordSlot {
        assert!(self.slot.is_none(), "Network property attached twice");
        let slot = registrar.add_property(direction, predictability);
        registrar.mark_dirty(slot);
        self.slot = Some(slot);
        slot
    }

    pub fn slot(&self) -> Option<RecordSlot> {
        self.slot
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Stores `value`, marking the slot dirty in `record` when it differs.
    pub fn set(&mut self, value: T, record: &mut ReplicationRecord) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        if let Some(slot) = self.slot {
            record.mark_dirty(slot);
        }
        true
    }

    /// Consumes the slot's bit in a notification pass.
    pub fn changed(&self, record: &mut ReplicationRecord) -> bool {
        self.slot.map(|slot| record.consume(slot)).unwrap_or(false)
    }

    /// Writes the value if its slot is dirty in `record`, or reads it back.
    /// A received value byte-identical to the local one is not applied and
    /// its bit is cleared from `record`. A validation pass decodes without
    /// touching the value or `record`'s dirty bits.
    pub fn serialize(
        &mut self,
        record: &mut ReplicationRecord,
        serializer: &mut dyn Serializer,
        name: &'static str,
    ) -> bool {
        let Some(slot) = self.slot else {
            return true;
        };
        if !record.consume(slot) {
            return serializer.is_valid();
        }

        let format = serializer.format();
        let local = match encode_value(format, &self.value) {
            Ok(local) => local,
            Err(e) => {
                log::warn!("Failed to encode property {}: {}", name, e);
                serializer.invalidate();
                return false;
            }
        };

        match serializer.mode() {
            SerializerMode::ReadFromObject => {
                let mut data = local;
                serializer.serialize_bytes(&mut data, name)
            }
            SerializerMode::WriteToObject => {
                let mut data = Vec::new();
                if !serializer.serialize_bytes(&mut data, name) {
                    return false;
                }
                let validating = serializer.is_validating();
                if data == local {
                    if !validating {
                        record.clear_dirty(slot);
                    }
                    return true;
                }
                match decode_value(format, &data) {
                    Ok(value) => {
                        if !validating {
                            self.value = value;
                        }
                        true
                    }
                    Err(e) => {
                        log::warn!("Failed to decode property {}: {}", name, e);
                        serializer.invalidate();
                        false
                    }
                }
            }
        }
    }
}

impl<T: Default + Serialize + DeserializeOwned + PartialEq> Default for NetworkProperty<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::NetEntityRole;
    use crate::serialization::{BinaryFormat, ByteReader, ByteWriter};

    struct Layout {
        next: [u16; 3],
        current: ReplicationRecord,
        predictable: ReplicationRecord,
    }

    impl Layout {
        fn new() -> Self {
            Self {
                next: [0; 3],
                current: ReplicationRecord::new(NetEntityRole::Server),
                predictable: ReplicationRecord::new(NetEntityRole::Autonomous),
            }
        }

        fn registrar(&mut self, component_id: NetComponentId) -> PropertyRegistrar<'_> {
            PropertyRegistrar::new(component_id, &mut self.next, &mut self.current, &mut self.predictable)
        }
    }

    #[test]
    fn test_slots_are_positional_per_direction() {
        let mut layout = Layout::new();
        let mut a = NetworkProperty::new(0u32);
        let mut b = NetworkProperty::new(0u32);
        let mut c = NetworkProperty::new(0u32);

        let slot_a = a.attach(&mut layout.registrar(1), ReplicationDirection::AuthorityToClient, Predictability::Unpredictable);
        let slot_b = b.attach(&mut layout.registrar(2), ReplicationDirection::AuthorityToAutonomous, Predictability::Predictable);
        let slot_c = c.attach(&mut layout.registrar(2), ReplicationDirection::AuthorityToClient, Predictability::Unpredictable);

        assert_eq!(slot_a, RecordSlot::new(ReplicationDirection::AuthorityToClient, 0));
        assert_eq!(slot_b, RecordSlot::new(ReplicationDirection::AuthorityToAutonomous, 0));
        assert_eq!(slot_c, RecordSlot::new(ReplicationDirection::AuthorityToClient, 1));
        assert!(layout.predictable.is_dirty(slot_b));
        assert!(!layout.predictable.is_dirty(slot_a));
        assert_eq!(layout.current.dirty_count(), 3);
    }

    #[test]
    fn test_set_marks_only_real_changes() {
        let mut layout = Layout::new();
        let mut speed = NetworkProperty::new(5.0f32);
        let slot = speed.attach(&mut layout.registrar(1), ReplicationDirection::AuthorityToClient, Predictability::Unpredictable);

        let mut record = ReplicationRecord::new(NetEntityRole::Server);
        assert!(!speed.set(5.0, &mut record));
        assert!(!record.is_dirty(slot));
        assert!(speed.set(7.5, &mut record));
        assert!(record.is_dirty(slot));
    }

    #[test]
    fn test_identical_value_is_reconciled_away() {
        let mut layout = Layout::new();
        let mut sender = NetworkProperty::new(String::from("idle"));
        let slot = sender.attach(&mut layout.registrar(1), ReplicationDirection::AuthorityToClient, Predictability::Unpredictable);

        let mut outgoing = ReplicationRecord::new(NetEntityRole::Client);
        outgoing.mark_dirty(slot);
        let mut writer = ByteWriter::new(BinaryFormat::Bincode);
        assert!(sender.serialize(&mut outgoing, &mut writer, "state"));

        let mut receiver_layout = Layout::new();
        let mut receiver = NetworkProperty::new(String::from("idle"));
        receiver.attach(&mut receiver_layout.registrar(1), ReplicationDirection::AuthorityToClient, Predictability::Unpredictable);

        let mut incoming = ReplicationRecord::new(NetEntityRole::Client);
        incoming.mark_dirty(slot);
        let mut reader = ByteReader::new(BinaryFormat::Bincode, writer.into_bytes());
        assert!(receiver.serialize(&mut incoming, &mut reader, "state"));

        assert!(!incoming.is_dirty(slot));
        incoming.reset_consumed_bits();
        assert!(!receiver.changed(&mut incoming));
    }

    #[test]
    fn test_different_value_is_applied() {
        let mut layout = Layout::new();
        let mut sender = NetworkProperty::new(11i64);
        let slot = sender.attach(&mut layout.registrar(1), ReplicationDirection::AuthorityToClient, Predictability::Unpredictable);

        let mut outgoing = ReplicationRecord::new(NetEntityRole::Client);
        outgoing.mark_dirty(slot);
        let mut writer = ByteWriter::new(BinaryFormat::MessagePack);
        assert!(sender.serialize(&mut outgoing, &mut writer, "ammo"));

        let mut receiver_layout = Layout::new();
        let mut receiver = NetworkProperty::new(3i64);
        receiver.attach(&mut receiver_layout.registrar(1), ReplicationDirection::AuthorityToClient, Predictability::Unpredictable);

        let mut incoming = ReplicationRecord::new(NetEntityRole::Client);
        incoming.mark_dirty(slot);
        let mut reader = ByteReader::new(BinaryFormat::MessagePack, writer.into_bytes());
        assert!(receiver.serialize(&mut incoming, &mut reader, "ammo"));

        assert_eq!(*receiver.get(), 11);
        incoming.reset_consumed_bits();
        assert!(receiver.changed(&mut incoming));
    }

    #[test]
    fn test_validation_pass_keeps_value_and_bits() {
        let mut layout = Layout::new();
        let mut sender = NetworkProperty::new(11i64);
        let slot = sender.attach(&mut layout.registrar(1), ReplicationDirection::AuthorityToClient, Predictability::Unpredictable);

        let mut outgoing = ReplicationRecord::new(NetEntityRole::Client);
        outgoing.mark_dirty(slot);
        let mut writer = ByteWriter::new(BinaryFormat::Bincode);
        assert!(sender.serialize(&mut outgoing, &mut writer, "ammo"));

        let mut receiver_layout = Layout::new();
        let mut receiver = NetworkProperty::new(3i64);
        receiver.attach(&mut receiver_layout.registrar(1), ReplicationDirection::AuthorityToClient, Predictability::Unpredictable);

        let mut incoming = ReplicationRecord::new(NetEntityRole::Client);
        incoming.mark_dirty(slot);
        let mut reader = ByteReader::new(BinaryFormat::Bincode, writer.into_bytes());
        assert!(reader.begin_validation());
        assert!(receiver.serialize(&mut incoming, &mut reader, "ammo"));
        reader.end_validation();

        assert_eq!(*receiver.get(), 3);
        assert!(incoming.is_dirty(slot));
    }

    #[test]
    fn test_clean_slot_is_skipped() {
        let mut layout = Layout::new();
        let mut property = NetworkProperty::new(1u8);
        property.attach(&mut layout.registrar(1), ReplicationDirection::AuthorityToClient, Predictability::Unpredictable);

        let mut record = ReplicationRecord::new(NetEntityRole::Client);
        let mut writer = ByteWriter::new(BinaryFormat::Bincode);
        assert!(property.serialize(&mut record, &mut writer, "flag"));
        assert!(writer.is_empty());
    }

    #[test]
    #[should_panic(expected = "attached twice")]
    fn test_double_attach_is_fatal() {
        let mut layout = Layout::new();
        let mut property = NetworkProperty::new(1u8);
        property.attach(&mut layout.registrar(1), ReplicationDirection::AuthorityToClient, Predictability::Unpredictable);
        property.attach(&mut layout.registrar(1), ReplicationDirection::AuthorityToClient, Predictability::Unpredictable);
    }
}
