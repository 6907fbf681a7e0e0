use crate::error::{BindError, Result};
use crate::input::NetworkInput;
use crate::protocol::{NetworkEntityRpcMessage, NetworkEntityUpdateMessage};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Direction of a serializer pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerMode {
    /// Values are read out of local objects and written to the stream.
    ReadFromObject,
    /// Values are read from the stream and written into local objects.
    WriteToObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFormat {
    Json,
    MessagePack,
    Bincode,
}

/// Bidirectional serializer consumed by records and properties. The same
/// call sequence writes in one mode and reads in the other; a failed read
/// leaves the serializer invalid for the remainder of the pass.
pub trait Serializer {
    fn mode(&self) -> SerializerMode;
    fn format(&self) -> BinaryFormat;
    fn is_valid(&self) -> bool;
    fn invalidate(&mut self);
    fn serialize_u32(&mut self, value: &mut u32, name: &'static str) -> bool;
    fn serialize_bool(&mut self, value: &mut bool, name: &'static str) -> bool;
    fn serialize_bytes(&mut self, value: &mut Vec<u8>, name: &'static str) -> bool;

    /// Starts a read pass that decodes values without applying them, saving
    /// the read position. Returns false if the serializer cannot replay.
    fn begin_validation(&mut self) -> bool {
        false
    }

    /// Ends a validation pass and restores the saved read position.
    fn end_validation(&mut self) {}

    fn is_validating(&self) -> bool {
        false
    }
}

pub fn encode_value<T: Serialize>(format: BinaryFormat, value: &T) -> Result<Vec<u8>> {
    match format {
        BinaryFormat::Json => Ok(serde_json::to_vec(value)?),
        BinaryFormat::MessagePack => Ok(rmp_serde::to_vec(value)?),
        BinaryFormat::Bincode => Ok(bincode::serialize(value)?),
    }
}

pub fn decode_value<T: DeserializeOwned>(format: BinaryFormat, data: &[u8]) -> Result<T> {
    match format {
        BinaryFormat::Json => Ok(serde_json::from_slice(data)?),
        BinaryFormat::MessagePack => Ok(rmp_serde::from_slice(data)?),
        BinaryFormat::Bincode => Ok(bincode::deserialize(data)?),
    }
}

/// Moves a serde value through `serializer` as a length-prefixed blob.
pub fn serialize_value<T: Serialize + DeserializeOwned>(
    serializer: &mut dyn Serializer,
    value: &mut T,
    name: &'static str,
) -> bool {
    let format = serializer.format();
    match serializer.mode() {
        SerializerMode::ReadFromObject => match encode_value(format, value) {
            Ok(mut data) => serializer.serialize_bytes(&mut data, name),
            Err(e) => {
                log::warn!("Failed to encode {}: {}", name, e);
                serializer.invalidate();
                false
            }
        },
        SerializerMode::WriteToObject => {
            let mut data = Vec::new();
            if !serializer.serialize_bytes(&mut data, name) {
                return false;
            }
            match decode_value::<T>(format, &data) {
                Ok(decoded) => {
                    if !serializer.is_validating() {
                        *value = decoded;
                    }
                    true
                }
                Err(e) => {
                    log::warn!("Failed to decode {}: {}", name, e);
                    serializer.invalidate();
                    false
                }
            }
        }
    }
}

/// Writes into a growable buffer.
pub struct ByteWriter {
    format: BinaryFormat,
    buffer: BytesMut,
    valid: bool,
}

impl ByteWriter {
    pub fn new(format: BinaryFormat) -> Self {
        Self {
            format,
            buffer: BytesMut::with_capacity(256),
            valid: true,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }
}

impl Serializer for ByteWriter {
    fn mode(&self) -> SerializerMode {
        SerializerMode::ReadFromObject
    }

    fn format(&self) -> BinaryFormat {
        self.format
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn invalidate(&mut self) {
        self.valid = false;
    }

    fn serialize_u32(&mut self, value: &mut u32, _name: &'static str) -> bool {
        if !self.valid {
            return false;
        }
        self.buffer.put_u32_le(*value);
        true
    }

    fn serialize_bool(&mut self, value: &mut bool, _name: &'static str) -> bool {
        if !self.valid {
            return false;
        }
        self.buffer.put_u8(u8::from(*value));
        true
    }

    fn serialize_bytes(&mut self, value: &mut Vec<u8>, _name: &'static str) -> bool {
        if !self.valid {
            return false;
        }
        self.buffer.put_u32_le(value.len() as u32);
        self.buffer.put_slice(value);
        true
    }
}

/// Reads from a received buffer. Running out of data invalidates the reader.
pub struct ByteReader {
    format: BinaryFormat,
    data: Bytes,
    valid: bool,
    checkpoint: Option<Bytes>,
}

impl ByteReader {
    pub fn new(format: BinaryFormat, data: Bytes) -> Self {
        Self {
            format,
            data,
            valid: true,
            checkpoint: None,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    fn ensure(&mut self, needed: usize, name: &'static str) -> bool {
        if !self.valid {
            return false;
        }
        if self.data.remaining() < needed {
            log::trace!("Read of {} needs {} bytes, {} left", name, needed, self.data.remaining());
            self.valid = false;
            return false;
        }
        true
    }
}

impl Serializer for ByteReader {
    fn mode(&self) -> SerializerMode {
        SerializerMode::WriteToObject
    }

    fn format(&self) -> BinaryFormat {
        self.format
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn invalidate(&mut self) {
        self.valid = false;
    }

    fn serialize_u32(&mut self, value: &mut u32, name: &'static str) -> bool {
        if !self.ensure(4, name) {
            return false;
        }
        *value = self.data.get_u32_le();
        true
    }

    fn serialize_bool(&mut self, value: &mut bool, name: &'static str) -> bool {
        if !self.ensure(1, name) {
            return false;
        }
        match self.data.get_u8() {
            0 => *value = false,
            1 => *value = true,
            _ => {
                self.valid = false;
                return false;
            }
        }
        true
    }

    fn serialize_bytes(&mut self, value: &mut Vec<u8>, name: &'static str) -> bool {
        if !self.ensure(4, name) {
            return false;
        }
        let len = self.data.get_u32_le() as usize;
        if !self.ensure(len, name) {
            return false;
        }
        *value = self.data.copy_to_bytes(len).to_vec();
        true
    }

    fn begin_validation(&mut self) -> bool {
        self.checkpoint = Some(self.data.clone());
        true
    }

    fn end_validation(&mut self) {
        if let Some(data) = self.checkpoint.take() {
            self.data = data;
        }
    }

    fn is_validating(&self) -> bool {
        self.checkpoint.is_some()
    }
}

/// Encodes whole messages for the transport.
pub struct MessageCodec {
    format: BinaryFormat,
}

impl MessageCodec {
    pub fn new(format: BinaryFormat) -> Self {
        Self { format }
    }

    pub fn json() -> Self {
        Self::new(BinaryFormat::Json)
    }

    pub fn messagepack() -> Self {
        Self::new(BinaryFormat::MessagePack)
    }

    pub fn bincode() -> Self {
        Self::new(BinaryFormat::Bincode)
    }

    pub fn get_format(&self) -> BinaryFormat {
        self.format
    }

    pub fn serialize_update(&self, message: &NetworkEntityUpdateMessage) -> Result<Bytes> {
        encode_value(self.format, message).map(Bytes::from)
    }

    pub fn deserialize_update(&self, data: &[u8]) -> Result<NetworkEntityUpdateMessage> {
        decode_value(self.format, data)
    }

    pub fn serialize_rpc(&self, message: &NetworkEntityRpcMessage) -> Result<Bytes> {
        encode_value(self.format, message).map(Bytes::from)
    }

    pub fn deserialize_rpc(&self, data: &[u8]) -> Result<NetworkEntityRpcMessage> {
        decode_value(self.format, data)
    }

    pub fn serialize_input(&self, input: &NetworkInput) -> Result<Bytes> {
        encode_value(self.format, input).map(Bytes::from)
    }

    pub fn deserialize_input(&self, data: &[u8]) -> Result<NetworkInput> {
        decode_value(self.format, data).map_err(|e| BindError::Decode(format!("network input: {}", e)))
    }
}
