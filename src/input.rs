use crate::error::Result;
use crate::protocol::NetComponentId;
use crate::serialization::{decode_value, encode_value, BinaryFormat};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub type ClientInputId = u16;
pub type HostFrameId = u32;

/// Input produced by one component's controller for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInput {
    pub component_id: NetComponentId,
    pub data: Bytes,
}

impl ComponentInput {
    pub fn new(component_id: NetComponentId) -> Self {
        Self {
            component_id,
            data: Bytes::new(),
        }
    }

    pub fn write<T: Serialize>(&mut self, format: BinaryFormat, value: &T) -> Result<()> {
        self.data = Bytes::from(encode_value(format, value)?);
        Ok(())
    }

    pub fn read<T: DeserializeOwned>(&self, format: BinaryFormat) -> Result<T> {
        decode_value(format, &self.data)
    }
}

/// All component inputs of one entity for one tick, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInput {
    pub client_input_id: ClientInputId,
    pub host_frame_id: HostFrameId,
    pub component_inputs: Vec<ComponentInput>,
}

impl NetworkInput {
    pub fn new(client_input_id: ClientInputId, host_frame_id: HostFrameId) -> Self {
        Self {
            client_input_id,
            host_frame_id,
            component_inputs: Vec::new(),
        }
    }

    pub fn with_component_inputs(mut self, component_inputs: Vec<ComponentInput>) -> Self {
        self.component_inputs = component_inputs;
        self
    }

    pub fn component_input(&self, component_id: NetComponentId) -> Option<&ComponentInput> {
        self.component_inputs
            .iter()
            .find(|input| input.component_id == component_id)
    }

    pub fn component_input_mut(&mut self, component_id: NetComponentId) -> Option<&mut ComponentInput> {
        self.component_inputs
            .iter_mut()
            .find(|input| input.component_id == component_id)
    }
}

/// Axis-aligned bounds used to limit rewind queries for an input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    /// Bounds that contain nothing; adding any valid bounds replaces them.
    pub fn null() -> Self {
        Self {
            min: [f32::MAX; 3],
            max: [f32::MIN; 3],
        }
    }

    pub fn from_min_max(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    pub fn is_valid(&self) -> bool {
        (0..3).all(|axis| self.min[axis] <= self.max[axis])
    }

    pub fn add_aabb(&mut self, other: &Aabb) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(other.min[axis]);
            self.max[axis] = self.max[axis].max(other.max[axis]);
        }
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::null()
    }
}
