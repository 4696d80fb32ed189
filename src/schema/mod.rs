pub mod codec;
mod convert;
pub mod registry;
pub mod wire;

pub use codec::{AvroDeserializer, AvroSerializer, CompositeDeserializer, Decoded, WireDeserializer};
pub use registry::{RegisteredSchema, SchemaRegistryClient};
