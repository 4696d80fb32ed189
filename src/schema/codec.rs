//! Typed serializers and deserializers over the wire envelope.
//!
//! An [`AvroSerializer`] maps a domain type to its JSON intermediate form,
//! encodes it as an Avro datum against the bound schema, and prepends the
//! wire envelope. An [`AvroDeserializer`] reverses the process for one bound
//! target type; a [`CompositeDeserializer`] fans incoming records out over an
//! ordered list of type-bound deserializers keyed by schema id.
//!
//! Decoding is strict: target types are expected to derive
//! `#[serde(deny_unknown_fields)]` so that payload fields with no counterpart
//! in the target type are rejected rather than dropped.

use super::registry::RegisteredSchema;
use super::{convert, wire};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// A decoded key or value, type-erased for dispatch.
pub struct Decoded(Box<dyn Any + Send>);

impl Decoded {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// Recovers the concrete type, failing with a descriptive error when the
    /// record was decoded into something else.
    pub fn downcast<T: 'static>(self) -> Result<T> {
        self.0.downcast::<T>().map(|v| *v).map_err(|_| Error::Downcast {
            expected: std::any::type_name::<T>(),
        })
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl std::fmt::Debug for Decoded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Decoded(..)")
    }
}

/// Serializes one domain type against one registered schema.
pub struct AvroSerializer<T> {
    schema: Arc<RegisteredSchema>,
    _marker: PhantomData<fn(&T)>,
}

impl<T> Clone for AvroSerializer<T> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize> AvroSerializer<T> {
    pub fn new(schema: Arc<RegisteredSchema>) -> Self {
        Self {
            schema,
            _marker: PhantomData,
        }
    }

    pub fn schema(&self) -> &RegisteredSchema {
        &self.schema
    }

    /// Domain type → JSON intermediate → Avro datum → enveloped bytes.
    pub fn serialize(&self, value: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_value(value)?;
        let avro = convert::json_to_avro(&json, &self.schema.schema)?;
        let datum = apache_avro::to_avro_datum(&self.schema.schema, avro)?;
        Ok(wire::encode(self.schema.id, &datum))
    }
}

/// Deserializes records carrying one specific schema id into one target type.
pub struct AvroDeserializer<T> {
    schema: Arc<RegisteredSchema>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for AvroDeserializer<T> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> AvroDeserializer<T> {
    pub fn new(schema: Arc<RegisteredSchema>) -> Self {
        Self {
            schema,
            _marker: PhantomData,
        }
    }

    pub fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        let (schema_id, payload) = wire::decode(bytes)?;
        if schema_id != self.schema.id {
            return Err(Error::NoHandler { schema_id });
        }
        let mut reader = payload;
        let avro = apache_avro::from_avro_datum(&self.schema.schema, &mut reader, None)?;
        let json = convert::avro_to_json(&avro)?;
        Ok(serde_json::from_value(json)?)
    }
}

/// One type-bound deserializer inside a [`CompositeDeserializer`].
pub trait WireDeserializer: Send + Sync {
    /// Whether this deserializer decodes records carrying `schema_id`.
    fn handles(&self, schema_id: u32) -> bool;

    /// Decodes the enveloped record into a type-erased value.
    fn deserialize_erased(&self, bytes: &[u8]) -> Result<Decoded>;
}

impl<T> WireDeserializer for AvroDeserializer<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn handles(&self, schema_id: u32) -> bool {
        schema_id == self.schema.id
    }

    fn deserialize_erased(&self, bytes: &[u8]) -> Result<Decoded> {
        Ok(Decoded::new(self.deserialize(bytes)?))
    }
}

/// Dispatches records over an ordered list of type-bound deserializers.
///
/// The list is scanned in registration order and the first deserializer
/// whose `handles` accepts the record's schema id wins. A record no
/// deserializer accepts fails with [`Error::NoHandler`]; there is no partial
/// or default decoding.
#[derive(Default)]
pub struct CompositeDeserializer {
    handlers: Vec<Box<dyn WireDeserializer>>,
}

impl CompositeDeserializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl WireDeserializer + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn push(&mut self, handler: impl WireDeserializer + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn deserialize(&self, bytes: &[u8]) -> Result<Decoded> {
        let schema_id = wire::schema_id(bytes)?;
        self.handlers
            .iter()
            .find(|h| h.handles(schema_id))
            .ok_or(Error::NoHandler { schema_id })?
            .deserialize_erased(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const EVENT_SCHEMA: &str = r#"{
        "type": "record",
        "name": "FileCreated",
        "fields": [
            {"name": "identifier", "type": "string"},
            {"name": "path", "type": "string"},
            {"name": "size", "type": "long"}
        ]
    }"#;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct FileCreated {
        identifier: String,
        path: String,
        size: i64,
    }

    fn registered(id: u32, definition: &str) -> Arc<RegisteredSchema> {
        Arc::new(RegisteredSchema {
            id,
            version: 1,
            definition: definition.to_string(),
            schema: apache_avro::Schema::parse_str(definition).unwrap(),
        })
    }

    fn sample() -> FileCreated {
        FileCreated {
            identifier: "3f1c".to_string(),
            path: "/images/users/3f1c/picture".to_string(),
            size: 2048,
        }
    }

    #[test]
    fn serialize_then_deserialize_round_trips() {
        let schema = registered(9, EVENT_SCHEMA);
        let serializer = AvroSerializer::<FileCreated>::new(Arc::clone(&schema));
        let deserializer = AvroDeserializer::<FileCreated>::new(schema);

        let bytes = serializer.serialize(&sample()).unwrap();
        let decoded = deserializer.deserialize(&bytes).unwrap();

        assert_eq!(decoded, sample());
    }

    #[test]
    fn serialized_records_carry_the_envelope() {
        let schema = registered(0x0a0b0c0d, EVENT_SCHEMA);
        let serializer = AvroSerializer::<FileCreated>::new(schema);

        let bytes = serializer.serialize(&sample()).unwrap();

        assert_eq!(bytes[0], 0x00);
        assert_eq!(&bytes[1..5], &[0x0a, 0x0b, 0x0c, 0x0d]);
        assert!(bytes.len() > wire::ENVELOPE_LEN);
    }

    #[test]
    fn bound_deserializer_rejects_other_schema_ids() {
        let serializer = AvroSerializer::<FileCreated>::new(registered(1, EVENT_SCHEMA));
        let deserializer = AvroDeserializer::<FileCreated>::new(registered(2, EVENT_SCHEMA));

        let bytes = serializer.serialize(&sample()).unwrap();
        let err = deserializer.deserialize(&bytes).unwrap_err();

        assert!(matches!(err, Error::NoHandler { schema_id: 1 }));
    }

    #[test]
    fn decoding_rejects_fields_absent_from_the_target_type() {
        #[derive(Debug, Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Narrow {
            #[allow(dead_code)]
            identifier: String,
        }

        let schema = registered(3, EVENT_SCHEMA);
        let serializer = AvroSerializer::<FileCreated>::new(Arc::clone(&schema));
        let deserializer = AvroDeserializer::<Narrow>::new(schema);

        let bytes = serializer.serialize(&sample()).unwrap();
        let err = deserializer.deserialize(&bytes).unwrap_err();

        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn serializing_a_value_with_unknown_fields_fails() {
        #[derive(Serialize)]
        struct Wide {
            identifier: String,
            path: String,
            size: i64,
            checksum: String,
        }

        let serializer = AvroSerializer::<Wide>::new(registered(4, EVENT_SCHEMA));
        let err = serializer
            .serialize(&Wide {
                identifier: "x".into(),
                path: "/p".into(),
                size: 1,
                checksum: "abc".into(),
            })
            .unwrap_err();

        assert!(matches!(err, Error::SchemaConformance { .. }));
    }

    #[test]
    fn composite_routes_to_the_matching_deserializer() {
        const OTHER_SCHEMA: &str = r#"{
            "type": "record",
            "name": "FileDeleted",
            "fields": [{"name": "identifier", "type": "string"}]
        }"#;

        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(deny_unknown_fields)]
        struct FileDeleted {
            identifier: String,
        }

        let composite = CompositeDeserializer::new()
            .with(AvroDeserializer::<FileCreated>::new(registered(1, EVENT_SCHEMA)))
            .with(AvroDeserializer::<FileDeleted>::new(registered(2, OTHER_SCHEMA)));

        let serializer = AvroSerializer::<FileDeleted>::new(registered(2, OTHER_SCHEMA));
        let bytes = serializer
            .serialize(&FileDeleted {
                identifier: "d-7".to_string(),
            })
            .unwrap();

        let decoded = composite.deserialize(&bytes).unwrap();
        assert!(decoded.is::<FileDeleted>());
        let value: FileDeleted = decoded.downcast().unwrap();
        assert_eq!(value.identifier, "d-7");
    }

    #[test]
    fn composite_without_matching_handler_fails() {
        let composite = CompositeDeserializer::new()
            .with(AvroDeserializer::<FileCreated>::new(registered(1, EVENT_SCHEMA)));

        let serializer = AvroSerializer::<FileCreated>::new(registered(99, EVENT_SCHEMA));
        let bytes = serializer.serialize(&sample()).unwrap();

        let err = composite.deserialize(&bytes).unwrap_err();
        assert!(matches!(err, Error::NoHandler { schema_id: 99 }));
        assert_eq!(err.to_string(), "No handler for schema id 99");
    }

    #[test]
    fn downcast_to_wrong_type_fails() {
        let decoded = Decoded::new(sample());
        let err = decoded.downcast::<String>().unwrap_err();
        assert!(matches!(err, Error::Downcast { .. }));
    }
}
