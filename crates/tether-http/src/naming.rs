//! Field-name casing for structured payloads
//!
//! The strategy describes the casing used on the wire. Rust types are declared
//! with snake_case field names, so serialization converts struct field names
//! to the wire casing and deserialization maps wire names back onto the
//! declared fields. Map keys and all values pass through untouched.

use heck::{ToLowerCamelCase, ToSnakeCase};
use serde::{
    de::{
        self,
        value::{MapDeserializer, SeqDeserializer, StringDeserializer},
        DeserializeOwned, DeserializeSeed, EnumAccess, IntoDeserializer, VariantAccess, Visitor,
    },
    forward_to_deserialize_any, ser, Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::{Map, Value};

use crate::error::{HttpError, Result};

type JsonResult<T> = std::result::Result<T, serde_json::Error>;

/// Naming strategies for different casings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingStrategy {
    /// Keys are left as declared
    None,
    /// lowerCamelCase
    #[default]
    Camel,
    /// snake_case
    Snake,
}

impl NamingStrategy {
    /// Convert a declared field name to its wire form
    pub fn to_wire(self, name: &str) -> String {
        match self {
            NamingStrategy::None => name.to_string(),
            NamingStrategy::Camel => {
                preserve_leading_underscores(name, |s| s.to_lower_camel_case())
            }
            NamingStrategy::Snake => preserve_leading_underscores(name, |s| s.to_snake_case()),
        }
    }

    /// Convert a wire field name back to its declared form
    pub fn to_native(self, name: &str) -> String {
        match self {
            NamingStrategy::None => name.to_string(),
            NamingStrategy::Camel | NamingStrategy::Snake => {
                preserve_leading_underscores(name, |s| s.to_snake_case())
            }
        }
    }

    /// Serialize `value` to JSON bytes with struct fields in wire casing
    pub fn serialize<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        let tree = value
            .serialize(WireSerializer(self))
            .map_err(HttpError::Serialization)?;
        serde_json::to_vec(&tree).map_err(HttpError::Serialization)
    }

    /// Deserialize JSON bytes whose struct fields use wire casing
    pub fn deserialize<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        let value: Value = serde_json::from_slice(bytes).map_err(HttpError::Deserialization)?;
        T::deserialize(WireValue {
            value,
            naming: self,
        })
        .map_err(HttpError::Deserialization)
    }

    /// Pick the declared field a wire key belongs to; unknown keys are kept
    fn native_field(self, key: String, fields: &'static [&'static str]) -> String {
        if fields.iter().any(|field| *field == key) {
            return key;
        }
        let native = self.to_native(&key);
        fields
            .iter()
            .find(|field| self.to_wire(field) == key || **field == native)
            .map(|field| field.to_string())
            .unwrap_or(key)
    }
}

fn preserve_leading_underscores(name: &str, convert: impl Fn(&str) -> String) -> String {
    let trimmed = name.trim_start_matches('_');
    let prefix = &name[..name.len() - trimmed.len()];
    if trimmed.is_empty() {
        return name.to_string();
    }
    format!("{prefix}{}", convert(trimmed))
}

fn tagged(variant: Option<&'static str>, value: Value) -> Value {
    match variant {
        Some(variant) => {
            let mut map = Map::new();
            map.insert(variant.to_string(), value);
            Value::Object(map)
        }
        None => value,
    }
}

/// Builds a JSON tree, renaming struct fields on the way down
#[derive(Clone, Copy)]
struct WireSerializer(NamingStrategy);

macro_rules! forward_to_value_serializer {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method(self, v: $ty) -> JsonResult<Value> {
                serde_json::value::Serializer.$method(v)
            }
        )*
    };
}

impl Serializer for WireSerializer {
    type Ok = Value;
    type Error = serde_json::Error;
    type SerializeSeq = WireSeq;
    type SerializeTuple = WireSeq;
    type SerializeTupleStruct = WireSeq;
    type SerializeTupleVariant = WireSeq;
    type SerializeMap = WireMap;
    type SerializeStruct = WireStruct;
    type SerializeStructVariant = WireStruct;

    forward_to_value_serializer! {
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_i128(i128),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_u128(u128),
        serialize_f32(f32),
        serialize_f64(f64),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
    }

    fn serialize_none(self) -> JsonResult<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> JsonResult<Value> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> JsonResult<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> JsonResult<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> JsonResult<Value> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> JsonResult<Value> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> JsonResult<Value> {
        Ok(tagged(Some(variant), value.serialize(self)?))
    }

    fn serialize_seq(self, len: Option<usize>) -> JsonResult<WireSeq> {
        Ok(WireSeq {
            naming: self.0,
            variant: None,
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> JsonResult<WireSeq> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> JsonResult<WireSeq> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> JsonResult<WireSeq> {
        Ok(WireSeq {
            naming: self.0,
            variant: Some(variant),
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> JsonResult<WireMap> {
        Ok(WireMap {
            naming: self.0,
            entries: Map::new(),
            next_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> JsonResult<WireStruct> {
        Ok(WireStruct {
            naming: self.0,
            variant: None,
            fields: Map::new(),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> JsonResult<WireStruct> {
        Ok(WireStruct {
            naming: self.0,
            variant: Some(variant),
            fields: Map::new(),
        })
    }
}

struct WireSeq {
    naming: NamingStrategy,
    variant: Option<&'static str>,
    items: Vec<Value>,
}

impl WireSeq {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> JsonResult<()> {
        self.items.push(value.serialize(WireSerializer(self.naming))?);
        Ok(())
    }

    fn finish(self) -> JsonResult<Value> {
        Ok(tagged(self.variant, Value::Array(self.items)))
    }
}

impl ser::SerializeSeq for WireSeq {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> JsonResult<()> {
        self.push(value)
    }

    fn end(self) -> JsonResult<Value> {
        self.finish()
    }
}

impl ser::SerializeTuple for WireSeq {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> JsonResult<()> {
        self.push(value)
    }

    fn end(self) -> JsonResult<Value> {
        self.finish()
    }
}

impl ser::SerializeTupleStruct for WireSeq {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> JsonResult<()> {
        self.push(value)
    }

    fn end(self) -> JsonResult<Value> {
        self.finish()
    }
}

impl ser::SerializeTupleVariant for WireSeq {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> JsonResult<()> {
        self.push(value)
    }

    fn end(self) -> JsonResult<Value> {
        self.finish()
    }
}

/// Map entries keep their keys verbatim
struct WireMap {
    naming: NamingStrategy,
    entries: Map<String, Value>,
    next_key: Option<String>,
}

impl ser::SerializeMap for WireMap {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> JsonResult<()> {
        let key = match key.serialize(WireSerializer(self.naming))? {
            Value::String(key) => key,
            Value::Number(key) => key.to_string(),
            Value::Bool(key) => key.to_string(),
            _ => return Err(ser::Error::custom("map key must be a string")),
        };
        self.next_key = Some(key);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> JsonResult<()> {
        let Some(key) = self.next_key.take() else {
            return Err(ser::Error::custom("map value serialized before its key"));
        };
        self.entries
            .insert(key, value.serialize(WireSerializer(self.naming))?);
        Ok(())
    }

    fn end(self) -> JsonResult<Value> {
        Ok(Value::Object(self.entries))
    }
}

struct WireStruct {
    naming: NamingStrategy,
    variant: Option<&'static str>,
    fields: Map<String, Value>,
}

impl WireStruct {
    fn field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> JsonResult<()> {
        let value = value.serialize(WireSerializer(self.naming))?;
        self.fields.insert(self.naming.to_wire(key), value);
        Ok(())
    }

    fn finish(self) -> JsonResult<Value> {
        Ok(tagged(self.variant, Value::Object(self.fields)))
    }
}

impl ser::SerializeStruct for WireStruct {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> JsonResult<()> {
        self.field(key, value)
    }

    fn end(self) -> JsonResult<Value> {
        self.finish()
    }
}

impl ser::SerializeStructVariant for WireStruct {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> JsonResult<()> {
        self.field(key, value)
    }

    fn end(self) -> JsonResult<Value> {
        self.finish()
    }
}

/// Parsed JSON tree that maps wire field names onto the fields a struct asks for
struct WireValue {
    value: Value,
    naming: NamingStrategy,
}

fn visit_array<'de, V: Visitor<'de>>(
    items: Vec<Value>,
    naming: NamingStrategy,
    visitor: V,
) -> JsonResult<V::Value> {
    let mut access: SeqDeserializer<_, serde_json::Error> =
        SeqDeserializer::new(items.into_iter().map(|value| WireValue { value, naming }));
    let visited = visitor.visit_seq(&mut access)?;
    access.end()?;
    Ok(visited)
}

fn visit_object<'de, V, I>(entries: I, naming: NamingStrategy, visitor: V) -> JsonResult<V::Value>
where
    V: Visitor<'de>,
    I: Iterator<Item = (String, Value)>,
{
    let mut access: MapDeserializer<'de, _, serde_json::Error> = MapDeserializer::new(
        entries.map(|(key, value)| (key, WireValue { value, naming })),
    );
    let visited = visitor.visit_map(&mut access)?;
    access.end()?;
    Ok(visited)
}

impl<'de> IntoDeserializer<'de, serde_json::Error> for WireValue {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

impl<'de> Deserializer<'de> for WireValue {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> JsonResult<V::Value> {
        match self.value {
            Value::Array(items) => visit_array(items, self.naming, visitor),
            Value::Object(entries) => visit_object(entries.into_iter(), self.naming, visitor),
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> JsonResult<V::Value> {
        if self.value.is_null() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> JsonResult<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> JsonResult<V::Value> {
        let naming = self.naming;
        match self.value {
            Value::Object(entries) => visit_object(
                entries
                    .into_iter()
                    .map(|(key, value)| (naming.native_field(key, fields), value)),
                naming,
                visitor,
            ),
            other => WireValue {
                value: other,
                naming,
            }
            .deserialize_any(visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> JsonResult<V::Value> {
        match self.value {
            Value::String(variant) => {
                visitor.visit_enum(StringDeserializer::<serde_json::Error>::new(variant))
            }
            Value::Object(entries) if entries.len() == 1 => {
                let Some((variant, content)) = entries.into_iter().next() else {
                    return Err(de::Error::invalid_length(0, &"map with a single key"));
                };
                visitor.visit_enum(WireEnum {
                    variant,
                    content: WireValue {
                        value: content,
                        naming: self.naming,
                    },
                })
            }
            other => other.deserialize_enum(name, variants, visitor),
        }
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map identifier ignored_any
    }
}

/// Externally tagged enum: `{"Variant": content}`
struct WireEnum {
    variant: String,
    content: WireValue,
}

impl<'de> EnumAccess<'de> for WireEnum {
    type Error = serde_json::Error;
    type Variant = WireValue;

    fn variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> JsonResult<(S::Value, WireValue)> {
        let variant = seed.deserialize(StringDeserializer::<serde_json::Error>::new(self.variant))?;
        Ok((variant, self.content))
    }
}

impl<'de> VariantAccess<'de> for WireValue {
    type Error = serde_json::Error;

    fn unit_variant(self) -> JsonResult<()> {
        <()>::deserialize(self)
    }

    fn newtype_variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> JsonResult<S::Value> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> JsonResult<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> JsonResult<V::Value> {
        self.deserialize_struct("", fields, visitor)
    }
}
