//! Decoding component values from prototype configuration tables.
//!
//! Configuration goes through its own serde [`Deserializer`] over
//! [`toml::Value`] so that decode failures come back as a structured
//! [`FieldError`]: a missing required field is reported by name rather than
//! buried in a message string.

use std::fmt;

use serde::de::value::{MapDeserializer, SeqDeserializer, StringDeserializer};
use serde::de::{self, DeserializeOwned, IntoDeserializer, Visitor};
use serde::forward_to_deserialize_any;

/// Why a configuration table did not decode.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("missing field `{0}`")]
    Missing(&'static str),

    #[error("{0}")]
    Invalid(String),
}

impl FieldError {
    /// An out-of-range or inconsistent tuning value.
    pub fn invalid(message: impl fmt::Display) -> Self {
        Self::Invalid(message.to_string())
    }
}

impl de::Error for FieldError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Invalid(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        Self::Missing(field)
    }
}

/// Decode `T` from a configuration value with plain serde rules.
///
/// # Errors
///
/// [`FieldError::Missing`] for an absent required field and
/// [`FieldError::Invalid`] for anything else serde rejects.
pub fn decode<T: DeserializeOwned>(value: toml::Value) -> Result<T, FieldError> {
    T::deserialize(ConfigValue(value))
}

/// A [`toml::Value`] viewed as a deserializer yielding [`FieldError`]s.
struct ConfigValue(toml::Value);

impl<'de> IntoDeserializer<'de, FieldError> for ConfigValue {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

impl<'de> de::Deserializer<'de> for ConfigValue {
    type Error = FieldError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FieldError> {
        match self.0 {
            toml::Value::String(s) => visitor.visit_string(s),
            toml::Value::Integer(i) => visitor.visit_i64(i),
            toml::Value::Float(f) => visitor.visit_f64(f),
            toml::Value::Boolean(b) => visitor.visit_bool(b),
            toml::Value::Datetime(dt) => visitor.visit_string(dt.to_string()),
            toml::Value::Array(items) => {
                let mut seq =
                    SeqDeserializer::<_, FieldError>::new(items.into_iter().map(ConfigValue));
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
            toml::Value::Table(table) => {
                let mut map = MapDeserializer::<_, FieldError>::new(
                    table.into_iter().map(|(key, value)| (key, ConfigValue(value))),
                );
                let value = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(value)
            }
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FieldError> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, FieldError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, FieldError> {
        match self.0 {
            toml::Value::String(variant) => {
                let variant: StringDeserializer<FieldError> = variant.into_deserializer();
                visitor.visit_enum(variant)
            }
            other => Err(FieldError::invalid(format_args!(
                "expected a variant name, found {}",
                other.type_str()
            ))),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, FieldError> {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "snake_case")]
    enum Style {
        Mouse,
        Wasd,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Barrel {
        pitch_max: f64,
        #[serde(default)]
        offset: Option<[f64; 3]>,
        style: Style,
    }

    fn table(source: &str) -> toml::Value {
        toml::Value::Table(toml::from_str(source).unwrap())
    }

    #[test]
    fn test_decode_table() {
        let barrel: Barrel = decode(table(
            "pitch_max = 60\noffset = [0.0, 1.0, 0.0]\nstyle = \"wasd\"\nextra = true",
        ))
        .unwrap();
        assert_eq!(
            barrel,
            Barrel {
                pitch_max: 60.0,
                offset: Some([0.0, 1.0, 0.0]),
                style: Style::Wasd,
            }
        );
    }

    #[test]
    fn test_missing_field_is_named() {
        let err = decode::<Barrel>(table("style = \"mouse\"")).unwrap_err();
        assert_eq!(err, FieldError::Missing("pitch_max"));
    }

    #[test]
    fn test_type_errors_are_invalid() {
        let err = decode::<Barrel>(table("pitch_max = \"high\"\nstyle = \"mouse\"")).unwrap_err();
        assert!(matches!(err, FieldError::Invalid(_)));

        let err = decode::<Barrel>(table("pitch_max = 1.0\nstyle = \"joystick\"")).unwrap_err();
        assert!(matches!(err, FieldError::Invalid(_)));
    }
}
