use serde::{Deserialize, Serialize};

pub mod document_chunk;

pub trait StoredObject: Serialize + for<'de> Deserialize<'de> {
    fn table_name() -> &'static str;
    fn get_id(&self) -> &str;
}

/// Serde adapters for SurrealDB record ids and datetimes.
///
/// SurrealDB hands record ids back as `Thing` maps and datetimes in its own
/// wire type; these helpers keep the stored structs on plain `String` ids and
/// `chrono` timestamps. Referenced by name from the `stored_object!` macro,
/// which imports them into the invoking module.
pub mod serde_helpers {
    use std::fmt;

    use chrono::{DateTime, Utc};
    use serde::de::{self, Visitor};
    use serde::{Deserialize, Deserializer, Serialize};
    use surrealdb::sql::Thing;

    struct FlexibleIdVisitor;

    impl<'de> Visitor<'de> for FlexibleIdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a Thing")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
        where
            A: de::MapAccess<'de>,
        {
            let thing = Thing::deserialize(de::value::MapAccessDeserializer::new(map))?;
            Ok(thing.id.to_raw())
        }
    }

    pub fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(FlexibleIdVisitor)
    }

    pub fn serialize_datetime<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Into::<surrealdb::sql::Datetime>::into(*date).serialize(serializer)
    }

    pub fn deserialize_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let dt = surrealdb::sql::Datetime::deserialize(deserializer)?;
        Ok(DateTime::<Utc>::from(dt))
    }
}

#[macro_export]
macro_rules! stored_object {
    ($name:ident, $table:expr, {$($(#[$attr:meta])* $field:ident: $ty:ty),*}) => {
        use $crate::storage::types::serde_helpers::{
            deserialize_datetime, deserialize_flexible_id, serialize_datetime,
        };
        use $crate::storage::types::StoredObject;

        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
        pub struct $name {
            #[serde(deserialize_with = "deserialize_flexible_id")]
            pub id: String,
            #[serde(
                serialize_with = "serialize_datetime",
                deserialize_with = "deserialize_datetime",
                default
            )]
            pub created_at: chrono::DateTime<chrono::Utc>,
            #[serde(
                serialize_with = "serialize_datetime",
                deserialize_with = "deserialize_datetime",
                default
            )]
            pub updated_at: chrono::DateTime<chrono::Utc>,
            $( $(#[$attr])* pub $field: $ty),*
        }

        impl $crate::storage::types::StoredObject for $name {
            fn table_name() -> &'static str {
                $table
            }

            fn get_id(&self) -> &str {
                &self.id
            }
        }
    };
}
