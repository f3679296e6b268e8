use serde::{de::DeserializeOwned, Serialize};

pub mod document;
pub mod document_chunk;
pub mod message;

/// A record persisted in its own Surreal table, keyed by a string id.
pub trait StoredObject: Serialize + DeserializeOwned {
    fn table_name() -> &'static str;
    fn get_id(&self) -> &str;
}

/// Serde helpers shared by the record types: Surreal returns record ids as
/// `Thing` values and datetimes in its own wire format, while the structs
/// keep plain `String` / `DateTime<Utc>` fields.
pub mod record {
    use std::fmt;

    use chrono::{DateTime, Utc};
    use serde::{
        de::{self, Visitor},
        Deserialize, Deserializer,
    };
    use surrealdb::sql::Thing;

    struct RawIdVisitor;

    impl<'de> Visitor<'de> for RawIdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a record Thing")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_owned())
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

        fn visit_enum<A>(self, access: A) -> Result<Self::Value, A::Error>
        where
            A: de::EnumAccess<'de>,
        {
            use de::VariantAccess;
            let (name, variant) = access.variant::<String>()?;
            match name.as_str() {
                "Thing" => variant.newtype_variant::<Thing>().map(|t| t.id.to_raw()),
                _ => variant.newtype_variant::<String>(),
            }
        }
    }

    pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(RawIdVisitor)
    }

    pub mod datetime {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            surrealdb::sql::Datetime::from(*date).serialize(serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let datetime = surrealdb::sql::Datetime::deserialize(deserializer)?;
            Ok(DateTime::<Utc>::from(datetime))
        }
    }

    /// Timestamp pair used when constructing a fresh record.
    pub fn now_pair() -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now, now)
    }
}
