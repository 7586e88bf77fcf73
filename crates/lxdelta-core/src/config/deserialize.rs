use std::fmt;

use serde::Deserialize;

pub(super) const STRICT_STRING_ERROR: &str = "string value must be quoted";

/// Generates `visit_*` methods that reject non-string YAML scalars with
/// [`STRICT_STRING_ERROR`]. Use inside a `serde::de::Visitor` impl block.
macro_rules! reject_non_string_visits {
    ($out:ty) => {
        fn visit_bool<E: de::Error>(self, _v: bool) -> Result<$out, E> {
            Err(E::custom(STRICT_STRING_ERROR))
        }
        fn visit_i64<E: de::Error>(self, _v: i64) -> Result<$out, E> {
            Err(E::custom(STRICT_STRING_ERROR))
        }
        fn visit_u64<E: de::Error>(self, _v: u64) -> Result<$out, E> {
            Err(E::custom(STRICT_STRING_ERROR))
        }
        fn visit_f64<E: de::Error>(self, _v: f64) -> Result<$out, E> {
            Err(E::custom(STRICT_STRING_ERROR))
        }
        fn visit_unit<E: de::Error>(self) -> Result<$out, E> {
            Err(E::custom(STRICT_STRING_ERROR))
        }
    };
}

/// A string that refuses YAML's implicit scalars, so `- yes` in a hook list
/// or a container filter is an error instead of the command `true`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct StrictString(String);

impl StrictString {
    pub(super) fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for StrictString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de;

        struct StrictStringVisitor;

        impl<'de> de::Visitor<'de> for StrictStringVisitor {
            type Value = StrictString;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<StrictString, E> {
                Ok(StrictString(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<StrictString, E> {
                Ok(StrictString(v))
            }

            reject_non_string_visits!(StrictString);
        }

        deserializer.deserialize_any(StrictStringVisitor)
    }
}

pub(super) fn deserialize_strict_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    StrictString::deserialize(deserializer).map(StrictString::into_inner)
}

/// Durations may be written as `"90m"` or as a bare number of seconds.
pub(super) fn deserialize_duration_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct DurationVisitor;

    impl<'de> de::Visitor<'de> for DurationVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration string or integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_bool<E: de::Error>(self, _v: bool) -> Result<String, E> {
            Err(E::custom(STRICT_STRING_ERROR))
        }

        fn visit_f64<E: de::Error>(self, _v: f64) -> Result<String, E> {
            Err(E::custom(STRICT_STRING_ERROR))
        }

        fn visit_unit<E: de::Error>(self) -> Result<String, E> {
            Err(E::custom(STRICT_STRING_ERROR))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

/// Deserialize a YAML field that can be either a single string or a list of strings.
pub(super) fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrVec;

    impl<'de> de::Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Vec<String>, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Vec<String>, E> {
            Ok(vec![v])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<String>, A::Error> {
            let mut v = Vec::new();
            while let Some(s) = seq.next_element::<StrictString>()? {
                v.push(s.into_inner());
            }
            Ok(v)
        }

        reject_non_string_visits!(Vec<String>);
    }

    deserializer.deserialize_any(StringOrVec)
}
