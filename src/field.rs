//! Field/Value model. The only component that touches raw
//! column types — every other component manipulates descriptors by variant,
//! never by string.

use rust_decimal::Decimal;

/// A tagged value. Numeric variants are kept distinct because they drive
/// both column-type selection in the Builder and parameter-binding choice.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Carries an optional declared precision alongside the numeric value.
    Decimal(Decimal, Option<u32>),
    String(String),
    Varchar(String),
    Text(String),
    Blob(Vec<u8>),
    /// 64-bit epoch.
    DateTime(i64),
}

impl FieldValue {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldValue::Int32(_)
                | FieldValue::Int64(_)
                | FieldValue::Float32(_)
                | FieldValue::Float64(_)
                | FieldValue::Decimal(_, _)
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self,
            FieldValue::String(_) | FieldValue::Varchar(_) | FieldValue::Text(_)
        )
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, FieldValue::Blob(_))
    }

    pub fn is_datetime(&self) -> bool {
        matches!(self, FieldValue::DateTime(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int32(v) => Some(*v as i64),
            FieldValue::Int64(v) => Some(*v),
            FieldValue::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float32(v) => Some(*v as f64),
            FieldValue::Float64(v) => Some(*v),
            FieldValue::Decimal(v, _) => v.to_string().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) | FieldValue::Varchar(s) | FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Parses a JSON scalar into the `FieldValue` variant implied by a
    /// declared CreateTable type string. Used by the Translator
    /// when binding row values whose declared column type is known.
    pub fn from_json_typed(value: &serde_json::Value, type_name: &str) -> Option<FieldValue> {
        match type_name.to_ascii_lowercase().as_str() {
            "int" => value.as_i64().map(|v| FieldValue::Int32(v as i32)),
            "float" => value.as_f64().map(|v| FieldValue::Float32(v as f32)),
            "double" => value.as_f64().map(FieldValue::Float64),
            "decimal" => value
                .as_f64()
                .and_then(|v| Decimal::from_str_exact(&v.to_string()).ok())
                .map(|d| FieldValue::Decimal(d, None)),
            "text" => value.as_str().map(|s| FieldValue::Text(s.to_string())),
            "varchar" => value.as_str().map(|s| FieldValue::Varchar(s.to_string())),
            "blob" => value
                .as_str()
                .and_then(|s| hex::decode(s).ok())
                .map(FieldValue::Blob),
            "datetime" => value.as_i64().map(FieldValue::DateTime),
            _ => None,
        }
    }

    /// Infers a `FieldValue` from an untyped JSON scalar (used when binding
    /// SET/condition values, which carry no declared column type of their
    /// own in the Update/Delete row shapes).
    pub fn from_json_untyped(value: &serde_json::Value) -> Option<FieldValue> {
        match value {
            serde_json::Value::Null => Some(FieldValue::String(String::new())),
            serde_json::Value::Bool(b) => Some(FieldValue::Int32(if *b { 1 } else { 0 })),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(FieldValue::Int64(i))
                } else {
                    n.as_f64().map(FieldValue::Float64)
                }
            }
            serde_json::Value::String(s) => Some(FieldValue::String(s.clone())),
            _ => None,
        }
    }
}

/// Small hand-rolled bitflags macro. The teacher's dependency stack never
/// reaches for the `bitflags` crate, so a handful of named const masks on a
/// newtype plays the same role without adding a dependency for six bits.
macro_rules! bitflags_lite {
    (
        $(#[$outer:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$outer])*
        #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
        pub struct $name($repr);

        impl $name {
            pub const NONE: $name = $name(0);
            $(pub const $flag: $name = $name($value);)*

            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            pub fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

bitflags_lite! {
    /// Column attribute bitflags: PK, NotNull, Unique, AutoIncrement, Index, HasDefault.
    pub struct ColumnFlags: u8 {
        const PK = 0b0000_0001;
        const NOT_NULL = 0b0000_0010;
        const UNIQUE = 0b0000_0100;
        const AUTO_INCREMENT = 0b0000_1000;
        const INDEX = 0b0001_0000;
        const HAS_DEFAULT = 0b0010_0000;
    }
}

/// `{name, value, length, flags}`. `length` is the declared width
/// for VARCHAR/TEXT/INT/DECIMAL; zero means "use the dialect default".
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub value: FieldValue,
    pub length: i32,
    pub flags: ColumnFlags,
    /// Recorded default literal text, present only when `HAS_DEFAULT` is set.
    pub default: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        ColumnDescriptor {
            name: name.into(),
            value,
            length: 0,
            flags: ColumnFlags::NONE,
            default: None,
        }
    }

    pub fn with_flag(mut self, flag: ColumnFlags) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn with_length(mut self, length: i32) -> Self {
        self.length = length;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.flags.insert(ColumnFlags::HAS_DEFAULT);
        self.default = Some(default.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_compose() {
        let mut f = ColumnFlags::NONE;
        f.insert(ColumnFlags::PK);
        f.insert(ColumnFlags::NOT_NULL);
        assert!(f.contains(ColumnFlags::PK));
        assert!(f.contains(ColumnFlags::NOT_NULL));
        assert!(!f.contains(ColumnFlags::UNIQUE));
    }

    #[test]
    fn numeric_predicate() {
        assert!(FieldValue::Int32(1).is_numeric());
        assert!(!FieldValue::Text("x".into()).is_numeric());
        assert!(FieldValue::Text("x".into()).is_string());
    }

    #[test]
    fn typed_json_conversion() {
        let v = FieldValue::from_json_typed(&serde_json::json!(64), "int").unwrap();
        assert_eq!(v, FieldValue::Int32(64));
        let v = FieldValue::from_json_typed(&serde_json::json!("alice"), "varchar").unwrap();
        assert_eq!(v, FieldValue::Varchar("alice".to_string()));
    }
}
