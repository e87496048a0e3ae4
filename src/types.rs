use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A dynamically typed argument or result value as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    /// The type identifier this value would satisfy.
    pub fn type_id(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
        }
    }
}

impl From<()> for Value {
    fn from((): ()) -> Value {
        Value::Null
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_owned())
    }
}

macro_rules! impl_value_from {
    ($rust_type:ty, $variant:ident) => {
        impl From<$rust_type> for Value {
            fn from(inner: $rust_type) -> Value {
                Value::$variant(inner)
            }
        }
    };
}

impl_value_from!(bool, Bool);
impl_value_from!(i64, Int);
impl_value_from!(f64, Float);
impl_value_from!(String, Str);
impl_value_from!(Vec<u8>, Bytes);

/// A value did not satisfy the type it was checked against.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TypeMismatch(String);

impl TypeMismatch {
    pub fn new(expected: &str, actual: &Value) -> Self {
        Self(format!("expected {expected}, got {actual:?}"))
    }

    pub fn arity(expected: usize, actual: usize) -> Self {
        Self(format!("expected {expected} arguments, got {actual}"))
    }
}

/// A Rust type with a stable over-the-wire identifier and a [`Value`]
/// representation.
pub trait WireType: Sized {
    /// Identifier recorded in a request's `parameter_types`.
    fn type_id() -> &'static str;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self, TypeMismatch>;
}

impl WireType for () {
    fn type_id() -> &'static str {
        "null"
    }

    fn into_value(self) -> Value {
        Value::Null
    }

    fn from_value(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Null => Ok(()),
            other => Err(TypeMismatch::new("null", &other)),
        }
    }
}

macro_rules! impl_wire_type {
    ($rust_type:ty, $id:expr, $variant:ident) => {
        impl WireType for $rust_type {
            fn type_id() -> &'static str {
                $id
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Result<Self, TypeMismatch> {
                match value {
                    Value::$variant(inner) => Ok(inner),
                    other => Err(TypeMismatch::new($id, &other)),
                }
            }
        }
    };
}

impl_wire_type!(bool, "bool", Bool);
impl_wire_type!(i64, "int", Int);
impl_wire_type!(f64, "float", Float);
impl_wire_type!(String, "string", Str);
impl_wire_type!(Vec<u8>, "bytes", Bytes);
impl_wire_type!(Vec<Value>, "list", List);

/// Identity passthrough for callers that want to stay dynamically typed.
impl WireType for Value {
    fn type_id() -> &'static str {
        "any"
    }

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Result<Self, TypeMismatch> {
        Ok(value)
    }
}

impl<T: WireType> WireType for Option<T> {
    fn type_id() -> &'static str {
        T::type_id()
    }

    fn into_value(self) -> Value {
        match self {
            Some(inner) => inner.into_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Null => Ok(None),
            other => Ok(Some(T::from_value(other)?)),
        }
    }
}

/// An ordered argument list: the declared parameter type identifiers plus
/// the values themselves, convertible in both directions with type checking.
///
/// Implemented for tuples up to arity four. A single argument is passed as a
/// one-element tuple.
pub trait Params: Sized {
    fn type_ids() -> Vec<String>;

    fn into_values(self) -> Vec<Value>;

    fn from_values(values: Vec<Value>) -> Result<Self, TypeMismatch>;
}

impl Params for () {
    fn type_ids() -> Vec<String> {
        Vec::new()
    }

    fn into_values(self) -> Vec<Value> {
        Vec::new()
    }

    fn from_values(values: Vec<Value>) -> Result<Self, TypeMismatch> {
        if values.is_empty() {
            Ok(())
        } else {
            Err(TypeMismatch::arity(0, values.len()))
        }
    }
}

macro_rules! impl_params {
    ($len:expr; $($name:ident),+) => {
        impl<$($name: WireType),+> Params for ($($name,)+) {
            fn type_ids() -> Vec<String> {
                vec![$($name::type_id().to_owned()),+]
            }

            fn into_values(self) -> Vec<Value> {
                #[allow(non_snake_case)]
                let ($($name,)+) = self;
                vec![$($name.into_value()),+]
            }

            fn from_values(values: Vec<Value>) -> Result<Self, TypeMismatch> {
                if values.len() != $len {
                    return Err(TypeMismatch::arity($len, values.len()));
                }
                let mut values = values.into_iter();
                Ok(($(
                    match values.next() {
                        Some(value) => $name::from_value(value)?,
                        None => unreachable!("arity checked above"),
                    },
                )+))
            }
        }
    };
}

impl_params!(1; A);
impl_params!(2; A, B);
impl_params!(3; A, B, C);
impl_params!(4; A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trips() {
        assert_eq!(i64::from_value(42i64.into_value()).unwrap(), 42);
        assert!(bool::from_value(true.into_value()).unwrap());
        assert_eq!(
            String::from_value("hi".to_owned().into_value()).unwrap(),
            "hi"
        );
        <()>::from_value(().into_value()).unwrap();
        assert_eq!(
            Vec::<u8>::from_value(vec![1u8, 2].into_value()).unwrap(),
            vec![1, 2]
        );
    }

    #[test]
    fn mismatch_reports_expected_and_actual() {
        let err = i64::from_value(Value::Str("nope".into())).unwrap_err();
        assert!(err.to_string().contains("expected int"));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn option_maps_null() {
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<i64>::from_value(Value::Int(3)).unwrap(), Some(3));
        assert_eq!(None::<String>.into_value(), Value::Null);
    }

    #[test]
    fn tuple_params_round_trip() {
        type Args = (String, i64, bool);
        assert_eq!(Args::type_ids(), vec!["string", "int", "bool"]);

        let values = ("x".to_owned(), 7i64, false).into_values();
        assert_eq!(
            values,
            vec![Value::Str("x".into()), Value::Int(7), Value::Bool(false)]
        );
        let (s, n, b) = Args::from_values(values).unwrap();
        assert_eq!((s.as_str(), n, b), ("x", 7, false));
    }

    #[test]
    fn tuple_params_check_arity() {
        let err = <(String,)>::from_values(vec![]).unwrap_err();
        assert!(err.to_string().contains("expected 1 arguments"));

        let err = <()>::from_values(vec![Value::Null]).unwrap_err();
        assert!(err.to_string().contains("expected 0 arguments"));
    }

    #[test]
    fn tuple_params_check_element_types() {
        let err = <(String, i64)>::from_values(vec![Value::Int(1), Value::Int(2)]).unwrap_err();
        assert!(err.to_string().contains("expected string"));
    }

    #[test]
    fn value_identity_is_dynamic() {
        assert_eq!(<Value as WireType>::type_id(), "any");
        let v = Value::List(vec![Value::Int(1), Value::Str("two".into())]);
        assert_eq!(Value::from_value(v.clone()).unwrap(), v);
    }
}
