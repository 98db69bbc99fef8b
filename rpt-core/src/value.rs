use bytes::Bytes;

/// A single point value. Series are typed by the first value they receive;
/// the wire format carries integers, doubles and raw byte strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Raw(Bytes),
}

impl Value {
    #[inline]
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Raw(_) => ValueType::Raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Int,
    Float,
    Raw,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type() {
        assert_eq!(Value::Int(1).value_type(), ValueType::Int);
        assert_eq!(Value::Float(0.5).value_type(), ValueType::Float);
        assert_eq!(
            Value::Raw(Bytes::from_static(b"x")).value_type(),
            ValueType::Raw
        );
    }
}
