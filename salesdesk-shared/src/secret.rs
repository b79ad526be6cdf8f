use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps credentials and personal identifiers so they never show up in `Debug`/`Display`
/// output (config dumps, `tracing` fields). Serialization still writes the real value because
/// the wrapped string has to reach the remote service.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl Masked<String> {
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_value() {
        let token = Masked::new("s3cr3t".to_string());
        assert_eq!(format!("{:?}", token), "********");
        assert_eq!(format!("{}", token), "********");
        assert_eq!(token.expose(), "s3cr3t");
    }

    #[test]
    fn test_serializes_real_value() {
        let token = Masked::new("s3cr3t".to_string());
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"s3cr3t\"");

        let back: Masked<String> = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back.into_inner(), "abc");
    }
}
