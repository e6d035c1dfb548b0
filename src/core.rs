//! # Core Types
//!
//! The one-or-many serde helper shared across the credential data model.

use serde::{Deserialize, Serialize};

/// `Quota` models credential properties that may hold one value or many,
/// serializing transparently in either shape.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Quota<T> {
    /// The property holds a single value.
    One(T),

    /// The property holds a set of values.
    Many(Vec<T>),
}

impl<T: Default> Default for Quota<T> {
    fn default() -> Self {
        Self::One(T::default())
    }
}

impl<T: Default> Quota<T> {
    /// Adds a value, converting a single value into a set.
    pub fn add(&mut self, item: T) {
        match std::mem::take(self) {
            Self::One(one) => *self = Self::Many(vec![one, item]),
            Self::Many(mut many) => {
                many.push(item);
                *self = Self::Many(many);
            }
        }
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(many) => many.len(),
        }
    }

    /// Returns `true` when no values are held.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(_) => false,
            Self::Many(many) => many.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_add() {
        let mut quota = Quota::One("VerifiableCredential".to_string());
        quota.add("StatusList2021Credential".to_string());

        let Quota::Many(types) = quota else {
            panic!("quota should hold two values");
        };
        assert_eq!(types.len(), 2);
        assert_eq!(types[1], "StatusList2021Credential");
    }

    #[test]
    fn quota_untagged() {
        let one: Quota<String> =
            serde_json::from_str(r#""VerifiableCredential""#).expect("should deserialize");
        assert_eq!(one.len(), 1);

        let many: Quota<String> =
            serde_json::from_str(r#"["VerifiableCredential", "StatusList2021Credential"]"#)
                .expect("should deserialize");
        assert_eq!(many.len(), 2);
        assert!(!many.is_empty());
    }
}
