//! # Metadata Sets
//!
//! Immutable label sets attached to fitables and local executors.
//! Membership is case-sensitive and order-free.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

macro_rules! label_set {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(BTreeSet<String>);

        impl $name {
            pub fn new<I, S>(labels: I) -> Self
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                Self(labels.into_iter().map(Into::into).collect())
            }

            /// Every label in the set.
            pub fn all(&self) -> &BTreeSet<String> {
                &self.0
            }

            pub fn contains(&self, label: &str) -> bool {
                self.0.contains(label)
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl<S: Into<String>> FromIterator<S> for $name {
            fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
                Self::new(iter)
            }
        }
    };
}

label_set! {
    /// Alternative names a fitable answers to.
    Aliases
}

label_set! {
    /// Free-form classification labels (e.g. `canary`, `region:eu`).
    Tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_is_case_sensitive() {
        let aliases = Aliases::new(["Card", "visa"]);
        assert!(aliases.contains("Card"));
        assert!(!aliases.contains("card"));
        assert_eq!(aliases.len(), 2);
    }

    #[test]
    fn test_order_is_irrelevant() {
        let a: Tags = ["canary", "eu"].into_iter().collect();
        let b: Tags = ["eu", "canary", "eu"].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.all().iter().cloned().collect::<Vec<_>>(), vec!["canary", "eu"]);
    }

    #[test]
    fn test_default_is_empty() {
        assert!(Aliases::default().is_empty());
        assert!(!Tags::default().contains(""));
    }
}
