use serde::{Deserialize, Serialize};

/// Feature tags an adapter (or a model) may support.
///
/// Callers dispatch by capability, not by adapter sub-type; the set is
/// closed and not user-extensible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Text,
    Chat,
    Functions,
    Structured,
    Embeddings,
    Vision,
    Images,
    Audio,
}

impl Capability {
    const ALL: [Capability; 8] = [
        Capability::Text,
        Capability::Chat,
        Capability::Functions,
        Capability::Structured,
        Capability::Embeddings,
        Capability::Vision,
        Capability::Images,
        Capability::Audio,
    ];

    fn bit(self) -> u8 {
        Self::ALL.iter().position(|c| *c == self).unwrap_or(0) as u8
    }
}

/// Compact set of [`Capability`] tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet(u16);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn new(caps: &[Capability]) -> Self {
        let mut set = Self::empty();
        for cap in caps {
            set = set.with(*cap);
        }
        set
    }

    pub fn with(self, cap: Capability) -> Self {
        Self(self.0 | (1 << cap.bit()))
    }

    pub fn contains(self, cap: Capability) -> bool {
        self.0 & (1 << cap.bit()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = Self::empty();
        for cap in iter {
            set = set.with(cap);
        }
        set
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let caps = Vec::<Capability>::deserialize(deserializer)?;
        Ok(caps.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_only_inserted_capabilities() {
        let set = CapabilitySet::new(&[Capability::Text, Capability::Embeddings]);
        assert!(set.contains(Capability::Text));
        assert!(set.contains(Capability::Embeddings));
        assert!(!set.contains(Capability::Images));
    }

    #[test]
    fn iter_preserves_membership() {
        let set = CapabilitySet::new(&[Capability::Audio, Capability::Chat]);
        let caps: Vec<Capability> = set.iter().collect();
        assert_eq!(caps, vec![Capability::Chat, Capability::Audio]);
    }

    #[test]
    fn serde_roundtrip_as_list() {
        let set = CapabilitySet::new(&[Capability::Text, Capability::Vision]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["text","vision"]"#);
        let back: CapabilitySet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn empty_set_contains_nothing() {
        let set = CapabilitySet::empty();
        assert!(set.is_empty());
        assert!(!set.contains(Capability::Text));
    }
}
