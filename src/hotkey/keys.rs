//! Modifier sets and key codes
//!
//! Modifiers are a platform-neutral bitset: a set is the union of named
//! bits, and naming the same modifier twice changes nothing. Keys are opaque
//! platform key codes, handed to the backend untouched.

use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// A single named modifier key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    /// Shift key
    Shift,
    /// Control key
    Control,
    /// Alt / Option key
    Alt,
    /// Super / Command / Windows key
    Super,
}

impl Modifier {
    const fn bit(self) -> u32 {
        match self {
            Modifier::Shift => 1 << 0,
            Modifier::Control => 1 << 1,
            Modifier::Alt => 1 << 2,
            Modifier::Super => 1 << 3,
        }
    }
}

/// Set of modifiers that must be held together with the key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifiers(u32);

impl Modifiers {
    pub const NONE: Self = Self(0);
    pub const SHIFT: Self = Self(Modifier::Shift.bit());
    pub const CONTROL: Self = Self(Modifier::Control.bit());
    pub const ALT: Self = Self(Modifier::Alt.bit());
    pub const SUPER: Self = Self(Modifier::Super.bit());

    /// Raw bit pattern
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check whether every modifier in `other` is part of this set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check whether no modifier is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The named modifiers in this set
    pub fn iter(self) -> impl Iterator<Item = Modifier> {
        [
            Modifier::Shift,
            Modifier::Control,
            Modifier::Alt,
            Modifier::Super,
        ]
        .into_iter()
        .filter(move |m| self.contains((*m).into()))
    }
}

impl From<Modifier> for Modifiers {
    fn from(modifier: Modifier) -> Self {
        Self(modifier.bit())
    }
}

impl FromIterator<Modifier> for Modifiers {
    fn from_iter<I: IntoIterator<Item = Modifier>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, |set, m| set | m.into())
    }
}

impl BitOr for Modifiers {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Platform-specific key code, treated as an atom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(u32);

impl Key {
    pub const fn from_code(code: u32) -> Self {
        Self(code)
    }

    pub const fn code(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set() {
        let mods = Modifiers::default();
        assert!(mods.is_empty());
        assert_eq!(mods.iter().count(), 0);
    }

    #[test]
    fn test_union_of_named_bits() {
        let mods = Modifiers::CONTROL | Modifiers::SHIFT;
        assert!(mods.contains(Modifiers::CONTROL));
        assert!(mods.contains(Modifiers::SHIFT));
        assert!(!mods.contains(Modifiers::ALT));
        assert!(!mods.contains(Modifiers::CONTROL | Modifiers::SUPER));
    }

    #[test]
    fn test_duplicates_are_harmless() {
        let mods: Modifiers = [Modifier::Control, Modifier::Control, Modifier::Alt]
            .into_iter()
            .collect();
        assert_eq!(mods, Modifiers::CONTROL | Modifiers::ALT);
        assert_eq!(
            mods.iter().collect::<Vec<_>>(),
            vec![Modifier::Control, Modifier::Alt]
        );
    }

    #[test]
    fn test_modifier_names() {
        let parsed: Vec<Modifier> = serde_json::from_str(r#"["control","super"]"#).unwrap();
        assert_eq!(parsed, vec![Modifier::Control, Modifier::Super]);
    }

    #[test]
    fn test_key_is_opaque() {
        let key = Key::from_code(0x61);
        assert_eq!(key.code(), 0x61);
        assert_eq!(serde_json::to_string(&key).unwrap(), "97");
    }
}
