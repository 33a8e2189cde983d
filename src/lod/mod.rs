//! Detail levels and level masks.

use std::fmt;

/// Level of detail of one representation of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DetailLevel {
    Low = 0,
    Medium = 1,
    High = 2,
    Highest = 3,
    /// Source representation, before any reduction.
    Base = 4,
}

impl DetailLevel {
    pub const ALL: [Self; 5] = [Self::Low, Self::Medium, Self::High, Self::Highest, Self::Base];

    #[inline]
    pub const fn bit(self) -> u8 {
        1 << self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Highest => "highest",
            Self::Base => "base",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of detail levels.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DetailMask(u8);

impl DetailMask {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(0x1f);

    /// Mask from raw bits; bits outside the known levels are dropped.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self((bits & Self::ALL.0 as u32) as u8)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn from_levels(levels: &[DetailLevel]) -> Self {
        levels.iter().fold(Self::EMPTY, |m, &l| m.include(l))
    }

    /// Union with a single level.
    #[inline]
    #[must_use]
    pub const fn include(self, level: DetailLevel) -> Self {
        Self(self.0 | level.bit())
    }

    /// Union with another mask.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    #[inline]
    pub const fn contains(self, level: DetailLevel) -> bool {
        self.0 & level.bit() != 0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Levels in the mask, lowest first.
    pub fn levels(self) -> impl Iterator<Item = DetailLevel> {
        DetailLevel::ALL.into_iter().filter(move |&l| self.contains(l))
    }

    /// First entry of `priority` present in the mask.
    pub fn get_best_match(self, priority: &[DetailLevel]) -> Option<DetailLevel> {
        priority.iter().copied().find(|&l| self.contains(l))
    }
}

impl From<DetailLevel> for DetailMask {
    fn from(level: DetailLevel) -> Self {
        Self(level.bit())
    }
}

impl FromIterator<DetailLevel> for DetailMask {
    fn from_iter<I: IntoIterator<Item = DetailLevel>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::include)
    }
}

impl fmt::Debug for DetailMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.levels()).finish()
    }
}

impl fmt::Display for DetailMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.levels().map(DetailLevel::name).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}
