//! Pitch classes and pitch-class sets.

use std::fmt;

/// Chromatic note names, sharps-only spelling.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A pitch class, 0 = C through 11 = B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PitchClass(u8);

impl PitchClass {
    pub fn new(value: u8) -> Self {
        Self(value % 12)
    }

    pub fn from_midi(note: u8) -> Self {
        Self(note % 12)
    }

    #[inline]
    pub fn index(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        NOTE_NAMES[self.0 as usize]
    }

    pub fn transposed(self, semitones: u8) -> Self {
        Self((self.0 + semitones % 12) % 12)
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of pitch classes packed into the low 12 bits of a u16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PitchClassSet(u16);

impl PitchClassSet {
    pub const EMPTY: Self = Self(0);

    pub fn from_bits(bits: u16) -> Self {
        Self(bits & 0x0FFF)
    }

    #[inline]
    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn insert(&mut self, pc: PitchClass) {
        self.0 |= 1 << pc.index();
    }

    pub fn remove(&mut self, pc: PitchClass) {
        self.0 &= !(1 << pc.index());
    }

    #[inline]
    pub fn contains(self, pc: PitchClass) -> bool {
        self.0 & (1 << pc.index()) != 0
    }

    #[inline]
    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Transpose the set so `by` becomes pitch class 0.
    pub fn rotated_down(self, by: u8) -> Self {
        let by = (by % 12) as u32;
        Self(((self.0 >> by) | (self.0 << (12 - by))) & 0x0FFF)
    }

    pub fn iter(self) -> impl Iterator<Item = PitchClass> {
        (0..12u8).filter(move |&i| self.0 & (1 << i) != 0).map(PitchClass::new)
    }
}

impl FromIterator<PitchClass> for PitchClassSet {
    fn from_iter<I: IntoIterator<Item = PitchClass>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for pc in iter {
            set.insert(pc);
        }
        set
    }
}

impl fmt::Display for PitchClassSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        f.write_str("{")?;
        for pc in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{pc}")?;
            first = false;
        }
        f.write_str("}")
    }
}
