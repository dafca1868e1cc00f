//! Chord recognition by template matching over pitch-class rotations.
//!
//! Each quality is an interval mask relative to an assumed root; the
//! analyzer rotates the active set to every candidate root and scores by
//! matched-tone count. Ties prefer roots actually present in the set
//! (a sounding inversion), then fewer template tones, then the lower
//! root, so `{C E G A}` reads as C6 rather than Am7 absent bass
//! information.

use crate::{PitchClass, PitchClassSet};
use std::fmt;

/// Build an interval mask at compile time.
const fn mask(intervals: &[u8]) -> u16 {
    let mut bits = 0u16;
    let mut i = 0;
    while i < intervals.len() {
        bits |= 1 << (intervals[i] % 12);
        i += 1;
    }
    bits
}

/// Chord quality. The discriminant is the wire `quality_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChordQuality {
    Major = 0,
    Minor = 1,
    Diminished = 2,
    Augmented = 3,
    Sus2 = 4,
    Sus4 = 5,
    Power = 6,
    Major6 = 7,
    Minor6 = 8,
    Dominant7 = 9,
    Major7 = 10,
    Minor7 = 11,
    MinorMajor7 = 12,
    Diminished7 = 13,
    HalfDiminished7 = 14,
    Augmented7 = 15,
    AugmentedMajor7 = 16,
    Dominant7Sus4 = 17,
    Dominant7Flat5 = 18,
    Add9 = 19,
    MinorAdd9 = 20,
    Add11 = 21,
    SixNine = 22,
    Dominant9 = 23,
    Major9 = 24,
    Minor9 = 25,
    Dominant7Flat9 = 26,
    Dominant7Sharp9 = 27,
    Dominant11 = 28,
    Minor11 = 29,
    Dominant13 = 30,
    Major13 = 31,
    Minor13 = 32,
}

/// Template table: every quality with its interval mask.
static TEMPLATES: &[(ChordQuality, u16)] = &[
    (ChordQuality::Major, mask(&[0, 4, 7])),
    (ChordQuality::Minor, mask(&[0, 3, 7])),
    (ChordQuality::Diminished, mask(&[0, 3, 6])),
    (ChordQuality::Augmented, mask(&[0, 4, 8])),
    (ChordQuality::Sus2, mask(&[0, 2, 7])),
    (ChordQuality::Sus4, mask(&[0, 5, 7])),
    (ChordQuality::Power, mask(&[0, 7])),
    (ChordQuality::Major6, mask(&[0, 4, 7, 9])),
    (ChordQuality::Minor6, mask(&[0, 3, 7, 9])),
    (ChordQuality::Dominant7, mask(&[0, 4, 7, 10])),
    (ChordQuality::Major7, mask(&[0, 4, 7, 11])),
    (ChordQuality::Minor7, mask(&[0, 3, 7, 10])),
    (ChordQuality::MinorMajor7, mask(&[0, 3, 7, 11])),
    (ChordQuality::Diminished7, mask(&[0, 3, 6, 9])),
    (ChordQuality::HalfDiminished7, mask(&[0, 3, 6, 10])),
    (ChordQuality::Augmented7, mask(&[0, 4, 8, 10])),
    (ChordQuality::AugmentedMajor7, mask(&[0, 4, 8, 11])),
    (ChordQuality::Dominant7Sus4, mask(&[0, 5, 7, 10])),
    (ChordQuality::Dominant7Flat5, mask(&[0, 4, 6, 10])),
    (ChordQuality::Add9, mask(&[0, 2, 4, 7])),
    (ChordQuality::MinorAdd9, mask(&[0, 2, 3, 7])),
    (ChordQuality::Add11, mask(&[0, 4, 5, 7])),
    (ChordQuality::SixNine, mask(&[0, 2, 4, 7, 9])),
    (ChordQuality::Dominant9, mask(&[0, 2, 4, 7, 10])),
    (ChordQuality::Major9, mask(&[0, 2, 4, 7, 11])),
    (ChordQuality::Minor9, mask(&[0, 2, 3, 7, 10])),
    (ChordQuality::Dominant7Flat9, mask(&[0, 1, 4, 7, 10])),
    (ChordQuality::Dominant7Sharp9, mask(&[0, 3, 4, 7, 10])),
    (ChordQuality::Dominant11, mask(&[0, 2, 4, 5, 7, 10])),
    (ChordQuality::Minor11, mask(&[0, 2, 3, 5, 7, 10])),
    (ChordQuality::Dominant13, mask(&[0, 2, 4, 7, 9, 10])),
    (ChordQuality::Major13, mask(&[0, 2, 4, 7, 9, 11])),
    (ChordQuality::Minor13, mask(&[0, 2, 3, 5, 7, 9, 10])),
];

impl ChordQuality {
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn interval_mask(self) -> u16 {
        TEMPLATES[self as usize].1
    }

    /// Template tone count; lower reads as simpler.
    pub fn complexity(self) -> u32 {
        self.interval_mask().count_ones()
    }

    pub fn name(self) -> &'static str {
        match self {
            ChordQuality::Major => "maj",
            ChordQuality::Minor => "min",
            ChordQuality::Diminished => "dim",
            ChordQuality::Augmented => "aug",
            ChordQuality::Sus2 => "sus2",
            ChordQuality::Sus4 => "sus4",
            ChordQuality::Power => "5",
            ChordQuality::Major6 => "6",
            ChordQuality::Minor6 => "min6",
            ChordQuality::Dominant7 => "7",
            ChordQuality::Major7 => "maj7",
            ChordQuality::Minor7 => "min7",
            ChordQuality::MinorMajor7 => "minMaj7",
            ChordQuality::Diminished7 => "dim7",
            ChordQuality::HalfDiminished7 => "m7b5",
            ChordQuality::Augmented7 => "aug7",
            ChordQuality::AugmentedMajor7 => "augMaj7",
            ChordQuality::Dominant7Sus4 => "7sus4",
            ChordQuality::Dominant7Flat5 => "7b5",
            ChordQuality::Add9 => "add9",
            ChordQuality::MinorAdd9 => "minAdd9",
            ChordQuality::Add11 => "add11",
            ChordQuality::SixNine => "6/9",
            ChordQuality::Dominant9 => "9",
            ChordQuality::Major9 => "maj9",
            ChordQuality::Minor9 => "min9",
            ChordQuality::Dominant7Flat9 => "7b9",
            ChordQuality::Dominant7Sharp9 => "7#9",
            ChordQuality::Dominant11 => "11",
            ChordQuality::Minor11 => "min11",
            ChordQuality::Dominant13 => "13",
            ChordQuality::Major13 => "maj13",
            ChordQuality::Minor13 => "min13",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChordEstimate {
    pub root: PitchClass,
    pub quality: ChordQuality,
    pub confidence: f32,
    pub pitch_classes: PitchClassSet,
}

impl ChordEstimate {
    fn none(active: PitchClassSet) -> Self {
        Self {
            root: PitchClass::default(),
            quality: ChordQuality::Major,
            confidence: 0.0,
            pitch_classes: active,
        }
    }
}

impl fmt::Display for ChordEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.root, self.quality.name())
    }
}

/// How fast a held chord loses its claim when the instantaneous winner
/// disagrees. Two consecutive windows of a clear new chord replace the
/// held one.
const HOLD_DECAY: f32 = 0.8;

/// Template matcher with temporal smoothing.
#[derive(Debug, Default)]
pub struct ChordAnalyzer {
    held: Option<ChordEstimate>,
    held_score: f32,
}

impl ChordAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best instantaneous match, no smoothing.
    pub fn best_match(active: PitchClassSet) -> ChordEstimate {
        if active.len() < 3 {
            return ChordEstimate::none(active);
        }

        let mut best: Option<(u32, bool, u32, u8, ChordQuality)> = None;
        for root in 0..12u8 {
            let rotated = active.rotated_down(root);
            let root_present = active.contains(PitchClass::new(root));
            for &(quality, template) in TEMPLATES {
                let matched = (rotated.bits() & template).count_ones();
                if matched < 2 {
                    continue;
                }
                let candidate = (matched, root_present, quality.complexity(), root, quality);
                let wins = match &best {
                    None => true,
                    Some(b) => {
                        // More matched tones, then a sounding root, then
                        // the simpler template, then the lower root.
                        (candidate.0, candidate.1, std::cmp::Reverse(candidate.2), std::cmp::Reverse(candidate.3))
                            > (b.0, b.1, std::cmp::Reverse(b.2), std::cmp::Reverse(b.3))
                    }
                };
                if wins {
                    best = Some(candidate);
                }
            }
        }

        match best {
            Some((matched, _, complexity, root, quality)) => ChordEstimate {
                root: PitchClass::new(root),
                quality,
                confidence: matched as f32 / active.len().max(complexity) as f32,
                pitch_classes: active,
            },
            None => ChordEstimate::none(active),
        }
    }

    /// Match with flicker suppression: the held estimate only yields to a
    /// different chord that beats its decayed score.
    pub fn analyze(&mut self, active: PitchClassSet) -> ChordEstimate {
        let raw = Self::best_match(active);
        if raw.confidence <= 0.0 {
            self.held_score *= HOLD_DECAY;
            if self.held_score < 0.1 {
                self.held = None;
            }
            return raw;
        }

        match self.held {
            Some(held) if held.root == raw.root && held.quality == raw.quality => {
                self.held = Some(raw);
                self.held_score = raw.confidence;
                raw
            }
            Some(held) => {
                self.held_score *= HOLD_DECAY;
                if raw.confidence > self.held_score {
                    self.held = Some(raw);
                    self.held_score = raw.confidence;
                    raw
                } else {
                    held
                }
            }
            None => {
                self.held = Some(raw);
                self.held_score = raw.confidence;
                raw
            }
        }
    }

    pub fn reset(&mut self) {
        self.held = None;
        self.held_score = 0.0;
    }
}
