//! Voice-leading suggestions.
//!
//! Given the previously sounding voicing and a newly recognized chord,
//! find target notes that realize the chord with minimal total motion.
//! The search assigns each voice up to four nearby chord tones and walks
//! the assignments depth first, pruning on accumulated movement, with
//! penalties for leaving chord tones uncovered, piling more than two
//! voices on one pitch class, and crossing adjacent voices.

use crate::{ChordEstimate, PitchClass, PitchClassSet};
use smallvec::SmallVec;
use std::collections::HashMap;

pub const MIN_VOICES: usize = 3;
pub const MAX_VOICES: usize = 6;

const MAX_CANDIDATES: usize = 4;
const MEMO_CAPACITY: usize = 256;

const UNCOVERED_PENALTY: f32 = 8.0;
const DOUBLING_PENALTY: f32 = 3.0;
const CROSSING_PENALTY: f32 = 2.0;

/// A concrete target voicing. `notes[..len]` are MIDI note numbers in
/// voice order, matching the input voicing one to one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoicingSuggestion {
    pub notes: [u8; MAX_VOICES],
    pub len: u8,
    pub cost: f32,
}

impl VoicingSuggestion {
    pub fn voices(&self) -> &[u8] {
        &self.notes[..self.len as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MemoKey {
    prev: [u8; MAX_VOICES],
    len: u8,
    root: u8,
    quality: u8,
}

impl MemoKey {
    fn new(previous: &[u8], chord: &ChordEstimate) -> Self {
        let mut prev = [0u8; MAX_VOICES];
        prev[..previous.len()].copy_from_slice(previous);
        Self {
            prev,
            len: previous.len() as u8,
            root: chord.root.index(),
            quality: chord.quality.id(),
        }
    }
}

pub struct VoiceLeadingOptimizer {
    range_low: u8,
    range_high: u8,
    max_leap: u8,
    memo: HashMap<MemoKey, VoicingSuggestion>,
}

impl Default for VoiceLeadingOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceLeadingOptimizer {
    pub fn new() -> Self {
        Self {
            range_low: 36,
            range_high: 84,
            max_leap: 12,
            memo: HashMap::with_capacity(MEMO_CAPACITY),
        }
    }

    /// Suggest targets for `previous` under `chord`. Returns `None` when
    /// the voicing size is unusable, the chord carries no confidence, or
    /// some voice has no reachable chord tone.
    pub fn suggest(
        &mut self,
        previous: &[u8],
        chord: &ChordEstimate,
    ) -> Option<VoicingSuggestion> {
        if previous.len() < MIN_VOICES || previous.len() > MAX_VOICES {
            return None;
        }
        if chord.confidence <= 0.0 {
            return None;
        }

        let key = MemoKey::new(previous, chord);
        if let Some(hit) = self.memo.get(&key) {
            return Some(*hit);
        }

        let tones = chord_tones(chord);
        let mut candidates: SmallVec<[SmallVec<[u8; MAX_CANDIDATES]>; MAX_VOICES]> =
            SmallVec::new();
        for &note in previous {
            let reachable = self.candidates_for(note, tones);
            if reachable.is_empty() {
                return None;
            }
            candidates.push(reachable);
        }

        let mut current = [0u8; MAX_VOICES];
        let mut best = None;
        search(&candidates, previous, tones, 0, 0.0, &mut current, &mut best);

        if let Some(found) = best {
            if self.memo.len() >= MEMO_CAPACITY {
                self.memo.clear();
            }
            self.memo.insert(key, found);
        }
        best
    }

    /// Chord tones within leap and range of `from`, nearest first, capped
    /// at [`MAX_CANDIDATES`]. Downward motion wins distance ties.
    fn candidates_for(&self, from: u8, tones: PitchClassSet) -> SmallVec<[u8; MAX_CANDIDATES]> {
        let mut out = SmallVec::new();
        let from = from as i16;
        let mut consider = |target: i16, out: &mut SmallVec<[u8; MAX_CANDIDATES]>| {
            if out.len() < MAX_CANDIDATES
                && target >= self.range_low as i16
                && target <= self.range_high as i16
                && tones.contains(PitchClass::from_midi(target as u8))
            {
                out.push(target as u8);
            }
        };

        consider(from, &mut out);
        for dist in 1..=self.max_leap as i16 {
            consider(from - dist, &mut out);
            consider(from + dist, &mut out);
            if out.len() == MAX_CANDIDATES {
                break;
            }
        }
        out
    }

    pub fn reset(&mut self) {
        self.memo.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.memo.len()
    }
}

/// Chord tones in absolute pitch-class space.
fn chord_tones(chord: &ChordEstimate) -> PitchClassSet {
    let up = chord.root.index();
    PitchClassSet::from_bits(chord.quality.interval_mask()).rotated_down((12 - up) % 12)
}

fn search(
    candidates: &[SmallVec<[u8; MAX_CANDIDATES]>],
    previous: &[u8],
    tones: PitchClassSet,
    depth: usize,
    movement: f32,
    current: &mut [u8; MAX_VOICES],
    best: &mut Option<VoicingSuggestion>,
) {
    if let Some(found) = best {
        // Penalties only add, so accumulated movement alone can prune.
        if movement >= found.cost {
            return;
        }
    }

    if depth == previous.len() {
        let cost = movement + penalties(&current[..depth], tones);
        if best.map_or(true, |found| cost < found.cost) {
            let mut notes = [0u8; MAX_VOICES];
            notes[..depth].copy_from_slice(&current[..depth]);
            *best = Some(VoicingSuggestion {
                notes,
                len: depth as u8,
                cost,
            });
        }
        return;
    }

    for &target in &candidates[depth] {
        current[depth] = target;
        let step = (target as i16 - previous[depth] as i16).abs() as f32;
        search(
            candidates,
            previous,
            tones,
            depth + 1,
            movement + step,
            current,
            best,
        );
    }
}

fn penalties(notes: &[u8], tones: PitchClassSet) -> f32 {
    let mut cost = 0.0;

    let mut counts = [0u8; 12];
    for &note in notes {
        counts[(note % 12) as usize] += 1;
    }
    for pc in tones.iter() {
        if counts[pc.index() as usize] == 0 {
            cost += UNCOVERED_PENALTY;
        }
    }
    for &count in &counts {
        if count > 2 {
            cost += DOUBLING_PENALTY * f32::from(count - 2);
        }
    }
    for pair in notes.windows(2) {
        if pair[0] > pair[1] {
            cost += CROSSING_PENALTY;
        }
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChordAnalyzer;

    fn chord(pcs: &[u8]) -> ChordEstimate {
        ChordAnalyzer::best_match(pcs.iter().map(|&i| PitchClass::new(i)).collect())
    }

    #[test]
    fn test_static_voicing_is_free() {
        let mut optimizer = VoiceLeadingOptimizer::new();
        let suggestion = optimizer
            .suggest(&[60, 64, 67], &chord(&[0, 4, 7]))
            .unwrap();
        assert_eq!(suggestion.voices(), &[60, 64, 67]);
        assert_eq!(suggestion.cost, 0.0);
    }

    #[test]
    fn test_resolves_to_nearest_tones() {
        let mut optimizer = VoiceLeadingOptimizer::new();
        // C E G moving to F major: keep C, E up to F, G up to A.
        let suggestion = optimizer
            .suggest(&[60, 64, 67], &chord(&[5, 9, 0]))
            .unwrap();
        assert_eq!(suggestion.voices(), &[60, 65, 69]);
        assert_eq!(suggestion.cost, 3.0);
    }

    #[test]
    fn test_memoized_second_call() {
        let mut optimizer = VoiceLeadingOptimizer::new();
        let first = optimizer.suggest(&[60, 64, 67], &chord(&[5, 9, 0])).unwrap();
        let second = optimizer.suggest(&[60, 64, 67], &chord(&[5, 9, 0])).unwrap();
        assert_eq!(first, second);
        assert_eq!(optimizer.cache_len(), 1);

        optimizer.reset();
        assert_eq!(optimizer.cache_len(), 0);
    }

    #[test]
    fn test_rejects_unusable_input() {
        let mut optimizer = VoiceLeadingOptimizer::new();
        let c_major = chord(&[0, 4, 7]);

        assert!(optimizer.suggest(&[], &c_major).is_none());
        assert!(optimizer.suggest(&[60, 64], &c_major).is_none());
        assert!(optimizer.suggest(&[40, 45, 50, 55, 60, 65, 70], &c_major).is_none());

        let vague = chord(&[0, 1]);
        assert!(optimizer.suggest(&[60, 64, 67], &vague).is_none());
    }

    #[test]
    fn test_stays_in_range_and_leap() {
        let mut optimizer = VoiceLeadingOptimizer::new();
        let previous = [36, 37, 38, 70, 82, 84];
        let suggestion = optimizer.suggest(&previous, &chord(&[0, 4, 7])).unwrap();

        let tones = chord_tones(&chord(&[0, 4, 7]));
        for (&from, &to) in previous.iter().zip(suggestion.voices()) {
            assert!((36..=84).contains(&to), "note {to} out of range");
            assert!((to as i16 - from as i16).abs() <= 12);
            assert!(tones.contains(PitchClass::from_midi(to)));
        }
    }

    #[test]
    fn test_coverage_beats_clustering() {
        let mut optimizer = VoiceLeadingOptimizer::new();
        // All voices already sit on E; covering C and G costs motion but
        // beats the uncovered-tone penalties.
        let suggestion = optimizer.suggest(&[64, 64, 64], &chord(&[0, 4, 7])).unwrap();
        let covered: PitchClassSet = suggestion
            .voices()
            .iter()
            .map(|&n| PitchClass::from_midi(n))
            .collect();
        assert_eq!(covered.len(), 3);
    }
}
