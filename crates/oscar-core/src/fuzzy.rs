//! Edit-distance search over package slugs.
//!
//! A slug scores by its best-matching window: edit distance against the
//! pattern, normalised by pattern length, plus a penalty for how far into
//! the slug the window starts. Lower is better; `0.0` is a prefix match.

use strsim::levenshtein;

/// Scores above this are not matches.
pub const DEFAULT_THRESHOLD: f64 = 0.6;
/// Characters of offset that cost a full point of score.
pub const DEFAULT_DISTANCE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch<'a> {
    pub candidate: &'a str,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatcher {
    threshold: f64,
    distance: usize,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            distance: DEFAULT_DISTANCE,
        }
    }
}

impl FuzzyMatcher {
    pub fn new(threshold: f64, distance: usize) -> Self {
        Self {
            threshold,
            distance: distance.max(1),
        }
    }

    /// Score of `candidate` against `pattern`, if it clears the threshold.
    pub fn score(&self, pattern: &str, candidate: &str) -> Option<f64> {
        let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
        let text: Vec<char> = candidate.to_lowercase().chars().collect();
        if pattern.is_empty() {
            return None;
        }
        let needle: String = pattern.iter().collect();
        let plen = pattern.len();

        let mut best = f64::MAX;
        let starts = text.len().saturating_sub(1);
        for start in 0..=starts {
            let location = start as f64 / self.distance as f64;
            if location >= best {
                break;
            }
            for len in plen.saturating_sub(1).max(1)..=plen + 1 {
                let end = (start + len).min(text.len());
                let window: String = text[start..end].iter().collect();
                let edits = levenshtein(&needle, &window) as f64 / plen as f64;
                best = best.min(edits + location);
            }
        }

        (best <= self.threshold).then_some(best)
    }

    /// Matching candidates, best first. Ties go to the shorter slug, then
    /// alphabetical order.
    pub fn search<'a, I>(&self, pattern: &str, candidates: I) -> Vec<FuzzyMatch<'a>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut matches: Vec<FuzzyMatch<'a>> = candidates
            .into_iter()
            .filter_map(|c| {
                self.score(pattern, c)
                    .map(|score| FuzzyMatch { candidate: c, score })
            })
            .collect();
        matches.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then(a.candidate.len().cmp(&b.candidate.len()))
                .then(a.candidate.cmp(b.candidate))
        });
        matches
    }
}
