//! ROUGE scoring.
//!
//! Tokens are maximal runs of ASCII letters and digits, lowercased; any other
//! character, accented letters included, separates tokens. Every
//! metric reports the F1 of precision and recall. Empty input on either side
//! scores zero; scoring never fails.

use std::collections::HashMap;

use crate::types::ScoreTriple;

/// Score `candidate` against `reference`. Argument order matters: precision
/// is measured on the candidate, recall on the reference.
pub fn score(candidate: &str, reference: &str) -> ScoreTriple {
    let cand = tokenize(candidate);
    let refr = tokenize(reference);

    if cand.is_empty() || refr.is_empty() {
        return ScoreTriple::zero();
    }

    ScoreTriple {
        rouge1: rouge_n(&cand, &refr, 1),
        rouge2: rouge_n(&cand, &refr, 2),
        rouge_l: rouge_l(&cand, &refr),
    }
}

/// Lowercase and split on every character outside `[a-z0-9]`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Clipped n-gram overlap F1.
fn rouge_n(cand: &[String], refr: &[String], n: usize) -> f64 {
    let cand_grams = ngram_counts(cand, n);
    let ref_grams = ngram_counts(refr, n);

    if cand_grams.is_empty() || ref_grams.is_empty() {
        // Both sides too short to form an n-gram; identical token lists
        // still count as a perfect match.
        return if cand == refr { 1.0 } else { 0.0 };
    }

    let overlap: usize = cand_grams
        .iter()
        .map(|(gram, count)| ref_grams.get(gram).map_or(0, |r| (*count).min(*r)))
        .sum();

    let cand_total: usize = cand_grams.values().sum();
    let ref_total: usize = ref_grams.values().sum();
    f1(overlap, cand_total, ref_total)
}

/// Longest-common-subsequence F1 over tokens.
fn rouge_l(cand: &[String], refr: &[String]) -> f64 {
    f1(lcs_len(cand, refr), cand.len(), refr.len())
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for gram in tokens.windows(n) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

fn lcs_len(a: &[String], b: &[String]) -> usize {
    // Two-row dynamic programming table.
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn f1(overlap: usize, cand_total: usize, ref_total: usize) -> f64 {
    if overlap == 0 || cand_total == 0 || ref_total == 0 {
        return 0.0;
    }
    let precision = overlap as f64 / cand_total as f64;
    let recall = overlap as f64 / ref_total as f64;
    2.0 * precision * recall / (precision + recall)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
