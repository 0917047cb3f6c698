//! Per-token probability calculation.
//!
//! [`calc_stat`] turns a token's spam/innocent hit counts into a
//! probability under the configured p-value policy, compensating for young
//! or imbalanced training corpora. The Markov weighting helpers live here
//! too since they read the token's rendered name.

use tracing::warn;

use crate::config::{Class, ClassifierConfig, PValuePolicy, TrainingMode};
use crate::store::Totals;

/// Robinson shrinkage strength.
pub(crate) const CHI_S: f64 = 0.1;
/// Robinson assumed probability for an unseen token.
pub(crate) const CHI_X: f64 = 0.5;

/// Markovian scaling constants; the weight ratio is divided by 256 to keep
/// single tokens from dominating a weighted decision.
const MARKOV_C1: i64 = 16;
const MARKOV_C2: i64 = 1;

/// Per-token statistics carried through one classification pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpamStat {
    pub probability: f64,
    pub spam_hits: u64,
    pub innocent_hits: u64,
    /// The record existed in storage when the pass loaded it.
    pub on_disk: bool,
    /// The record changed and must be written back.
    pub dirty: bool,
}

/// What kind of token a probability is being computed for. Noise-reduction
/// patterns demand more evidence and normalize against their own totals
/// record rather than the account totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Default,
    Bnr,
}

/// Compute `stat.probability` from its hit counts.
///
/// With a forced classification the probability is pinned to 1.0 or 0.0;
/// only the Markov policy continues past the pin, since its weighted
/// cutoffs still want computed values. `bnr_totals` is the noise-reduction
/// totals record and only read for [`StatKind::Bnr`].
pub fn calc_stat(
    config: &ClassifierConfig,
    totals: &Totals,
    classification: Option<Class>,
    name: &str,
    stat: &mut SpamStat,
    kind: StatKind,
    bnr_totals: Option<&SpamStat>,
) {
    let mut min_hits: i64 = match kind {
        StatKind::Bnr => 25,
        StatKind::Default => 5,
    };

    // Statistical sedation: raise the hapaxial threshold while the corpus
    // is young or spam-heavy, scaled by the training buffer.
    let mut sed_hits: i64 = 0;
    let ti = (totals.innocent_learned + totals.innocent_classified) as i64;
    let ts = (totals.spam_learned + totals.spam_classified) as i64;
    let buffer = i64::from(config.training_buffer);
    if buffer > 0 {
        if ti < 1000 && ti < ts {
            sed_hits = min_hits + buffer / 2 + buffer * ((ts - ti) / 200);
        }
        if (1000..2500).contains(&ti) && ts > ti {
            let spams = (ts as f64 / (ts as f64 + ti as f64)) * 100.0;
            sed_hits = (min_hits as f64 + (buffer / 2) as f64 + buffer as f64 * (spams / 20.0))
                as i64;
        }
    }
    if kind != StatKind::Default || sed_hits > min_hits {
        min_hits = sed_hits;
    }

    // TUM training stops recording past 20 hits, so never demand more.
    if config.training == TrainingMode::Tum && min_hits > 20 {
        min_hits = 20;
    }

    match classification {
        Some(class) => {
            stat.probability = if class == Class::Spam { 1.0 } else { 0.0 };
            if !config.is_weighted() {
                return;
            }
        }
        None => {
            stat.probability = if config.is_weighted() { 0.5 } else { 0.4 };
        }
    }

    if config.is_weighted() {
        // Markovian weighting
        if name.is_empty() {
            stat.probability = 0.5;
            return;
        }

        let weight = markov_weight(name) as i64;
        let sh = stat.spam_hits as i64;
        let ih = stat.innocent_hits as i64;
        let (num, den) = if config.bias {
            (
                weight * (sh - ih * 2),
                MARKOV_C1 * (sh + ih * 2 + MARKOV_C2) * 256,
            )
        } else {
            (
                (sh - ih) * weight,
                MARKOV_C1 * (sh + ih + MARKOV_C2) * 256,
            )
        };
        let base = if config.bias { 0.49 } else { 0.5 };
        stat.probability = base + num as f64 / den as f64;
    } else {
        // Graham / Robinson estimate
        let ih_mult: u64 = if config.bias { 2 } else { 1 };
        let trained = totals.spam_learned > 0 && totals.innocent_learned > 0;

        if trained {
            match (kind, bnr_totals) {
                (StatKind::Bnr, Some(tot)) => {
                    let ps = stat.spam_hits as f64 / tot.spam_hits as f64;
                    let pi = stat.innocent_hits as f64 / tot.innocent_hits as f64;
                    stat.probability = ps / (ps + pi);
                }
                _ => {
                    let ps = stat.spam_hits as f64 / totals.spam_learned as f64;
                    let pi = (stat.innocent_hits * ih_mult) as f64
                        / totals.innocent_learned as f64;
                    stat.probability = ps / (ps + pi);
                }
            }
        }

        // One-sided tokens get pushed toward the extremes, but never
        // further than one phantom opposite hit would justify.
        if stat.spam_hits == 0 && stat.innocent_hits > 0 {
            stat.probability = 0.01;
            if trained {
                let ps = 1.0 / totals.spam_learned as f64;
                let pi =
                    (stat.innocent_hits * ih_mult) as f64 / totals.innocent_learned as f64;
                let adjusted = ps / (ps + pi);
                if adjusted < 0.01 {
                    stat.probability = adjusted;
                }
            }
        } else if stat.spam_hits > 0 && stat.innocent_hits == 0 {
            stat.probability = 0.99;
            if trained {
                let ps = stat.spam_hits as f64 / totals.spam_learned as f64;
                let pi = ih_mult as f64 / totals.innocent_learned as f64;
                let adjusted = ps / (ps + pi);
                if adjusted > 0.99 {
                    stat.probability = adjusted;
                }
            }
        }

        // Hapaxes: too little evidence, stay neutral.
        if stat.spam_hits + ih_mult * stat.innocent_hits < min_hits as u64 {
            stat.probability = 0.4;
        }
    }

    stat.probability = stat.probability.clamp(0.0001, 0.9999);

    if kind != StatKind::Bnr && config.pvalue == PValuePolicy::Robinson {
        let n = (stat.spam_hits + stat.innocent_hits) as f64;
        stat.probability = ((CHI_S * CHI_X) + n * stat.probability) / (CHI_S + n);
    }
}

/// Number of words a pattern token covers: one more than its join marks.
pub fn complexity(name: &str) -> u32 {
    1 + name.bytes().filter(|&b| b == b'+').count() as u32
}

/// Number of placeholder gaps in a sparse pattern token.
pub fn sparseness(name: &str) -> u32 {
    let bytes = name.as_bytes();
    let mut sparse = 0;
    if name.starts_with("#+") {
        sparse += 1;
    }
    if name.len() >= 2 && name.ends_with("+#") {
        sparse += 1;
    }
    for window in bytes.windows(3) {
        if window == b"+#+" {
            sparse += 1;
        }
    }
    sparse
}

/// Markovian weight of a token: longer, denser patterns carry
/// exponentially more weight.
pub fn markov_weight(name: &str) -> u32 {
    let complexity = complexity(name);
    let sparse = sparseness(name);

    match (complexity, sparse) {
        (1, 0) => 1,
        (2, 0) => 4,
        (3, 1) => 4,
        (3, 0) => 16,
        (4, 2) => 4,
        (4, 1) => 16,
        (4, 0) => 64,
        (5, 3) => 4,
        (5, 2) => 16,
        (5, 1) => 64,
        (5, 0) => 256,
        _ => {
            warn!(token = name, complexity, sparse, "no markovian weight rule");
            1
        }
    }
}
