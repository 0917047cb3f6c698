//! Combination of ranked token probabilities into a verdict.
//!
//! Five algorithms can run over the same pass: naive Bayes, Graham's and
//! Burton's product combinations over the ranked heap, Robinson's geometric
//! mean, and the Fisher-Robinson inverse chi-square. The Robinson mean is
//! always computed since it doubles as the confidence measure for the
//! classical p-value policies. Spam votes are resolved in a fixed priority
//! order; the first enabled algorithm that votes spam supplies the reported
//! probability and factor set, and when nothing votes spam the first
//! enabled algorithm supplies them instead.

use std::f64::consts::LN_2;
use std::mem;

use crate::config::{Class, ClassifierConfig, PValuePolicy};
use crate::diction::{Diction, TermKind};
use crate::heap::TokenHeap;
use crate::score::stat::{CHI_S, CHI_X};
use crate::tokenizer::control_token;

/// Graham's combination uses only the strongest 15 tokens.
pub(crate) const GRAHAM_WINDOW: i64 = 15;
/// Burton's variant widens the window and double-counts repeats.
pub(crate) const BURTON_WINDOW: i64 = 27;
/// Robinson's geometric mean window.
pub(crate) const ROBINSON_WINDOW: i64 = 25;

/// Robinson smoothing sensitivity.
const ROB_S: f64 = 0.010;
/// Robinson assumed probability when nothing is known.
const ROB_X: f64 = 0.500;
/// Spam cutoff for the Robinson score.
const ROB_CUTOFF: f64 = 0.50;

/// Spam cutoff for the chi-square score.
const CHI_CUTOFF: f64 = 0.5010;
/// Chi-square exclusionary radius: tokens this close to 0.5 are ignored.
const CHI_EXCR: f64 = 0.4500;

/// Spam cutoff for the product-combination algorithms.
const BAYES_CUTOFF: f64 = 0.9;

/// One token's contribution to the dominant calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    pub token: String,
    pub value: f64,
}

/// The outcome of combining one message's token probabilities.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub class: Class,
    pub probability: f64,
    pub confidence: f64,
    pub factors: Vec<Factor>,
}

#[derive(Debug, Default)]
struct Accum {
    top: f64,
    bot: f64,
    used: i64,
    factors: Vec<Factor>,
}

impl Accum {
    fn accumulate(&mut self, p: f64) {
        if self.used == 0 {
            self.top = p;
            self.bot = 1.0 - p;
        } else {
            self.top *= p;
            self.bot *= 1.0 - p;
        }
        self.used += 1;
    }

    fn factor(&mut self, token: &str, value: f64) {
        self.factors.push(Factor {
            token: token.to_owned(),
            value,
        });
    }

    fn product_result(&self) -> Option<f64> {
        if self.used == 0 {
            None
        } else {
            Some(self.top / (self.top + self.bot))
        }
    }
}

struct Candidate {
    enabled: bool,
    score: Option<f64>,
    cutoff: f64,
    factors: Vec<Factor>,
}

/// Combine the ranked tokens into a verdict.
pub fn calc_result(
    config: &ClassifierConfig,
    classification: Option<Class>,
    heap: &TokenHeap,
    diction: &Diction,
) -> Verdict {
    let algorithms = &config.algorithms;
    let weighted = config.is_weighted();

    let mut naive = Accum::default();
    let mut graham = Accum::default();
    let mut burton = Accum::default();
    let mut robinson = Accum::default();

    let mut chi_factors: Vec<Factor> = Vec::new();
    let mut chi_used: i64 = 0;
    let mut chi_s = 1.0f64;
    let mut chi_h = 1.0f64;
    let mut chi_sx: i32 = 0;
    let mut chi_hx: i32 = 0;

    // Ranked-token pass, most decisive first.
    for entry in heap.iter_decisive() {
        let Some(term) = diction.find(entry.key) else {
            continue;
        };
        if term.kind == TermKind::Pattern {
            continue;
        }

        let p = match classification {
            Some(Class::Spam) => 1.0,
            Some(Class::Innocent) => 0.0,
            None => term.stat.probability,
        };
        let name = term.name.as_str();

        if algorithms.graham && graham.used < GRAHAM_WINDOW {
            graham.factor(name, p);
            graham.accumulate(p);
        }

        if algorithms.burton && burton.used < BURTON_WINDOW {
            burton.factor(name, p);
            burton.accumulate(p);
            if burton.used < BURTON_WINDOW && entry.frequency > 1 {
                burton.factor(name, p);
                burton.accumulate(p);
            }
        }

        // Robinson runs regardless of the algorithm set: its score is the
        // confidence measure for the classical policies.
        if robinson.used < ROBINSON_WINDOW {
            let n = heap.len().min(ROBINSON_WINDOW as usize) as f64;
            let smoothed = ((ROB_S * ROB_X) + n * p) / (ROB_S + n);

            robinson.factor(name, p);
            if smoothed < 0.3 || smoothed > 0.7 {
                robinson.accumulate(smoothed);
                if robinson.used < ROBINSON_WINDOW && entry.frequency > 1 {
                    robinson.factor(name, p);
                    robinson.accumulate(smoothed);
                }
            }
        }
    }

    // Whole-table pass for the algorithms that want every token.
    if algorithms.naive || algorithms.chi_square {
        let mut cursor = diction.cursor();
        while let Some(key) = cursor.next_key(diction) {
            if key == control_token() {
                continue;
            }
            let Some(term) = diction.find(key) else {
                continue;
            };

            if algorithms.naive {
                let p = term.stat.probability;
                naive.factor(&term.name, p);
                naive.accumulate(p);
            }

            if algorithms.chi_square {
                if term.kind == TermKind::Pattern {
                    continue;
                }

                let fw = if config.pvalue == PValuePolicy::Robinson {
                    term.stat.probability
                } else {
                    let n = (term.stat.spam_hits + term.stat.innocent_hits) as f64;
                    ((CHI_S * CHI_X) + n * term.stat.probability) / (CHI_S + n)
                };

                if (0.5 - fw).abs() > CHI_EXCR {
                    chi_factors.push(Factor {
                        token: term.name.clone(),
                        value: term.stat.probability,
                    });
                    chi_used += 1;
                    chi_s *= 1.0 - fw;
                    chi_h *= fw;
                    // keep the running products renormalized so they never
                    // underflow to zero
                    if chi_s < 1e-200 {
                        let (m, e) = frexp(chi_s);
                        chi_s = m;
                        chi_sx += e;
                    }
                    if chi_h < 1e-200 {
                        let (m, e) = frexp(chi_h);
                        chi_h = m;
                        chi_hx += e;
                    }
                }
            }
        }
    }

    let rob_result = if robinson.used == 0 {
        0.0
    } else {
        let p = 1.0 - robinson.bot.powf(1.0 / robinson.used as f64);
        let q = 1.0 - robinson.top.powf(1.0 / robinson.used as f64);
        let s = (p - q) / (p + q);
        (s + 1.0) / 2.0
    };

    let chi_result = if algorithms.chi_square {
        if chi_used > 0 {
            let ln_s = chi_s.ln() + f64::from(chi_sx) * LN_2;
            let ln_h = chi_h.ln() + f64::from(chi_hx) * LN_2;
            let s = 1.0 - chi2q(-2.0 * ln_s, 2 * chi_used as u64);
            let h = 1.0 - chi2q(-2.0 * ln_h, 2 * chi_used as u64);
            Some(((s - h) + 1.0) / 2.0)
        } else {
            Some(CHI_CUTOFF - 0.1)
        }
    } else {
        None
    };

    // Fixed decision priority.
    let mut candidates = [
        Candidate {
            enabled: algorithms.naive,
            score: naive.product_result(),
            cutoff: BAYES_CUTOFF,
            factors: mem::take(&mut naive.factors),
        },
        Candidate {
            enabled: algorithms.graham,
            score: graham.product_result(),
            cutoff: BAYES_CUTOFF,
            factors: mem::take(&mut graham.factors),
        },
        Candidate {
            enabled: algorithms.burton,
            score: burton.product_result(),
            cutoff: BAYES_CUTOFF,
            factors: mem::take(&mut burton.factors),
        },
        Candidate {
            enabled: algorithms.robinson,
            score: Some(rob_result),
            cutoff: ROB_CUTOFF,
            factors: mem::take(&mut robinson.factors),
        },
        Candidate {
            enabled: algorithms.chi_square,
            score: chi_result,
            cutoff: CHI_CUTOFF,
            factors: chi_factors,
        },
    ];

    let mut class = Class::Innocent;
    let mut probability: Option<f64> = None;
    let mut chosen: Option<usize> = None;

    match classification {
        Some(forced) => {
            class = forced;
            probability = Some(if forced == Class::Spam { 1.0 } else { 0.0 });
        }
        None => {
            for (i, candidate) in candidates.iter().enumerate() {
                if !candidate.enabled {
                    continue;
                }
                let Some(score) = candidate.score else {
                    continue;
                };
                let votes_spam = if weighted {
                    score > 0.5
                } else {
                    score >= candidate.cutoff
                };
                if votes_spam {
                    class = Class::Spam;
                    probability = Some(score);
                    chosen = Some(i);
                    break;
                }
            }
        }
    }

    // No spam vote (or a forced classification): the first enabled
    // algorithm explains the outcome.
    if chosen.is_none() {
        for (i, candidate) in candidates.iter().enumerate() {
            if candidate.enabled && candidate.score.is_some() {
                if probability.is_none() {
                    probability = candidate.score;
                }
                chosen = Some(i);
                break;
            }
        }
    }

    let probability = probability.unwrap_or(0.0);
    let factors = chosen
        .map(|i| mem::take(&mut candidates[i].factors))
        .unwrap_or_default();

    let confidence = if weighted {
        if class == Class::Spam {
            probability
        } else {
            1.0 - probability
        }
    } else if class == Class::Spam {
        rob_result
    } else {
        1.0 - rob_result
    };

    Verdict {
        class,
        probability,
        confidence,
        factors,
    }
}

/// Inverse chi-square: the probability that a chi-squared statistic of
/// `x` with `v` degrees of freedom would arise by chance.
fn chi2q(x: f64, v: u64) -> f64 {
    let m = x / 2.0;
    let mut s = (-m).exp();
    let mut t = s;
    for i in 1..(v / 2) {
        t *= m / i as f64;
        s += t;
    }
    s.min(1.0)
}

/// Decompose a float into mantissa in [0.5, 1.0) and power-of-two
/// exponent, like C's `frexp`.
fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let raw_exp = ((bits >> 52) & 0x7ff) as i32;
    if raw_exp == 0 {
        // subnormal: scale into the normal range first
        let (m, e) = frexp(x * f64::from_bits(0x43f0_0000_0000_0000)); // 2^64
        return (m, e - 64);
    }
    let exponent = raw_exp - 1022;
    let mantissa = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1022u64 << 52));
    (mantissa, exponent)
}
