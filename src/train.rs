//! Training: totals bookkeeping, token hit updates, signature retraining.
//!
//! Everything here mutates state *after* a verdict exists. The rules are
//! deliberately asymmetric between learning, unlearning, corpus feeding and
//! error correction, and they differ again between training modes; the
//! [`PassPlan`] carries the knobs so the rules read in one place.

use tracing::debug;

use crate::config::{
    Class, ClassifierConfig, OperatingMode, TrainingMode, TrainingSource,
};
use crate::diction::{Diction, TermKind};
use crate::error::StorageError;
use crate::signature::SignatureEntry;
use crate::store::{StoreResult, TokenRecord, TokenStore, Totals};

/// Hit-count threshold past which train-until-mature stops updating a
/// token, absent a reason to keep going.
const TUM_MATURITY: u64 = 50;

/// Confidence below which train-until-mature keeps training everything.
const TUM_CONFIDENCE: f64 = 0.70;

/// Innocent-corpus size past which noise-reduction patterns are trained.
const PATTERN_TRAINING_FLOOR: u64 = 500;

/// The decisions that shape a single pass, resolved once up front.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PassPlan {
    pub mode: OperatingMode,
    pub training: TrainingMode,
    pub classification: Option<Class>,
    pub source: Option<TrainingSource>,
    pub unlearn: bool,
    pub signature_provided: bool,
}

impl PassPlan {
    /// A message trained as innocent to correct a spam verdict.
    pub(crate) fn false_positive(&self) -> bool {
        self.classification == Some(Class::Innocent) && self.source == Some(TrainingSource::Error)
    }

    /// A message trained as spam to correct an innocent verdict.
    pub(crate) fn spam_miss(&self) -> bool {
        self.classification == Some(Class::Spam) && self.source == Some(TrainingSource::Error)
    }

    fn reverses_opposite(&self) -> bool {
        self.training != TrainingMode::Toe && self.training != TrainingMode::NoTrain
    }
}

// ---------------------------------------------------------------------------
// Totals
// ---------------------------------------------------------------------------

/// Update the account totals for a finished pass. Returns whether the
/// message counts as learned.
pub(crate) fn update_totals(plan: &PassPlan, totals: &mut Totals, result: Class) -> bool {
    let mut learned = false;

    if result == Class::Spam && plan.mode != OperatingMode::Classify {
        if !plan.unlearn {
            totals.spam_learned += 1;
            learned = true;
        }
        if plan.classification == Some(Class::Spam) {
            if plan.unlearn {
                totals.spam_learned = totals.spam_learned.saturating_sub(1);
            } else if matches!(
                plan.source,
                Some(TrainingSource::Corpus) | Some(TrainingSource::Inoculation)
            ) {
                totals.spam_corpusfed += 1;
            } else if plan.spam_miss() {
                totals.spam_misclassified += 1;
                if plan.reverses_opposite() {
                    totals.innocent_learned = totals.innocent_learned.saturating_sub(1);
                }
            }
        }
    } else if result == Class::Innocent && plan.mode != OperatingMode::Classify {
        if !plan.unlearn {
            totals.innocent_learned += 1;
            learned = true;
        }
        if matches!(
            plan.source,
            Some(TrainingSource::Corpus) | Some(TrainingSource::Inoculation)
        ) {
            totals.innocent_corpusfed += 1;
        } else if plan.false_positive() {
            if plan.unlearn {
                totals.innocent_learned = totals.innocent_learned.saturating_sub(1);
            } else {
                totals.innocent_misclassified += 1;
                if plan.reverses_opposite() {
                    totals.spam_learned = totals.spam_learned.saturating_sub(1);
                }
            }
        }
    }

    // Classify-only passes in train-on-error still grow the corpus size
    // that sedation reasons about.
    if plan.training == TrainingMode::Toe && plan.mode == OperatingMode::Classify {
        match result {
            Class::Spam => totals.spam_classified += 1,
            Class::Innocent => totals.innocent_classified += 1,
        }
    }

    learned
}

// ---------------------------------------------------------------------------
// Token updates
// ---------------------------------------------------------------------------

fn add_hits(hits: &mut u64, occurrence: bool, frequency: i64) {
    if occurrence {
        *hits = hits.saturating_add_signed(frequency.max(0));
    } else {
        *hits += 1;
    }
}

fn sub_hits(hits: &mut u64, occurrence: bool, frequency: i64) {
    if occurrence {
        *hits = hits.saturating_sub(frequency.max(0) as u64);
    } else {
        *hits = hits.saturating_sub(1);
    }
}

/// Apply the pass's hit-count changes to every term and mark what must be
/// written back. Optionally collects the token/frequency pairs for a new
/// training signature.
pub(crate) fn increment_tokens(
    config: &ClassifierConfig,
    plan: &PassPlan,
    totals: &Totals,
    result: Class,
    confidence: f64,
    diction: &mut Diction,
    build_signature: bool,
) -> Option<Vec<SignatureEntry>> {
    let occurrence = config.count_occurrences;
    let whitelist_token = diction.whitelist_token;
    let ti = totals.innocent_learned + totals.innocent_classified;
    let mut entries = build_signature.then(|| Vec::with_capacity(diction.len()));

    for key in diction.keys() {
        let Some(term) = diction.find_mut(key) else {
            continue;
        };

        if let Some(entries) = entries.as_mut() {
            entries.push(SignatureEntry {
                key,
                frequency: term.frequency,
            });
        }

        match plan.classification {
            Some(Class::Spam) => term.stat.probability = 1.0,
            Some(Class::Innocent) => term.stat.probability = 0.0,
            None => {}
        }

        let stat = &mut term.stat;
        if term.kind == TermKind::Word
            && (plan.training != TrainingMode::Tum
                || plan.source == Some(TrainingSource::Error)
                || plan.source == Some(TrainingSource::Inoculation)
                || stat.spam_hits + stat.innocent_hits < TUM_MATURITY
                || Some(key) == whitelist_token
                || confidence < TUM_CONFIDENCE)
        {
            stat.dirty = true;
        }
        if term.kind == TermKind::Pattern
            && ti > PATTERN_TRAINING_FLOOR
            && config.noise_reduction
            && !plan.signature_provided
        {
            stat.dirty = true;
        }

        if result == Class::Spam {
            if plan.source == Some(TrainingSource::Inoculation) {
                // Inoculations weigh heavier the first time a token is seen.
                if stat.innocent_hits < 2 && stat.spam_hits < 5 {
                    stat.spam_hits += 5;
                } else {
                    stat.spam_hits += 2;
                }
            } else if plan.unlearn {
                if plan.classification == Some(Class::Spam) {
                    sub_hits(&mut stat.spam_hits, occurrence, term.frequency);
                }
            } else {
                add_hits(&mut stat.spam_hits, occurrence, term.frequency);
            }

            if plan.spam_miss() && !plan.unlearn && plan.reverses_opposite() {
                sub_hits(&mut stat.innocent_hits, occurrence, term.frequency);
            }
        } else {
            if plan.unlearn {
                if plan.classification == Some(Class::Innocent) {
                    sub_hits(&mut stat.innocent_hits, occurrence, term.frequency);
                }
            } else {
                add_hits(&mut stat.innocent_hits, occurrence, term.frequency);
            }

            if plan.false_positive() && !plan.unlearn && plan.reverses_opposite() {
                sub_hits(&mut stat.spam_hits, occurrence, term.frequency);
            }
        }
    }

    entries
}

/// Write every dirty term's hit counts back to storage.
///
/// Classify-only passes write nothing, with one exception: a mature
/// train-on-error account still updates its whitelist sender token and
/// noise-reduction patterns, since those must keep learning while regular
/// tokens do not. Hit counts are clamped to the learned totals; a token
/// cannot have been seen in more messages than were learned.
pub(crate) fn persist_dirty(
    config: &ClassifierConfig,
    plan: &PassPlan,
    totals: &Totals,
    diction: &Diction,
    store: &dyn TokenStore,
) -> StoreResult<()> {
    if plan.mode == OperatingMode::Classify
        && (plan.training != TrainingMode::Toe
            || (diction.whitelist_token.is_none() && !config.noise_reduction))
    {
        return Ok(());
    }

    let classify_toe = plan.training == TrainingMode::Toe
        && plan.classification.is_none()
        && plan.mode == OperatingMode::Classify;

    let mut records = Vec::new();
    for key in diction.keys() {
        let Some(term) = diction.find(key) else {
            continue;
        };
        if !term.stat.dirty {
            continue;
        }
        if classify_toe
            && Some(key) != diction.whitelist_token
            && !term.name.starts_with("bnr.")
        {
            continue;
        }
        records.push((
            key,
            TokenRecord {
                spam_hits: term.stat.spam_hits.min(totals.spam_learned),
                innocent_hits: term.stat.innocent_hits.min(totals.innocent_learned),
            },
        ));
    }
    if records.is_empty() {
        return Ok(());
    }
    debug!(records = records.len(), "persisting token records");
    store.set_all_records(&records)
}

// ---------------------------------------------------------------------------
// Signature retraining
// ---------------------------------------------------------------------------

/// Retrain (or unlearn) from a token signature instead of message text.
///
/// Reverses exactly what the original pass recorded: totals move the same
/// way they would for a fresh message, every signature token's hit counts
/// move by its recorded frequency. Returns the pinned class and
/// probability.
pub(crate) fn process_signature(
    config: &ClassifierConfig,
    plan: &PassPlan,
    totals: &mut Totals,
    entries: &[SignatureEntry],
    store: &dyn TokenStore,
) -> Result<(Class, f64), StorageError> {
    let occurrence = config.count_occurrences;
    debug!(tokens = entries.len(), "retraining from signature");

    if plan.classification == Some(Class::Innocent) && plan.mode != OperatingMode::Classify {
        if plan.unlearn {
            totals.innocent_learned = totals.innocent_learned.saturating_sub(1);
        } else {
            if plan.source == Some(TrainingSource::Error) {
                totals.innocent_misclassified += 1;
                if plan.reverses_opposite() {
                    totals.spam_learned = totals.spam_learned.saturating_sub(1);
                }
            } else {
                totals.innocent_corpusfed += 1;
            }
            totals.innocent_learned += 1;
        }
    } else if plan.classification == Some(Class::Spam) && plan.mode != OperatingMode::Classify {
        if plan.unlearn {
            totals.spam_learned = totals.spam_learned.saturating_sub(1);
        } else {
            if plan.source == Some(TrainingSource::Error) {
                totals.spam_misclassified += 1;
                if plan.reverses_opposite() {
                    totals.innocent_learned = totals.innocent_learned.saturating_sub(1);
                }
            } else {
                totals.spam_corpusfed += 1;
            }
            totals.spam_learned += 1;
        }
    }

    let mut diction = Diction::new(24593);
    for entry in entries {
        diction.touch(entry.key, "-", None).frequency = entry.frequency;
    }

    let keys = diction.keys();
    let records = store.get_all_records(&keys)?;
    for key in &keys {
        if let Some(record) = records.get(key)
            && let Some(term) = diction.find_mut(*key)
        {
            term.stat.spam_hits = record.spam_hits;
            term.stat.innocent_hits = record.innocent_hits;
            term.stat.on_disk = true;
        }
    }

    for key in keys {
        let Some(term) = diction.find_mut(key) else {
            continue;
        };
        let stat = &mut term.stat;

        match plan.classification {
            Some(Class::Innocent) => {
                if plan.unlearn {
                    sub_hits(&mut stat.innocent_hits, occurrence, term.frequency);
                } else {
                    add_hits(&mut stat.innocent_hits, occurrence, term.frequency);
                    if plan.source == Some(TrainingSource::Error) && plan.reverses_opposite() {
                        sub_hits(&mut stat.spam_hits, occurrence, term.frequency);
                    }
                }
            }
            Some(Class::Spam) => {
                if plan.unlearn {
                    sub_hits(&mut stat.spam_hits, occurrence, term.frequency);
                } else {
                    if plan.source == Some(TrainingSource::Error) && plan.reverses_opposite() {
                        sub_hits(&mut stat.innocent_hits, occurrence, term.frequency);
                    }
                    if plan.source == Some(TrainingSource::Inoculation) {
                        if stat.innocent_hits < 2 && stat.spam_hits < 5 {
                            stat.spam_hits += 5;
                        } else {
                            stat.spam_hits += 2;
                        }
                    } else {
                        add_hits(&mut stat.spam_hits, occurrence, term.frequency);
                    }
                }
            }
            None => {}
        }

        stat.dirty = true;
    }

    if plan.training != TrainingMode::NoTrain {
        persist_dirty(config, plan, totals, &diction, store)?;
    }

    Ok(match plan.classification {
        Some(Class::Spam) => (Class::Spam, 1.0),
        _ => (Class::Innocent, 0.0),
    })
}
