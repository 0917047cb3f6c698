//! Bayesian noise reduction through contextual symmetry logic.
//!
//! Tokens rarely lie, but messages do: spam drowns its payload in passages
//! of perfectly innocent prose. Noise reduction watches the *sequence* of
//! token probabilities, learns which three-value context patterns are
//! themselves predictive, and suppresses tokens whose own value is
//! inconsistent with a decided pattern they appear under. Suppression only
//! affects the current pass; the token's stored statistics are untouched.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::{Class, ClassifierConfig};
use crate::diction::{Diction, TermKind};
use crate::score::stat::{StatKind, calc_stat};
use crate::store::{TokenStore, Totals};
use crate::tokenizer::token_key;

/// Context window: each pattern covers this many consecutive tokens.
const WINDOW_SIZE: usize = 3;

/// A pattern is decided when its own p-value sits further than this from
/// neutral.
const DECISIVE_RADIUS: f64 = 0.25;

/// A token under a decided pattern is eliminated when its value differs
/// from the pattern's by more than this.
const INCONSISTENCY_RADIUS: f64 = 0.33;

/// Name of the totals record the pattern statistics normalize against.
pub(crate) const TOTALS_PATTERN: &str = "bnr.t|";

/// Innocent-corpus size below which elimination is not trusted at all.
const ELIMINATION_FLOOR: u64 = 2500;

/// Innocent-corpus size above which patterns are trained alongside tokens.
const TRAINING_FLOOR: u64 = 1000;

const PATTERN_TABLE_CAPACITY: u64 = 3079;

// ---------------------------------------------------------------------------
// Pattern streams
// ---------------------------------------------------------------------------

struct StreamToken {
    value: f64,
    eliminated: bool,
}

/// One ordered stream of token probabilities plus the window patterns
/// instantiated over it. The plain and chained token sequences each get
/// their own stream, tagged by an identifier character that becomes part
/// of every pattern name.
pub(crate) struct BnrStream {
    identifier: char,
    stream: Vec<StreamToken>,
    patterns: HashMap<String, f64>,
}

impl BnrStream {
    pub(crate) fn new(identifier: char) -> Self {
        Self {
            identifier,
            stream: Vec::new(),
            patterns: HashMap::new(),
        }
    }

    /// Append the next token's probability to the stream.
    pub(crate) fn add(&mut self, value: f64) {
        self.stream.push(StreamToken {
            value,
            eliminated: false,
        });
    }

    /// Instantiate a window pattern at every stream position. Windows that
    /// overhang the start of the stream are padded with 0.00 slots.
    pub(crate) fn instantiate(&mut self) {
        let mut window = [0.0f64; WINDOW_SIZE];
        for token in &self.stream {
            slide(&mut window, round_up(token.value));
            self.patterns
                .entry(pattern_name(self.identifier, &window))
                .or_insert(0.0);
        }
    }

    /// Assign a p-value to an instantiated pattern. Unknown names are
    /// ignored.
    pub(crate) fn set_pattern(&mut self, name: &str, value: f64) {
        if let Some(slot) = self.patterns.get_mut(name) {
            *slot = value;
        }
    }

    /// Walk the stream a second time and mark eliminations: wherever a
    /// decided pattern covers a token whose raw value is inconsistent with
    /// the pattern's value, that token is suppressed.
    pub(crate) fn finalize(&mut self) {
        let mut probs = [0.0f64; WINDOW_SIZE];
        let mut slots: [Option<usize>; WINDOW_SIZE] = [None; WINDOW_SIZE];

        for i in 0..self.stream.len() {
            slide(&mut probs, round_up(self.stream[i].value));
            for s in 0..WINDOW_SIZE - 1 {
                slots[s] = slots[s + 1];
            }
            slots[WINDOW_SIZE - 1] = Some(i);

            let name = pattern_name(self.identifier, &probs);
            let pattern_value = self.patterns.get(&name).copied().unwrap_or(0.0);
            if (0.5 - pattern_value).abs() > DECISIVE_RADIUS {
                for slot in slots.iter().flatten() {
                    if (self.stream[*slot].value - pattern_value).abs() > INCONSISTENCY_RADIUS {
                        self.stream[*slot].eliminated = true;
                    }
                }
            }
        }
    }

    /// Elimination flags in stream order.
    pub(crate) fn eliminations(&self) -> impl Iterator<Item = bool> + '_ {
        self.stream.iter().map(|t| t.eliminated)
    }

    fn eliminated_count(&self) -> usize {
        self.stream.iter().filter(|t| t.eliminated).count()
    }
}

fn slide(window: &mut [f64; WINDOW_SIZE], value: f64) {
    for i in 0..WINDOW_SIZE - 1 {
        window[i] = window[i + 1];
    }
    window[WINDOW_SIZE - 1] = value;
}

/// Round a probability up to the next 0.05 step, coarsening the pattern
/// space enough for contexts to repeat across messages.
fn round_up(value: f64) -> f64 {
    let mut r = (value * 100.0) as i64;
    while r % 5 != 0 {
        r += 1;
    }
    r as f64 / 100.0
}

fn pattern_name(identifier: char, window: &[f64; WINDOW_SIZE]) -> String {
    let mut name = format!("bnr.{identifier}|");
    for value in window {
        name.push_str(&format!("{value:.2}_"));
    }
    name
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Run noise reduction over a tokenized, statistics-loaded diction.
///
/// Always instantiates the message's context patterns; whether anything
/// more happens depends on corpus maturity. Past [`ELIMINATION_FLOOR`]
/// innocent messages (and only on an unforced, signature-less pass),
/// inconsistent tokens have their frequency decremented, dropping them
/// from ranking. Past [`TRAINING_FLOOR`], the patterns themselves are
/// merged into the diction so training sees them.
pub(crate) fn apply_bnr(
    config: &ClassifierConfig,
    totals: &Totals,
    classification: Option<Class>,
    signature_provided: bool,
    diction: &mut Diction,
    store: &dyn TokenStore,
) {
    let mut patterns = Diction::new(PATTERN_TABLE_CAPACITY);
    let mut plain = BnrStream::new('s');
    let mut chained = BnrStream::new('c');

    let order = diction.order.clone();
    let chained_order = diction.chained_order.clone();
    instantiate_patterns(config, totals, classification, diction, &order, 's', &mut patterns);
    instantiate_patterns(
        config,
        totals,
        classification,
        diction,
        &chained_order,
        'c',
        &mut patterns,
    );

    let totals_key = token_key(TOTALS_PATTERN);
    patterns.touch(totals_key, TOTALS_PATTERN, None).kind = TermKind::Pattern;

    // Load pattern statistics
    debug!(patterns = patterns.len(), "loading noise reduction patterns");
    let keys = patterns.keys();
    match store.get_all_records(&keys) {
        Ok(records) => {
            for key in keys {
                if let Some(record) = records.get(&key)
                    && let Some(term) = patterns.find_mut(key)
                {
                    term.stat.spam_hits = record.spam_hits;
                    term.stat.innocent_hits = record.innocent_hits;
                    term.stat.on_disk = true;
                }
            }
        }
        Err(error) => {
            warn!(%error, "noise reduction pattern load failed, skipping");
            return;
        }
    }

    let ti = totals.innocent_learned + totals.innocent_classified;
    if classification.is_none() && !signature_provided && ti > ELIMINATION_FLOOR {
        for &key in &order {
            if let Some(term) = diction.find(key) {
                plain.add(term.stat.probability);
            }
        }
        for &key in &chained_order {
            if let Some(term) = diction.find(key) {
                chained.add(term.stat.probability);
            }
        }
        plain.instantiate();
        chained.instantiate();

        // Pattern p-values come from the pattern corpus, normalized against
        // its own totals record rather than the account totals.
        let bnr_totals = patterns.get_stat(totals_key).unwrap_or_default();
        for key in patterns.keys() {
            let Some(term) = patterns.find_mut(key) else {
                continue;
            };
            calc_stat(
                config,
                totals,
                classification,
                &term.name,
                &mut term.stat,
                StatKind::Bnr,
                Some(&bnr_totals),
            );
            let value = term.stat.probability;
            match term.name.as_bytes().get(4) {
                Some(b's') => {
                    let name = term.name.clone();
                    plain.set_pattern(&name, value);
                }
                Some(b'c') => {
                    let name = term.name.clone();
                    chained.set_pattern(&name, value);
                }
                _ => {}
            }
        }

        plain.finalize();
        chained.finalize();

        let mut flags = plain.eliminations();
        for &key in &order {
            if let Some(term) = diction.find_mut(key)
                && flags.next() == Some(true)
            {
                term.frequency -= 1;
            }
        }
        drop(flags);
        let mut flags = chained.eliminations();
        for &key in &chained_order {
            if let Some(term) = diction.find_mut(key)
                && flags.next() == Some(true)
            {
                term.frequency -= 1;
            }
        }
        drop(flags);

        debug!(
            eliminated = plain.eliminated_count() + chained.eliminated_count(),
            stream = order.len() + chained_order.len(),
            "noise reduction complete"
        );
    }

    // Merge patterns into the diction so training updates their records.
    if ti > TRAINING_FLOOR {
        for key in patterns.keys() {
            if let Some(pattern) = patterns.find(key) {
                let name = pattern.name.clone();
                let stat = pattern.stat.clone();
                let term = diction.touch(key, &name, None);
                term.kind = TermKind::Pattern;
                term.frequency = 1;
                term.stat = stat;
            }
        }
    }
}

/// Compute each stream token's p-value and register the window pattern it
/// completes into the pattern table.
fn instantiate_patterns(
    config: &ClassifierConfig,
    totals: &Totals,
    classification: Option<Class>,
    diction: &mut Diction,
    order: &[u64],
    identifier: char,
    patterns: &mut Diction,
) {
    let mut window = [0.0f64; WINDOW_SIZE];
    for &key in order {
        let Some(term) = diction.find_mut(key) else {
            continue;
        };
        calc_stat(
            config,
            totals,
            classification,
            &term.name,
            &mut term.stat,
            StatKind::Default,
            None,
        );
        slide(&mut window, round_up(term.stat.probability));
        let name = pattern_name(identifier, &window);
        patterns.touch(token_key(&name), &name, None).kind = TermKind::Pattern;
    }
}
