//! Per-message token table.
//!
//! A [`Diction`] collects every token observed in one message together with
//! its per-message frequency and the statistics loaded for it from storage.
//! It lives for exactly one classification pass. Lookups are by 64-bit token
//! key; the table also keeps two insertion-ordered key sequences used by
//! noise reduction, and remembers which key (if any) is the sender
//! whitelist token.

use crate::score::stat::SpamStat;

/// What a table entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    /// A token produced by the tokenizer.
    Word,
    /// A noise-reduction context pattern merged into the table.
    Pattern,
}

/// Which ordered sequence a touched token joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    /// The plain body-token sequence.
    Context,
    /// The chained (bigram) body-token sequence.
    Chained,
}

/// One token in the table.
#[derive(Debug, Clone)]
pub struct Term {
    pub key: u64,
    pub name: String,
    /// Occurrences in this message. Noise reduction may drive this to zero
    /// or below, which removes the token from ranking.
    pub frequency: i64,
    pub kind: TermKind,
    pub stat: SpamStat,
}

/// Bucket counts, ascending primes. The table picks the first at least as
/// large as the requested capacity.
const PRIME_LADDER: [u64; 28] = [
    53,
    97,
    193,
    389,
    769,
    1543,
    3079,
    6151,
    12289,
    24593,
    49157,
    98317,
    196_613,
    393_241,
    786_433,
    1_572_869,
    3_145_739,
    6_291_469,
    12_582_917,
    25_165_843,
    50_331_653,
    100_663_319,
    201_326_611,
    402_653_189,
    805_306_457,
    1_610_612_741,
    3_221_225_473,
    4_294_967_291,
];

/// Hash table of [`Term`]s keyed by token hash, with open chaining.
#[derive(Debug)]
pub struct Diction {
    buckets: Vec<Vec<Term>>,
    items: usize,
    /// Body tokens in order of appearance (one entry per occurrence).
    pub order: Vec<u64>,
    /// Chained body tokens in order of appearance.
    pub chained_order: Vec<u64>,
    /// Key of the sender whitelist token, when one was emitted.
    pub whitelist_token: Option<u64>,
}

impl Diction {
    /// Create a table sized for roughly `capacity` tokens.
    pub fn new(capacity: u64) -> Self {
        let size = PRIME_LADDER
            .iter()
            .copied()
            .find(|&p| p >= capacity)
            .unwrap_or(PRIME_LADDER[PRIME_LADDER.len() - 1]);
        Self {
            buckets: vec![Vec::new(); size as usize],
            items: 0,
            order: Vec::new(),
            chained_order: Vec::new(),
            whitelist_token: None,
        }
    }

    fn bucket(&self, key: u64) -> usize {
        (key % self.buckets.len() as u64) as usize
    }

    /// Number of distinct terms in the table.
    pub fn len(&self) -> usize {
        self.items
    }

    /// Whether the table holds no terms.
    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    /// Record one occurrence of a token.
    ///
    /// Creates the term with frequency 1 if absent, otherwise bumps its
    /// frequency and fills in the name if it was created nameless. When an
    /// `order` is given, the key is appended to that sequence on *every*
    /// touch, so the sequences carry one entry per occurrence.
    pub fn touch(&mut self, key: u64, name: &str, order: Option<OrderKind>) -> &mut Term {
        let bucket = self.bucket(key);
        match order {
            Some(OrderKind::Context) => self.order.push(key),
            Some(OrderKind::Chained) => self.chained_order.push(key),
            None => {}
        }

        let chain = &mut self.buckets[bucket];
        let pos = chain.iter().position(|t| t.key == key);
        match pos {
            Some(i) => {
                let term = &mut chain[i];
                term.frequency += 1;
                if term.name.is_empty() && !name.is_empty() {
                    term.name = name.to_owned();
                }
                &mut chain[i]
            }
            None => {
                chain.push(Term {
                    key,
                    name: name.to_owned(),
                    frequency: 1,
                    kind: TermKind::Word,
                    stat: SpamStat::default(),
                });
                self.items += 1;
                let last = chain.len() - 1;
                &mut chain[last]
            }
        }
    }

    /// Look up a term by key.
    pub fn find(&self, key: u64) -> Option<&Term> {
        self.buckets[self.bucket(key)].iter().find(|t| t.key == key)
    }

    /// Look up a term by key, mutably.
    pub fn find_mut(&mut self, key: u64) -> Option<&mut Term> {
        let bucket = self.bucket(key);
        self.buckets[bucket].iter_mut().find(|t| t.key == key)
    }

    /// Remove a term. Returns whether it was present. Entries already in the
    /// ordered sequences stay there; consumers of the sequences look keys up
    /// again and skip the missing ones.
    pub fn delete(&mut self, key: u64) -> bool {
        let bucket = self.bucket(key);
        let chain = &mut self.buckets[bucket];
        if let Some(i) = chain.iter().position(|t| t.key == key) {
            chain.remove(i);
            self.items -= 1;
            true
        } else {
            false
        }
    }

    /// Copy of a term's statistics, if present.
    pub fn get_stat(&self, key: u64) -> Option<SpamStat> {
        self.find(key).map(|t| t.stat.clone())
    }

    /// Replace a term's statistics. Returns whether the term was present.
    pub fn set_stat(&mut self, key: u64, stat: &SpamStat) -> bool {
        match self.find_mut(key) {
            Some(term) => {
                term.stat = stat.clone();
                true
            }
            None => false,
        }
    }

    /// Merge statistics into a term: hit counts and probability add, the
    /// disk/dirty markers combine. Used to overlay group records onto user
    /// records. Returns whether the term was present.
    pub fn add_stat(&mut self, key: u64, stat: &SpamStat) -> bool {
        match self.find_mut(key) {
            Some(term) => {
                term.stat.probability += stat.probability;
                term.stat.spam_hits += stat.spam_hits;
                term.stat.innocent_hits += stat.innocent_hits;
                term.stat.on_disk |= stat.on_disk;
                term.stat.dirty |= stat.dirty;
                true
            }
            None => false,
        }
    }

    /// Snapshot of every key currently in the table, bucket order.
    pub fn keys(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .flat_map(|chain| chain.iter().map(|t| t.key))
            .collect()
    }

    /// Cursor over the terms present when it was created.
    ///
    /// The cursor holds keys, not references, so the table stays mutable
    /// while iterating. Terms deleted after cursor creation are skipped;
    /// deleting the key the cursor just yielded never skips or repeats the
    /// remaining terms.
    pub fn cursor(&self) -> DictionCursor {
        DictionCursor {
            keys: self.keys(),
            pos: 0,
        }
    }
}

/// See [`Diction::cursor`].
#[derive(Debug)]
pub struct DictionCursor {
    keys: Vec<u64>,
    pos: usize,
}

impl DictionCursor {
    /// Next key still present in `diction`, or `None` when exhausted.
    pub fn next_key(&mut self, diction: &Diction) -> Option<u64> {
        while self.pos < self.keys.len() {
            let key = self.keys[self.pos];
            self.pos += 1;
            if diction.find(key).is_some() {
                return Some(key);
            }
        }
        None
    }
}
