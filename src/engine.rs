//! Classifier facade: the top-level API of the chaff engine.
//!
//! A [`Classifier`] owns a configuration, a storage handle and the
//! account's running totals, and turns [`ClassifyRequest`]s into
//! [`Outcome`]s. One instance corresponds to one statistical account; two
//! classifiers with different stores never share state.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bnr;
use crate::config::{Class, ClassifierConfig, OperatingMode, TrainingMode, TrainingSource};
use crate::diction::{Diction, TermKind};
use crate::error::{ChaffResult, ConfigError, ProcessError};
use crate::heap::TokenHeap;
use crate::score::combine::{
    BURTON_WINDOW, Factor, GRAHAM_WINDOW, ROBINSON_WINDOW, calc_result,
};
use crate::score::stat::{StatKind, calc_stat, complexity};
use crate::signature::Signature;
use crate::store::{TokenStore, Totals};
use crate::tokenizer::{control_token, tokenize};
use crate::train::{self, PassPlan};

/// Diction sizing for a typical message.
const DICTION_CAPACITY: u64 = 24593;

/// Below this many learned messages of either class, train-on-error still
/// trains everything.
const UNDERTRAINED: u64 = 100;

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// One message (or signature) to classify, train or unlearn.
#[derive(Debug, Clone, Default)]
pub struct ClassifyRequest {
    /// Decoded header text, one field per line.
    pub headers: String,
    /// Decoded body text.
    pub body: String,
    /// Caller-asserted truth about the message; forces the verdict and
    /// trains toward it.
    pub classification: Option<Class>,
    /// Where the classification came from. Required with one, forbidden
    /// without.
    pub source: Option<TrainingSource>,
    /// A signature from an earlier pass, for retraining or signature-based
    /// classification.
    pub signature: Option<Signature>,
    /// Reverse the training this message (or signature) received.
    pub unlearn: bool,
}

impl ClassifyRequest {
    /// A plain classification request for decoded message text.
    pub fn message(headers: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            headers: headers.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Assert the message's true class.
    pub fn classified(mut self, class: Class, source: TrainingSource) -> Self {
        self.classification = Some(class);
        self.source = Some(source);
        self
    }

    /// Attach a signature from an earlier pass.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Reverse rather than apply the training.
    pub fn unlearning(mut self) -> Self {
        self.unlearn = true;
        self
    }
}

/// The result of one pass.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub class: Class,
    /// Spam probability. Pinned to 1.0 / 0.0 when a classification was
    /// forced.
    pub probability: f64,
    /// How far the dominant calculation stood from the decision boundary.
    pub confidence: f64,
    /// The tokens that drove the decision, most decisive first.
    pub factors: Vec<Factor>,
    /// Training signature for later retraining, when one was produced.
    pub signature: Option<Signature>,
    /// Whether this pass moved the learned totals.
    pub learned: bool,
    /// The verdict was overridden by the sender whitelist.
    pub whitelisted: bool,
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// A statistical anti-spam classifier bound to one account's store.
pub struct Classifier {
    config: ClassifierConfig,
    store: Arc<dyn TokenStore>,
    totals: Totals,
}

impl Classifier {
    /// Create a classifier, loading the account totals from storage.
    pub fn new(config: ClassifierConfig, store: Arc<dyn TokenStore>) -> ChaffResult<Self> {
        if !config.algorithms.any() {
            return Err(ConfigError::NoAlgorithms.into());
        }
        let totals = store.get_totals()?;
        info!(
            tokenizer = ?config.tokenizer,
            training = ?config.training,
            spam_learned = totals.spam_learned,
            innocent_learned = totals.innocent_learned,
            "initializing classifier"
        );
        Ok(Self {
            config,
            store,
            totals,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// The account totals as of the last pass.
    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    /// Persist the account totals. Call once after the last pass;
    /// classify-only instances skip the write.
    pub fn shutdown(&mut self) -> ChaffResult<()> {
        if self.config.mode != OperatingMode::Classify {
            self.store.set_totals(&self.totals)?;
        }
        debug!("classifier shut down");
        Ok(())
    }

    /// Run one pass: validate, tokenize (or replay a signature), score,
    /// decide, train.
    pub fn process(&mut self, request: ClassifyRequest) -> ChaffResult<Outcome> {
        let ClassifyRequest {
            headers,
            body,
            classification,
            source,
            signature,
            unlearn,
        } = request;
        let sig_provided = signature.is_some();

        if self.config.mode == OperatingMode::Classify && classification.is_some() {
            return Err(ConfigError::ClassifyWithClassification.into());
        }
        if classification.is_some() && source.is_none() {
            return Err(ConfigError::ClassificationWithoutSource.into());
        }
        if classification.is_none() && source.is_some() {
            return Err(ConfigError::SourceWithoutClassification.into());
        }

        let mut training = self.config.training;
        let mut mode = self.config.mode;

        // A train-on-error account with little history trains everything;
        // there is no error rate worth speaking of yet.
        if training == TrainingMode::Toe
            && (self.totals.innocent_learned <= UNDERTRAINED
                || self.totals.spam_learned <= UNDERTRAINED)
            && !self.config.is_weighted()
        {
            debug!("train-on-error account undertrained, training this pass");
            training = TrainingMode::Teft;
        }

        // Mature train-on-error and no-train accounts classify without
        // touching regular token statistics.
        if mode == OperatingMode::Process
            && classification.is_none()
            && matches!(training, TrainingMode::Toe | TrainingMode::NoTrain)
        {
            mode = OperatingMode::Classify;
        }

        let plan = PassPlan {
            mode,
            training,
            classification,
            source,
            unlearn,
            signature_provided: sig_provided,
        };

        // A classified pass under a word tokenizer retrains from the
        // signature alone; the message text is not consulted.
        if mode == OperatingMode::Process
            && classification.is_some()
            && self.config.make_signature
            && !self.config.is_sparse()
        {
            let entries = match signature {
                Some(Signature::Tokens(ref entries)) => entries,
                Some(Signature::Text { .. }) => return Err(ConfigError::SignatureForm.into()),
                None => return Err(ConfigError::MissingSignature.into()),
            };
            let (class, probability) = train::process_signature(
                &self.config,
                &plan,
                &mut self.totals,
                entries,
                self.store.as_ref(),
            )?;
            return Ok(Outcome {
                class,
                probability,
                confidence: 1.0,
                factors: Vec::new(),
                signature: None,
                learned: !unlearn,
                whitelisted: false,
            });
        }

        // An SBPH retrain replays the degenerated text recorded by the
        // original pass instead of the supplied message.
        let sbph_retrain = self.config.is_sparse()
            && mode != OperatingMode::Classify
            && classification.is_some()
            && self.config.make_signature;
        let (headers, body) = if sbph_retrain {
            match &signature {
                Some(Signature::Text { headers, body }) => (headers.clone(), body.clone()),
                Some(Signature::Tokens(_)) => return Err(ConfigError::SignatureForm.into()),
                None => return Err(ConfigError::MissingSignature.into()),
            }
        } else {
            (headers, body)
        };

        let mut diction = Diction::new(DICTION_CAPACITY);

        // Classifying against a provided signature preloads its tokens;
        // anything else tokenizes the message.
        if self.config.make_signature && mode == OperatingMode::Classify && sig_provided {
            match signature {
                Some(Signature::Tokens(ref entries)) => {
                    for entry in entries {
                        let name = format!("E: {}", entry.key);
                        diction.touch(entry.key, &name, None).frequency = entry.frequency;
                    }
                }
                _ => return Err(ConfigError::SignatureForm.into()),
            }
        } else {
            tokenize(&self.config, &headers, &body, &mut diction);
        }

        // Load statistics for everything we saw. A failed read degrades to
        // zeroed records rather than failing the pass.
        let keys = diction.keys();
        match self.store.get_all_records(&keys) {
            Ok(records) => {
                for key in keys {
                    if let Some(record) = records.get(&key)
                        && let Some(term) = diction.find_mut(key)
                    {
                        term.stat.spam_hits = record.spam_hits;
                        term.stat.innocent_hits = record.innocent_hits;
                        term.stat.on_disk = true;
                    }
                }
            }
            Err(error) => {
                warn!(%error, "token record load failed, scoring with zeroed statistics");
            }
        }

        if self.config.noise_reduction {
            bnr::apply_bnr(
                &self.config,
                &self.totals,
                classification,
                sig_provided,
                &mut diction,
                self.store.as_ref(),
            );
        }

        // Rank tokens by their distance from neutral.
        let capacity = if self.config.algorithms.burton {
            BURTON_WINDOW
        } else if self.config.algorithms.robinson {
            ROBINSON_WINDOW
        } else {
            GRAHAM_WINDOW
        } as usize;
        let mut heap = TokenHeap::with_capacity(capacity);

        let control = control_token();
        let whitelist_token = diction.whitelist_token;
        let mut do_whitelist = false;

        for key in diction.keys() {
            if key == control {
                continue;
            }
            let Some(term) = diction.find_mut(key) else {
                continue;
            };
            if term.stat.probability == 0.0 || classification.is_some() {
                calc_stat(
                    &self.config,
                    &self.totals,
                    classification,
                    &term.name,
                    &mut term.stat,
                    StatKind::Default,
                    None,
                );
            }

            if self.config.auto_whitelist
                && Some(key) == whitelist_token
                && term.stat.spam_hits <= term.stat.innocent_hits / 15
                && term.stat.innocent_hits > self.config.whitelist_threshold
                && classification.is_none()
            {
                do_whitelist = true;
            }

            if term.frequency > 0 && term.kind == TermKind::Word {
                heap.insert(
                    term.stat.probability,
                    key,
                    term.frequency,
                    complexity(&term.name),
                );
            }
        }

        if heap.is_empty() {
            return Err(ProcessError::NoSignal.into());
        }

        let verdict = calc_result(&self.config, classification, &heap, &diction);
        let mut class = verdict.class;
        let mut probability = verdict.probability;
        let mut whitelisted = false;

        if self.config.auto_whitelist && do_whitelist {
            debug!("auto-whitelisting this message");
            class = Class::Innocent;
            whitelisted = true;
        }

        let learned = train::update_totals(&plan, &mut self.totals, class);

        let build_entries = !self.config.is_sparse()
            && self.config.make_signature
            && (mode != OperatingMode::Classify || !sig_provided);
        let build_text = self.config.is_sparse()
            && self.config.make_signature
            && ((mode != OperatingMode::Classify && classification.is_none()) || !sig_provided)
            && source != Some(TrainingSource::Corpus);

        let entries = train::increment_tokens(
            &self.config,
            &plan,
            &self.totals,
            class,
            verdict.confidence,
            &mut diction,
            build_entries,
        );

        if training != TrainingMode::NoTrain {
            train::persist_dirty(
                &self.config,
                &plan,
                &self.totals,
                &diction,
                self.store.as_ref(),
            )?;
        }

        match classification {
            Some(Class::Spam) => {
                probability = 1.0;
                class = Class::Spam;
            }
            Some(Class::Innocent) => {
                probability = 0.0;
                class = Class::Innocent;
            }
            None => {}
        }

        let out_signature = if let Some(entries) = entries {
            Some(Signature::Tokens(entries))
        } else if build_text {
            Some(Signature::Text { headers, body })
        } else {
            None
        };

        debug!(
            ?class,
            probability,
            confidence = verdict.confidence,
            learned,
            "pass complete"
        );

        Ok(Outcome {
            class,
            probability,
            confidence: verdict.confidence,
            factors: verdict.factors,
            signature: out_signature,
            learned,
            whitelisted,
        })
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("config", &self.config)
            .field("totals", &self.totals)
            .finish()
    }
}
