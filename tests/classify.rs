//! End-to-end classification tests.
//!
//! These exercise the full pipeline: tokenization, statistics loading,
//! ranking, combination, training and signature-based retraining against
//! the in-memory store.

use std::sync::Arc;

use chaff::config::{
    AlgorithmSet, Class, ClassifierConfig, OperatingMode, TokenizerKind, TrainingMode,
    TrainingSource,
};
use chaff::engine::{Classifier, ClassifyRequest};
use chaff::signature::Signature;
use chaff::store::mem::MemStore;
use chaff::store::{TokenRecord, TokenStore, Totals};
use chaff::tokenizer::token_key;

fn store_with_totals(spam_learned: u64, innocent_learned: u64) -> Arc<MemStore> {
    let store = Arc::new(MemStore::new());
    store
        .set_totals(&Totals {
            spam_learned,
            innocent_learned,
            ..Totals::default()
        })
        .unwrap();
    store
}

fn seed(store: &MemStore, words: &[&str], spam_hits: u64, innocent_hits: u64) {
    for word in words {
        store
            .set_record(
                token_key(word),
                &TokenRecord {
                    spam_hits,
                    innocent_hits,
                },
            )
            .unwrap();
    }
}

#[test]
fn uniformly_innocent_tokens_yield_a_confident_innocent_verdict() {
    let store = store_with_totals(1000, 1000);
    seed(&store, &["hello", "world", "friend"], 0, 50);

    let config = ClassifierConfig {
        tokenizer: TokenizerKind::Word,
        algorithms: AlgorithmSet::robinson(),
        ..ClassifierConfig::default()
    };
    let mut classifier = Classifier::new(config, store).unwrap();
    let outcome = classifier
        .process(ClassifyRequest::message("", "hello world friend"))
        .unwrap();

    assert_eq!(outcome.class, Class::Innocent);
    assert!(outcome.probability < 0.02, "p = {}", outcome.probability);
    assert!(outcome.confidence > 0.98, "confidence = {}", outcome.confidence);
}

#[test]
fn sedation_keeps_balanced_tokens_neutral() {
    // A spam-heavy young corpus raises the evidence bar; ten hits on each
    // side stays below it and scores the neutral 0.4.
    let store = store_with_totals(500, 100);
    seed(&store, &["ticket", "update", "invoice"], 10, 10);

    let config = ClassifierConfig {
        tokenizer: TokenizerKind::Word,
        algorithms: AlgorithmSet::robinson(),
        training_buffer: 10,
        ..ClassifierConfig::default()
    };
    let mut classifier = Classifier::new(config, store).unwrap();
    let outcome = classifier
        .process(ClassifyRequest::message("", "ticket update invoice"))
        .unwrap();

    assert_eq!(outcome.class, Class::Innocent);
    assert!(outcome.probability < 0.5);
}

#[test]
fn half_trained_account_never_divides_by_zero() {
    // innocent history only; spam_learned is zero
    let store = store_with_totals(0, 10);
    seed(&store, &["hello", "there"], 0, 2);

    let config = ClassifierConfig {
        tokenizer: TokenizerKind::Word,
        algorithms: AlgorithmSet::robinson(),
        ..ClassifierConfig::default()
    };
    let mut classifier = Classifier::new(config, store).unwrap();
    let outcome = classifier
        .process(ClassifyRequest::message("", "hello there"))
        .unwrap();

    assert!(outcome.probability.is_finite());
    assert_eq!(outcome.class, Class::Innocent);
}

#[test]
fn one_sided_spam_tokens_convict() {
    let store = store_with_totals(1000, 1000);
    seed(&store, &["cheap", "meds", "online"], 10, 0);

    let config = ClassifierConfig {
        tokenizer: TokenizerKind::Word,
        algorithms: AlgorithmSet {
            naive: false,
            graham: true,
            burton: false,
            robinson: false,
            chi_square: false,
        },
        ..ClassifierConfig::default()
    };
    let mut classifier = Classifier::new(config, store).unwrap();
    let outcome = classifier
        .process(ClassifyRequest::message("", "cheap meds online"))
        .unwrap();

    assert_eq!(outcome.class, Class::Spam);
    assert!(outcome.probability > 0.9);
}

#[test]
fn signature_learn_then_unlearn_restores_token_state() {
    let store = Arc::new(MemStore::new());
    let mut classifier =
        Classifier::new(ClassifierConfig::default(), Arc::clone(&store) as Arc<dyn TokenStore>).unwrap();

    let outcome = classifier
        .process(ClassifyRequest::message(
            "Subject: newsletter",
            "weekly digest of things",
        ))
        .unwrap();
    let signature = outcome.signature.clone().unwrap();
    let key = token_key("digest");
    assert_eq!(store.get_record(key).unwrap().unwrap().innocent_hits, 1);

    // retrain the pass as spam, then take it back
    classifier
        .process(
            ClassifyRequest::default()
                .classified(Class::Spam, TrainingSource::Corpus)
                .with_signature(signature.clone()),
        )
        .unwrap();
    assert_eq!(store.get_record(key).unwrap().unwrap().spam_hits, 1);
    assert_eq!(classifier.totals().spam_learned, 1);

    classifier
        .process(
            ClassifyRequest::default()
                .classified(Class::Spam, TrainingSource::Corpus)
                .with_signature(signature)
                .unlearning(),
        )
        .unwrap();

    let record = store.get_record(key).unwrap().unwrap();
    assert_eq!(record.spam_hits, 0);
    assert_eq!(record.innocent_hits, 1);
    assert_eq!(classifier.totals().spam_learned, 0);
    assert_eq!(classifier.totals().innocent_learned, 1);
}

#[test]
fn signature_classification_matches_text_classification() {
    let store = Arc::new(MemStore::new());
    let mut trainer =
        Classifier::new(ClassifierConfig::default(), Arc::clone(&store) as Arc<dyn TokenStore>).unwrap();
    let outcome = trainer
        .process(ClassifyRequest::message(
            "Subject: plans",
            "dinner on friday maybe",
        ))
        .unwrap();
    let signature = outcome.signature.unwrap();
    trainer.shutdown().unwrap();

    let config = ClassifierConfig {
        mode: OperatingMode::Classify,
        ..ClassifierConfig::default()
    };
    let mut classifier = Classifier::new(config, store).unwrap();
    let replay = classifier
        .process(ClassifyRequest::default().with_signature(signature))
        .unwrap();

    assert_eq!(replay.class, Class::Innocent);
    assert!(!replay.learned);
}

#[test]
fn train_on_error_learns_only_while_undertrained() {
    let config = ClassifierConfig {
        training: TrainingMode::Toe,
        ..ClassifierConfig::default()
    };

    // fresh account: everything trains
    let store = Arc::new(MemStore::new());
    let mut young = Classifier::new(config.clone(), Arc::clone(&store) as Arc<dyn TokenStore>).unwrap();
    let outcome = young
        .process(ClassifyRequest::message("Subject: hi", "hello old friend"))
        .unwrap();
    assert!(outcome.learned);
    assert!(store.get_record(token_key("hello")).unwrap().is_some());

    // mature account: classify only, regular tokens untouched
    let store = store_with_totals(500, 500);
    let mut mature = Classifier::new(config, Arc::clone(&store) as Arc<dyn TokenStore>).unwrap();
    let outcome = mature
        .process(ClassifyRequest::message("Subject: hi", "hello old friend"))
        .unwrap();
    assert!(!outcome.learned);
    assert_eq!(mature.totals().innocent_classified, 1);
    assert!(store.get_record(token_key("hello")).unwrap().is_none());
}

#[test]
fn sbph_signature_replays_the_message_text() {
    let config = ClassifierConfig {
        tokenizer: TokenizerKind::Sbph,
        ..ClassifierConfig::default()
    };
    let store = Arc::new(MemStore::new());
    let mut classifier = Classifier::new(config, Arc::clone(&store) as Arc<dyn TokenStore>).unwrap();

    let outcome = classifier
        .process(ClassifyRequest::message(
            "Subject: offer",
            "claim your free prize now",
        ))
        .unwrap();
    let signature = outcome.signature.unwrap();
    assert!(matches!(signature, Signature::Text { .. }));

    let retrained = classifier
        .process(
            ClassifyRequest::default()
                .classified(Class::Spam, TrainingSource::Error)
                .with_signature(signature),
        )
        .unwrap();
    assert_eq!(retrained.class, Class::Spam);
    assert_eq!(retrained.probability, 1.0);
    assert!(retrained.learned);
    assert_eq!(classifier.totals().spam_learned, 1);
    assert_eq!(classifier.totals().spam_misclassified, 1);
}

#[test]
fn url_contents_score_in_their_own_scope() {
    let store = Arc::new(MemStore::new());
    let mut classifier =
        Classifier::new(ClassifierConfig::default(), Arc::clone(&store) as Arc<dyn TokenStore>).unwrap();
    classifier
        .process(ClassifyRequest::message(
            "Subject: look",
            "see http://pills.example/buy for details",
        ))
        .unwrap();

    assert!(store.get_record(token_key("Url*//pills")).unwrap().is_some());
    // the URL text itself is blanked before body tokenization
    assert!(store.get_record(token_key("pills")).unwrap().is_none());
}
