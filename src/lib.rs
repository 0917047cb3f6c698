//! # chaff
//!
//! An embeddable statistical anti-spam classification engine: tokenization,
//! per-token probability estimation, multi-algorithm combination, training
//! and retraining, behind a pluggable storage trait.
//!
//! ## Architecture
//!
//! - **Tokenizers** (`tokenizer`): word/chain n-grams and sparse window
//!   patterns (SBPH / OSB), scoped by header field
//! - **Scoring** (`score`): per-token p-values under Graham, Robinson or
//!   Markovian weighting; five combination algorithms over the ranked heap
//! - **Noise reduction** (`bnr`): contextual-symmetry elimination of
//!   out-of-character tokens
//! - **Training** (`engine`, signatures in `signature`): train-on-everything,
//!   train-on-error, train-until-mature, unlearning and corpus feeding
//! - **Storage** (`store`): a narrow `TokenStore` trait; in-memory backend
//!   included
//!
//! ## Library usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use chaff::config::ClassifierConfig;
//! use chaff::engine::{Classifier, ClassifyRequest};
//! use chaff::store::mem::MemStore;
//!
//! let store = Arc::new(MemStore::new());
//! let mut classifier = Classifier::new(ClassifierConfig::default(), store)?;
//! let outcome = classifier.process(ClassifyRequest::message(
//!     "From: alice@example.org\nSubject: lunch?",
//!     "are you free around noon",
//! ))?;
//! classifier.shutdown()?;
//! # Ok::<(), chaff::error::ChaffError>(())
//! ```

mod bnr;
pub mod config;
pub mod diction;
pub mod engine;
pub mod error;
pub mod heap;
pub mod score;
pub mod signature;
pub mod store;
pub mod tokenizer;
mod train;
