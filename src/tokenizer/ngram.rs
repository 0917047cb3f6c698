//! Word and chained-word tokenization.
//!
//! Header values are scoped by field name (`Subject*hello`); body words
//! stand alone. In chained mode each adjacent pair is also emitted
//! (`hello+world`), with chains never crossing a header-line boundary.

use crate::config::{ClassifierConfig, TokenizerKind};
use crate::diction::{Diction, OrderKind};
use crate::tokenizer::{
    header_ignored, split_header_line, token_key, token_len_ok, touch_whitelist, truncate_token,
    url_tokenize, HeaderLine, DELIMITERS, DELIMITERS_HEADING,
};

pub fn tokenize_ngram(
    config: &ClassifierConfig,
    headers: &str,
    body: &str,
    diction: &mut Diction,
) {
    let chained = config.tokenizer == TokenizerKind::Chain;

    let mut body = body.to_owned();
    if config.url_context {
        url_tokenize(diction, &mut body, "http://");
        url_tokenize(diction, &mut body, "www.");
        url_tokenize(diction, &mut body, "href=");
    }

    // Header tokenization
    let mut heading = "";
    for line in headers.split('\n').filter(|l| !l.is_empty()) {
        let value = match split_header_line(line) {
            HeaderLine::Heading {
                heading: new_heading,
                value,
            } => {
                heading = new_heading;
                if config.auto_whitelist && heading == "From" {
                    touch_whitelist(diction, heading, value);
                }
                value
            }
            HeaderLine::Continuation { value } => value,
        };

        let mut previous: Option<&str> = None;
        for token in value.split(DELIMITERS_HEADING).filter(|t| token_len_ok(t)) {
            process_header_token(config, diction, heading, token, previous);
            if chained {
                previous = Some(token);
            }
        }
    }

    // Body tokenization
    let mut previous: Option<&str> = None;
    for token in body.split(DELIMITERS).filter(|t| token_len_ok(t)) {
        process_body_token(config, diction, token, previous);
        if chained {
            previous = Some(token);
        }
    }
}

fn process_header_token(
    config: &ClassifierConfig,
    diction: &mut Diction,
    heading: &str,
    token: &str,
    previous: Option<&str>,
) {
    if header_ignored(config, heading) {
        return;
    }

    let token = truncate_token(token);
    let name = format!("{heading}*{token}");
    diction.touch(token_key(&name), &name, None);

    if config.tokenizer == TokenizerKind::Chain {
        if let Some(previous) = previous {
            let previous = truncate_token(previous);
            let name = format!("{heading}*{previous}+{token}");
            diction.touch(token_key(&name), &name, None);
        }
    }
}

fn process_body_token(
    config: &ClassifierConfig,
    diction: &mut Diction,
    token: &str,
    previous: Option<&str>,
) {
    let token = truncate_token(token);
    diction.touch(token_key(token), token, Some(OrderKind::Context));

    if config.tokenizer == TokenizerKind::Chain {
        if let Some(previous) = previous {
            let previous = truncate_token(previous);
            let name = format!("{previous}+{token}");
            diction.touch(token_key(&name), &name, Some(OrderKind::Chained));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;

    fn chain_config() -> ClassifierConfig {
        ClassifierConfig::default()
    }

    fn word_config() -> ClassifierConfig {
        ClassifierConfig {
            tokenizer: TokenizerKind::Word,
            ..ClassifierConfig::default()
        }
    }

    #[test]
    fn header_tokens_are_scoped_and_chained() {
        let mut diction = Diction::new(193);
        tokenize_ngram(&chain_config(), "Subject: hello world", "", &mut diction);
        assert!(diction.find(token_key("Subject*hello")).is_some());
        assert!(diction.find(token_key("Subject*world")).is_some());
        assert!(diction.find(token_key("Subject*hello+world")).is_some());
    }

    #[test]
    fn word_mode_emits_no_chains() {
        let mut diction = Diction::new(193);
        tokenize_ngram(&word_config(), "Subject: hello world", "", &mut diction);
        assert!(diction.find(token_key("Subject*hello")).is_some());
        assert!(diction.find(token_key("Subject*hello+world")).is_none());
    }

    #[test]
    fn body_tokens_join_the_ordered_sequences() {
        let mut diction = Diction::new(193);
        tokenize_ngram(&chain_config(), "", "one two three", &mut diction);
        assert_eq!(
            diction.order,
            vec![token_key("one"), token_key("two"), token_key("three")]
        );
        assert_eq!(
            diction.chained_order,
            vec![token_key("one+two"), token_key("two+three")]
        );
    }

    #[test]
    fn chains_do_not_cross_header_lines() {
        let mut diction = Diction::new(193);
        tokenize_ngram(
            &chain_config(),
            "Subject: alpha\nTo: beta",
            "",
            &mut diction,
        );
        assert!(diction.find(token_key("Subject*alpha+beta")).is_none());
        assert!(diction.find(token_key("To*alpha+beta")).is_none());
    }

    #[test]
    fn from_line_becomes_whitelist_token() {
        let mut diction = Diction::new(193);
        tokenize_ngram(
            &chain_config(),
            "From: Alice <alice@example.org>",
            "",
            &mut diction,
        );
        let expected = token_key("From*Alice <alice@example.org>");
        assert_eq!(diction.whitelist_token, Some(expected));
        assert!(diction.find(expected).is_some());
    }

    #[test]
    fn ignored_headers_are_skipped() {
        let mut config = chain_config();
        config.ignored_headers.push("Received".into());
        let mut diction = Diction::new(193);
        tokenize_ngram(
            &config,
            "Received: by mx1\nX-Chaff-Signature: abc\nSubject: ok",
            "",
            &mut diction,
        );
        assert!(diction.find(token_key("Received*mx1")).is_none());
        assert!(diction.find(token_key("X-Chaff-Signature*abc")).is_none());
        assert!(diction.find(token_key("Subject*ok")).is_some());
    }

    #[test]
    fn truncated_variants_collide() {
        let mut diction = Diction::new(193);
        tokenize_ngram(&word_config(), "", "buy!!!! buy!", &mut diction);
        let term = diction.find(token_key("buy!")).unwrap();
        assert_eq!(term.frequency, 2);
    }

    #[test]
    fn oversized_tokens_are_dropped() {
        let long = "x".repeat(50);
        let mut diction = Diction::new(193);
        tokenize_ngram(&word_config(), "", &long, &mut diction);
        assert!(diction.is_empty());
        let ok = "y".repeat(49);
        tokenize_ngram(&word_config(), "", &ok, &mut diction);
        assert_eq!(diction.len(), 1);
    }
}
