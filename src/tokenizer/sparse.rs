//! Sparse binary polynomial hashing (SBPH) and orthogonal sparse bigrams.
//!
//! A window of the last W tokens slides over each header line and over the
//! body. At every step the window's subsets are rendered into pattern
//! tokens, with `#` marking skipped positions (`hello+#+world`). Only
//! patterns anchored at the oldest window slot are emitted, which makes
//! every pattern "this token plus some of the following W-1"; the window is
//! drained with W empty steps at each boundary so trailing tokens still
//! reach the anchor slot. SBPH keeps any pattern with at least one literal;
//! OSB keeps exactly the two-literal patterns.

use crate::config::{ClassifierConfig, TokenizerKind};
use crate::diction::{Diction, OrderKind};
use crate::tokenizer::{
    header_ignored, split_header_line, token_key, token_len_ok, touch_whitelist, url_tokenize,
    HeaderLine, DELIMITERS, DELIMITERS_HEADING,
};

/// Sliding window length.
pub(crate) const SPARSE_WINDOW_SIZE: usize = 5;

/// Which window slots each subset mask selects. Row `mask` holds one flag
/// per slot; bit i of the mask selects slot i, slot 0 being the oldest.
struct BitPattern {
    rows: Vec<[bool; SPARSE_WINDOW_SIZE]>,
}

impl BitPattern {
    fn new() -> Self {
        let breadth = 1usize << SPARSE_WINDOW_SIZE;
        let mut rows = Vec::with_capacity(breadth);
        for mask in 0..breadth {
            let mut row = [false; SPARSE_WINDOW_SIZE];
            for (i, slot) in row.iter_mut().enumerate() {
                *slot = mask & (1 << i) != 0;
            }
            rows.push(row);
        }
        Self { rows }
    }

    fn selected(&self, mask: usize, slot: usize) -> bool {
        self.rows[mask][slot]
    }
}

pub fn tokenize_sparse(
    config: &ClassifierConfig,
    headers: &str,
    body: &str,
    diction: &mut Diction,
) {
    let pattern = BitPattern::new();

    let mut body = body.to_owned();
    if config.url_context {
        url_tokenize(diction, &mut body, "http://");
        url_tokenize(diction, &mut body, "www.");
        url_tokenize(diction, &mut body, "href=");
    }

    // Header tokenization: the window never crosses a line boundary.
    let mut heading = "";
    for line in headers.split('\n').filter(|l| !l.is_empty()) {
        let mut window: [Option<&str>; SPARSE_WINDOW_SIZE] = [None; SPARSE_WINDOW_SIZE];

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

        for token in value.split(DELIMITERS_HEADING).filter(|t| token_len_ok(t)) {
            map_header_token(config, diction, heading, Some(token), &mut window, &pattern);
        }
        for _ in 0..SPARSE_WINDOW_SIZE {
            map_header_token(config, diction, heading, None, &mut window, &pattern);
        }
    }

    // Body tokenization
    let mut window: [Option<&str>; SPARSE_WINDOW_SIZE] = [None; SPARSE_WINDOW_SIZE];
    for token in body.split(DELIMITERS).filter(|t| token_len_ok(t)) {
        map_body_token(config, diction, Some(token), &mut window, &pattern);
    }
    for _ in 0..SPARSE_WINDOW_SIZE {
        map_body_token(config, diction, None, &mut window, &pattern);
    }
}

fn map_header_token<'a>(
    config: &ClassifierConfig,
    diction: &mut Diction,
    heading: &str,
    token: Option<&'a str>,
    window: &mut [Option<&'a str>; SPARSE_WINDOW_SIZE],
    pattern: &BitPattern,
) {
    if header_ignored(config, heading) {
        return;
    }
    for rendered in shift_and_render(config, token, window, pattern) {
        let name = format!("{heading}*{rendered}");
        diction.touch(token_key(&name), &name, Some(OrderKind::Context));
    }
}

fn map_body_token<'a>(
    config: &ClassifierConfig,
    diction: &mut Diction,
    token: Option<&'a str>,
    window: &mut [Option<&'a str>; SPARSE_WINDOW_SIZE],
    pattern: &BitPattern,
) {
    for rendered in shift_and_render(config, token, window, pattern) {
        diction.touch(token_key(&rendered), &rendered, Some(OrderKind::Context));
    }
}

/// Advance the window by one token (or one empty step) and render every
/// surviving subset pattern.
fn shift_and_render<'a>(
    config: &ClassifierConfig,
    token: Option<&'a str>,
    window: &mut [Option<&'a str>; SPARSE_WINDOW_SIZE],
    pattern: &BitPattern,
) -> Vec<String> {
    let mut active = 0;
    for i in 0..SPARSE_WINDOW_SIZE - 1 {
        window[i] = window[i + 1];
        if window[i].is_some() {
            active += 1;
        }
    }
    window[SPARSE_WINDOW_SIZE - 1] = token;
    if token.is_some() {
        active += 1;
    }

    let breadth = 1usize << active;
    let mut out = Vec::new();

    for mask in 0..breadth {
        let mut key = String::new();
        let mut terms = 0;

        for (i, slot) in window.iter().enumerate() {
            if i > 0 {
                key.push('+');
            }
            match slot {
                Some(word) if pattern.selected(mask, i) => {
                    key.push_str(word);
                    terms += 1;
                }
                _ => key.push('#'),
            }
        }

        let keep = match config.tokenizer {
            TokenizerKind::Sbph => terms != 0,
            TokenizerKind::Osb => terms == 2,
            _ => false,
        };
        if !keep {
            continue;
        }

        // Drop empty tail positions, then require the pattern to be
        // anchored at the front: patterns starting with a placeholder are
        // duplicates of a shorter window's output.
        while key.len() > 2 && key.ends_with("+#") {
            key.truncate(key.len() - 2);
        }
        if key.starts_with("#+") {
            continue;
        }

        out.push(key);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;

    fn sbph_config() -> ClassifierConfig {
        ClassifierConfig {
            tokenizer: TokenizerKind::Sbph,
            ..ClassifierConfig::default()
        }
    }

    fn osb_config() -> ClassifierConfig {
        ClassifierConfig {
            tokenizer: TokenizerKind::Osb,
            ..ClassifierConfig::default()
        }
    }

    #[test]
    fn five_word_body_emits_all_anchored_subsets() {
        let mut diction = Diction::new(193);
        tokenize_sparse(&sbph_config(), "", "a b c d e", &mut diction);
        // every non-empty subset of a 5-token window appears exactly once
        assert_eq!(diction.len(), (1 << SPARSE_WINDOW_SIZE) - 1);
        assert!(diction.find(token_key("a")).is_some());
        assert!(diction.find(token_key("a+b+c+d+e")).is_some());
        assert!(diction.find(token_key("a+#+c")).is_some());
        assert!(diction.find(token_key("b+#+#+e")).is_some());
    }

    #[test]
    fn osb_emits_exactly_pairs() {
        let mut diction = Diction::new(193);
        tokenize_sparse(&osb_config(), "", "a b c d e", &mut diction);
        // each of the 5 tokens pairs with up to 4 successors: 4+4+3+2+1
        assert!(diction.find(token_key("a+b")).is_some());
        assert!(diction.find(token_key("a+#+#+#+e")).is_some());
        assert!(diction.find(token_key("a")).is_none());
        assert!(diction.find(token_key("a+b+c")).is_none());
        assert_eq!(diction.len(), 10);
    }

    #[test]
    fn header_patterns_are_scoped() {
        let mut diction = Diction::new(193);
        tokenize_sparse(&sbph_config(), "Subject: cheap meds", "", &mut diction);
        assert!(diction.find(token_key("Subject*cheap")).is_some());
        assert!(diction.find(token_key("Subject*cheap+meds")).is_some());
        assert!(diction.find(token_key("Subject*meds")).is_some());
        assert!(diction.find(token_key("cheap")).is_none());
    }

    #[test]
    fn window_does_not_cross_header_lines() {
        let mut diction = Diction::new(193);
        tokenize_sparse(&sbph_config(), "Subject: alpha\nTo: beta", "", &mut diction);
        assert!(diction.find(token_key("Subject*alpha+beta")).is_none());
        assert!(diction.find(token_key("To*alpha+beta")).is_none());
    }

    #[test]
    fn short_body_still_drains_the_window() {
        let mut diction = Diction::new(193);
        tokenize_sparse(&sbph_config(), "", "lone", &mut diction);
        assert!(diction.find(token_key("lone")).is_some());
        assert_eq!(diction.len(), 1);
    }

    #[test]
    fn sparse_keys_join_the_order_sequence() {
        let mut diction = Diction::new(193);
        tokenize_sparse(&sbph_config(), "To: bob", "hi", &mut diction);
        assert!(diction.order.contains(&token_key("To*bob")));
        assert!(diction.order.contains(&token_key("hi")));
        assert!(diction.chained_order.is_empty());
    }
}
