//! Line reconstruction from positioned tokens.
//!
//! PDF text comes out as font runs with absolute positions. A line is every
//! run on the same page at the same baseline; runs are glued back together
//! with a space only where the layout shows a real gap.

use crate::types::{Line, Token};

/// Minimum horizontal gap (exclusive) between two runs that reads as a space
const WORD_GAP: f64 = 1.0;

/// Flatten per-page token lists, dropping each page's header run and
/// invisible items, and tag every surviving token with its 1-indexed page.
pub fn tokens_from_pages(pages: Vec<Vec<Token>>, page_header_items: usize) -> Vec<Token> {
    pages
        .into_iter()
        .enumerate()
        .flat_map(|(idx, page)| {
            let page_number = idx as u32 + 1;
            page.into_iter()
                .skip(page_header_items)
                .filter(Token::is_visible)
                .map(move |mut token| {
                    token.page = page_number;
                    token
                })
        })
        .collect()
}

/// Concatenate runs, inserting one space where the gap after the previous
/// run's right edge is strictly wider than `WORD_GAP`.
pub fn build_line<'a, I>(tokens: I) -> String
where
    I: IntoIterator<Item = &'a Token>,
{
    let mut text = String::new();
    let mut previous_end: Option<f64> = None;

    for token in tokens {
        if let Some(end) = previous_end {
            if token.x() - end > WORD_GAP {
                text.push(' ');
            }
        }
        text.push_str(&token.text);
        previous_end = Some(token.end_x());
    }

    text
}

/// Composite ordering key: page-major, then top-to-bottom.
///
/// This is `-(page * y_cap) + y` negated, so that ascending order walks the
/// document from the first page's top line to the last page's bottom line.
fn line_key(token: &Token, y_cap: f64) -> f64 {
    f64::from(token.page) * y_cap - token.y()
}

/// Group visible tokens into ordered lines. Tokens keep their input order
/// within a line.
pub fn group_lines(tokens: &[Token], y_cap: f64) -> Vec<Line> {
    let mut keyed: Vec<(f64, &Token)> = tokens
        .iter()
        .filter(|t| t.is_visible())
        .map(|t| (line_key(t, y_cap), t))
        .collect();
    // Stable: runs on one baseline stay in reading order
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

    keyed
        .chunk_by(|a, b| a.0 == b.0)
        .map(|chunk| {
            let tokens: Vec<Token> = chunk.iter().map(|(_, t)| (*t).clone()).collect();
            let text = build_line(&tokens);
            Line {
                page: tokens[0].page,
                y: tokens[0].y(),
                tokens,
                text,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str, x: f64, width: f64, y: f64, page: u32) -> Token {
        Token {
            text: text.to_string(),
            width,
            height: 10.0,
            font_name: "g_d0_f1".to_string(),
            transform: [1.0, 0.0, 0.0, 1.0, x, y],
            page,
        }
    }

    #[test]
    fn gap_wider_than_one_inserts_single_space() {
        let tokens = [token("Ensure", 0.0, 30.0, 700.0, 1), token("that", 31.5, 20.0, 700.0, 1)];
        assert_eq!(build_line(&tokens), "Ensure that");
    }

    #[test]
    fn gap_of_exactly_one_joins_runs() {
        let tokens = [token("kube", 10.0, 20.0, 700.0, 1), token("let", 31.0, 15.0, 700.0, 1)];
        assert_eq!(build_line(&tokens), "kubelet");
    }

    #[test]
    fn overlapping_runs_join_without_space() {
        let tokens = [token("--anonymous", 10.0, 50.0, 700.0, 1), token("-auth", 59.0, 20.0, 700.0, 1)];
        assert_eq!(build_line(&tokens), "--anonymous-auth");
    }

    #[test]
    fn lines_are_page_major_then_top_to_bottom() {
        let tokens = vec![
            token("page2-top", 0.0, 10.0, 700.0, 2),
            token("page1-bottom", 0.0, 10.0, 100.0, 1),
            token("page1-top", 0.0, 10.0, 700.0, 1),
        ];
        let lines = group_lines(&tokens, 1000.0);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["page1-top", "page1-bottom", "page2-top"]);
    }

    #[test]
    fn same_baseline_tokens_share_a_line_in_input_order() {
        let tokens = vec![
            token("1.1.1", 0.0, 20.0, 650.0, 1),
            token("Ensure", 25.0, 30.0, 650.0, 1),
            token("other", 0.0, 20.0, 600.0, 1),
        ];
        let lines = group_lines(&tokens, 1000.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "1.1.1 Ensure");
        assert_eq!(lines[0].tokens.len(), 2);
    }

    #[test]
    fn page_header_items_and_invisible_tokens_are_dropped() {
        let blank = token("", 0.0, 10.0, 500.0, 0);
        let zero_width = token("x", 0.0, 0.0, 500.0, 0);
        let pages = vec![
            vec![token("header", 0.0, 10.0, 800.0, 0), token("body", 0.0, 10.0, 500.0, 0)],
            vec![token("header", 0.0, 10.0, 800.0, 0), blank, zero_width, token("more", 0.0, 10.0, 400.0, 0)],
        ];
        let tokens = tokens_from_pages(pages, 1);
        let texts: Vec<(&str, u32)> = tokens.iter().map(|t| (t.text.as_str(), t.page)).collect();
        assert_eq!(texts, [("body", 1), ("more", 2)]);
    }
}
