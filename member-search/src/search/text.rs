use crate::members::{Member, MemberStore, StoreError};
use crate::search::SearchResult;

/// Terms must be longer than this to take part in matching.
const MIN_TERM_CHARS: usize = 2;
/// Each matched term adds 0.2, so five hits saturate the score.
const HITS_FOR_FULL_SCORE: usize = 5;
const HIGHLIGHT_CONTEXT_CHARS: usize = 40;

/// Whitespace-separated terms longer than two characters, deduplicated
/// case-insensitively. Falls back to the whole trimmed query when no term
/// qualifies, so short-word queries like "ui ux" still match something.
pub fn extract_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query.split_whitespace() {
        if term.chars().count() <= MIN_TERM_CHARS {
            continue;
        }
        if !terms.iter().any(|t| t.to_lowercase() == term.to_lowercase()) {
            terms.push(term.to_string());
        }
    }

    let trimmed = query.trim();
    if terms.is_empty() && !trimmed.is_empty() {
        terms.push(trimmed.to_string());
    }
    terms
}

/// Byte range of the first case-insensitive occurrence of `needle` in `haystack`.
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    for (start, _) in haystack.char_indices() {
        let mut rest = haystack[start..].char_indices();
        let mut matched_len = None;
        let mut needle_chars = needle.chars();
        loop {
            match (needle_chars.next(), rest.next()) {
                (None, Some((offset, _))) => {
                    matched_len = Some(offset);
                    break;
                }
                (None, None) => {
                    matched_len = Some(haystack.len() - start);
                    break;
                }
                (Some(n), Some((_, h))) if n.to_lowercase().eq(h.to_lowercase()) => continue,
                _ => break,
            }
        }
        if let Some(len) = matched_len {
            return Some((start, start + len));
        }
    }
    None
}

fn contains_case_insensitive(haystack: &str, needle: &str) -> bool {
    find_case_insensitive(haystack, needle).is_some()
}

/// Number of terms found in any searchable field, times 0.2, capped at 1.0.
pub fn text_match_score(member: &Member, terms: &[String]) -> f64 {
    let fields = member.searchable_fields();
    let hits = terms
        .iter()
        .filter(|term| fields.iter().any(|f| contains_case_insensitive(f, term)))
        .count();
    hits.min(HITS_FOR_FULL_SCORE) as f64 / HITS_FOR_FULL_SCORE as f64
}

/// A window of `text` around the earliest matching term, with the term
/// wrapped in `**`.
pub fn highlight(text: &str, terms: &[String]) -> Option<String> {
    let (start, end) = terms
        .iter()
        .filter_map(|term| find_case_insensitive(text, term))
        .min_by_key(|(start, _)| *start)?;

    let window_start = text[..start]
        .char_indices()
        .rev()
        .nth(HIGHLIGHT_CONTEXT_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let window_end = text[end..]
        .char_indices()
        .nth(HIGHLIGHT_CONTEXT_CHARS)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());

    let mut snippet = String::new();
    if window_start > 0 {
        snippet.push_str("...");
    }
    snippet.push_str(&text[window_start..start]);
    snippet.push_str("**");
    snippet.push_str(&text[start..end]);
    snippet.push_str("**");
    snippet.push_str(&text[end..window_end]);
    if window_end < text.len() {
        snippet.push_str("...");
    }
    Some(snippet)
}

/// Scores store rows against `terms` and sorts them by non-increasing score.
/// Rows with equal scores keep the store's order.
pub fn rank_text_matches(members: Vec<Member>, terms: &[String]) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = members
        .into_iter()
        .map(|member| {
            let similarity_score = text_match_score(&member, terms);
            let highlight = highlight(&member.description, terms);
            SearchResult {
                member,
                similarity_score,
                highlight,
            }
        })
        .collect();
    results.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    results
}

pub async fn text_search(
    store: &dyn MemberStore,
    query: &str,
    limit: i64,
) -> Result<Vec<SearchResult>, StoreError> {
    let terms = extract_terms(query);
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let members = store.search_members_text(&terms, limit).await?;
    let mut results = rank_text_matches(members, &terms);
    results.truncate(usize::try_from(limit).unwrap_or(0));
    Ok(results)
}
