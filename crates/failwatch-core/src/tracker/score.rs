//! Similarity scoring between a reason and tracker issues.

use std::sync::OnceLock;

use regex::Regex;

use super::search::IssueCandidate;

/// Below this title score the description is consulted.
pub const TITLE_THRESHOLD: f64 = 0.5;

fn noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)command failed (?:on \S+ )?with status [0-9]+").expect("noise pattern")
    })
}

/// Remove the "command failed ... with status N" boilerplate.
pub fn strip_noise(text: &str) -> String {
    noise_re().replace_all(text, "").trim().to_string()
}

struct SearchPatterns {
    timestamp: Regex,
    daemon: Regex,
    braces: Regex,
    punct: Regex,
    spaces: Regex,
}

fn search_patterns() -> &'static SearchPatterns {
    static PATTERNS: OnceLock<SearchPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| SearchPatterns {
        timestamp: Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9:.+-]+\s+").expect("timestamp pattern"),
        daemon: Regex::new(r"\b(?:osd|mon|mgr|mds)\.[A-Za-z0-9_-]+\b").expect("daemon pattern"),
        braces: Regex::new(r"[(){}]").expect("brace pattern"),
        punct: Regex::new(r"[()@:;\[\]\\]").expect("punctuation pattern"),
        spaces: Regex::new(r"\s+").expect("whitespace pattern"),
    })
}

/// Reduce a cleaned reason to the words worth sending to a keyword search:
/// no surrounding quotes, leading ISO timestamp, daemon ids (`osd.6`,
/// `mon.a`) or token punctuation.
pub fn normalize_for_search(reason: &str) -> String {
    let p = search_patterns();
    let s = reason
        .trim()
        .trim_start_matches(|c: char| c == '\'' || c == '"')
        .trim_end_matches(|c: char| c == '\'' || c == '"');
    let s = p.timestamp.replace(s, "");
    let s = p.daemon.replace_all(&s, "");
    let s = p.braces.replace_all(&s, "");
    let s = p.punct.replace_all(&s, " ");
    p.spaces.replace_all(&s, " ").trim().to_string()
}

/// Drop a leading `category:` (or `Bug #N (New):`) prefix from a title.
pub fn trim_after_colon(title: &str) -> &str {
    match title.split_once(':') {
        Some((_, rest)) => rest.trim(),
        None => title,
    }
}

pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Winning candidate and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch {
    pub issue_id: u64,
    pub score: f64,
}

fn best_by<F>(candidates: &[IssueCandidate], mut score: F) -> Option<BestMatch>
where
    F: FnMut(&IssueCandidate) -> Option<f64>,
{
    let mut best: Option<BestMatch> = None;
    for c in candidates {
        let Some(s) = score(c) else { continue };
        if best.map_or(true, |b| s > b.score) {
            best = Some(BestMatch {
                issue_id: c.id,
                score: s,
            });
        }
    }
    best
}

/// Pick the candidate closest to `query`: by title first, by description
/// when the best title score is under [`TITLE_THRESHOLD`] and a description
/// scores strictly higher.
pub fn pick_best(query: &str, candidates: &[IssueCandidate]) -> Option<BestMatch> {
    let by_title = best_by(candidates, |c| {
        Some(similarity(query, &strip_noise(trim_after_colon(&c.title))))
    })?;
    if by_title.score >= TITLE_THRESHOLD {
        return Some(by_title);
    }

    let by_desc = best_by(candidates, |c| {
        c.description
            .as_deref()
            .map(|d| similarity(query, &strip_noise(d)))
    });
    match by_desc {
        Some(d) if d.score > by_title.score => Some(d),
        _ => Some(by_title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: u64, title: &str, description: Option<&str>) -> IssueCandidate {
        IssueCandidate {
            id,
            title: title.to_string(),
            description: description.map(String::from),
        }
    }

    #[test]
    fn noise_is_stripped() {
        assert_eq!(
            strip_noise("Command failed on smithi000 with status 1: 'ceph osd pool ls'"),
            ": 'ceph osd pool ls'"
        );
        assert_eq!(strip_noise("command failed with status 124"), "");
        assert_eq!(strip_noise("osd crashed"), "osd crashed");
    }

    #[test]
    fn search_query_keeps_only_words() {
        assert_eq!(
            normalize_for_search(
                "\"2025-05-18T23:33:40.185645+0000 osd.6 (osd.6) 3 : cluster [WRN] OSD bench result\""
            ),
            "3 cluster WRN OSD bench result"
        );
        assert_eq!(
            normalize_for_search("mon.a calling new election; mgr.x failed @ boot"),
            "calling new election failed boot"
        );
        assert_eq!(normalize_for_search("  'max job timeout'  "), "max job timeout");
        assert_eq!(normalize_for_search("osd.12"), "");
    }

    #[test]
    fn title_prefix_is_trimmed() {
        assert_eq!(trim_after_colon("rados: osd crashed"), "osd crashed");
        assert_eq!(trim_after_colon("Bug #5 (New): osd crashed"), "osd crashed");
        assert_eq!(trim_after_colon("no prefix"), "no prefix");
    }

    #[test]
    fn best_title_wins() {
        let cands = vec![
            cand(1, "rados: monitor election storm", None),
            cand(2, "rados: osd crashed on boot", None),
        ];
        let best = pick_best("osd crashed on boot", &cands).unwrap();
        assert_eq!(best.issue_id, 2);
        assert!((best.score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn weak_titles_fall_back_to_description() {
        let cands = vec![
            cand(1, "rgw: unrelated title text", Some("nothing similar here at all")),
            cand(2, "crimson: zzz", Some("scrub found 3 inconsistent objects")),
        ];
        let best = pick_best("scrub found 3 inconsistent objects", &cands).unwrap();
        assert_eq!(best.issue_id, 2);
        assert!(best.score > TITLE_THRESHOLD);
    }

    #[test]
    fn strong_title_ignores_description() {
        let cands = vec![
            cand(1, "rados: osd crashed", Some("x")),
            cand(2, "rados: zzz", Some("osd crashed")),
        ];
        assert_eq!(pick_best("osd crashed", &cands).unwrap().issue_id, 1);
    }

    #[test]
    fn no_candidates_no_match() {
        assert!(pick_best("anything", &[]).is_none());
    }
}
