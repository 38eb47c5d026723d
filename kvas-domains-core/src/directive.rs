//! Line-level parsing of upstream domain lists.
//!
//! Every upstream list is plain text with one directive per line. A line is
//! classified into one of four [`DirectiveKind`]s; only bare and full-match
//! lines produce a [`Domain`]. Blank lines and `#` comments are not directives
//! at all and are never counted.
//!
//! Pattern directives (`include:`, `regexp:`, `keyword:` ...) are recognised
//! but never expanded: they are tallied as skipped so the per-source
//! diagnostics still add up.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::OnceLock;

/// Prefixes that carry an explicit full-match domain.
pub const FULL_PREFIXES: &[&str] = &["full:", "domain:"];

/// Prefixes for pattern directives that are counted but never expanded.
pub const SKIP_PREFIXES: &[&str] = &[
    "include:", "keyword:", "regexp:", "geosite:", "ext:", "tcp:", "udp:", "ip:", "cidr:",
];

const MAX_DOMAIN_LEN: usize = 253;

fn domain_regex() -> &'static Regex {
    static DOMAIN_RE: OnceLock<Regex> = OnceLock::new();
    DOMAIN_RE.get_or_init(|| {
        Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9-]{2,63}$")
            .expect("domain regex is valid")
    })
}

/// A normalized hostname: lowercase, trimmed, at least one dot.
///
/// Equality is plain string equality, so two entries are the same domain only
/// after both went through [`Domain::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(String);

impl Domain {
    /// Normalizes `candidate` and validates it against the hostname rule.
    pub fn parse(candidate: &str) -> Option<Domain> {
        let normalized = candidate.trim().to_ascii_lowercase();
        let normalized = normalized.trim_matches('.');
        if normalized.is_empty() || normalized.len() > MAX_DOMAIN_LEN {
            return None;
        }
        if domain_regex().is_match(normalized) {
            Some(Domain(normalized.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Domain {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Classification of one non-blank, non-comment line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    BareDomain,
    FullDomain,
    SkippedDirective,
    Invalid,
}

/// Result of parsing a single directive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub domain: Option<Domain>,
}

impl Directive {
    fn with_domain(kind: DirectiveKind, domain: Option<Domain>) -> Self {
        match domain {
            Some(d) => Directive {
                kind,
                domain: Some(d),
            },
            None => Directive::invalid(),
        }
    }

    fn skipped() -> Self {
        Directive {
            kind: DirectiveKind::SkippedDirective,
            domain: None,
        }
    }

    fn invalid() -> Self {
        Directive {
            kind: DirectiveKind::Invalid,
            domain: None,
        }
    }
}

/// Classifies one raw line. Returns `None` for blank and comment-only lines.
pub fn parse_line(raw: &str) -> Option<Directive> {
    let line = raw.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return None;
    }

    // v2fly lists may append attributes: `example.com @cn @ads`.
    let mut tokens = line.split_whitespace();
    let head = tokens.next()?;
    if !tokens.all(|t| t.starts_with('@') && t.len() > 1) {
        return Some(Directive::invalid());
    }

    let lowered = head.to_ascii_lowercase();
    if SKIP_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
        return Some(Directive::skipped());
    }
    if let Some(prefix) = FULL_PREFIXES.iter().find(|p| lowered.starts_with(**p)) {
        let rest = &head[prefix.len()..];
        return Some(Directive::with_domain(
            DirectiveKind::FullDomain,
            Domain::parse(rest),
        ));
    }

    Some(Directive::with_domain(
        DirectiveKind::BareDomain,
        Domain::parse(head),
    ))
}

/// Per-list line tallies.
///
/// `valid_lines + invalid_lines + skipped_directives` always equals the number
/// of directive lines, i.e. every line except blanks and comments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineStats {
    pub valid_lines: usize,
    pub invalid_lines: usize,
    pub skipped_directives: usize,
    pub ignored_lines: usize,
}

impl LineStats {
    pub fn directive_lines(&self) -> usize {
        self.valid_lines + self.invalid_lines + self.skipped_directives
    }

    fn record(&mut self, kind: DirectiveKind) {
        match kind {
            DirectiveKind::BareDomain | DirectiveKind::FullDomain => self.valid_lines += 1,
            DirectiveKind::SkippedDirective => self.skipped_directives += 1,
            DirectiveKind::Invalid => self.invalid_lines += 1,
        }
    }
}

/// Parsed content of one list: domains in first-seen order, duplicates removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedList {
    pub domains: Vec<Domain>,
    pub stats: LineStats,
}

pub fn parse_list(text: &str) -> ParsedList {
    let mut seen = std::collections::HashSet::new();
    let mut parsed = ParsedList::default();

    for raw in text.lines() {
        let Some(directive) = parse_line(raw) else {
            parsed.stats.ignored_lines += 1;
            continue;
        };
        parsed.stats.record(directive.kind);
        if let Some(domain) = directive.domain {
            if seen.insert(domain.clone()) {
                parsed.domains.push(domain);
            }
        }
    }

    parsed
}
