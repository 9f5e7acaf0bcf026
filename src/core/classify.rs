//! Heuristic root-cause classification
//!
//! Given a witness and a pair of conflicting outcomes, guess *why* the
//! languages disagreed. Each cause has a predicate over the pattern text, the
//! input, the two outcomes, and the languages implicated; the first predicate
//! that fires wins. These are best-effort clues, not proofs: unexplained
//! pairs are expected and tracked under `Cause::Unknown`.
//!
//! Order is fixed by design: driver-bug workarounds first, then the broad
//! non-ASCII catch-alls, then the feature-specific heuristics, finishing with
//! the trailing-capture-group heuristic.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::matching::{MatchResult, SemanticDifferenceWitness};

/// PHP is fine at a 65K repetition bound and falls over around 70K.
const PHP_QUANTIFIER_LIMIT: u64 = 70_000;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("failed to compile classifier pattern `{pattern}`: {detail}")]
    Pattern { pattern: String, detail: String },
}

/// A predicate could not decide; treated as "did not match, try the next".
#[derive(Error, Debug)]
pub enum PredicateError {
    #[error("regex evaluation failed: {0}")]
    Engine(#[from] Box<fancy_regex::Error>),

    #[error("quantifier bound out of range: {0}")]
    Bound(#[from] std::num::ParseIntError),
}

impl From<fancy_regex::Error> for PredicateError {
    fn from(err: fancy_regex::Error) -> Self {
        PredicateError::Engine(Box::new(err))
    }
}

/// The closed catalogue of known cross-language regex quirks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cause {
    PhpForwardSlashDriverBug,
    PhpOversizedQuantifierDriverBug,
    NonAsciiInput,
    NonAsciiPattern,
    QuoteDirectiveQE,
    MatchStartG,
    StringAnchorsAZ,
    StringAnchorLowerZ,
    BackreferenceG,
    MatchResetK,
    UnicodePropertyNotation,
    PosixCharClass,
    EscapedH,
    BracedHexEscape,
    EscapedE,
    ControlCharEscape,
    RustOctalBackreference,
    RubyMixedGroupKinds,
    InlineFlags,
    PossessiveQuantifier,
    RubyOptionalExactQuantifier,
    EmptyCharClass,
    LineAnchors,
    QuantifiedStarGroup,
    TrailingCaptureGroups,
    Unknown,
}

impl Cause {
    /// Stable identifier used as the histogram key.
    pub fn label(self) -> &'static str {
        match self {
            Cause::PhpForwardSlashDriverBug => "php-forward-slash-driver-bug",
            Cause::PhpOversizedQuantifierDriverBug => "php-oversized-quantifier-driver-bug",
            Cause::NonAsciiInput => "non-ascii-input",
            Cause::NonAsciiPattern => "non-ascii-pattern",
            Cause::QuoteDirectiveQE => "quote-directive-q-e",
            Cause::MatchStartG => "match-start-g",
            Cause::StringAnchorsAZ => "string-anchors-a-z",
            Cause::StringAnchorLowerZ => "string-anchor-lower-z",
            Cause::BackreferenceG => "backreference-g",
            Cause::MatchResetK => "match-reset-k",
            Cause::UnicodePropertyNotation => "unicode-property-notation",
            Cause::PosixCharClass => "posix-char-class",
            Cause::EscapedH => "escaped-h",
            Cause::BracedHexEscape => "braced-hex-escape",
            Cause::EscapedE => "escaped-e",
            Cause::ControlCharEscape => "control-char-escape",
            Cause::RustOctalBackreference => "rust-octal-backreference",
            Cause::RubyMixedGroupKinds => "ruby-mixed-group-kinds",
            Cause::InlineFlags => "inline-flags",
            Cause::PossessiveQuantifier => "possessive-quantifier",
            Cause::RubyOptionalExactQuantifier => "ruby-optional-exact-quantifier",
            Cause::EmptyCharClass => "empty-char-class",
            Cause::LineAnchors => "line-anchors",
            Cause::QuantifiedStarGroup => "quantified-star-group",
            Cause::TrailingCaptureGroups => "trailing-capture-groups",
            Cause::Unknown => "unknown",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Cause::PhpForwardSlashDriverBug => {
                "Driver bug: the PHP driver mishandles patterns containing a forward slash"
            }
            Cause::PhpOversizedQuantifierDriverBug => {
                "Driver bug: the PHP driver mishandles repetition bounds around 70000 and up"
            }
            Cause::NonAsciiInput => "The input contained non-ASCII character(s); a clue, not a cause",
            Cause::NonAsciiPattern => {
                "The pattern contained non-ASCII character(s); a clue, not a cause"
            }
            Cause::QuoteDirectiveQE => {
                "\\Q...\\E read either as a quoting directive or as literal Q and E"
            }
            Cause::MatchStartG => {
                "\\G read either as the begin-at-previous-match assertion or as a literal G"
            }
            Cause::StringAnchorsAZ => {
                "\\A and \\Z read either as whole-string anchors or as literal A and Z"
            }
            Cause::StringAnchorLowerZ => {
                "\\z read either as the true end-of-string anchor or as a literal z"
            }
            Cause::BackreferenceG => "\\g read either as backreference notation or as a literal g",
            Cause::MatchResetK => "\\K read either as 'reset match start' or as a literal K",
            Cause::UnicodePropertyNotation => {
                "\\p{X} / \\pL read either as a Unicode property class or as literal text"
            }
            Cause::PosixCharClass => "POSIX classes like [[:space:]] are not supported everywhere",
            Cause::EscapedH => {
                "\\h read as hex digit, horizontal whitespace, or a literal h depending on language"
            }
            Cause::BracedHexEscape => "\\x{...} hex notation is not accepted everywhere",
            Cause::EscapedE => "\\e read either as the escape character or as a literal e",
            Cause::ControlCharEscape => {
                "\\cX read either as control character X or as a literal c and X"
            }
            Cause::RustOctalBackreference => {
                "Rust reads a backreference like \\1 as an octal escape instead"
            }
            Cause::RubyMixedGroupKinds => {
                "Ruby drops unnamed groups when named and unnamed capture groups are mixed"
            }
            Cause::InlineFlags => {
                "Inline flag notation (?i...) is unsupported or differs (unset form) by language"
            }
            Cause::PossessiveQuantifier => {
                "Possessive quantifiers (++, *+, ?+) are not supported everywhere"
            }
            Cause::RubyOptionalExactQuantifier => {
                "Ruby reads {n}? as an optional {n} rather than a non-greedy {n}"
            }
            Cause::EmptyCharClass => "Languages disagree on whether an empty class [] is permitted",
            Cause::LineAnchors => {
                "^/$ apply per line in some languages, or $ matches before a final line terminator"
            }
            Cause::QuantifiedStarGroup => {
                "Star inside a quantified group, e.g. ((a*)+), captures differently by language"
            }
            Cause::TrailingCaptureGroups => {
                "Trailing unused capture groups are dropped by some languages"
            }
            Cause::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Cause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything a predicate may inspect about one conflicting outcome pair.
pub struct PairContext<'a> {
    pub pattern: &'a str,
    pub input: &'a str,
    pub mr1: &'a MatchResult,
    pub mr2: &'a MatchResult,
    pub langs1: &'a [String],
    pub langs2: &'a [String],
}

impl PairContext<'_> {
    /// Whether `lang` reported either of the two outcomes.
    fn implicates(&self, lang: &str) -> bool {
        self.langs1.iter().any(|l| l == lang) || self.langs2.iter().any(|l| l == lang)
    }

    fn implicates_any(&self, langs: &[&str]) -> bool {
        langs.iter().any(|lang| self.implicates(lang))
    }

    /// Whether one side of the pair is exactly `lang` and nothing else.
    fn one_side_is_only(&self, lang: &str) -> bool {
        fn exactly(langs: &[String], lang: &str) -> bool {
            langs.len() == 1 && langs[0] == lang
        }
        exactly(self.langs1, lang) || exactly(self.langs2, lang)
    }

    fn match_disagreement(&self) -> bool {
        self.mr1.is_match() != self.mr2.is_match()
    }

    fn both_matched_same_substring(&self) -> bool {
        self.mr1.is_match()
            && self.mr2.is_match()
            && self.mr1.matched_string() == self.mr2.matched_string()
    }
}

/// Precompiled detection patterns. "Escaped needle" tests must not fire on
/// `\\Q` (an escaped backslash followed by a literal Q), which takes a
/// look-behind; those compile on the fancy-regex engine, the rest on the
/// regex crate.
struct DetectionPatterns {
    escape_text: regex::Regex,
    braced_hex: regex::Regex,
    posix_class: regex::Regex,
    inline_flags: regex::Regex,
    possessive: regex::Regex,
    optional_exact: regex::Regex,
    empty_class: regex::Regex,
    quantifier_upper: regex::Regex,

    quote_qe: fancy_regex::Regex,
    escaped_g_upper: fancy_regex::Regex,
    escaped_az: fancy_regex::Regex,
    escaped_z: fancy_regex::Regex,
    backref_g: fancy_regex::Regex,
    escaped_k: fancy_regex::Regex,
    unicode_property: fancy_regex::Regex,
    escaped_h: fancy_regex::Regex,
    escaped_e: fancy_regex::Regex,
    control_char: fancy_regex::Regex,
    escaped_digit: fancy_regex::Regex,
}

/// `needle` escaped in the pattern under test: an even number of preceding
/// backslashes (possibly zero), then a real `\`. `\G` counts, `\\G` does not.
fn escaped(needle: &str) -> String {
    format!(r"(?<!\\)(\\\\)*\\{}", needle)
}

fn plain(pattern: &str) -> Result<regex::Regex, ClassifyError> {
    regex::Regex::new(pattern).map_err(|e| ClassifyError::Pattern {
        pattern: pattern.to_string(),
        detail: e.to_string(),
    })
}

fn fancy(pattern: &str) -> Result<fancy_regex::Regex, ClassifyError> {
    fancy_regex::Regex::new(pattern).map_err(|e| ClassifyError::Pattern {
        pattern: pattern.to_string(),
        detail: e.to_string(),
    })
}

impl DetectionPatterns {
    fn new() -> Result<Self, ClassifyError> {
        Ok(Self {
            // Literal \uXXXX / \u{...} escape text carried inside a string.
            escape_text: plain(r"\\u\{?[a-fA-F0-9]{2,6}")?,
            braced_hex: plain(r"\\x\{[a-fA-F0-9]+\}")?,
            posix_class: plain(r"\[.*\[:\w+:\].*\]")?,
            inline_flags: plain(r"\(\?[-imsUux]+.*\)")?,
            possessive: plain(r"[+*?]\+")?,
            optional_exact: plain(r"\{\d+\}\?")?,
            empty_class: plain(r"\[\]")?,
            quantifier_upper: plain(r"\{(?:\d+)?,(\d+)\}")?,

            quote_qe: fancy(&format!("{}Q.*{}E", escaped(""), escaped("")))?,
            escaped_g_upper: fancy(&escaped("G"))?,
            escaped_az: fancy(&escaped("(A|Z)"))?,
            escaped_z: fancy(&escaped("z"))?,
            backref_g: fancy(&escaped(r#"g[{<'"\d]"#))?,
            escaped_k: fancy(&escaped("K"))?,
            unicode_property: fancy(&escaped(r"[pP]([A-Z]|\{.+\})"))?,
            escaped_h: fancy(&escaped("h"))?,
            escaped_e: fancy(&escaped("e"))?,
            control_char: fancy(&escaped("c[a-zA-Z]"))?,
            escaped_digit: fancy(&escaped(r"\d"))?,
        })
    }
}

type Predicate = fn(&DetectionPatterns, &PairContext<'_>) -> Result<bool, PredicateError>;

/// Classifies conflicting outcome pairs against the cause catalogue.
pub struct CauseClassifier {
    patterns: DetectionPatterns,
    rules: Vec<(Cause, Predicate)>,
}

impl CauseClassifier {
    pub fn new() -> Result<Self, ClassifyError> {
        let rules: Vec<(Cause, Predicate)> = vec![
            // Driver-bug workarounds: most specific, most embarrassing.
            (Cause::PhpForwardSlashDriverBug, is_php_forward_slash),
            (
                Cause::PhpOversizedQuantifierDriverBug,
                is_php_oversized_quantifier,
            ),
            // Broad catch-alls.
            (Cause::NonAsciiInput, is_non_ascii_input),
            (Cause::NonAsciiPattern, is_non_ascii_pattern),
            // Feature-specific heuristics.
            (Cause::QuoteDirectiveQE, is_quote_directive_qe),
            (Cause::MatchStartG, is_match_start_g),
            (Cause::StringAnchorsAZ, is_string_anchors_az),
            (Cause::StringAnchorLowerZ, is_string_anchor_lower_z),
            (Cause::BackreferenceG, is_backreference_g),
            (Cause::MatchResetK, is_match_reset_k),
            (Cause::UnicodePropertyNotation, is_unicode_property),
            (Cause::PosixCharClass, is_posix_char_class),
            (Cause::EscapedH, is_escaped_h),
            (Cause::BracedHexEscape, is_braced_hex),
            (Cause::EscapedE, is_escaped_e),
            (Cause::ControlCharEscape, is_control_char),
            (Cause::RustOctalBackreference, is_rust_octal_backreference),
            (Cause::RubyMixedGroupKinds, is_ruby_mixed_group_kinds),
            (Cause::InlineFlags, is_inline_flags),
            (Cause::PossessiveQuantifier, is_possessive_quantifier),
            (
                Cause::RubyOptionalExactQuantifier,
                is_ruby_optional_exact_quantifier,
            ),
            (Cause::EmptyCharClass, is_empty_char_class),
            (Cause::LineAnchors, is_line_anchors),
            (Cause::QuantifiedStarGroup, is_quantified_star_group),
            // Trailing capture-group count heuristic closes the list.
            (Cause::TrailingCaptureGroups, is_trailing_capture_groups),
        ];
        Ok(Self {
            patterns: DetectionPatterns::new()?,
            rules,
        })
    }

    /// Explain why `mr1` and `mr2` differ for this witness. Pure function of
    /// its inputs: the same pair always classifies the same way.
    pub fn classify(
        &self,
        sdw: &SemanticDifferenceWitness,
        mr1: &MatchResult,
        mr2: &MatchResult,
    ) -> Cause {
        let ctx = PairContext {
            pattern: &sdw.pattern,
            input: &sdw.input,
            mr1,
            mr2,
            langs1: sdw.langs_for(mr1),
            langs2: sdw.langs_for(mr2),
        };

        for (cause, predicate) in &self.rules {
            match predicate(&self.patterns, &ctx) {
                Ok(true) => {
                    debug!(pattern = %sdw.pattern, input = %sdw.input, cause = %cause, "classified");
                    return *cause;
                }
                Ok(false) => {}
                Err(err) => {
                    // A broken predicate is a non-answer, not a failure.
                    warn!(pattern = %sdw.pattern, cause = %cause, %err, "predicate error, skipping");
                }
            }
        }
        Cause::Unknown
    }
}

/// Running cause -> count tally across a classification run.
#[derive(Debug, Default, Clone)]
pub struct CauseHistogram {
    counts: BTreeMap<Cause, u64>,
}

impl CauseHistogram {
    pub fn record(&mut self, cause: Cause) {
        *self.counts.entry(cause).or_insert(0) += 1;
    }

    pub fn counts(&self) -> impl Iterator<Item = (Cause, u64)> + '_ {
        self.counts.iter().map(|(c, n)| (*c, *n))
    }

    pub fn get(&self, cause: Cause) -> u64 {
        self.counts.get(&cause).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

fn is_php_forward_slash(
    _p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    Ok(ctx.one_side_is_only("php") && ctx.pattern.contains('/'))
}

fn is_php_oversized_quantifier(
    p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    if !ctx.one_side_is_only("php") {
        return Ok(false);
    }
    for caps in p.quantifier_upper.captures_iter(ctx.pattern) {
        let bound: u64 = caps[1].parse()?;
        if bound > PHP_QUANTIFIER_LIMIT {
            return Ok(true);
        }
    }
    Ok(false)
}

fn looks_non_ascii(p: &DetectionPatterns, text: &str) -> bool {
    !text.is_ascii() || p.escape_text.is_match(text)
}

fn is_non_ascii_input(p: &DetectionPatterns, ctx: &PairContext<'_>) -> Result<bool, PredicateError> {
    Ok(looks_non_ascii(p, ctx.input))
}

fn is_non_ascii_pattern(
    p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    Ok(looks_non_ascii(p, ctx.pattern))
}

fn is_quote_directive_qe(
    p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    // The Perl driver has its own troubles with \Q...\E; a pair where one
    // side is Perl alone does not qualify.
    Ok(p.quote_qe.is_match(ctx.pattern)?
        && ctx.match_disagreement()
        && !ctx.one_side_is_only("perl"))
}

fn is_match_start_g(p: &DetectionPatterns, ctx: &PairContext<'_>) -> Result<bool, PredicateError> {
    // \G is a literal G in Python and JavaScript.
    if ctx.implicates_any(&["python", "javascript"]) {
        return Ok(p.escaped_g_upper.is_match(ctx.pattern)?);
    }
    Ok(false)
}

fn is_string_anchors_az(
    p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    // \A and \Z differences manifest in JavaScript.
    if ctx.implicates("javascript") {
        return Ok(p.escaped_az.is_match(ctx.pattern)?);
    }
    Ok(false)
}

fn is_string_anchor_lower_z(
    p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    // \z is a literal z in JavaScript and Python.
    if ctx.implicates_any(&["javascript", "python"]) {
        return Ok(p.escaped_z.is_match(ctx.pattern)?);
    }
    Ok(false)
}

fn is_backreference_g(
    p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    // \g takes many forms (\g1, \g{...}, \g<...>, \g'name'); expected to
    // manifest as a match/mismatch split.
    if ctx.match_disagreement() {
        return Ok(p.backref_g.is_match(ctx.pattern)?);
    }
    Ok(false)
}

fn is_match_reset_k(p: &DetectionPatterns, ctx: &PairContext<'_>) -> Result<bool, PredicateError> {
    if ctx.match_disagreement() && ctx.implicates_any(&["ruby", "perl", "php"]) {
        return Ok(p.escaped_k.is_match(ctx.pattern)?);
    }
    Ok(false)
}

fn is_unicode_property(
    p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    // No \p support in Python and JavaScript; Ruby takes \p{...} but not \pL.
    if ctx.implicates_any(&["javascript", "python", "ruby"]) {
        return Ok(p.unicode_property.is_match(ctx.pattern)?);
    }
    Ok(false)
}

fn is_posix_char_class(
    p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    Ok(p.posix_class.is_match(ctx.pattern))
}

fn is_escaped_h(p: &DetectionPatterns, ctx: &PairContext<'_>) -> Result<bool, PredicateError> {
    // Literal h (Python, JS), horizontal whitespace (Perl, Java), hex (Ruby).
    if ctx.implicates_any(&["javascript", "python", "perl", "java", "ruby"]) {
        return Ok(p.escaped_h.is_match(ctx.pattern)?);
    }
    Ok(false)
}

fn is_braced_hex(p: &DetectionPatterns, ctx: &PairContext<'_>) -> Result<bool, PredicateError> {
    Ok(p.braced_hex.is_match(ctx.pattern))
}

fn is_escaped_e(p: &DetectionPatterns, ctx: &PairContext<'_>) -> Result<bool, PredicateError> {
    if ctx.implicates_any(&["javascript", "python", "rust", "go"]) {
        return Ok(p.escaped_e.is_match(ctx.pattern)?);
    }
    Ok(false)
}

fn is_control_char(p: &DetectionPatterns, ctx: &PairContext<'_>) -> Result<bool, PredicateError> {
    // Python reads \cA as a literal c followed by A.
    if ctx.implicates("python") {
        return Ok(p.control_char.is_match(ctx.pattern)?);
    }
    Ok(false)
}

fn is_rust_octal_backreference(
    p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    if ctx.implicates("rust") {
        return Ok(p.escaped_digit.is_match(ctx.pattern)?);
    }
    Ok(false)
}

fn is_ruby_mixed_group_kinds(
    _p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    if ctx.implicates("ruby") {
        return Ok(has_mixed_group_kinds(ctx.pattern));
    }
    Ok(false)
}

fn is_inline_flags(p: &DetectionPatterns, ctx: &PairContext<'_>) -> Result<bool, PredicateError> {
    // JavaScript has no inline flags; Python's unset form differs.
    if ctx.implicates_any(&["javascript", "python"]) {
        return Ok(p.inline_flags.is_match(ctx.pattern));
    }
    Ok(false)
}

fn is_possessive_quantifier(
    p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    if ctx.one_side_is_only("rust") {
        return Ok(p.possessive.is_match(ctx.pattern));
    }
    Ok(false)
}

fn is_ruby_optional_exact_quantifier(
    p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    if ctx.one_side_is_only("ruby") {
        return Ok(p.optional_exact.is_match(ctx.pattern));
    }
    Ok(false)
}

fn is_empty_char_class(
    p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    if ctx.implicates("javascript") {
        return Ok(p.empty_class.is_match(ctx.pattern));
    }
    Ok(false)
}

fn is_line_anchors(_p: &DetectionPatterns, ctx: &PairContext<'_>) -> Result<bool, PredicateError> {
    // Needs an anchor, a line terminator in the input, and either a
    // match/mismatch split or Java in the mix (Java's terminator is \r).
    Ok((ctx.pattern.contains('^') || ctx.pattern.contains('$'))
        && (ctx.input.contains('\r') || ctx.input.contains('\n'))
        && (ctx.match_disagreement() || ctx.implicates("java")))
}

fn is_quantified_star_group(
    _p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    // Usually manifests as missing or different-sized capture groups.
    if ctx.both_matched_same_substring() {
        return Ok(has_quantified_star_group(ctx.pattern));
    }
    Ok(false)
}

fn is_trailing_capture_groups(
    _p: &DetectionPatterns,
    ctx: &PairContext<'_>,
) -> Result<bool, PredicateError> {
    if !ctx.both_matched_same_substring() {
        return Ok(false);
    }
    let (a, b) = (ctx.mr1.capture_groups(), ctx.mr2.capture_groups());
    if a.len() == b.len() {
        return Ok(false);
    }
    let (shorter, longer) = if a.len() < b.len() { (a, b) } else { (b, a) };
    // Agreement up to the shorter vector, only empties past it.
    if shorter.iter().zip(longer.iter()).any(|(s, l)| s != l) {
        return Ok(false);
    }
    Ok(longer[shorter.len()..].iter().all(String::is_empty))
}

/// Does the pattern mix named and unnamed capture groups?
///
/// Walks the regex-syntax AST when the pattern parses; falls back to a
/// character scan for foreign-dialect patterns the AST parser rejects.
fn has_mixed_group_kinds(pattern: &str) -> bool {
    use regex_syntax::ast::parse::Parser as AstParser;
    use regex_syntax::ast::{Ast, GroupKind};

    fn walk(ast: &Ast, named: &mut bool, unnamed: &mut bool) {
        match ast {
            Ast::Group(group) => {
                match &group.kind {
                    GroupKind::CaptureName { .. } => *named = true,
                    GroupKind::CaptureIndex(_) => *unnamed = true,
                    GroupKind::NonCapturing(_) => {}
                }
                walk(&group.ast, named, unnamed);
            }
            Ast::Concat(concat) => concat.asts.iter().for_each(|a| walk(a, named, unnamed)),
            Ast::Alternation(alt) => alt.asts.iter().for_each(|a| walk(a, named, unnamed)),
            Ast::Repetition(rep) => walk(&rep.ast, named, unnamed),
            _ => {}
        }
    }

    match AstParser::new().parse(pattern) {
        Ok(ast) => {
            let (mut named, mut unnamed) = (false, false);
            walk(&ast, &mut named, &mut unnamed);
            named && unnamed
        }
        Err(_) => scan_mixed_group_kinds(pattern),
    }
}

static NAMED_GROUP_HEAD: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\?(<\w+>|'\w+')").expect("BUG: named-group head pattern is invalid")
});

/// Scanner fallback: find `(` outside character classes, classify each group
/// opener as named, non-capturing, or unnamed.
fn scan_mixed_group_kinds(pattern: &str) -> bool {
    let mut named = false;
    let mut unnamed = false;
    let mut escaped_next = false;
    let mut class_depth = 0usize;

    for (i, c) in pattern.char_indices() {
        if escaped_next {
            escaped_next = false;
            continue;
        }
        if c == '\\' {
            escaped_next = true;
            continue;
        }
        if c == '[' {
            class_depth += 1;
            continue;
        }
        if class_depth > 0 && c == ']' {
            class_depth -= 1;
            continue;
        }
        if class_depth == 0 && c == '(' {
            let rest = &pattern[i + c.len_utf8()..];
            if rest.starts_with("?:") {
                // Non-capturing.
            } else if NAMED_GROUP_HEAD.is_match(rest) {
                named = true;
            } else {
                unnamed = true;
            }
        }
    }
    named && unnamed
}

/// Does the pattern quantify a group that contains a star, e.g. `((a*))+`?
/// A star colors every enclosing group, so `((a*)bc)?` counts too.
fn has_quantified_star_group(pattern: &str) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    let mut escaped_next = false;
    let mut class_depth = 0usize;
    let mut group_has_star: Vec<bool> = Vec::new();

    for i in 0..chars.len() {
        let c = chars[i];
        if escaped_next {
            escaped_next = false;
            continue;
        }
        if c == '\\' {
            escaped_next = true;
            continue;
        }
        if c == '[' {
            class_depth += 1;
            continue;
        }
        if class_depth > 0 && c == ']' {
            class_depth -= 1;
            continue;
        }
        if class_depth > 0 {
            continue;
        }
        match c {
            '(' => group_has_star.push(false),
            ')' => {
                let closing_had_star = group_has_star.last().copied().unwrap_or(false);
                let quantified = matches!(chars.get(i + 1), Some('*' | '+' | '?' | '{'));
                if closing_had_star && quantified {
                    return true;
                }
                group_has_star.pop();
            }
            '*' => {
                for flag in &mut group_has_star {
                    *flag = true;
                }
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matching::{MatchContents, RegexEvaluationResult};

    fn matched(string: &str, groups: &[&str]) -> MatchResult {
        MatchResult::matched(MatchContents::from_raw(
            string,
            groups.iter().map(|g| Some(g.to_string())).collect(),
        ))
    }

    /// Build a witness where `langs1` all saw `mr1` and `langs2` all saw
    /// `mr2`, then classify the (mr1, mr2) pair.
    fn classify_pair(
        pattern: &str,
        input: &str,
        mr1: MatchResult,
        langs1: &[&str],
        mr2: MatchResult,
        langs2: &[&str],
    ) -> Cause {
        let classifier = CauseClassifier::new().unwrap();
        let mut sdw = SemanticDifferenceWitness::new(pattern, input);
        for (mr, langs) in [(&mr1, langs1), (&mr2, langs2)] {
            for lang in langs {
                sdw.add_rer(&RegexEvaluationResult {
                    pattern: pattern.to_string(),
                    input: input.to_string(),
                    language: lang.to_string(),
                    match_result: mr.clone(),
                });
            }
        }
        classifier.classify(&sdw, &mr1, &mr2)
    }

    #[test]
    fn test_quote_directive_wins_over_unknown() {
        let cause = classify_pair(
            r"\Qa.b\E",
            "a.b",
            matched("a.b", &[]),
            &["java", "go"],
            MatchResult::no_match(),
            &["javascript"],
        );
        assert_eq!(cause, Cause::QuoteDirectiveQE);
    }

    #[test]
    fn test_classification_is_deterministic() {
        for _ in 0..2 {
            let cause = classify_pair(
                r"\Qa\E",
                "a",
                matched("a", &[]),
                &["go"],
                MatchResult::no_match(),
                &["javascript"],
            );
            assert_eq!(cause, Cause::QuoteDirectiveQE);
        }
    }

    #[test]
    fn test_quote_directive_excludes_perl_only_pairs() {
        let cause = classify_pair(
            r"\Qa\E",
            "a",
            matched("a", &[]),
            &["perl"],
            MatchResult::no_match(),
            &["go"],
        );
        assert_ne!(cause, Cause::QuoteDirectiveQE);
    }

    #[test]
    fn test_php_forward_slash_bug_comes_first() {
        let cause = classify_pair(
            r"a/b",
            "a/b",
            MatchResult::no_match(),
            &["php"],
            matched("a/b", &[]),
            &["python", "ruby"],
        );
        assert_eq!(cause, Cause::PhpForwardSlashDriverBug);
    }

    #[test]
    fn test_php_oversized_quantifier_bug() {
        let cause = classify_pair(
            r"a{2,80000}",
            "aa",
            MatchResult::no_match(),
            &["php"],
            matched("aa", &[]),
            &["python"],
        );
        assert_eq!(cause, Cause::PhpOversizedQuantifierDriverBug);
    }

    #[test]
    fn test_oversized_quantifier_overflow_is_survivable() {
        // A bound too large for u64 makes the predicate error out; the
        // classifier moves on and lands on unknown.
        let cause = classify_pair(
            r"a{2,99999999999999999999999}",
            "aa",
            MatchResult::no_match(),
            &["php"],
            matched("aa", &[]),
            &["python"],
        );
        assert_eq!(cause, Cause::Unknown);
    }

    #[test]
    fn test_non_ascii_input_catch_all() {
        let cause = classify_pair(
            r"caf.",
            "café",
            matched("café", &[]),
            &["python"],
            MatchResult::no_match(),
            &["go"],
        );
        assert_eq!(cause, Cause::NonAsciiInput);
    }

    #[test]
    fn test_rust_octal_backreference() {
        let cause = classify_pair(
            r"(a)\1",
            "aa",
            matched("aa", &["a"]),
            &["perl"],
            MatchResult::no_match(),
            &["rust"],
        );
        assert_eq!(cause, Cause::RustOctalBackreference);
    }

    #[test]
    fn test_possessive_quantifier_needs_rust_alone() {
        let cause = classify_pair(
            r"ba*+",
            "baa",
            matched("baa", &[]),
            &["java", "perl"],
            MatchResult::no_match(),
            &["rust"],
        );
        assert_eq!(cause, Cause::PossessiveQuantifier);
    }

    #[test]
    fn test_ruby_optional_exact_quantifier() {
        let cause = classify_pair(
            r"ba{3}?",
            "b",
            matched("b", &[]),
            &["ruby"],
            MatchResult::no_match(),
            &["python"],
        );
        assert_eq!(cause, Cause::RubyOptionalExactQuantifier);
    }

    #[test]
    fn test_line_anchors() {
        let cause = classify_pair(
            "^ab$",
            "ab\ncd",
            matched("ab", &[]),
            &["ruby"],
            MatchResult::no_match(),
            &["python"],
        );
        assert_eq!(cause, Cause::LineAnchors);
    }

    #[test]
    fn test_quantified_star_group_on_capture_disagreement() {
        let cause = classify_pair(
            r"((b*)+)",
            "bb",
            matched("bb", &["bb", "bb"]),
            &["python"],
            matched("bb", &["bb", ""]),
            &["go"],
        );
        assert_eq!(cause, Cause::QuantifiedStarGroup);
    }

    #[test]
    fn test_trailing_capture_groups_is_the_last_resort() {
        let cause = classify_pair(
            r"(b)(c)?",
            "b",
            matched("b", &["b", ""]),
            &["python"],
            matched("b", &["b"]),
            &["php", "go"],
        );
        assert_eq!(cause, Cause::TrailingCaptureGroups);
    }

    #[test]
    fn test_trailing_capture_groups_requires_empty_tail() {
        let cause = classify_pair(
            r"(b)(c)?",
            "bc",
            matched("b", &["b", "c"]),
            &["python"],
            matched("b", &["b"]),
            &["go"],
        );
        assert_ne!(cause, Cause::TrailingCaptureGroups);
    }

    #[test]
    fn test_ruby_mixed_group_kinds() {
        let cause = classify_pair(
            r"(?<x>b)(c)",
            "bc",
            matched("bc", &["b", "c"]),
            &["python"],
            matched("bc", &["b", ""]),
            &["ruby"],
        );
        assert_eq!(cause, Cause::RubyMixedGroupKinds);
    }

    #[test]
    fn test_unexplained_pair_is_unknown() {
        let cause = classify_pair(
            "bcd",
            "bcd",
            matched("bcd", &[]),
            &["python"],
            MatchResult::no_match(),
            &["ruby"],
        );
        assert_eq!(cause, Cause::Unknown);
    }

    #[test]
    fn test_escaped_needle_detection_ignores_escaped_backslash() {
        // `\\G` is an escaped backslash then a literal G, not the assertion.
        let cause = classify_pair(
            r"a\\Gb",
            "ab",
            matched("ab", &[]),
            &["python"],
            MatchResult::no_match(),
            &["perl"],
        );
        assert_ne!(cause, Cause::MatchStartG);

        let cause = classify_pair(
            r"a\Gb",
            "ab",
            matched("ab", &[]),
            &["python"],
            MatchResult::no_match(),
            &["perl"],
        );
        assert_eq!(cause, Cause::MatchStartG);
    }

    #[test]
    fn test_scanner_fallbacks() {
        assert!(has_quantified_star_group(r"((a*)+)"));
        assert!(has_quantified_star_group(r"((a*)bc)?"));
        assert!(!has_quantified_star_group(r"(a*)"));
        assert!(!has_quantified_star_group(r"[(*)]+"));

        assert!(has_mixed_group_kinds(r"(?<x>a)(b)"));
        assert!(!has_mixed_group_kinds(r"(?<x>a)(?:b)"));
        assert!(!has_mixed_group_kinds(r"(a)(b)"));
        // Foreign syntax forces the scanner path.
        assert!(has_mixed_group_kinds(r"(?'x'a)(b)(?=c)"));
    }

    #[test]
    fn test_histogram_accumulates() {
        let mut histogram = CauseHistogram::default();
        histogram.record(Cause::Unknown);
        histogram.record(Cause::Unknown);
        histogram.record(Cause::LineAnchors);
        assert_eq!(histogram.get(Cause::Unknown), 2);
        assert_eq!(histogram.get(Cause::LineAnchors), 1);
        assert_eq!(histogram.total(), 3);
    }
}
