//! Separation of reasoning from user-facing text
//!
//! Native-reasoning backends tag fragments at the wire level and the
//! processor only re-emits them. Pattern-reasoning models embed markers such
//! as `<think>...</think>` in ordinary content; the processor buffers just
//! enough text to never split such a marker across two emitted tokens.

use regex::{Regex, RegexBuilder};

use crate::capability::{ReasoningConfig, ReasoningKind};
use crate::types::{ThinkingToken, TokenKind};

/// Longest subject line shown for a reasoning span
const SUBJECT_MAX_CHARS: usize = 50;

/// Reasoning marker compiled from a regex
///
/// The first capture group is the reasoning body. `.` matches newlines.
#[derive(Debug, Clone)]
pub struct ReasoningPattern {
    regex: Regex,
    opening: Opening,
}

/// Literal text every match of a pattern starts with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Opening {
    /// ASCII-lowercased when `ignore_case` is set
    literal: String,
    ignore_case: bool,
    /// The pattern may consume whitespace ahead of the literal
    leading_space: bool,
}

impl ReasoningPattern {
    /// Compile a pattern
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern).dot_matches_new_line(true).build()?;
        Ok(Self {
            opening: opening_of(pattern),
            regex,
        })
    }

    /// Source pattern
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Literal text every match starts with, empty when none can be derived
    pub fn opening(&self) -> &str {
        &self.opening.literal
    }

    /// Offset from which `buffer` might still start a match, if any
    fn hold_from(&self, buffer: &str) -> Option<usize> {
        let opening = &self.opening;
        let lowered;
        let haystack = if opening.ignore_case {
            // ASCII lowering keeps byte offsets intact
            lowered = buffer.to_ascii_lowercase();
            lowered.as_str()
        } else {
            buffer
        };
        let literal = opening.literal.as_str();

        let position = if literal.is_empty() {
            None
        } else if let Some(position) = haystack.find(literal) {
            Some(position)
        } else {
            // Longest buffer suffix that is a proper prefix of the marker
            (1..literal.len())
                .rev()
                .filter(|&i| literal.is_char_boundary(i))
                .find(|&i| haystack.ends_with(&literal[..i]))
                .map(|i| haystack.len() - i)
        };

        if !opening.leading_space {
            return position;
        }
        let position = position.unwrap_or(haystack.len());
        Some(haystack[..position].trim_end().len())
    }

    /// Earliest non-empty match as `(start, end, body)`
    fn find(&self, haystack: &str) -> Option<(usize, usize, String)> {
        let captures = self.regex.captures(haystack)?;
        let whole = captures.get(0)?;
        if whole.is_empty() {
            return None;
        }
        let body = captures.get(1).map_or(whole.as_str(), |m| m.as_str());
        Some((whole.start(), whole.end(), body.to_owned()))
    }
}

/// Opening literal of a regex, up to the first metacharacter
///
/// Leading inline flag groups, `^` anchors and `\s*`/`\s+` runs are
/// skipped. Case-insensitive patterns keep only the ASCII part of the
/// literal, lowercased.
fn opening_of(pattern: &str) -> Opening {
    let mut rest = pattern;
    let mut ignore_case = false;
    while let Some(after) = rest.strip_prefix("(?") {
        let Some(end) = after.find(')') else { break };
        let flags = &after[..end];
        if flags.contains(':') {
            break;
        }
        let enabled = flags.split('-').next().unwrap_or_default();
        if enabled.contains('i') {
            ignore_case = true;
        }
        rest = &after[end + 1..];
    }

    let mut leading_space = false;
    loop {
        if let Some(after) = rest.strip_prefix('^') {
            rest = after;
        } else if let Some(after) = rest.strip_prefix(r"\s*").or_else(|| rest.strip_prefix(r"\s+")) {
            rest = after;
            leading_space = true;
        } else {
            break;
        }
    }

    let mut literal = literal_prefix(rest);
    if ignore_case {
        let ascii = literal.find(|c: char| !c.is_ascii()).unwrap_or(literal.len());
        literal.truncate(ascii);
        literal.make_ascii_lowercase();
    }

    Opening {
        literal,
        ignore_case,
        leading_space,
    }
}

/// Literal prefix of a regex, up to the first metacharacter
fn literal_prefix(pattern: &str) -> String {
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        let ch = match c {
            '\\' => match chars.next() {
                Some(escaped) if escaped.is_ascii_punctuation() => escaped,
                _ => break,
            },
            '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' => break,
            other => other,
        };

        match chars.peek() {
            // Optional: not part of every match
            Some('*' | '?' | '{') => break,
            Some('+') => {
                literal.push(ch);
                break;
            }
            _ => literal.push(ch),
        }
    }

    literal
}

/// Short display line for a reasoning span
///
/// First non-empty line with markdown emphasis and heading markers removed,
/// truncated to 50 characters.
pub fn subject_line(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_start_matches('#').trim_matches('*').trim();
    if line.is_empty() {
        return None;
    }

    if line.chars().count() > SUBJECT_MAX_CHARS {
        let cut: String = line.chars().take(SUBJECT_MAX_CHARS).collect();
        Some(format!("{}...", cut.trim_end()))
    } else {
        Some(line.to_owned())
    }
}

#[derive(Debug)]
enum Mode {
    PassThrough,
    Native,
    Pattern(Vec<ReasoningPattern>),
}

/// Text of a complete response split into its two channels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitText {
    /// Reasoning spans joined by blank lines
    pub reasoning: Option<String>,
    /// Remaining user-facing text
    pub content: String,
}

/// Per-call state machine turning raw text into typed tokens
///
/// Holds no shared state; create one per stream.
#[derive(Debug)]
pub struct ThinkingProcessor {
    mode: Mode,
    buffer: String,
    after_reasoning: bool,
    span: String,
}

impl ThinkingProcessor {
    /// Processor for a model's reasoning strategy
    pub fn new(config: &ReasoningConfig) -> Self {
        let mode = match config.kind {
            ReasoningKind::None => Mode::PassThrough,
            ReasoningKind::Native => Mode::Native,
            ReasoningKind::Pattern if config.patterns.is_empty() => Mode::PassThrough,
            ReasoningKind::Pattern => Mode::Pattern(config.patterns.clone()),
        };

        Self {
            mode,
            buffer: String::new(),
            after_reasoning: false,
            span: String::new(),
        }
    }

    /// Feed an untagged text fragment
    pub fn push(&mut self, text: &str) -> Vec<ThinkingToken> {
        let mut out = Vec::new();
        if matches!(self.mode, Mode::Pattern(_)) {
            self.buffer.push_str(text);
            self.scan(false, &mut out);
        } else {
            self.emit_content(text, &mut out);
        }
        out
    }

    /// Feed a fragment the backend already tagged as reasoning
    ///
    /// Content withheld as a possible marker is released first: a tagged
    /// fragment interrupts it, so it can no longer open one.
    pub fn push_reasoning(&mut self, text: &str) -> Vec<ThinkingToken> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut out = self.finish();
        self.span.push_str(text);
        self.after_reasoning = true;
        out.push(ThinkingToken::reasoning(text, subject_line(&self.span)));
        out
    }

    /// Flush everything still buffered as content
    ///
    /// Unclosed markers are emitted verbatim so a malformed stream still
    /// terminates with all of its text delivered.
    pub fn finish(&mut self) -> Vec<ThinkingToken> {
        let mut out = Vec::new();
        if matches!(self.mode, Mode::Pattern(_)) {
            self.scan(true, &mut out);
        }
        out
    }

    /// Split a complete, non-streamed text
    pub fn split_complete(mut self, text: &str) -> SplitText {
        let mut tokens = self.push(text);
        tokens.extend(self.finish());

        let mut reasoning = Vec::new();
        let mut content = String::new();
        for token in tokens {
            match token.kind {
                TokenKind::Reasoning => reasoning.push(token.text),
                TokenKind::Content => content.push_str(&token.text),
            }
        }

        SplitText {
            reasoning: (!reasoning.is_empty()).then(|| reasoning.join("\n\n")),
            content,
        }
    }

    fn scan(&mut self, finished: bool, out: &mut Vec<ThinkingToken>) {
        loop {
            // A match is final only once no other marker could still open before it
            if let Some((start, end, body)) = self.earliest_match()
                && (finished || start <= self.hold_point())
            {
                let before: String = self.buffer.drain(..start).collect();
                self.emit_content(&before, out);
                self.emit_span(&body, out);
                self.buffer.drain(..end - start);
                continue;
            }

            let ready = if finished { self.buffer.len() } else { self.hold_point() };
            let text: String = self.buffer.drain(..ready).collect();
            self.emit_content(&text, out);
            break;
        }
    }

    fn patterns(&self) -> &[ReasoningPattern] {
        match &self.mode {
            Mode::Pattern(patterns) => patterns,
            Mode::PassThrough | Mode::Native => &[],
        }
    }

    /// Leftmost full match; ties go to the earlier pattern
    fn earliest_match(&self) -> Option<(usize, usize, String)> {
        self.patterns()
            .iter()
            .filter_map(|p| p.find(&self.buffer))
            .min_by_key(|(start, _, _)| *start)
    }

    /// Byte offset before which the buffer can no longer start a match
    fn hold_point(&self) -> usize {
        self.patterns()
            .iter()
            .filter_map(|pattern| pattern.hold_from(&self.buffer))
            .min()
            .unwrap_or(self.buffer.len())
    }

    fn emit_span(&mut self, body: &str, out: &mut Vec<ThinkingToken>) {
        self.after_reasoning = true;
        let text = body.trim();
        if !text.is_empty() {
            out.push(ThinkingToken::reasoning(text, subject_line(text)));
        }
    }

    fn emit_content(&mut self, text: &str, out: &mut Vec<ThinkingToken>) {
        let mut text = text;
        if self.after_reasoning {
            text = text.trim_start();
            if text.is_empty() {
                return;
            }
            self.after_reasoning = false;
        }
        if text.is_empty() {
            return;
        }
        self.span.clear();
        out.push(ThinkingToken::content(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern_config(patterns: &[&str]) -> ReasoningConfig {
        ReasoningConfig {
            kind: ReasoningKind::Pattern,
            native_param: None,
            patterns: patterns.iter().map(|p| ReasoningPattern::new(p).unwrap()).collect(),
            default_level: None,
        }
    }

    fn think() -> ReasoningConfig {
        pattern_config(&["<think>(.*?)</think>"])
    }

    fn run(config: &ReasoningConfig, chunks: &[&str]) -> Vec<ThinkingToken> {
        let mut processor = ThinkingProcessor::new(config);
        let mut tokens: Vec<ThinkingToken> = chunks.iter().flat_map(|c| processor.push(c)).collect();
        tokens.extend(processor.finish());
        tokens
    }

    /// Adjacent content fragments merged, so chunkings can be compared
    fn merged(tokens: Vec<ThinkingToken>) -> Vec<ThinkingToken> {
        let mut out: Vec<ThinkingToken> = Vec::new();
        for token in tokens {
            match out.last_mut() {
                Some(last) if last.kind == TokenKind::Content && token.kind == TokenKind::Content => {
                    last.text.push_str(&token.text);
                }
                _ => out.push(token),
            }
        }
        out
    }

    #[test]
    fn marker_split_across_chunks() {
        let tokens = run(&think(), &["<think>step ", "one</think>answer"]);
        assert_eq!(
            tokens,
            vec![
                ThinkingToken::reasoning("step one", Some("step one".to_owned())),
                ThinkingToken::content("answer"),
            ]
        );
    }

    #[test]
    fn chunking_does_not_change_output() {
        let inputs = [
            "<think>step one</think>answer",
            "intro <think>first\nsecond</think>\n\nmiddle <think>again</think> end",
            "no reasoning here at all",
            "<think>unclosed reasoning",
            "émoji ✓ <think>ünïcode</think>  done ✓",
            "a < b and <thin but not a tag",
        ];

        for input in inputs {
            let whole = merged(run(&think(), &[input]));

            let boundaries: Vec<usize> = (1..input.len()).filter(|&i| input.is_char_boundary(i)).collect();
            for &split in &boundaries {
                let parts = [&input[..split], &input[split..]];
                assert_eq!(merged(run(&think(), &parts)), whole, "split at {split} of {input:?}");
            }

            let singles: Vec<&str> = input
                .char_indices()
                .map(|(i, c)| &input[i..i + c.len_utf8()])
                .collect();
            assert_eq!(merged(run(&think(), &singles)), whole, "char by char {input:?}");
        }
    }

    #[test]
    fn unclosed_marker_flushes_as_content() {
        let mut processor = ThinkingProcessor::new(&think());
        assert!(processor.push("<think>never ").is_empty());
        assert!(processor.push("closed").is_empty());

        assert_eq!(processor.finish(), vec![ThinkingToken::content("<think>never closed")]);
        assert!(processor.finish().is_empty());
    }

    #[test]
    fn partial_marker_is_withheld() {
        let mut processor = ThinkingProcessor::new(&think());
        assert_eq!(processor.push("Hello <thi"), vec![ThinkingToken::content("Hello ")]);
        assert_eq!(processor.push("s is fine"), vec![ThinkingToken::content("<this is fine")]);
    }

    #[test]
    fn multiple_spans_and_whitespace_after_reasoning() {
        let tokens = run(&think(), &["<think>a</think>\n\nfirst <think>b</think> second"]);
        assert_eq!(
            tokens,
            vec![
                ThinkingToken::reasoning("a", Some("a".to_owned())),
                ThinkingToken::content("first "),
                ThinkingToken::reasoning("b", Some("b".to_owned())),
                ThinkingToken::content("second"),
            ]
        );
    }

    #[test]
    fn earliest_of_several_patterns_wins() {
        let config = pattern_config(&["<think>(.*?)</think>", r"\[THINKING\](.*?)\[/THINKING\]"]);
        let tokens = run(&config, &["[THINKING]x[/THINKING]y<think>z</think>"]);
        let kinds: Vec<_> = tokens.iter().map(|t| (t.kind, t.text.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (TokenKind::Reasoning, "x"),
                (TokenKind::Content, "y"),
                (TokenKind::Reasoning, "z"),
            ]
        );
    }

    #[test]
    fn pass_through_never_buffers() {
        let config = ReasoningConfig::default();
        let mut processor = ThinkingProcessor::new(&config);
        assert_eq!(processor.push("<think>"), vec![ThinkingToken::content("<think>")]);
        assert!(processor.finish().is_empty());
    }

    #[test]
    fn native_fragments_keep_their_tags() {
        let config = ReasoningConfig {
            kind: ReasoningKind::Native,
            ..ReasoningConfig::default()
        };
        let mut processor = ThinkingProcessor::new(&config);

        let first = processor.push_reasoning("**Checking the ");
        let second = processor.push_reasoning("units**\nmore");
        let answer = processor.push("\n\n42");

        assert_eq!(first[0].subject.as_deref(), Some("Checking the"));
        assert_eq!(second[0].subject.as_deref(), Some("Checking the units"));
        assert_eq!(answer, vec![ThinkingToken::content("42")]);
    }

    #[test]
    fn split_complete_for_non_streaming() {
        let processor = ThinkingProcessor::new(&think());
        let split = processor.split_complete("<think>plan</think>\nresult");
        assert_eq!(split.reasoning.as_deref(), Some("plan"));
        assert_eq!(split.content, "result");
    }

    #[test]
    fn derives_literal_openings() {
        let literal = |p: &str| opening_of(p).literal;
        assert_eq!(literal("(?s)<think>(.*?)</think>"), "<think>");
        assert_eq!(literal(r"\[THINKING\](.*?)\[/THINKING\]"), "[THINKING]");
        assert_eq!(literal(r"<reasoning>\s*(.*?)</reasoning>"), "<reasoning>");
        assert_eq!(literal("^<r>(.*)"), "<r>");
        assert_eq!(literal("ab?c"), "a");
        assert_eq!(literal("ab+c"), "ab");
        assert_eq!(literal("(.*?)</think>"), "");

        let folded = opening_of("(?i)<Think>(.*?)</think>");
        assert_eq!(folded.literal, "<think>");
        assert!(folded.ignore_case);
        assert!(!opening_of("(?s-i)<think>(.*?)</think>").ignore_case);

        let spaced = opening_of(r"^\s*<think>(.*?)</think>");
        assert_eq!(spaced.literal, "<think>");
        assert!(spaced.leading_space);
    }

    #[test]
    fn case_insensitive_marker_is_withheld() {
        let config = pattern_config(&["(?i)<think>(.*?)</think>"]);
        let mut processor = ThinkingProcessor::new(&config);

        assert_eq!(processor.push("Hello <THI"), vec![ThinkingToken::content("Hello ")]);
        assert_eq!(
            processor.push("NK>plan</Think>"),
            vec![ThinkingToken::reasoning("plan", Some("plan".to_owned()))]
        );
        assert_eq!(processor.push("done"), vec![ThinkingToken::content("done")]);
        assert_eq!(processor.finish(), Vec::new());

        let whole = merged(run(&config, &["intro <THINK>a</think> end"]));
        let split = merged(run(&config, &["intro <TH", "INK>a</th", "ink> end"]));
        assert_eq!(split, whole);
    }

    #[test]
    fn leading_whitespace_pattern_keeps_chunking_stable() {
        let config = pattern_config(&[r"\s*<think>(.*?)</think>"]);
        let input = "Hello \n <think>plan</think>answer";

        let whole = merged(run(&config, &[input]));
        assert_eq!(
            whole,
            vec![
                ThinkingToken::content("Hello"),
                ThinkingToken::reasoning("plan", Some("plan".to_owned())),
                ThinkingToken::content("answer"),
            ]
        );
        for split in (1..input.len()).filter(|&i| input.is_char_boundary(i)) {
            let parts = [&input[..split], &input[split..]];
            assert_eq!(merged(run(&config, &parts)), whole, "split at {split}");
        }
    }

    #[test]
    fn tagged_reasoning_releases_withheld_content_first() {
        let mut processor = ThinkingProcessor::new(&think());
        let mut tokens = processor.push("Hi <");
        tokens.extend(processor.push_reasoning("native thought"));
        tokens.extend(processor.push("b"));
        tokens.extend(processor.finish());

        assert_eq!(
            tokens,
            vec![
                ThinkingToken::content("Hi "),
                ThinkingToken::content("<"),
                ThinkingToken::reasoning("native thought", Some("native thought".to_owned())),
                ThinkingToken::content("b"),
            ]
        );
    }

    #[test]
    fn subject_lines() {
        assert_eq!(subject_line("\n\n## Planning the reply\nbody").as_deref(), Some("Planning the reply"));
        assert_eq!(subject_line("   \n"), None);

        let long = "x".repeat(80);
        let subject = subject_line(&long).unwrap();
        assert_eq!(subject.chars().count(), 53);
        assert!(subject.ends_with("..."));
    }
}
