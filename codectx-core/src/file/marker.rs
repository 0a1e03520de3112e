use anyhow::Result;
use regex::Regex;

use crate::file::context::AccessMode;

/// Inline comment conventions that promote a file into context and signal a
/// downstream agent action:
///
/// - `AI:`  task - file becomes Mutable, an edit is requested
/// - `AI!`  urgent task - Mutable, interrupts before everything else
/// - `AI@`  reference - file becomes Reference context only
/// - `AI?`  question - Reference, answer requested, no edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum MarkerKind {
    Task,
    Urgent,
    Reference,
    Question,
}

impl MarkerKind {
    fn from_sigil(sigil: &str) -> Option<Self> {
        match sigil {
            ":" => Some(Self::Task),
            "!" => Some(Self::Urgent),
            "@" => Some(Self::Reference),
            "?" => Some(Self::Question),
            _ => None,
        }
    }

    pub fn access_mode(self) -> AccessMode {
        match self {
            Self::Task | Self::Urgent => AccessMode::Mutable,
            Self::Reference | Self::Question => AccessMode::Reference,
        }
    }

    /// Which marker interrupts the foreground prompt first when one event
    /// batch carries several. Lower wins; Reference never interrupts.
    pub fn interrupt_priority(self) -> Option<u8> {
        match self {
            Self::Urgent => Some(0),
            Self::Question => Some(1),
            Self::Task => Some(2),
            Self::Reference => None,
        }
    }
}

/// One detected marker occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    /// 1-based line number.
    pub line: usize,
    /// Instruction text following the marker, trimmed.
    pub text: String,
}

/// Scans file content for marker comments in the three comment families:
/// `// AI: ...`, `# AI: ...` and `<!-- AI: ... -->`. Case-insensitive.
pub struct MarkerScanner {
    patterns: Vec<Regex>,
}

impl MarkerScanner {
    pub fn new() -> Result<Self> {
        let patterns = vec![
            // JavaScript, Rust, C++, ...
            Regex::new(r"(?i)//.*?AI([:@!?])\s*(.*)$")?,
            // Python, shell, TOML, ...
            Regex::new(r"(?i)#.*?AI([:@!?])\s*(.*)$")?,
            // HTML, XML, Markdown
            Regex::new(r"(?i)<!--.*?AI([:@!?])\s*(.*?)\s*-->")?,
        ];
        Ok(Self { patterns })
    }

    pub fn scan(&self, content: &str) -> Vec<Marker> {
        let mut markers = Vec::new();

        for (index, line) in content.lines().enumerate() {
            // Collect every match on the line, in positional order, so two
            // markers on one line both surface.
            let mut hits: Vec<(usize, Marker)> = Vec::new();
            for pattern in &self.patterns {
                for caps in pattern.captures_iter(line) {
                    let Some(kind) = caps.get(1).and_then(|m| MarkerKind::from_sigil(m.as_str()))
                    else {
                        continue;
                    };
                    let text = caps
                        .get(2)
                        .map(|m| m.as_str().trim().to_string())
                        .unwrap_or_default();
                    let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
                    hits.push((
                        start,
                        Marker {
                            kind,
                            line: index + 1,
                            text,
                        },
                    ));
                }
            }
            hits.sort_by_key(|(start, _)| *start);
            markers.extend(hits.into_iter().map(|(_, m)| m));
        }

        markers
    }
}

/// Null-byte heuristic over the head of the file. Marker scanning skips
/// binary content rather than decoding garbage.
pub fn is_probably_binary(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(8192)];
    head.contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("// AI: add error handling", MarkerKind::Task, "add error handling")]
    #[case("# AI! fix this now", MarkerKind::Urgent, "fix this now")]
    #[case("// AI@ keep for reference", MarkerKind::Reference, "keep for reference")]
    #[case("# AI? what does this do", MarkerKind::Question, "what does this do")]
    #[case("<!-- AI: translate this page -->", MarkerKind::Task, "translate this page")]
    fn detects_each_marker_form(
        #[case] line: &str,
        #[case] kind: MarkerKind,
        #[case] text: &str,
    ) {
        let scanner = MarkerScanner::new().unwrap();
        let markers = scanner.scan(line);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].kind, kind);
        assert_eq!(markers[0].text, text);
        assert_eq!(markers[0].line, 1);
    }

    #[test]
    fn case_insensitive_and_mid_comment() {
        let scanner = MarkerScanner::new().unwrap();
        let markers = scanner.scan("let x = 1; // TODO ai: rename x");
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].kind, MarkerKind::Task);
    }

    #[test]
    fn plain_code_has_no_markers() {
        let scanner = MarkerScanner::new().unwrap();
        let content = "fn main() {\n    // regular comment\n    let ai = 2; // uses ai var\n}\n";
        assert!(scanner.scan(content).is_empty());
    }

    #[test]
    fn line_numbers_are_one_based() {
        let scanner = MarkerScanner::new().unwrap();
        let content = "line one\nline two\n# AI? third line\n";
        let markers = scanner.scan(content);
        assert_eq!(markers[0].line, 3);
    }

    #[test]
    fn urgent_interrupts_before_question_before_task() {
        let mut kinds = vec![MarkerKind::Task, MarkerKind::Question, MarkerKind::Urgent];
        kinds.sort_by_key(|k| k.interrupt_priority());
        assert_eq!(
            kinds,
            vec![MarkerKind::Urgent, MarkerKind::Question, MarkerKind::Task]
        );
        assert_eq!(MarkerKind::Reference.interrupt_priority(), None);
    }

    #[test]
    fn binary_detection() {
        assert!(is_probably_binary(b"ELF\x00\x01\x02"));
        assert!(!is_probably_binary(b"fn main() {}\n"));
    }
}
