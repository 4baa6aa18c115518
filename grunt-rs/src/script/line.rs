//! Program lines and line-level helpers.
//!
//! A program is newline-separated text.  `;` starts a comment that runs to
//! the end of the line.  After comment stripping, blank lines are dropped; the
//! remaining lines keep their 1-based source line number so errors can point
//! back into the program even from inside a loop body or macro expansion.

/// One comment-stripped, trimmed, non-empty program line.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    pub lineno: usize,
    pub text: String,
}

impl SourceLine {
    pub fn new(lineno: usize, text: impl Into<String>) -> Self {
        SourceLine {
            lineno,
            text: text.into(),
        }
    }

    /// The block keyword this line opens or closes, if any.
    pub fn keyword(&self) -> Option<Keyword> {
        Keyword::of(&self.text)
    }
}

/// Split program text into [`SourceLine`]s.
pub fn load_program(src: &str) -> Vec<SourceLine> {
    src.split('\n')
        .enumerate()
        .filter_map(|(i, raw)| {
            let text = strip_comment(raw).trim();
            if text.is_empty() {
                None
            } else {
                Some(SourceLine::new(i + 1, text))
            }
        })
        .collect()
}

/// Remove a trailing `;` comment.
pub fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(i) => &line[..i],
        None => line,
    }
}

// ── Keywords ──────────────────────────────────────────────────────────────────

/// Block-structure keywords.  Only recognised as the first word of a line,
/// with exact (case-sensitive) spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Macro,
    EndMacro,
    If,
    ElseIf,
    Else,
    EndIf,
    For,
    EndFor,
    While,
    EndWhile,
    Call,
}

impl Keyword {
    pub fn of(line: &str) -> Option<Keyword> {
        Some(match first_word(line) {
            "MACRO" => Keyword::Macro,
            "ENDMACRO" => Keyword::EndMacro,
            "IF" => Keyword::If,
            "ELSEIF" => Keyword::ElseIf,
            "ELSE" => Keyword::Else,
            "ENDIF" => Keyword::EndIf,
            "FOR" => Keyword::For,
            "ENDFOR" => Keyword::EndFor,
            "WHILE" => Keyword::While,
            "ENDWHILE" => Keyword::EndWhile,
            "CALL" => Keyword::Call,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Macro => "MACRO",
            Keyword::EndMacro => "ENDMACRO",
            Keyword::If => "IF",
            Keyword::ElseIf => "ELSEIF",
            Keyword::Else => "ELSE",
            Keyword::EndIf => "ENDIF",
            Keyword::For => "FOR",
            Keyword::EndFor => "ENDFOR",
            Keyword::While => "WHILE",
            Keyword::EndWhile => "ENDWHILE",
            Keyword::Call => "CALL",
        }
    }

    /// The terminator matching an opening keyword.
    pub fn terminator(self) -> Option<Keyword> {
        match self {
            Keyword::Macro => Some(Keyword::EndMacro),
            Keyword::If => Some(Keyword::EndIf),
            Keyword::For => Some(Keyword::EndFor),
            Keyword::While => Some(Keyword::EndWhile),
            _ => None,
        }
    }
}

// ── Small utilities ───────────────────────────────────────────────────────────

/// First whitespace-delimited word of `line` (empty if none).
pub fn first_word(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

/// Split `line` into its first word and the trimmed remainder.
pub fn split_first(line: &str) -> (&str, &str) {
    let line = line.trim_start();
    match line.find(char::is_whitespace) {
        Some(i) => (&line[..i], line[i..].trim()),
        None => (line, ""),
    }
}

/// Whitespace split that keeps `[...]` groups together, so `X[#a + 1]` stays
/// one word.  An unclosed `[` extends to the end of the line.
pub fn split_words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut cur = String::new();
    let mut depth = 0usize;

    for ch in s.chars() {
        match ch {
            '[' => {
                depth += 1;
                cur.push(ch);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                cur.push(ch);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !cur.is_empty() {
                    words.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        words.push(cur);
    }
    words
}

/// Text between the first `[` and the first `]` after it.
pub fn bracket_contents(s: &str) -> Option<&str> {
    let open = s.find('[')?;
    let close = s[open + 1..].find(']')? + open + 1;
    Some(&s[open + 1..close])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
