use crate::error::StartupError;
use std::path::{Path, PathBuf};

/// Character used to mask banned words
pub const MASK: char = '*';

/// Immutable, ordered list of banned words, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct BannedWords {
    words: Vec<String>,
    source: Option<PathBuf>,
}

impl BannedWords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
            source: None,
        }
    }

    /// Reads a line-delimited banned-word file. Blank lines are skipped.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StartupError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| StartupError::BannedWords {
            path: path.to_path_buf(),
            source,
        })?;

        let mut list = Self::parse(&data);
        list.source = Some(path.to_path_buf());
        Ok(list)
    }

    pub fn parse(data: &str) -> Self {
        Self::new(data.lines().map(str::trim).filter(|l| !l.is_empty()))
    }

    /// File name the list was loaded from, if any
    pub fn source_name(&self) -> Option<String> {
        self.source
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn censor(&self, text: &str) -> String {
        censor(text, &self.words)
    }

    /// Logs the source file and every banned word.
    pub fn log_words(&self) {
        tracing::info!(
            file = self.source_name().as_deref().unwrap_or("<inline>"),
            count = self.words.len(),
            "banned words loaded"
        );
        for word in &self.words {
            tracing::info!(%word, "banned word");
        }
    }
}

/// Replaces every case-insensitive occurrence of each banned word with an
/// equal-length run of `*`. The output always has as many chars as the input.
///
/// Words are applied in list order. For each word the text is scanned left to
/// right, and each search resumes at the end of the previous match, so spans
/// of one word never overlap.
pub fn censor<S: AsRef<str>>(text: &str, banned: &[S]) -> String {
    if banned.is_empty() || text.is_empty() {
        return text.to_string();
    }

    let mut chars: Vec<char> = text.chars().collect();
    let needles: Vec<Vec<char>> = banned
        .iter()
        .map(|w| w.as_ref().chars().collect::<Vec<_>>())
        .filter(|n| !n.is_empty())
        .collect();

    // A word containing the mask itself can start matching text that an
    // earlier pass starred, so keep going until nothing changes.
    let self_matching = needles.iter().any(|n| n.contains(&MASK));
    loop {
        let changed = censor_pass(&mut chars, &needles);
        if !changed || !self_matching {
            break;
        }
    }

    chars.into_iter().collect()
}

fn censor_pass(chars: &mut [char], needles: &[Vec<char>]) -> bool {
    let mut changed = false;
    for needle in needles {
        for start in find_spans(chars, needle) {
            let span = &mut chars[start..start + needle.len()];
            if span.iter().any(|&c| c != MASK) {
                span.fill(MASK);
                changed = true;
            }
        }
    }
    changed
}

/// Start indices of all non-overlapping matches of `needle` in `hay`.
fn find_spans(hay: &[char], needle: &[char]) -> Vec<usize> {
    let mut spans = Vec::new();
    if needle.len() > hay.len() {
        return spans;
    }

    let last = hay.len() - needle.len();
    let mut origin = 0;
    while origin <= last {
        match (origin..=last).find(|&i| matches_at(hay, i, needle)) {
            Some(start) => {
                spans.push(start);
                origin = start + needle.len();
            }
            None => break,
        }
    }
    spans
}

#[inline]
fn matches_at(hay: &[char], at: usize, needle: &[char]) -> bool {
    hay[at..at + needle.len()]
        .iter()
        .zip(needle)
        .all(|(&a, &b)| eq_ignore_case(a, b))
}

#[inline]
fn eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn masks_example_sentence() {
        let w = words(&["curse", "bad"]);
        assert_eq!(censor("this is a curse word", &w), "this is a ***** word");
    }

    #[test]
    fn case_insensitive() {
        let w = words(&["bad"]);
        assert_eq!(censor("BAD", &w), "***");
        assert_eq!(censor("bad", &w), "***");
        assert_eq!(censor("bAd", &words(&["BaD"])), "***");
    }

    #[test]
    fn substring_not_word_boundary() {
        let w = words(&["class"]);
        assert_eq!(censor("a classic move", &w), "a *****ic move");
    }

    #[test]
    fn match_at_start_of_text() {
        let w = words(&["bad"]);
        assert_eq!(censor("bad day", &w), "*** day");
    }

    #[test]
    fn repeated_and_adjacent_matches() {
        let w = words(&["ab"]);
        assert_eq!(censor("ababxab", &w), "****x**");
        let w = words(&["aa"]);
        // non-overlapping: search resumes after each match
        assert_eq!(censor("aaa", &w), "**a");
    }

    #[test]
    fn overlapping_words_apply_in_order() {
        let w = words(&["abc", "cde"]);
        // "abc" masks first, leaving "de" which no longer matches "cde"
        assert_eq!(censor("abcde", &w), "***de");
        let w = words(&["cde", "abc"]);
        assert_eq!(censor("abcde", &w), "ab***");
    }

    #[test]
    fn empty_list_is_noop() {
        let w: Vec<String> = Vec::new();
        assert_eq!(censor("anything goes", &w), "anything goes");
    }

    #[test]
    fn empty_banned_word_is_skipped() {
        let w = words(&["", "x"]);
        assert_eq!(censor("xyz", &w), "*yz");
    }

    #[test]
    fn preserves_length_and_is_idempotent() {
        let w = words(&["curse", "bad", "ur", "Ünï"]);
        for s in ["", "curse", "BADcurse bad", "aÜNÏb", "no match here", "***", "cuRSE baD ur"] {
            let once = censor(s, &w);
            assert_eq!(once.chars().count(), s.chars().count(), "length for {s:?}");
            assert_eq!(censor(&once, &w), once, "idempotence for {s:?}");
        }
    }

    #[test]
    fn idempotent_with_mask_in_word() {
        let w = words(&["a*", "b"]);
        let once = censor("ab", &w);
        assert_eq!(once, "**");
        assert_eq!(censor(&once, &w), once);
    }

    #[test]
    fn parse_skips_blank_lines_and_cr() {
        let list = BannedWords::parse("curse\r\n\r\n  bad  \n");
        assert_eq!(list.words(), &["curse".to_string(), "bad".to_string()]);
        assert_eq!(list.censor("Bad"), "***");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = BannedWords::load("/definitely/not/here/badwords.txt").unwrap_err();
        assert!(matches!(err, StartupError::BannedWords { .. }));
    }

    #[test]
    fn load_reads_file() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "curse").unwrap();
        writeln!(f, "bad").unwrap();

        let list = BannedWords::load(f.path()).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.source_name().is_some());
    }
}
