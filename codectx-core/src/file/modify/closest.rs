//! "Did you mean" feedback for failed searches.
//!
//! Models frequently get spacing or small details wrong in search blocks.
//! When the exact and whitespace-normalized passes both fail, we locate the
//! most similar region of the file and describe it, instead of echoing the
//! incorrect search text back at the model. The feedback is advisory only -
//! no fuzzy edit is ever applied from it.

/// The closest region found for a failed search.
#[derive(Debug, Clone)]
pub struct ClosestMatch {
    pub lines: Vec<String>,
    /// 0-based index of the first matched line.
    pub start_line: usize,
    /// 0.0 = nothing in common, 1.0 = identical.
    pub similarity: f64,
}

impl ClosestMatch {
    /// Correction feedback for an imperfect match; None when the match is
    /// perfect (the caller should not have gotten here).
    pub fn correction_feedback(&self) -> Option<String> {
        if self.similarity >= 1.0 {
            return None;
        }

        let mut feedback = format!(
            "Found closest match with {:.1}% similarity at line {}\n\nClosest match:\n",
            self.similarity * 100.0,
            self.start_line + 1
        );
        for line in &self.lines {
            feedback.push_str(line);
            feedback.push('\n');
        }
        Some(feedback)
    }
}

/// Slide a window of `search`'s height through `source` and keep the most
/// similar region, scored by average per-line edit distance.
pub fn closest_match(source: &str, search: &str) -> Option<ClosestMatch> {
    let source: Vec<&str> = source.lines().collect();
    let search: Vec<&str> = search.lines().collect();
    if search.is_empty() || source.is_empty() || search.len() > source.len() {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for start in 0..=source.len() - search.len() {
        let window = &source[start..start + search.len()];
        let similarity = window_similarity(window, &search);
        if best.is_none_or(|(_, b)| similarity > b) {
            best = Some((start, similarity));
        }
    }

    best.map(|(start_line, similarity)| ClosestMatch {
        lines: source[start_line..start_line + search.len()]
            .iter()
            .map(|l| l.to_string())
            .collect(),
        start_line,
        similarity,
    })
}

fn window_similarity(window: &[&str], search: &[&str]) -> f64 {
    let total: f64 = window
        .iter()
        .zip(search.iter())
        .map(|(w, s)| line_similarity(w, s))
        .sum();
    total / search.len() as f64
}

fn line_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_region_scores_perfect() {
        let source = "line 1\nline 2\nline 3";
        let result = closest_match(source, "line 2").unwrap();
        assert_eq!(result.start_line, 1);
        assert_eq!(result.similarity, 1.0);
        assert!(result.correction_feedback().is_none());
    }

    #[test]
    fn near_miss_produces_feedback() {
        let source = "if ft.is_dir() {\n    return true;\n}";
        // Missing semicolon.
        let result = closest_match(source, "if ft.is_dir() {\n    return true").unwrap();
        assert_eq!(result.start_line, 0);
        assert!(result.similarity > 0.9);

        let feedback = result.correction_feedback().unwrap();
        assert!(feedback.contains("return true;"));
        assert!(feedback.contains("line 1"));
    }

    #[test]
    fn search_taller_than_source_is_none() {
        assert!(closest_match("one line", "a\nb\nc").is_none());
        assert!(closest_match("", "a").is_none());
    }

    #[test]
    fn picks_best_of_multiple_candidates() {
        let source = "fn alpha() {}\nfn beta() {}\nfn gamma() {}";
        let result = closest_match(source, "fn betta() {}").unwrap();
        assert_eq!(result.start_line, 1);
        assert_eq!(result.lines, vec!["fn beta() {}".to_string()]);
    }
}
