//! Glob-style string matching, as used by `find` and `info` queries.

/// Matches `text` against a glob `pattern`.
///
/// Supports `*` (any run of characters), `?` (any single character), `[...]` character sets with
/// `a-z` ranges, and `\` to escape the next character.
pub fn string_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Backtracking point for the most recent `*`.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        let advanced = match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                true
            }
            Some('[') => match match_set(&pattern[p + 1..], text[t]) {
                Some((matched, consumed)) if matched => {
                    p += 1 + consumed;
                    true
                }
                _ => false,
            },
            Some('\\') if p + 1 < pattern.len() => {
                if pattern[p + 1] == text[t] {
                    p += 2;
                    true
                } else {
                    false
                }
            }
            Some(&c) => {
                if c == text[t] {
                    p += 1;
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if advanced {
            t += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Matches a single character against a `[...]` set. `set` starts right after the opening
/// bracket. Returns whether the character matched and how many pattern characters the set
/// occupies, including the closing bracket.
fn match_set(set: &[char], c: char) -> Option<(bool, usize)> {
    let mut i = 0;
    let mut matched = false;
    while i < set.len() {
        if set[i] == ']' {
            return Some((matched, i + 1));
        }
        if i + 2 < set.len() && set[i + 1] == '-' && set[i + 2] != ']' {
            let (lo, hi) =
                if set[i] <= set[i + 2] { (set[i], set[i + 2]) } else { (set[i + 2], set[i]) };
            matched |= (lo..=hi).contains(&c);
            i += 3;
        } else {
            matched |= set[i] == c;
            i += 1;
        }
    }
    None
}
