//! Text normalizer
//!
//! Canonicalizes raw text before pattern matching: lowercases, folds Latin
//! diacritics, substitutes common leetspeak, and collapses whitespace.
//! Folding is shape-preserving: digits fold only next to letters so phone
//! numbers survive, and `@` folds only at token edges so emails survive.

/// Canonicalize text for pattern matching.
///
/// The result is lowercase, diacritic-free, leet-folded, and has runs of
/// whitespace collapsed to single spaces. Idempotent.
pub fn normalize(text: &str) -> String {
    let mut chars: Vec<char> = Vec::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars().flat_map(char::to_lowercase) {
        let folded = fold_plain(ch);
        if folded.is_whitespace() {
            pending_space = !chars.is_empty();
            continue;
        }
        if pending_space {
            chars.push(' ');
            pending_space = false;
        }
        chars.push(folded);
    }

    // Leet folding changes a character's class (digit -> letter), which can
    // expose further folds on its neighbors; iterate to the fixpoint. Each
    // pass strictly shrinks the set of foldable characters, so this
    // terminates.
    while fold_leet_pass(&mut chars) {}

    chars.into_iter().collect()
}

/// Context-free folds: diacritics and `$`.
fn fold_plain(ch: char) -> char {
    match ch {
        'á' | 'à' | 'ä' | 'â' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        '$' => 's',
        _ => ch,
    }
}

/// One context-sensitive leet pass. Returns whether anything changed.
fn fold_leet_pass(chars: &mut [char]) -> bool {
    let mut changed = false;

    for i in 0..chars.len() {
        let prev = i.checked_sub(1).and_then(|p| chars.get(p)).copied();
        let next = chars.get(i + 1).copied();

        let replacement = match chars[i] {
            // Token-edge @ is leet; an interior @ is an email.
            '@' => {
                let interior = prev.is_some_and(|c| c.is_alphanumeric())
                    && next.is_some_and(|c| c.is_alphanumeric());
                (!interior).then_some('a')
            }
            // A digit folds only between letters; digit runs are phone shapes.
            ch @ ('0' | '1' | '3' | '4' | '5' | '7') => {
                let near_letter = prev.is_some_and(|c| c.is_alphabetic())
                    || next.is_some_and(|c| c.is_alphabetic());
                let near_digit = prev.is_some_and(|c| c.is_ascii_digit())
                    || next.is_some_and(|c| c.is_ascii_digit());
                (near_letter && !near_digit).then(|| match ch {
                    '0' => 'o',
                    '1' => 'i',
                    '3' => 'e',
                    '4' => 'a',
                    '5' => 's',
                    _ => 't',
                })
            }
            _ => None,
        };

        if let Some(replacement) = replacement {
            chars[i] = replacement;
            changed = true;
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lowercases_and_folds_diacritics() {
        assert_eq!(normalize("MÁTALO"), "matalo");
        assert_eq!(normalize("niño"), "nino");
    }

    #[test]
    fn folds_leetspeak_inside_words() {
        assert_eq!(normalize("pu7a"), "puta");
        assert_eq!(normalize("1diota"), "idiota");
        assert_eq!(normalize("m4t4r"), "matar");
    }

    #[test]
    fn preserves_phone_shapes() {
        assert_eq!(normalize("call 555-123-4567"), "call 555-123-4567");
        assert_eq!(normalize("612 345 678"), "612 345 678");
    }

    #[test]
    fn preserves_email_shapes() {
        assert_eq!(normalize("juan@example.com"), "juan@example.com");
    }

    #[test]
    fn folds_token_edge_at_sign() {
        assert_eq!(normalize("put@"), "puta");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize("  te   voy\ta  matar \n"), "te voy a matar");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "\\PC{0,80}") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once.clone());
        }

        #[test]
        fn output_has_no_double_spaces(s in "\\PC{0,80}") {
            let out = normalize(&s);
            prop_assert!(!out.contains("  "));
            prop_assert!(!out.starts_with(' '));
            prop_assert!(!out.ends_with(' '));
        }
    }
}
