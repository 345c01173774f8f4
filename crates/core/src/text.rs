//! Text normalization shared by lookup, manifest ids and lexical scoring.

/// Strip Latin diacritics from a string (`"coração"` → `"coracao"`).
///
/// Characters outside the Latin-1 / Latin Extended-A accented ranges pass
/// through untouched.
pub fn fold_diacritics(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

/// Lowercase + diacritic-free + single-spaced form used for pattern matching.
pub fn normalize(text: &str) -> String {
    let folded = fold_diacritics(&text.to_lowercase());
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lookup key for ids and module names: trimmed, folded, lowercased.
pub fn normalize_key(text: &str) -> String {
    fold_diacritics(text.trim()).to_lowercase()
}

fn fold_char(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => 'A',
        'ç' | 'ć' | 'č' => 'c',
        'Ç' | 'Ć' | 'Č' => 'C',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => 'e',
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ę' | 'Ě' => 'E',
        'ì' | 'í' | 'î' | 'ï' | 'ī' => 'i',
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' => 'I',
        'ñ' | 'ń' | 'ň' => 'n',
        'Ñ' | 'Ń' | 'Ň' => 'N',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => 'o',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' => 'O',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' => 'u',
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' => 'U',
        'ý' | 'ÿ' => 'y',
        'Ý' | 'Ÿ' => 'Y',
        'š' => 's',
        'Š' => 'S',
        'ž' => 'z',
        'Ž' => 'Z',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_portuguese_accents() {
        assert_eq!(fold_diacritics("coração ação é"), "coracao acao e");
    }

    #[test]
    fn normalize_lowercases_and_collapses_whitespace() {
        assert_eq!(normalize("  Não   SEI\tmais "), "nao sei mais");
    }

    #[test]
    fn normalize_key_keeps_punctuation() {
        assert_eq!(normalize_key(" Identidade_Mínima.txt "), "identidade_minima.txt");
    }
}
