//! ABOUTME: URL slug generation for news articles and other public pages
//! ABOUTME: Transliterates Cyrillic titles and resolves collisions with numeric suffixes

const MAX_SLUG_LEN: usize = 120;

/// Latin spelling for a lowercase Cyrillic letter (Russian plus Kazakh extensions)
fn transliterate(ch: char) -> Option<&'static str> {
    let latin = match ch {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'ё' | 'э' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' | 'і' => "i",
        'й' | 'ы' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' | 'һ' => "h",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "sch",
        'ъ' | 'ь' => "",
        'ю' => "yu",
        'я' => "ya",
        'ә' => "a",
        'ғ' => "gh",
        'қ' => "q",
        'ң' => "ng",
        'ө' => "o",
        'ұ' | 'ү' => "u",
        _ => return None,
    };
    Some(latin)
}

/// Build a lowercase ASCII slug from arbitrary text
///
/// ```
/// use sb_core::slugify;
/// assert_eq!(slugify("Стартап года 2024!"), "startap-goda-2024");
/// assert_eq!(slugify("  Hello,   World -- again "), "hello-world-again");
/// ```
pub fn slugify(input: &str) -> String {
    let mut ascii = String::with_capacity(input.len());
    for ch in input.chars().flat_map(char::to_lowercase) {
        if let Some(latin) = transliterate(ch) {
            ascii.push_str(latin);
        } else if ch.is_ascii_alphanumeric() || ch == '-' {
            ascii.push(ch);
        } else if ch.is_whitespace() {
            ascii.push(' ');
        }
        // anything else is dropped
    }

    let mut slug = String::with_capacity(ascii.len());
    let mut last_was_dash = false;
    for ch in ascii.chars() {
        if ch == ' ' || ch == '-' {
            if !slug.is_empty() && !last_was_dash {
                slug.push('-');
                last_was_dash = true;
            }
        } else {
            slug.push(ch);
            last_was_dash = false;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    slug
}

/// First of `base`, `base-1`, `base-2`, ... that `exists` reports as free
pub fn unique_slug<F>(base: &str, mut exists: F) -> String
where
    F: FnMut(&str) -> bool,
{
    if !exists(base) {
        return base.to_string();
    }

    let mut counter = 1usize;
    loop {
        let candidate = format!("{base}-{counter}");
        if !exists(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn transliterates_russian() {
        assert_eq!(slugify("Привет мир"), "privet-mir");
        assert_eq!(slugify("Щука и ёж"), "schuka-i-ezh");
        assert_eq!(slugify("Объявление"), "obyavlenie");
    }

    #[test]
    fn transliterates_kazakh_letters() {
        assert_eq!(slugify("Қазақстан"), "qazaqstan");
        assert_eq!(slugify("Өңір"), "ongir");
    }

    #[test]
    fn strips_punctuation_and_collapses_dashes() {
        assert_eq!(slugify("Series A: $5M raised!!"), "series-a-5m-raised");
        assert_eq!(slugify("a -- b"), "a-b");
        assert_eq!(slugify("--leading and trailing--"), "leading-and-trailing");
    }

    #[test]
    fn empty_and_symbol_only_input() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!! ???"), "");
    }

    #[test]
    fn truncates_long_titles() {
        let slug = slugify(&"word ".repeat(60));
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn unique_slug_appends_counter() {
        let taken: HashSet<&str> = ["news", "news-1"].into_iter().collect();
        assert_eq!(unique_slug("news", |s| taken.contains(s)), "news-2");
        assert_eq!(unique_slug("other", |s| taken.contains(s)), "other");
    }
}
