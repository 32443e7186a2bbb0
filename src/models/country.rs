use isocountry::CountryCode;

// Kosovo's user-assigned code, which the ISO registry itself leaves out.
const EXTRA_ALPHA2: &[&str] = &["XK"];

/// `code` must already be upper-cased.
pub fn is_iso_alpha2(code: &str) -> bool {
    if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
        return false;
    }

    CountryCode::for_alpha2(code).is_ok() || EXTRA_ALPHA2.contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("US", true)]
    #[case("DE", true)]
    #[case("ZW", true)]
    #[case("AD", true)]
    #[case("SS", true)]
    #[case("XK", true)]
    #[case("ZZ", false)]
    #[case("us", false)]
    #[case("USA", false)]
    #[case("", false)]
    fn recognizes_codes(#[case] code: &str, #[case] expected: bool) {
        assert_eq!(is_iso_alpha2(code), expected);
    }
}
