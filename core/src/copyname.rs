//! Names for duplicated folders and nodes: `copy_<n>_<base>`.

/// Next free copy name for `original` among sibling `existing` names.
///
/// A name that is already a copy contributes its base, so copying
/// `copy_1_api` yields `copy_2_api` rather than `copy_1_copy_1_api`.
pub fn next_copy_name<S: AsRef<str>>(existing: &[S], original: &str) -> String {
    let base = match split_copy(original) {
        Some(b) if !b.is_empty() => b,
        _ => original,
    };
    // copy numbers stay decimal strings so no digit run can overflow
    let highest = existing
        .iter()
        .filter_map(|name| copy_number(name.as_ref(), base))
        .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        .unwrap_or("0");
    let mut n = increment(highest);
    loop {
        let candidate = format!("copy_{}_{}", n, base);
        if !existing.iter().any(|e| e.as_ref() == candidate) {
            return candidate;
        }
        n = increment(&n);
    }
}

/// `digits + 1` for a canonical decimal string.
fn increment(digits: &str) -> String {
    let mut out: Vec<u8> = digits.bytes().collect();
    for d in out.iter_mut().rev() {
        if *d == b'9' {
            *d = b'0';
        } else {
            *d += 1;
            return String::from_utf8_lossy(&out).into_owned();
        }
    }
    out.insert(0, b'1');
    String::from_utf8_lossy(&out).into_owned()
}

/// Leading `copy_<digits>` run, split at the first non-digit.
fn copy_digits(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix("copy_")?;
    let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 {
        return None;
    }
    Some(rest.split_at(digits_end))
}

/// `copy_<digits>_<underscores><rest>` → rest with the separator run removed.
fn split_copy(name: &str) -> Option<&str> {
    let (_, after) = copy_digits(name)?;
    if !after.starts_with('_') {
        return None;
    }
    Some(after.trim_start_matches('_'))
}

/// Copy number of `name` when it is a copy of exactly `base`, without leading zeros.
fn copy_number<'a>(name: &'a str, base: &str) -> Option<&'a str> {
    let (digits, sep_and_base) = copy_digits(name)?;
    let sep = sep_and_base.strip_suffix(base)?;
    if sep.is_empty() || !sep.chars().all(|c| c == '_') {
        return None;
    }
    let trimmed = digits.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_copy() {
        let names = ["api"];
        assert_eq!(next_copy_name(&names, "api"), "copy_1_api");
    }

    #[test]
    fn copies_of_copies_share_a_base() {
        let names = ["api", "copy_1_api", "copy_4_api"];
        assert_eq!(next_copy_name(&names, "copy_1_api"), "copy_5_api");
        assert_eq!(next_copy_name(&names, "api"), "copy_5_api");
    }

    #[test]
    fn other_bases_do_not_count() {
        let names = ["a.b", "copy_2_a.b", "copy_7_aXb", "copy_9_xa.b"];
        assert_eq!(next_copy_name(&names, "a.b"), "copy_3_a.b");
    }

    #[test]
    fn degenerate_copy_prefix_is_its_own_base() {
        let names: [&str; 0] = [];
        assert_eq!(next_copy_name(&names, "copy_1_"), "copy_1_copy_1_");
        assert_eq!(next_copy_name(&names, "copy_x"), "copy_1_copy_x");
    }

    #[test]
    fn huge_copy_numbers_keep_counting() {
        let names = ["x", "copy_18446744073709551615_x", "copy_99999999999999999999999_x"];
        assert_eq!(next_copy_name(&names, "x"), "copy_100000000000000000000000_x");
        let names = ["x", "copy_18446744073709551615_x"];
        assert_eq!(next_copy_name(&names, "copy_18446744073709551615_x"), "copy_18446744073709551616_x");
    }

    #[test]
    fn leading_zeros_compare_by_value() {
        let names = ["api", "copy_009_api", "copy_10_api"];
        assert_eq!(next_copy_name(&names, "api"), "copy_11_api");
        assert_eq!(increment("199"), "200");
        assert_eq!(increment("0"), "1");
    }
}
