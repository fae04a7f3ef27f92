//! Canonical ordering of package version strings
//!
//! Versions in Nixpkgs are not reliably semver, so ordering uses its own
//! parser:
//!   - numeric dot-separated parts compare numerically (`1.9.0 < 1.10.0`)
//!   - a hyphenated suffix is a pre-release and sorts before the bare
//!     version (`3.14.0-rc1 < 3.14.0`)
//!   - a suffix glued to the numbers is not a pre-release and sorts after
//!     the bare version (`3.14.0 < 3.14.0rc99`)

use std::cmp::Ordering;

/// Where a version sits relative to its bare numeric release
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tier {
    PreRelease,
    Release,
    Trailing,
}

/// Parsed version key for comparison.
struct VersionKey<'a> {
    /// Numeric components, e.g. [1, 20, 2] for "1.20.2"
    nums: Vec<u64>,
    tier: Tier,
    /// Text after the numeric part, without the pre-release hyphen
    tail: &'a str,
}

fn parse_version_key(v: &str) -> VersionKey<'_> {
    let split = v
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(v.len());
    let (num_part, rest) = v.split_at(split);

    let nums = num_part
        .split('.')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().unwrap_or(u64::MAX))
        .collect::<Vec<u64>>();

    let (tier, tail) = if rest.is_empty() {
        (Tier::Release, rest)
    } else if let Some(pre) = rest.strip_prefix('-') {
        if nums.is_empty() {
            (Tier::Trailing, rest)
        } else {
            (Tier::PreRelease, pre)
        }
    } else {
        (Tier::Trailing, rest)
    };

    VersionKey { nums, tier, tail }
}

fn cmp_num_vecs(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let av = a.get(i).copied().unwrap_or(0);
        let bv = b.get(i).copied().unwrap_or(0);
        match av.cmp(&bv) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Natural comparison: digit runs compare as numbers, everything else as text.
/// "rc2" < "rc10", "beta" < "rc".
fn cmp_natural(a: &str, b: &str) -> Ordering {
    let mut ai = a.char_indices().peekable();
    let mut bi = b.char_indices().peekable();

    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((sa, ca)), Some((sb, cb))) => {
                if ca.is_ascii_digit() && cb.is_ascii_digit() {
                    let ea = run_end(a, sa, |c| c.is_ascii_digit());
                    let eb = run_end(b, sb, |c| c.is_ascii_digit());
                    let da = a[sa..ea].trim_start_matches('0');
                    let db = b[sb..eb].trim_start_matches('0');
                    // Longer digit run (after leading zeros) is the larger number
                    let ord = da.len().cmp(&db.len()).then_with(|| da.cmp(db));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    while ai.peek().is_some_and(|&(i, _)| i < ea) {
                        ai.next();
                    }
                    while bi.peek().is_some_and(|&(i, _)| i < eb) {
                        bi.next();
                    }
                } else {
                    match ca.cmp(&cb) {
                        Ordering::Equal => {
                            ai.next();
                            bi.next();
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}

fn run_end(s: &str, start: usize, pred: impl Fn(char) -> bool) -> usize {
    s[start..]
        .char_indices()
        .find(|&(_, c)| !pred(c))
        .map(|(i, _)| start + i)
        .unwrap_or(s.len())
}

/// Total order over version strings (ascending).
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let ka = parse_version_key(a);
    let kb = parse_version_key(b);

    // 1. Numeric parts
    cmp_num_vecs(&ka.nums, &kb.nums)
        // 2. pre-release < release < trailing suffix
        .then_with(|| ka.tier.cmp(&kb.tier))
        // 3. Same tier → compare suffixes naturally (rc1 < rc2)
        .then_with(|| cmp_natural(ka.tail, kb.tail))
        // 4. "1.0" vs "1.0.0": shorter first, then lexical
        .then_with(|| ka.nums.len().cmp(&kb.nums.len()))
        .then_with(|| a.cmp(b))
}

/// Sorts version strings in canonical ascending order.
pub fn sort_versions<S: AsRef<str>>(versions: &mut [S]) {
    versions.sort_by(|a, b| compare_versions(a.as_ref(), b.as_ref()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_suffix_ordering() {
        assert_eq!(cmp_natural("rc2", "rc10"), Ordering::Less);
        assert_eq!(cmp_natural("beta1", "rc1"), Ordering::Less);
        assert_eq!(cmp_natural("rc01", "rc1"), Ordering::Equal);
        assert_eq!(cmp_natural("", "a"), Ordering::Less);
    }

    #[test]
    fn test_hyphen_is_prerelease_only_after_numbers() {
        let k = parse_version_key("3.14.0-rc1");
        assert_eq!(k.tier, Tier::PreRelease);
        assert_eq!(k.tail, "rc1");

        let k = parse_version_key("unstable-2024-01-01");
        assert_eq!(k.tier, Tier::Trailing);
        assert!(k.nums.is_empty());
    }

    #[test]
    fn test_trailing_suffix_sorts_after_release() {
        assert_eq!(compare_versions("3.14.0", "3.14.0rc99"), Ordering::Less);
        assert_eq!(compare_versions("3.14.0-rc2", "3.14.0"), Ordering::Less);
    }

    #[test]
    fn test_equal_numeric_value_still_total() {
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "1.0"), Ordering::Equal);
    }
}
