//! Longest common prefix of a set of strings
//!
//! Works on raw strings, not paths: the caller decides where the directory
//! boundary is. The prefix length is found by binary search over the
//! shortest input, so each probe costs one comparison per input and the
//! whole search is `O(n · m · log m)`.

/// Longest string every input starts with
///
/// Returns an empty string for an empty input. The result never splits a
/// multi-byte character and does not depend on input order.
#[must_use]
pub fn longest_common_prefix<S: AsRef<str>>(strs: &[S]) -> String {
    let strs: Vec<&str> = strs.iter().map(AsRef::<str>::as_ref).collect();
    let Some(shortest) = strs.iter().copied().min_by_key(|s| s.len()) else {
        return String::new();
    };

    let shares = |len: usize| {
        let candidate = &shortest.as_bytes()[..len];
        strs.iter().all(|s| s.as_bytes().starts_with(candidate))
    };

    // Invariant: every input shares the first `low` bytes; none share `high + 1`.
    let (mut low, mut high) = (0, shortest.len());
    while low < high {
        let mid = low + (high - low).div_ceil(2);
        if shares(mid) {
            low = mid;
        } else {
            high = mid - 1;
        }
    }

    while !shortest.is_char_boundary(low) {
        low -= 1;
    }
    shortest[..low].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_maximal(strs: &[&str], prefix: &str) -> bool {
        let next = strs.iter().find_map(|s| s[prefix.len()..].chars().next());
        match next {
            None => true,
            Some(c) => {
                let extended = format!("{prefix}{c}");
                strs.iter().any(|s| !s.starts_with(&extended))
            }
        }
    }

    #[test]
    fn test_empty_input() {
        let empty: [&str; 0] = [];
        assert_eq!(longest_common_prefix(&empty), "");
    }

    #[test]
    fn test_empty_string_member() {
        assert_eq!(longest_common_prefix(&["abc", "", "abd"]), "");
    }

    #[test]
    fn test_single_input() {
        assert_eq!(longest_common_prefix(&["/srv/app/a.js"]), "/srv/app/a.js");
    }

    #[test]
    fn test_paths() {
        let paths = ["/srv/app/js/a.js", "/srv/app/js/b.js", "/srv/app/css/c.css"];
        assert_eq!(longest_common_prefix(&paths), "/srv/app/");
        let paths = ["/a/bc/x", "/a/bd/y"];
        assert_eq!(longest_common_prefix(&paths), "/a/b");
    }

    #[test]
    fn test_no_common_prefix() {
        assert_eq!(longest_common_prefix(&["flower", "dog", "car"]), "");
    }

    #[test]
    fn test_identical_inputs() {
        assert_eq!(longest_common_prefix(&["same", "same", "same"]), "same");
    }

    #[test]
    fn test_order_independent() {
        let a = longest_common_prefix(&["interview", "internet", "interval"]);
        let b = longest_common_prefix(&["interval", "interview", "internet"]);
        assert_eq!(a, "inter");
        assert_eq!(a, b);
    }

    #[test]
    fn test_multibyte_boundary() {
        // 'é' and 'è' share their first UTF-8 byte
        assert_eq!(longest_common_prefix(&["café", "cafè"]), "caf");
        assert_eq!(longest_common_prefix(&["上传/a", "上传/b"]), "上传/");
    }

    #[test]
    fn test_prefix_and_maximality_over_many_sets() {
        let sets: [&[&str]; 6] = [
            &["a", "ab", "abc"],
            &["xyz", "xy", "x"],
            &["/tmp/dir/file1", "/tmp/dir/file2", "/tmp/dir2/file"],
            &["prefix", "prefixed", "prefixing", "pre"],
            &["zzzz", "zzzz"],
            &["mismatch", "nomatch"],
        ];
        for strs in sets {
            let prefix = longest_common_prefix(strs);
            assert!(strs.iter().all(|s| s.starts_with(&prefix)), "{strs:?}");
            assert!(is_maximal(strs, &prefix), "{strs:?} -> {prefix:?}");
        }
    }

    #[test]
    fn test_thousands_of_near_identical_paths() {
        let base = "/very/long/shared/directory/".repeat(20);
        let paths: Vec<String> = (0..5000).map(|i| format!("{base}{i:05}.bin")).collect();
        let prefix = longest_common_prefix(&paths);
        assert_eq!(prefix, format!("{base}0"));
    }
}
