//! Dotted version string comparison.
//!
//! One comparator serves every path that orders versions: release sorting,
//! application version checks, runtime library version checks. Strings that
//! parse as dotted numeric sequences compare segment-wise with missing
//! segments read as zero ("1.9" < "1.10", "1.0" == "1"); anything else falls
//! back to plain lexicographic comparison of the raw strings.

use std::cmp::Ordering;

/// Parse a dotted numeric version ("2.0.11", optionally "v"-prefixed) into
/// its segments. Returns `None` when any segment is not a plain integer.
fn parse_segments(s: &str) -> Option<Vec<u64>> {
    let s = s.trim();
    let s = s.strip_prefix('v').unwrap_or(s);
    if s.is_empty() {
        return None;
    }
    s.split('.').map(|seg| seg.parse::<u64>().ok()).collect()
}

/// Total ordering over version strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse_segments(a), parse_segments(b)) {
        (Some(sa), Some(sb)) => {
            let len = sa.len().max(sb.len());
            for i in 0..len {
                let x = sa.get(i).copied().unwrap_or(0);
                let y = sb.get(i).copied().unwrap_or(0);
                match x.cmp(&y) {
                    Ordering::Equal => continue,
                    ord => return ord,
                }
            }
            Ordering::Equal
        }
        // Weak fallback for non-numeric versions, kept deliberately simple.
        _ => a.trim().cmp(b.trim()),
    }
}

/// True when `candidate` is strictly newer than `current`.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}
