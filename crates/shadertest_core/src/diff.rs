//! Line-oriented inline diff.
//!
//! Renders the changes needed to turn `expected` into `actual`:
//!
//! ```text
//!   unchanged line
//! - line only in expected
//! + line only in actual
//! ```

/// One line of an inline diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLine<'a> {
    Same(&'a str),
    Removed(&'a str),
    Added(&'a str),
}

/// Compute the line edits between `expected` and `actual`.
///
/// ## Notes
/// - Common leading and trailing lines are matched directly; the remaining middle section is aligned with a shortest
///   edit script, preferring removals before additions when both are possible.
/// - A middle section needing more than [`MAX_EDIT_DISTANCE`] edits is shown as all removals then all additions.
pub fn diff_lines<'a>(expected: &'a str, actual: &'a str) -> Vec<DiffLine<'a>> {
    let old: Vec<&str> = expected.lines().collect();
    let new: Vec<&str> = actual.lines().collect();

    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut out = Vec::with_capacity(old.len().max(new.len()));
    out.extend(old[..prefix].iter().map(|l| DiffLine::Same(*l)));
    align(old_mid, new_mid, &mut out);
    out.extend(old[old.len() - suffix..].iter().map(|l| DiffLine::Same(*l)));
    out
}

/// Edit distance past which the middle section is shown as one removed block followed by one added block.
pub const MAX_EDIT_DISTANCE: usize = 1000;

/// Furthest point reached on one diagonal, and whether the last edit was an addition.
#[derive(Debug, Clone, Copy)]
struct Step {
    x: usize,
    down: bool,
}

fn align<'a>(old: &[&'a str], new: &[&'a str], out: &mut Vec<DiffLine<'a>>) {
    match shortest_edit(old, new) {
        Some(trace) => backtrack(old, new, &trace, out),
        None => {
            out.extend(old.iter().map(|l| DiffLine::Removed(*l)));
            out.extend(new.iter().map(|l| DiffLine::Added(*l)));
        }
    }
}

/// Greedy shortest-edit search (Myers, 1986).
///
/// Row `d` of the trace holds, for each diagonal `k = 2i - d`, the furthest point reachable with `d` edits, or `None`
/// when that diagonal leaves the grid. Returns `None` if more than [`MAX_EDIT_DISTANCE`] edits are needed.
fn shortest_edit(old: &[&str], new: &[&str]) -> Option<Vec<Vec<Option<Step>>>> {
    let (n, m) = (old.len(), new.len());
    let mut trace: Vec<Vec<Option<Step>>> = Vec::new();

    for d in 0..=(n + m).min(MAX_EDIT_DISTANCE) {
        let mut row = Vec::with_capacity(d + 1);
        for i in 0..=d {
            let k = 2 * i as isize - d as isize;
            let step = match trace.last() {
                None => Some(Step { x: 0, down: false }),
                Some(prev) => {
                    // Down comes from diagonal k + 1, right from diagonal k - 1.
                    let down = prev
                        .get(i)
                        .copied()
                        .flatten()
                        .filter(|s| s.x as isize - (k + 1) < m as isize)
                        .map(|s| s.x);
                    let right = i
                        .checked_sub(1)
                        .and_then(|j| prev.get(j))
                        .copied()
                        .flatten()
                        .filter(|s| s.x < n)
                        .map(|s| s.x + 1);
                    match (down, right) {
                        (Some(x), Some(xr)) if x >= xr => Some(Step { x, down: true }),
                        (_, Some(x)) => Some(Step { x, down: false }),
                        (Some(x), None) => Some(Step { x, down: true }),
                        (None, None) => None,
                    }
                }
            };

            let step = step.map(|mut s| {
                let mut y = (s.x as isize - k) as usize;
                while s.x < n && y < m && old[s.x] == new[y] {
                    s.x += 1;
                    y += 1;
                }
                s
            });
            row.push(step);

            if step.is_some_and(|s| s.x == n && s.x as isize - k == m as isize) {
                trace.push(row);
                return Some(trace);
            }
        }
        trace.push(row);
    }
    None
}

fn backtrack<'a>(old: &[&'a str], new: &[&'a str], trace: &[Vec<Option<Step>>], out: &mut Vec<DiffLine<'a>>) {
    let mut edits = Vec::new();
    let (mut x, mut y) = (old.len(), new.len());

    for d in (0..trace.len()).rev() {
        let k = x as isize - y as isize;
        let i = ((k + d as isize) / 2) as usize;
        let Some(step) = trace[d].get(i).copied().flatten() else {
            break;
        };

        let (start_x, edit) = match d.checked_sub(1) {
            None => (0, None),
            Some(p) => {
                let prev = &trace[p];
                let from = if step.down {
                    prev.get(i)
                } else {
                    i.checked_sub(1).and_then(|j| prev.get(j))
                };
                let Some(px) = from.copied().flatten().map(|s| s.x) else {
                    break;
                };
                if step.down {
                    let py = (px as isize - (k + 1)) as usize;
                    (px, Some((px, py, DiffLine::Added(new[py]))))
                } else {
                    let py = (px as isize - (k - 1)) as usize;
                    (px + 1, Some((px, py, DiffLine::Removed(old[px]))))
                }
            }
        };

        while x > start_x {
            x -= 1;
            y -= 1;
            edits.push(DiffLine::Same(old[x]));
        }
        if let Some((px, py, line)) = edit {
            edits.push(line);
            x = px;
            y = py;
        }
    }
    out.extend(edits.into_iter().rev());
}

/// Render the diff between `expected` and `actual` as text.
pub fn inline_diff(expected: &str, actual: &str) -> String {
    let mut diff = String::new();
    for line in diff_lines(expected, actual) {
        let (prefix, text) = match line {
            DiffLine::Same(t) => ("  ", t),
            DiffLine::Removed(t) => ("- ", t),
            DiffLine::Added(t) => ("+ ", t),
        };
        diff.push_str(prefix);
        diff.push_str(text);
        diff.push('\n');
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_inputs() {
        assert_eq!(inline_diff("a\nb\n", "a\nb\n"), "  a\n  b\n");
    }

    #[test]
    fn test_changed_line() {
        assert_eq!(
            inline_diff("a\nb\nc\n", "a\nx\nc\n"),
            "  a\n- b\n+ x\n  c\n"
        );
    }

    #[test]
    fn test_inserted_and_removed_lines() {
        assert_eq!(inline_diff("a\nc\n", "a\nb\nc\n"), "  a\n+ b\n  c\n");
        assert_eq!(inline_diff("a\nb\nc\n", "a\nc\n"), "  a\n- b\n  c\n");
    }

    #[test]
    fn test_empty_sides() {
        assert_eq!(inline_diff("", "a\n"), "+ a\n");
        assert_eq!(inline_diff("a\n", ""), "- a\n");
        assert_eq!(inline_diff("", ""), "");
    }

    #[test]
    fn test_reordered_lines_keep_lcs() {
        let lines = diff_lines("a\nb\nc\nd\n", "b\nc\na\nd\n");
        let same: Vec<_> = lines
            .iter()
            .filter_map(|l| match l {
                DiffLine::Same(t) => Some(*t),
                _ => None,
            })
            .collect();
        assert_eq!(same, vec!["b", "c", "d"]);
    }

    fn numbered(prefix: &str, count: usize) -> String {
        (0..count).map(|i| format!("{prefix} {i}\n")).collect()
    }

    #[test]
    fn test_large_input_with_changed_ends() {
        let expected = numbered("line", 8000);
        let actual = expected.replacen("line 0\n", "first\n", 1).replace("line 7999\n", "last\n");

        let lines = diff_lines(&expected, &actual);
        let count = |want: fn(&DiffLine<'_>) -> bool| lines.iter().filter(|l| want(l)).count();
        assert_eq!(count(|l| matches!(l, DiffLine::Removed(_))), 2);
        assert_eq!(count(|l| matches!(l, DiffLine::Added(_))), 2);
        assert_eq!(count(|l| matches!(l, DiffLine::Same(_))), 7998);
        assert_eq!(&lines[..2], [DiffLine::Removed("line 0"), DiffLine::Added("first")]);
        assert_eq!(lines[2], DiffLine::Same("line 1"));
    }

    #[test]
    fn test_unrelated_inputs_fall_back_to_blocks() {
        let expected = numbered("old", 1500);
        let actual = numbered("new", 1500);

        let lines = diff_lines(&expected, &actual);
        assert_eq!(lines.len(), 3000);
        assert!(lines[..1500].iter().all(|l| matches!(l, DiffLine::Removed(_))));
        assert!(lines[1500..].iter().all(|l| matches!(l, DiffLine::Added(_))));
        assert_eq!(lines[1500], DiffLine::Added("new 0"));
    }
}
