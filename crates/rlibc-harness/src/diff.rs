//! Diff rendering for fixture comparison.

/// Render a line diff between expected and actual output. Lines present on
/// only one side are shown against an empty counterpart.
#[must_use]
pub fn render_diff(expected: &str, actual: &str) -> String {
    if expected == actual {
        return String::from("[identical]");
    }

    let mut out = String::new();
    out.push_str("--- expected\n");
    out.push_str("+++ actual\n");
    let want: Vec<&str> = expected.split('\n').collect();
    let got: Vec<&str> = actual.split('\n').collect();
    for i in 0..want.len().max(got.len()) {
        let (e, a) = (want.get(i), got.get(i));
        if e == a {
            continue;
        }
        out.push_str(&format!("@@ line {} @@\n", i + 1));
        if let Some(e) = e {
            out.push_str(&format!("-{e}\n"));
        }
        if let Some(a) = a {
            out.push_str(&format!("+{a}\n"));
        }
    }
    out
}

/// One-line note for an errno mismatch, `None` when they agree.
#[must_use]
pub fn errno_note(expected: i32, actual: i32) -> Option<String> {
    (expected != actual).then(|| format!("errno: expected {expected}, got {actual}"))
}
