/// Stable identifier for accounts and tags.
///
/// Lowercases, collapses whitespace, drops anything outside `[a-z0-9 _.-]`, then turns
/// runs of spaces/dots into a single hyphen.
pub fn slugify(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut out = String::with_capacity(collapsed.len());
    for c in collapsed.chars() {
        match c {
            'a'..='z' | '0'..='9' | '_' => out.push(c),
            ' ' | '.' | '-' => {
                if !out.ends_with('-') {
                    out.push('-');
                }
            }
            _ => {}
        }
    }
    out
}
