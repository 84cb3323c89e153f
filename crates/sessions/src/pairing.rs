/// Format a raw pairing code for display: 4-character groups joined by `-`.
///
/// Separators already present in the raw code are dropped first, so
/// `"ABCD-EFGH"` and `"ABCDEFGH"` render the same.
pub fn format_pairing_code(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    chars
        .chunks(4)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}
