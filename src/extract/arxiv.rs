use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Explicit marker: arXiv:1206.2606, arXiv:hep-th/9409089
    pub static ref ARXIV_ID_PATTERN: Regex = Regex::new(
        r"(?i)arXiv:(([a-z0-9-]{1,15}/)?[\d.]{4,9}\d)"
    ).unwrap();

    // URL form: arxiv.org/abs/1206.2606, arxiv.org/pdf/hep-th/9409089
    pub static ref ARXIV_URL_PATTERN: Regex = Regex::new(
        r"(?i)arxiv\.org/[a-z0-9-]{1,10}/(([a-z0-9-]{1,15}/)?[\d.]{4,9}\d)"
    ).unwrap();

    // Year and month are the first four digits after an optional archive prefix
    static ref YEAR_MONTH_PATTERN: Regex = Regex::new(
        r"^(?:[^/]*/)?(\d\d)(\d\d)"
    ).unwrap();
}

/// Find the first arXiv identifier in a text.
///
/// Explicit `arXiv:` markers are tried before URL-embedded forms.
pub fn find_arxiv_id(text: &str) -> Option<String> {
    ARXIV_ID_PATTERN
        .captures(text)
        .or_else(|| ARXIV_URL_PATTERN.captures(text))
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// Derive the (two-digit year, month) pair an arXiv ID was issued in.
///
/// Works for `archive/YYMMNNN` and `YYMM.NNNNN`; anything else yields `None`.
pub fn arxiv_year_month(id: &str) -> Option<(u8, u8)> {
    let cap = YEAR_MONTH_PATTERN.captures(id.trim())?;
    let year: u8 = cap.get(1)?.as_str().parse().ok()?;
    let month: u8 = cap.get(2)?.as_str().parse().ok()?;
    if (1..=12).contains(&month) {
        Some((year, month))
    } else {
        None
    }
}

/// Candidate spellings of a possibly malformed arXiv ID, in lookup order:
/// the ID as given, the part after the last `/` (`quant-ph/0802.3625` is
/// really `0802.3625`), and a regrouping of run-together digits
/// (`14025167` is really `1402.5167`).
pub fn arxiv_id_guesses(id: &str) -> Vec<String> {
    let id = id.trim();
    let mut guesses = vec![id.to_string()];

    if let Some((_, suffix)) = id.rsplit_once('/') {
        if !suffix.is_empty() {
            guesses.push(suffix.to_string());
        }
    }

    if id.len() > 4 && id.chars().all(|c| c.is_ascii_digit()) {
        guesses.push(format!("{}.{}", &id[..4], &id[4..]));
    }

    guesses.dedup();
    guesses
}
