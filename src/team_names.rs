use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

// Keys are lowercase; values are the names fixtures are stored under.
const ALIASES: &[(&str, &str)] = &[
    ("man utd", "Manchester United"),
    ("man united", "Manchester United"),
    ("manchester utd", "Manchester United"),
    ("man city", "Manchester City"),
    ("spurs", "Tottenham Hotspur"),
    ("tottenham", "Tottenham Hotspur"),
    ("wolves", "Wolverhampton Wanderers"),
    ("wolverhampton", "Wolverhampton Wanderers"),
    ("brighton", "Brighton & Hove Albion"),
    ("brighton and hove albion", "Brighton & Hove Albion"),
    ("newcastle", "Newcastle United"),
    ("west ham", "West Ham United"),
    ("nott'm forest", "Nottingham Forest"),
    ("nottm forest", "Nottingham Forest"),
    ("forest", "Nottingham Forest"),
    ("leeds", "Leeds United"),
    ("sheffield utd", "Sheffield United"),
    ("leicester", "Leicester City"),
    ("ipswich", "Ipswich Town"),
    ("luton", "Luton Town"),
    ("bournemouth", "AFC Bournemouth"),
    ("villa", "Aston Villa"),
    ("palace", "Crystal Palace"),
    ("sunderland afc", "Sunderland"),
];

static CANONICAL: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| ALIASES.iter().copied().collect());

/// Maps a short or alternate team name to its canonical form. Names not in
/// the table come back unchanged apart from surrounding whitespace.
pub fn canonical_team_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let key = trimmed.to_lowercase();
    match CANONICAL.get(key.as_str()) {
        Some(name) => (*name).to_string(),
        None => trimmed.to_string(),
    }
}

pub fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    let mut out: String = first.to_uppercase().collect();
                    out.push_str(&chars.as_str().to_lowercase());
                    out
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Loose identifiers for a team name (collapsed words, acronym, prefixes),
/// used to pair odds-feed events with stored fixtures.
pub fn team_aliases(name: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let words = canonical_words(&canonical_team_name(name));
    if words.is_empty() {
        return out;
    }

    let collapsed = words.join("");
    if collapsed.len() >= 2 {
        out.insert(collapsed.clone());
    }
    out.insert(collapsed.chars().take(3).collect());

    let acronym: String = words.iter().filter_map(|w| w.chars().next()).collect();
    if acronym.len() >= 2 {
        out.insert(acronym);
    }

    for w in &words {
        // Shared suffix words would pair every "United" with every other.
        if matches!(w.as_str(), "united" | "city" | "town" | "athletic" | "rovers") {
            continue;
        }
        if w.len() >= 3 {
            out.insert(w.clone());
        }
    }

    out
}

pub fn aliases_intersect(a: &HashSet<String>, b: &HashSet<String>) -> bool {
    !a.is_disjoint(b)
}

/// Bookmakers label the draw outcome "Draw", "Tie" or "X".
pub fn is_draw_label(name: &str) -> bool {
    matches!(
        canonical_words(name).as_slice(),
        [word] if matches!(word.as_str(), "draw" | "tie" | "x")
    )
}

fn canonical_words(name: &str) -> Vec<String> {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|w| !matches!(*w, "fc" | "cf" | "afc" | "sc" | "ac" | "club"))
        .map(str::to_string)
        .collect()
}
