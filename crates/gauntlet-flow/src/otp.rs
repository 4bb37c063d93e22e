//! The fish-name check offered during registration.
//!
//! The user is shown a picture of a fish and types its name. Answers are
//! compared after trimming whitespace (including the full-width space) and
//! folding hiragana to katakana, so `ふぐ` and `フグ` are the same answer.

use rand::Rng;

/// A fish the user may be asked to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fish {
    /// Expected answer, in katakana.
    pub name: &'static str,
    /// Picture file stem, without extension.
    pub image: &'static str,
}

pub const FISH: [Fish; 10] = [
    Fish { name: "オニカマス", image: "onikamasu" },
    Fish { name: "ホウボウ", image: "houhou" },
    Fish { name: "マツカサウオ", image: "matsukasauo" },
    Fish { name: "ハリセンボン", image: "harisenbon" },
    Fish { name: "カワハギ", image: "kawahagi" },
    Fish { name: "フグ", image: "fugu" },
    Fish { name: "タツノオトシゴ", image: "tatsunootoshigo" },
    Fish { name: "オコゼ", image: "okoze" },
    Fish { name: "アンコウ", image: "ankou" },
    Fish { name: "ウツボ", image: "utsubo" },
];

const HIRAGANA: std::ops::RangeInclusive<char> = '\u{3040}'..='\u{309F}';
const KANA_OFFSET: u32 = 0x60;

/// Picks a fish at random, never the one named `excluding`.
pub fn pick_fish<R: Rng + ?Sized>(rng: &mut R, excluding: Option<&str>) -> &'static Fish {
    match excluding.and_then(|name| FISH.iter().position(|f| f.name == name)) {
        Some(skip) => {
            let i = rng.random_range(0..FISH.len() - 1);
            &FISH[if i >= skip { i + 1 } else { i }]
        }
        None => &FISH[rng.random_range(0..FISH.len())],
    }
}

/// Whether `input` names the same fish as `answer`.
pub fn kana_match(input: &str, answer: &str) -> bool {
    normalize(input) == normalize(answer)
}

fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| {
            if HIRAGANA.contains(&c) {
                char::from_u32(c as u32 + KANA_OFFSET).unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}
