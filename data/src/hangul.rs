//! Hangul syllable decomposition.
//!
//! A precomposed syllable is split into its lead consonant, vowel and optional
//! trailing consonant so that string similarity works on jamo instead of whole
//! syllables. One wrong vowel then costs one component, not a whole character.

const SYLLABLE_FIRST: u32 = 0xAC00;
const SYLLABLE_LAST: u32 = 0xD7A3;

const LEAD: [char; 19] = [
	'ㄱ', 'ㄲ', 'ㄴ', 'ㄷ', 'ㄸ', 'ㄹ', 'ㅁ', 'ㅂ', 'ㅃ', 'ㅅ', 'ㅆ', 'ㅇ', 'ㅈ', 'ㅉ', 'ㅊ', 'ㅋ', 'ㅌ', 'ㅍ', 'ㅎ',
];

const VOWEL: [char; 21] = [
	'ㅏ', 'ㅐ', 'ㅑ', 'ㅒ', 'ㅓ', 'ㅔ', 'ㅕ', 'ㅖ', 'ㅗ', 'ㅘ', 'ㅙ', 'ㅚ', 'ㅛ', 'ㅜ', 'ㅝ', 'ㅞ', 'ㅟ', 'ㅠ', 'ㅡ', 'ㅢ', 'ㅣ',
];

// Index 0 is "no trailing consonant".
const TAIL: [Option<char>; 28] = [
	None,
	Some('ㄱ'), Some('ㄲ'), Some('ㄳ'), Some('ㄴ'), Some('ㄵ'), Some('ㄶ'), Some('ㄷ'),
	Some('ㄹ'), Some('ㄺ'), Some('ㄻ'), Some('ㄼ'), Some('ㄽ'), Some('ㄾ'), Some('ㄿ'),
	Some('ㅀ'), Some('ㅁ'), Some('ㅂ'), Some('ㅄ'), Some('ㅅ'), Some('ㅆ'), Some('ㅇ'),
	Some('ㅈ'), Some('ㅊ'), Some('ㅋ'), Some('ㅌ'), Some('ㅍ'), Some('ㅎ'),
];

const PER_LEAD: u32 = (VOWEL.len() * TAIL.len()) as u32;
const PER_VOWEL: u32 = TAIL.len() as u32;

pub fn is_syllable(c: char) -> bool {
	(SYLLABLE_FIRST..=SYLLABLE_LAST).contains(&(c as u32))
}

/// Split `c` into (lead, vowel, tail) if it is a precomposed syllable.
pub fn split(c: char) -> Option<(char, char, Option<char>)> {
	if !is_syllable(c) {
		return None;
	}
	let offset = c as u32 - SYLLABLE_FIRST;
	let lead = LEAD[(offset / PER_LEAD) as usize];
	let vowel = VOWEL[(offset % PER_LEAD / PER_VOWEL) as usize];
	let tail = TAIL[(offset % PER_VOWEL) as usize];
	Some((lead, vowel, tail))
}

/// Replace every syllable of `s` by its jamo. Other characters are kept as is.
pub fn decompose(s: &str) -> String {
	let mut out = String::with_capacity(s.len() * 3);
	for c in s.chars() {
		match split(c) {
			Some((lead, vowel, tail)) => {
				out.push(lead);
				out.push(vowel);
				if let Some(tail) = tail {
					out.push(tail);
				}
			}
			None => out.push(c),
		}
	}
	out
}
