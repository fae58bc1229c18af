use std::{
	collections::HashMap,
	sync::{LazyLock, Mutex},
};

use regex::Regex;

use crate::{Error, Result};

/// `NOTE_AAA001`: uppercase type prefix, base-26 letter triplet, three
/// decimal digits. Unique per type, not globally.
static HRID_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^([A-Z0-9]+)_([A-Z]{3})([0-9]{3})$").expect("static HRID pattern must compile")
});

const ALPHA_SPAN: u64 = 26 * 26 * 26;
const NUM_SPAN: u64 = 1_000;
const INDEX_SPAN: u64 = ALPHA_SPAN * NUM_SPAN;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedHrid {
	pub memory_type: String,
	pub alpha_idx: u32,
	pub num: u32,
}
impl ParsedHrid {
	/// Position within the type's allocation sequence: 0 for `AAA000`.
	pub fn ordinal(&self) -> u64 {
		self.alpha_idx as u64 * NUM_SPAN + self.num as u64
	}
}

pub fn parse(hrid: &str) -> Result<ParsedHrid> {
	let trimmed = hrid.trim();
	let captures = HRID_RE
		.captures(trimmed)
		.ok_or_else(|| Error::Hrid { message: format!("'{hrid}' does not match TYPE_AAA000.") })?;
	let alpha = &captures[2];
	let num = captures[3]
		.parse::<u32>()
		.map_err(|_| Error::Hrid { message: format!("'{hrid}' has a non-numeric suffix.") })?;

	Ok(ParsedHrid { memory_type: captures[1].to_string(), alpha_idx: alpha_to_idx(alpha), num })
}

/// Collapses an HRID into one ordering integer: same type follows
/// allocation order; distinct types get a stable relative order from a
/// base-37 encoding of the type prefix. Used as the search tie-breaker.
/// The type key needs up to 42 bits and the intra-type ordinal 25, hence
/// the u128.
pub fn hrid_to_index(hrid: &str) -> Result<u128> {
	let parsed = parse(hrid)?;

	Ok((type_key(&parsed.memory_type) as u128) << 25 | parsed.ordinal() as u128)
}

/// Per-process HRID allocator: one monotonic counter per memory type,
/// serialized behind a mutex. Counters are seeded from storage once per
/// type per process (see `seed`); the storage lookup itself lives with
/// the caller.
#[derive(Debug, Default)]
pub struct HridAllocator {
	counters: Mutex<HashMap<String, u64>>,
}
impl HridAllocator {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_seeded(&self, memory_type: &str) -> bool {
		let counters = self.counters.lock().unwrap_or_else(|err| err.into_inner());

		counters.contains_key(&type_prefix(memory_type))
	}

	/// Seeds the counter for a type from HRIDs already in storage, resuming
	/// one past the highest. Malformed entries and entries of other types
	/// are ignored. A second seed for the same type is a no-op, so the
	/// first caller wins and the lookup happens at most once per process.
	pub fn seed<'a, I>(&self, memory_type: &str, existing: I)
	where
		I: IntoIterator<Item = &'a str>,
	{
		let prefix = type_prefix(memory_type);
		let mut highest: Option<u64> = None;

		for hrid in existing {
			let Ok(parsed) = parse(hrid) else { continue };

			if parsed.memory_type != prefix {
				continue;
			}

			let ordinal = parsed.ordinal();

			if highest.map(|current| ordinal > current).unwrap_or(true) {
				highest = Some(ordinal);
			}
		}

		let next = highest.map(|ordinal| ordinal + 1).unwrap_or(0);
		let mut counters = self.counters.lock().unwrap_or_else(|err| err.into_inner());

		counters.entry(prefix).or_insert(next);
	}

	pub fn allocate(&self, memory_type: &str) -> Result<String> {
		let prefix = type_prefix(memory_type);
		let mut counters = self.counters.lock().unwrap_or_else(|err| err.into_inner());
		let next = counters.entry(prefix.clone()).or_insert(0);

		if *next >= INDEX_SPAN {
			return Err(Error::HridExhausted { memory_type: prefix });
		}

		let issued = *next;

		*next += 1;

		Ok(format_hrid(&prefix, issued))
	}

	/// Drops all counters so the next allocation re-seeds. Test hook only.
	pub fn reset(&self) {
		self.counters.lock().unwrap_or_else(|err| err.into_inner()).clear();
	}
}

fn format_hrid(prefix: &str, ordinal: u64) -> String {
	let alpha_idx = (ordinal / NUM_SPAN) as u32;
	let num = ordinal % NUM_SPAN;

	format!("{prefix}_{}{num:03}", idx_to_alpha(alpha_idx))
}

fn type_prefix(memory_type: &str) -> String {
	memory_type.trim().to_uppercase()
}

fn alpha_to_idx(alpha: &str) -> u32 {
	alpha.bytes().fold(0, |idx, byte| idx * 26 + (byte - b'A') as u32)
}

fn idx_to_alpha(mut idx: u32) -> String {
	let mut chars = [b'A'; 3];

	for slot in chars.iter_mut().rev() {
		*slot = b'A' + (idx % 26) as u8;
		idx /= 26;
	}

	String::from_utf8_lossy(&chars).into_owned()
}

/// Deterministic numeric key for a type prefix: the first 8 chars in
/// base 37 (A-Z = 1-26, 0-9 = 27-36).
fn type_key(memory_type: &str) -> u64 {
	memory_type.chars().take(8).fold(0, |key, c| {
		let value = match c {
			'A'..='Z' => 1 + (c as u64 - 'A' as u64),
			'0'..='9' => 27 + (c as u64 - '0' as u64),
			_ => 0,
		};

		key * 37 + value
	})
}
