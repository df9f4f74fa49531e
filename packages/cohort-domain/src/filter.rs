use serde::{Deserialize, Serialize};
use time::Date;

use crate::patient::Gender;

pub type Result<T, E = FilterError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
	#[error("Age range minimum {min} exceeds maximum {max}.")]
	InvertedAgeRange { min: u16, max: u16 },
	#[error("Age {age} is outside the representable calendar range.")]
	AgeOutOfRange { age: u16 },
	#[error("Unrecognized gender value: {value:?}.")]
	UnknownGender { value: String },
}

/// Inclusive age range in whole years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
	pub min: u16,
	pub max: u16,
}

/// User-supplied search constraints. Every field is optional; an absent
/// field imposes no restriction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
	pub gender: Option<Gender>,
	pub deceased: Option<bool>,
	pub age: Option<AgeRange>,
}

/// Inclusive birthdate interval equivalent to an age range at a reference
/// date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthdateInterval {
	pub earliest: Date,
	pub latest: Date,
}

/// The conjunction of the constraints actually supplied, ready for the
/// store to render as a predicate. `born` is pinned to the compile-time
/// reference date; `age_at_death` stays symbolic because the reference (the
/// patient's death date) varies per row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
	pub gender: Option<Gender>,
	pub deceased: Option<bool>,
	pub born: Option<BirthdateInterval>,
	pub age_at_death: Option<AgeRange>,
}
impl CompiledFilter {
	pub fn is_unconstrained(&self) -> bool {
		*self == Self::default()
	}
}

impl SearchFilter {
	/// Compile into a [`CompiledFilter`] against `today`.
	///
	/// An age range compiles to a birthdate interval relative to `today`,
	/// so the same filter compiles to a different predicate on a different
	/// day. When the filter also pins `deceased = true`, age is measured at
	/// the recorded death date instead and the range is kept symbolic.
	pub fn compile(&self, today: Date) -> Result<CompiledFilter> {
		let mut compiled = CompiledFilter {
			gender: self.gender,
			deceased: self.deceased,
			..CompiledFilter::default()
		};

		if let Some(age) = self.age {
			if age.min > age.max {
				return Err(FilterError::InvertedAgeRange { min: age.min, max: age.max });
			}

			if self.deceased == Some(true) {
				compiled.age_at_death = Some(age);
			} else {
				compiled.born = Some(birthdate_interval(age, today)?);
			}
		}

		Ok(compiled)
	}
}

/// Parse a caller-supplied gender string against the recognized set.
pub fn parse_gender(value: &str) -> Result<Gender> {
	Gender::parse(value).ok_or_else(|| FilterError::UnknownGender { value: value.to_string() })
}

/// Birthdates matching `age.min ≤ age ≤ age.max` at `reference`:
/// born on or before `reference − min` years, and strictly after
/// `reference − (max + 1)` years.
fn birthdate_interval(age: AgeRange, reference: Date) -> Result<BirthdateInterval> {
	let latest = years_back(reference, age.min)?;
	let earliest = years_back(reference, age.max.saturating_add(1))?
		.next_day()
		.ok_or(FilterError::AgeOutOfRange { age: age.max })?;

	Ok(BirthdateInterval { earliest, latest })
}

/// `date` minus `years` calendar years, clamping Feb 29 to Feb 28 on
/// non-leap years.
fn years_back(date: Date, years: u16) -> Result<Date> {
	let year = date.year() - i32::from(years);

	Date::from_calendar_date(year, date.month(), date.day())
		.or_else(|_| Date::from_calendar_date(year, date.month(), 28))
		.map_err(|_| FilterError::AgeOutOfRange { age: years })
}
