//! Input validation
//!
//! Each validator checks a raw request payload and turns it into the
//! validated draft the repositories persist.

use crate::models::{
    ChapterInput, Coordinates, Location, MarineInput, NewChapter, NewMarine, NewPerson,
    PersonInput,
};

// ============================================================================
// Validation limits
// ============================================================================

/// Smallest declared chapter strength
pub const CHAPTER_MARINES_MIN: i64 = 1;
/// Largest declared chapter strength
pub const CHAPTER_MARINES_MAX: i64 = 1000;

/// Upper bound of a marine's x coordinate
pub const MARINE_COORD_X_MAX: i64 = 968;

/// Minimum person height
pub const PERSON_HEIGHT_MIN: f32 = 1.0;

/// Maximum length of a location name
pub const LOCATION_NAME_MAX: usize = 453;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid {field}: {message}")]
    Field { field: String, message: String },

    #[error("Multiple validation errors: {0}")]
    Multiple(String),
}

/// Validation result
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Collects field errors so a caller sees all of them at once
#[derive(Debug, Default)]
struct Violations {
    errors: Vec<ValidationError>,
}

impl Violations {
    fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ValidationError::Field {
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    fn finish(mut self) -> ValidationResult<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(ValidationError::Multiple(
                self.errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
        }
    }
}

/// Chapter validator
#[derive(Debug, Default)]
pub struct ChapterValidator;

impl ChapterValidator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validate a chapter for creation. `marinesCount` is mandatory.
    pub fn validate_new(&self, input: &ChapterInput) -> ValidationResult<NewChapter> {
        let mut violations = Violations::default();
        Self::check_name(&mut violations, &input.name);
        match input.marines_count {
            Some(count) => Self::check_count(&mut violations, count),
            None => violations.add("marinesCount", "must not be null"),
        }
        violations.finish()?;

        Ok(NewChapter {
            name: input.name.trim().to_string(),
            marines_count: input.marines_count.unwrap_or(CHAPTER_MARINES_MIN),
        })
    }

    /// Validate a chapter update. A missing `marinesCount` keeps the stored one.
    pub fn validate_update(&self, input: &ChapterInput) -> ValidationResult<(String, Option<i64>)> {
        let mut violations = Violations::default();
        Self::check_name(&mut violations, &input.name);
        if let Some(count) = input.marines_count {
            Self::check_count(&mut violations, count);
        }
        violations.finish()?;

        Ok((input.name.trim().to_string(), input.marines_count))
    }

    /// Validate the arguments of a stored-procedure chapter creation
    pub fn validate_parts(&self, name: &str, marines_count: i64) -> ValidationResult<NewChapter> {
        self.validate_new(&ChapterInput {
            name: name.to_string(),
            marines_count: Some(marines_count),
        })
    }

    fn check_name(violations: &mut Violations, name: &str) {
        violations.check(!name.trim().is_empty(), "name", "must not be blank");
    }

    fn check_count(violations: &mut Violations, count: i64) {
        if count < CHAPTER_MARINES_MIN {
            violations.add("marinesCount", format!("must be >= {CHAPTER_MARINES_MIN}"));
        } else if count > CHAPTER_MARINES_MAX {
            violations.add("marinesCount", format!("must be <= {CHAPTER_MARINES_MAX}"));
        }
    }
}

/// Space marine validator
#[derive(Debug, Default)]
pub struct MarineValidator;

impl MarineValidator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Check field constraints. Chapter existence is checked by the service.
    pub fn validate(&self, input: &MarineInput) -> ValidationResult<NewMarine> {
        let mut violations = Violations::default();

        violations.check(!input.name.trim().is_empty(), "name", "must not be blank");

        match &input.coordinates {
            Some(coordinates) => violations.check(
                coordinates.x <= MARINE_COORD_X_MAX,
                "coordinates.x",
                "must be <= 968",
            ),
            None => violations.add("coordinates", "must not be null"),
        }

        match input.health {
            Some(health) => violations.check(health > 0, "health", "must be > 0"),
            None => violations.add("health", "must not be null"),
        }

        violations.check(
            input.height.is_finite() && input.height > 0.0,
            "height",
            "must be > 0",
        );

        if input.chapter_id.is_none() {
            violations.add(
                "chapterId",
                "must be provided and refer to an existing Chapter",
            );
        }

        violations.finish()?;

        Ok(NewMarine {
            name: input.name.trim().to_string(),
            coordinates: input.coordinates.unwrap_or_default(),
            chapter_id: input.chapter_id.unwrap_or_default(),
            health: input.health.unwrap_or_default(),
            achievements: input.achievements.clone(),
            height: input.height,
            weapon_type: input.weapon_type,
        })
    }
}

/// Person validator
#[derive(Debug, Default)]
pub struct PersonValidator;

impl PersonValidator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    pub fn validate(&self, input: &PersonInput) -> ValidationResult<NewPerson> {
        let mut violations = Violations::default();

        violations.check(!input.name.is_empty(), "name", "size must be at least 1");
        violations.check(
            input.height.is_finite() && input.height >= PERSON_HEIGHT_MIN,
            "height",
            "must be >= 1",
        );
        violations.check(
            input.location.x.is_finite(),
            "location.x",
            "must be a finite number",
        );
        violations.check(
            input.location.name.chars().count() <= LOCATION_NAME_MAX,
            "location.name",
            "size must be at most 453",
        );

        violations.finish()?;

        Ok(NewPerson {
            name: input.name.clone(),
            coordinates: Coordinates {
                x: input.coordinates.x,
                y: input.coordinates.y,
            },
            eye_color: input.eye_color,
            hair_color: input.hair_color,
            location: Location {
                x: input.location.x,
                y: input.location.y,
                z: input.location.z,
                name: input.location.name.clone(),
            },
            height: input.height,
            birthday: input.birthday,
            nationality: input.nationality,
        })
    }
}
