//! Column types: how a cell is validated and how it is normalized before being stored.

use std::collections::HashMap;
use std::fmt::Display;

use chrono::NaiveDate;

/// The tag naming the type of a census column.
///
/// The built-in tags form a closed set. Any other tag is kept as `Other` so that
/// a configuration can be checked (and rejected) explicitly instead of being coerced.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub enum TypeTag {
    FreeText,
    TextTrim,
    Alphanumeric,
    Number,
    Date,
    Other(String),
}

impl TypeTag {
    pub fn from_tag(tag: &str) -> TypeTag {
        match tag.trim() {
            "free_text" => TypeTag::FreeText,
            "text_trim" => TypeTag::TextTrim,
            "alphanumeric" => TypeTag::Alphanumeric,
            "number" => TypeTag::Number,
            "date" => TypeTag::Date,
            x => TypeTag::Other(x.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TypeTag::FreeText => "free_text",
            TypeTag::TextTrim => "text_trim",
            TypeTag::Alphanumeric => "alphanumeric",
            TypeTag::Number => "number",
            TypeTag::Date => "date",
            TypeTag::Other(s) => s.as_str(),
        }
    }
}

impl Default for TypeTag {
    fn default() -> Self {
        TypeTag::FreeText
    }
}

impl Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The reason a value was rejected by its column type.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum ErrorCode {
    InvalidNumber,
    InvalidDate,
    /// Raised by types registered outside of this crate.
    Custom(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::InvalidNumber => "invalid_number",
            ErrorCode::InvalidDate => "invalid_date",
            ErrorCode::Custom(s) => s.as_str(),
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The pair of pure functions attached to a type tag.
///
/// `validate` is strict: it also rejects blank values for the types that check
/// their content. Blank cells are filtered out before by [TypeRegistry::validate].
#[derive(Debug, Clone, Copy)]
pub struct ColumnType {
    pub validate: fn(&str) -> Option<ErrorCode>,
    pub transform: fn(&str) -> String,
}

impl ColumnType {
    /// Always valid, returns the value unchanged.
    pub const NOOP: ColumnType = ColumnType {
        validate: accept_any,
        transform: identity,
    };
    pub const TEXT_TRIM: ColumnType = ColumnType {
        validate: accept_any,
        transform: trim_text,
    };
    pub const ALPHANUMERIC: ColumnType = ColumnType {
        validate: accept_any,
        transform: keep_alphanumeric,
    };
    pub const NUMBER: ColumnType = ColumnType {
        validate: validate_number,
        transform: identity,
    };
    pub const DATE: ColumnType = ColumnType {
        validate: validate_date,
        transform: identity,
    };
}

/// Lookup table from a type tag to its behavior.
///
/// Built once and handed to every pipeline invocation.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<TypeTag, ColumnType>,
}

impl TypeRegistry {
    /// The registry with all the built-in types.
    pub fn builtin() -> TypeRegistry {
        let mut types = HashMap::new();
        types.insert(TypeTag::FreeText, ColumnType::NOOP);
        types.insert(TypeTag::TextTrim, ColumnType::TEXT_TRIM);
        types.insert(TypeTag::Alphanumeric, ColumnType::ALPHANUMERIC);
        types.insert(TypeTag::Number, ColumnType::NUMBER);
        types.insert(TypeTag::Date, ColumnType::DATE);
        TypeRegistry { types }
    }

    /// Adds a type, or replaces the behavior of an existing tag.
    pub fn register(&mut self, tag: TypeTag, column_type: ColumnType) {
        self.types.insert(tag, column_type);
    }

    pub fn is_known(&self, tag: &TypeTag) -> bool {
        self.types.contains_key(tag)
    }

    /// The known tags, sorted by name.
    pub fn known_tags(&self) -> Vec<&TypeTag> {
        let mut tags: Vec<&TypeTag> = self.types.keys().collect();
        tags.sort_by_key(|t| t.as_str().to_string());
        tags
    }

    /// Unknown tags resolve to the no-op type.
    pub fn resolve(&self, tag: &TypeTag) -> ColumnType {
        self.types.get(tag).copied().unwrap_or(ColumnType::NOOP)
    }

    /// Validates a cell. Blank values are never type-validated.
    pub fn validate(&self, tag: &TypeTag, value: &str) -> Option<ErrorCode> {
        if is_blank(value) {
            return None;
        }
        (self.resolve(tag).validate)(value)
    }

    pub fn transform(&self, tag: &TypeTag, value: &str) -> String {
        (self.resolve(tag).transform)(value)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        TypeRegistry::builtin()
    }
}

pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn accept_any(_value: &str) -> Option<ErrorCode> {
    None
}

fn identity(value: &str) -> String {
    value.to_string()
}

fn trim_text(value: &str) -> String {
    value.trim().to_string()
}

fn keep_alphanumeric(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn validate_number(value: &str) -> Option<ErrorCode> {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        None
    } else {
        Some(ErrorCode::InvalidNumber)
    }
}

fn validate_date(value: &str) -> Option<ErrorCode> {
    match parse_date(value) {
        Some(_) => None,
        None => Some(ErrorCode::InvalidDate),
    }
}

// Day-first is tried before month-first: 01/02/2024 is the 1st of February.
const DATE_FORMATS: [&str; 17] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%Y%m%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%m.%d.%Y",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
];

/// Parses a calendar date written in one of the common notations.
///
/// The year must be written in full (at least four digits).
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let s = value.trim();
    if !has_full_year(s) {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn has_full_year(s: &str) -> bool {
    let mut run = 0;
    for c in s.chars() {
        if c.is_ascii_digit() {
            run += 1;
            if run >= 4 {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin(tag: &str) -> ColumnType {
        TypeRegistry::builtin().resolve(&TypeTag::from_tag(tag))
    }

    #[test]
    fn alphanumeric_keeps_ascii_letters_and_digits_in_order() {
        let t = builtin("alphanumeric");
        let samples = [
            "12.345.678-A",
            " ab C\td ",
            "Ñandú 42 ü",
            "x_y-z!?",
            "",
            "😀9z",
        ];
        for s in samples.iter() {
            let out = (t.transform)(s);
            assert!(out.chars().all(|c| c.is_ascii_alphanumeric()), "{:?}", out);
            let expected: String = s.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
            assert_eq!(out, expected);
            assert_eq!((t.transform)(&out), out);
        }
        assert_eq!((t.transform)("12.345.678-A"), "12345678A");
        assert_eq!((t.transform)("Ñandú 42"), "and42");
    }

    #[test]
    fn text_trim_only_strips_the_edges() {
        let t = builtin("text_trim");
        assert_eq!((t.transform)("  John   Smith \t\n"), "John   Smith");
        assert_eq!((t.transform)("\n\tA\tB\n"), "A\tB");
        assert_eq!((t.transform)("   "), "");
        for s in [" a ", "a", "\tx y\t", ""].iter() {
            let out = (t.transform)(s);
            assert_eq!(out, out.trim());
            assert!(s.contains(out.as_str()));
        }
    }

    #[test]
    fn free_text_is_untouched() {
        let t = builtin("free_text");
        assert_eq!((t.transform)("  Mixed Case  "), "  Mixed Case  ");
        assert_eq!((t.validate)("anything"), None);
    }

    #[test]
    fn number_accepts_only_digits() {
        let t = builtin("number");
        for ok in ["123", "007", "00000"].iter() {
            assert_eq!((t.validate)(ok), None, "{}", ok);
        }
        for bad in ["12.3", "-1", "1,000", "", "12a", " 12", "١٢"].iter() {
            assert_eq!((t.validate)(bad), Some(ErrorCode::InvalidNumber), "{}", bad);
        }
        assert_eq!((t.transform)("007"), "007");
    }

    #[test]
    fn date_accepts_common_notations() {
        let t = builtin("date");
        let ok = [
            "2024-01-15",
            "15/01/2024",
            "01/15/2024",
            "15.01.2024",
            "2024/01/15",
            "15 January 2024",
            "Jan 15, 2024",
            "20240115",
        ];
        for s in ok.iter() {
            assert_eq!((t.validate)(s), None, "{}", s);
        }
        for bad in ["not a date", "", "2024-02-30", "15/01/24", "2024-13-01"].iter() {
            assert_eq!((t.validate)(bad), Some(ErrorCode::InvalidDate), "{}", bad);
        }
        // No normalization on transform.
        assert_eq!((t.transform)("15/01/2024"), "15/01/2024");
    }

    #[test]
    fn parse_date_prefers_day_first() {
        assert_eq!(parse_date("01/02/2024"), NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(parse_date("01/15/2024"), NaiveDate::from_ymd_opt(2024, 1, 15));
    }

    #[test]
    fn registry_skips_blank_cells_and_falls_back_to_noop() {
        let reg = TypeRegistry::builtin();
        assert_eq!(reg.validate(&TypeTag::Number, ""), None);
        assert_eq!(reg.validate(&TypeTag::Number, "  "), None);
        assert_eq!(
            reg.validate(&TypeTag::Number, "abc"),
            Some(ErrorCode::InvalidNumber)
        );

        let unknown = TypeTag::from_tag("postal_code");
        assert!(!reg.is_known(&unknown));
        assert_eq!(reg.validate(&unknown, "anything"), None);
        assert_eq!(reg.transform(&unknown, " kept "), " kept ");
    }

    #[test]
    fn registry_can_be_extended() {
        fn upper(v: &str) -> String {
            v.to_uppercase()
        }
        fn five_chars(v: &str) -> Option<ErrorCode> {
            if v.chars().count() == 5 {
                None
            } else {
                Some(ErrorCode::Custom("invalid_postal_code".to_string()))
            }
        }
        let mut reg = TypeRegistry::builtin();
        let tag = TypeTag::from_tag("postal_code");
        reg.register(
            tag.clone(),
            ColumnType {
                validate: five_chars,
                transform: upper,
            },
        );
        assert!(reg.is_known(&tag));
        assert_eq!(reg.transform(&tag, "ab12c"), "AB12C");
        assert_eq!(
            reg.validate(&tag, "123").map(|e| e.to_string()),
            Some("invalid_postal_code".to_string())
        );
        assert_eq!(reg.known_tags().len(), 6);
    }

    #[test]
    fn tags_round_trip_through_their_names() {
        for t in TypeRegistry::builtin().known_tags() {
            assert_eq!(&TypeTag::from_tag(t.as_str()), t);
        }
        assert_eq!(TypeTag::from_tag(" number "), TypeTag::Number);
        assert_eq!(TypeTag::default(), TypeTag::FreeText);
    }
}
