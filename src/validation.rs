use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::ApiError;

pub const END_BEFORE_START: &str = "end date must not be before start date";
pub const CHECK_OUT_BEFORE_CHECK_IN: &str = "check-out must be after check-in";

/// Schema-level error attributed to `field` instead of `__all__`.
pub fn field_error(field: &'static str, code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err.add_param(Cow::Borrowed("field"), &field);
    err
}

pub fn check_date_range(
    start: NaiveDate,
    end: NaiveDate,
    end_field: &'static str,
) -> Result<(), ValidationError> {
    if end < start {
        return Err(field_error(end_field, "date_range", END_BEFORE_START));
    }
    Ok(())
}

pub fn check_datetime_range(
    start: NaiveDateTime,
    end: NaiveDateTime,
    end_field: &'static str,
) -> Result<(), ValidationError> {
    if end < start {
        return Err(field_error(end_field, "date_range", END_BEFORE_START));
    }
    Ok(())
}

pub fn check_time_order(
    check_in: Option<NaiveTime>,
    check_out: Option<NaiveTime>,
) -> Result<(), ValidationError> {
    match (check_in, check_out) {
        (Some(i), Some(o)) if o <= i => Err(field_error(
            "check_out",
            "time_order",
            CHECK_OUT_BEFORE_CHECK_IN,
        )),
        _ => Ok(()),
    }
}

/// Rejects whitespace-only strings, which `length(min = 1)` lets through.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some(Cow::Borrowed("must not be blank"));
        return Err(err);
    }
    Ok(())
}

/// Runs the derived rules and converts failures into a 400 response.
pub fn validated<T: Validate>(payload: &T) -> Result<(), ApiError> {
    payload.validate().map_err(ApiError::from)
}

/// Reports a standalone check (one that needs stored data) like a derived one.
pub fn checked(result: Result<(), ValidationError>) -> Result<(), ApiError> {
    result.map_err(|err| {
        let mut errors = ValidationErrors::new();
        errors.add("__all__", err);
        ApiError::from(errors)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_before_start_is_reported_on_end_field() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let err = check_date_range(start, end, "end_date").unwrap_err();
        assert_eq!(err.message.as_deref(), Some(END_BEFORE_START));
        assert_eq!(err.params.get("field").and_then(|v| v.as_str()), Some("end_date"));
    }

    #[test]
    fn same_day_range_is_valid() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        assert!(check_date_range(day, day, "end_date").is_ok());
    }

    #[test]
    fn check_out_must_follow_check_in() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0);
        let eight = NaiveTime::from_hms_opt(8, 0, 0);
        assert!(check_time_order(nine, eight).is_err());
        assert!(check_time_order(nine, nine).is_err());
        assert!(check_time_order(eight, nine).is_ok());
        assert!(check_time_order(None, eight).is_ok());
    }

    #[test]
    fn standalone_check_reports_its_field() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        match checked(check_date_range(start, end, "end_date")) {
            Err(ApiError::Validation(fields)) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "end_date");
                assert_eq!(fields[0].message, END_BEFORE_START);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn blank_strings_are_rejected() {
        assert!(not_blank("   ").is_err());
        assert!(not_blank("x").is_ok());
    }
}
