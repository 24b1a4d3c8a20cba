//! Scoring input errors

use thiserror::Error;

/// Errors from validating scorer inputs
///
/// Scorers never fail on missing data; these only flag inputs that cannot
/// be placed on the map at all.
#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("Invalid coordinates ({lat}, {lon}) for {subject}")]
    InvalidCoordinates { subject: String, lat: f64, lon: f64 },

    #[error("Empty event type for event at ({lat}, {lon})")]
    EmptyEventType { lat: f64, lon: f64 },
}

/// Check that a point lies on the globe
pub fn validate_coordinates(subject: &str, lat: f64, lon: f64) -> Result<(), ScoringError> {
    let valid = lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon);

    if valid {
        Ok(())
    } else {
        Err(ScoringError::InvalidCoordinates {
            subject: subject.to_string(),
            lat,
            lon,
        })
    }
}
