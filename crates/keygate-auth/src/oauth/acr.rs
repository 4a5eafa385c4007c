//! Essential ACR consistency check.

use crate::claims::{ACR_ATTRIBUTE, Attributes};
use crate::error::AuthorizationRejection;

/// Verifies that the emitted `acr` attribute covers every essential value
/// requested by the relying party.
///
/// # Errors
///
/// Returns a redirectable `invalid_request` rejection otherwise.
pub fn check_essential_acr(
    essential: &[String],
    attributes: &Attributes,
) -> Result<(), AuthorizationRejection> {
    if essential.is_empty() {
        return Ok(());
    }
    let emitted = attributes
        .get(ACR_ATTRIBUTE)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if let Some(missing) = essential.iter().find(|v| !emitted.contains(v)) {
        tracing::warn!(acr = %missing, "Essential ACR value was not satisfied");
        return Err(AuthorizationRejection::consistency("unsupported acr value"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_acr(values: &[&str]) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(
            "acr".to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        attributes
    }

    #[test]
    fn test_no_essential_values() {
        assert!(check_essential_acr(&[], &Attributes::new()).is_ok());
    }

    #[test]
    fn test_superset_passes() {
        let essential = vec!["acrReq".to_string()];
        assert!(check_essential_acr(&essential, &with_acr(&["acrReq", "other"])).is_ok());
    }

    #[test]
    fn test_mismatch_is_redirected_invalid_request() {
        let essential = vec!["acrReq".to_string()];
        let err = check_essential_acr(&essential, &with_acr(&["weak"])).unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
        assert_eq!(err.description(), "unsupported acr value");
        assert!(err.is_redirectable());

        assert!(check_essential_acr(&essential, &Attributes::new()).is_err());
    }
}
