use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ContractDraft, FieldErrors, PartyDetails, SignatureError};

/// What the signer hands over when signing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignatureInput {
    Drawn {
        image: String,
        #[serde(default)]
        text: Option<String>,
    },
    Stored,
}

/// Signature checked client-side and ready for the sign endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignatureSubmission {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_image: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub use_stored_signature: bool,
}

impl SignatureInput {
    pub fn validate(self) -> Result<SignatureSubmission, SignatureError> {
        match self {
            SignatureInput::Stored => Ok(SignatureSubmission {
                signature_text: None,
                signature_image: None,
                use_stored_signature: true,
            }),
            SignatureInput::Drawn { image, text } => {
                let image = validate_signature_image(&image)?;
                let text = text
                    .map(|text| text.trim().to_string())
                    .filter(|text| !text.is_empty());

                Ok(SignatureSubmission {
                    signature_text: text,
                    signature_image: Some(image),
                    use_stored_signature: false,
                })
            }
        }
    }
}

pub fn validate_signature_image(image: &str) -> Result<String, SignatureError> {
    let image = image.trim();
    if image.is_empty() {
        return Err(SignatureError::EmptyImage);
    }
    if !(image.starts_with("data:image/")
        || image.starts_with("https://")
        || image.starts_with("http://"))
    {
        return Err(SignatureError::UnsupportedImage);
    }
    Ok(image.to_string())
}

impl ContractDraft {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        if self.property_id.trim().is_empty() {
            errors.insert("propertyId", "property is required");
        }
        if self.landlord_id.trim().is_empty() {
            errors.insert("landlordId", "landlord is required");
        }
        if self.tenant_id.trim().is_empty() {
            errors.insert("tenantId", "tenant is required");
        } else if self.tenant_id.trim() == self.landlord_id.trim() {
            errors.insert("tenantId", "tenant must differ from landlord");
        }
        if self.monthly_rent <= Decimal::ZERO {
            errors.insert("monthlyRent", "monthly rent must be positive");
        }
        if self.security_deposit < Decimal::ZERO {
            errors.insert("securityDeposit", "security deposit cannot be negative");
        }

        match (self.start_date, self.end_date) {
            (None, _) => errors.insert("startDate", "start date is required"),
            (_, None) => errors.insert("endDate", "end date is required"),
            (Some(start), Some(end)) if start >= end => {
                errors.insert("endDate", "end date must be after start date")
            }
            _ => {}
        }

        if self.terms.trim().is_empty() {
            errors.insert("terms", "terms are required");
        }

        validate_party(
            &self.landlord_details,
            "landlordDetails.name",
            "landlordDetails.email",
            &mut errors,
        );
        validate_party(
            &self.tenant_details,
            "tenantDetails.name",
            "tenantDetails.email",
            &mut errors,
        );

        errors.into_result()
    }
}

fn validate_party(
    details: &PartyDetails,
    name_field: &'static str,
    email_field: &'static str,
    errors: &mut FieldErrors,
) {
    if details.name.trim().is_empty() {
        errors.insert(name_field, "name is required");
    }
    if let Some(email) = details.email.as_deref().map(str::trim) {
        if !email.is_empty() && !email.contains('@') {
            errors.insert(email_field, "email is invalid");
        }
    }
}

pub fn validate_message(content: &str) -> Result<String, FieldErrors> {
    let content = content.trim();
    if content.is_empty() {
        let mut errors = FieldErrors::new();
        errors.insert("content", "message cannot be empty");
        return Err(errors);
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn draft() -> ContractDraft {
        ContractDraft {
            property_id: "p-1".to_string(),
            chat_id: Some("chat-1".to_string()),
            landlord_id: "u-landlord".to_string(),
            tenant_id: "u-tenant".to_string(),
            monthly_rent: Decimal::new(1200, 0),
            security_deposit: Decimal::new(2400, 0),
            start_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 4, 30),
            terms: "12 month lease".to_string(),
            conditions: None,
            landlord_details: PartyDetails {
                name: "Ada Landlord".to_string(),
                email: Some("ada@example.com".to_string()),
                ..PartyDetails::default()
            },
            tenant_details: PartyDetails {
                name: "Tom Tenant".to_string(),
                ..PartyDetails::default()
            },
        }
    }

    #[test]
    fn complete_draft_passes() {
        assert_eq!(draft().validate(), Ok(()));
    }

    #[test]
    fn reports_every_failing_field() {
        let mut draft = draft();
        draft.monthly_rent = Decimal::ZERO;
        draft.terms = "   ".to_string();
        draft.end_date = NaiveDate::from_ymd_opt(2024, 4, 1);
        draft.tenant_details.name.clear();
        draft.landlord_details.email = Some("not-an-email".to_string());

        let errors = draft.validate().unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains("monthlyRent"));
        assert!(errors.contains("terms"));
        assert_eq!(errors.get("endDate"), Some("end date must be after start date"));
        assert!(errors.contains("tenantDetails.name"));
        assert!(errors.contains("landlordDetails.email"));
    }

    #[test]
    fn landlord_cannot_lease_to_self() {
        let mut draft = draft();
        draft.tenant_id = draft.landlord_id.clone();

        let errors = draft.validate().unwrap_err();
        assert_eq!(errors.get("tenantId"), Some("tenant must differ from landlord"));
    }

    #[test]
    fn blank_signature_image_is_rejected() {
        let input = SignatureInput::Drawn {
            image: " \n\t".to_string(),
            text: Some("Ada".to_string()),
        };
        assert_eq!(input.validate(), Err(SignatureError::EmptyImage));
    }

    #[test]
    fn drawn_signature_is_trimmed() {
        let submission = SignatureInput::Drawn {
            image: " data:image/png;base64,AAAA ".to_string(),
            text: Some("  ".to_string()),
        }
        .validate()
        .unwrap();

        assert_eq!(
            submission.signature_image.as_deref(),
            Some("data:image/png;base64,AAAA")
        );
        assert_eq!(submission.signature_text, None);
        assert!(!submission.use_stored_signature);
    }

    #[test]
    fn stored_signature_serializes_flag_only() {
        let submission = SignatureInput::Stored.validate().unwrap();
        let body = serde_json::to_value(&submission).unwrap();
        assert_eq!(body, serde_json::json!({ "useStoredSignature": true }));
    }

    #[test]
    fn blank_message_is_rejected() {
        assert!(validate_message("  ").is_err());
        assert_eq!(validate_message(" hi ").unwrap(), "hi");
    }
}
