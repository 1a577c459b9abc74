use crate::errors::ClientError;

/// Funding stage used when the caller does not pick one.
pub const DEFAULT_STAGE: &str = "Series A";

/// Parameters of one analysis run.
///
/// Serialized verbatim as the `POST /analyze` body.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunRequest {
    /// Company to analyze.
    pub company: String,
    /// Funding stage hint (`Seed`, `Series A`, `Growth`, ...).
    pub stage: String,
    /// Exit path hint (`IPO`, `Strategic Acquisition`, or empty).
    pub exit_type: String,
}

impl RunRequest {
    /// Creates a request with the default stage and no exit type.
    pub fn new(company: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            stage: DEFAULT_STAGE.to_string(),
            exit_type: String::new(),
        }
    }

    /// Sets the funding stage.
    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    /// Sets the exit type.
    pub fn exit_type(mut self, exit_type: impl Into<String>) -> Self {
        self.exit_type = exit_type.into();
        self
    }

    /// Checks the request and returns the normalized copy that goes on the wire.
    pub(crate) fn validated(&self) -> Result<Self, ClientError> {
        let company = self.company.trim();
        if company.is_empty() {
            return Err(ClientError::Validation(
                "company name must not be empty".into(),
            ));
        }
        let stage = match self.stage.trim() {
            "" => DEFAULT_STAGE,
            stage => stage,
        };
        Ok(Self {
            company: company.to_string(),
            stage: stage.to_string(),
            exit_type: self.exit_type.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_uses_default_stage() {
        let request = RunRequest::new("Stripe");
        assert_eq!(request.stage, "Series A");
        assert!(request.exit_type.is_empty());
    }

    #[test]
    fn validation_rejects_blank_company() {
        let err = RunRequest::new("   ").validated().expect_err("blank company");
        assert!(matches!(err, ClientError::Validation(msg) if msg.contains("company")));
    }

    #[test]
    fn validation_trims_fields() {
        let request = RunRequest::new("  Ramp ")
            .stage(" ")
            .exit_type(" IPO ")
            .validated()
            .expect("valid");
        assert_eq!(request.company, "Ramp");
        assert_eq!(request.stage, DEFAULT_STAGE);
        assert_eq!(request.exit_type, "IPO");
    }

    #[test]
    fn request_serializes_wire_field_names() {
        let value = serde_json::to_value(RunRequest::new("Figma").exit_type("IPO")).expect("json");
        assert_eq!(
            value,
            serde_json::json!({"company": "Figma", "stage": "Series A", "exit_type": "IPO"})
        );
    }
}
