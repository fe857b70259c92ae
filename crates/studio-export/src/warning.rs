use serde::Serialize;

use crate::error::ExtractionFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    ExtractionFault,
    RowCapReached,
    RegisteredTargetMissing,
    StageFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanWarning {
    pub code: WarningCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ScanWarning {
    #[must_use]
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stage: None,
            location: None,
        }
    }

    #[must_use]
    pub fn with_stage(mut self, stage: &'static str) -> Self {
        self.stage = Some(stage);
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl From<ExtractionFault> for ScanWarning {
    fn from(fault: ExtractionFault) -> Self {
        Self::new(WarningCode::ExtractionFault, fault.reason)
            .with_stage(fault.stage)
            .with_location(fault.location)
    }
}
