use feedscout_shared::ReasonCode;

use super::{CheckContext, CheckFailure, QualityCheck};

/// Rejects documents whose normalized body is shorter than `min_chars`.
#[derive(Debug, Clone, Copy)]
pub struct MinLengthCheck {
    min_chars: usize,
}

impl MinLengthCheck {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }
}

impl QualityCheck for MinLengthCheck {
    fn check(&self, ctx: &CheckContext<'_>) -> Result<(), CheckFailure> {
        let chars = ctx.document.body.chars().count();
        if chars < self.min_chars {
            return Err(CheckFailure::new(
                ReasonCode::ContentTooShort,
                format!("{chars} chars, need {}", self.min_chars),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "min-length"
    }
}
