//! Local fraud heuristics applied at registration and KYC submission.

use serde::{Deserialize, Serialize};

/// Confidence above which a flagged KYC submission is rejected outright.
pub const KYC_REJECT_CONFIDENCE: f64 = 0.7;

const MAX_LISTINGS_WITHOUT_KYC: u32 = 5;

/// Behavioural signals about the user being analysed.
#[derive(Debug, Clone, Default)]
pub struct UserSignals<'a> {
    pub email: &'a str,
    pub properties_posted: u32,
    pub kyc_verified: bool,
}

/// Result of a fraud analysis, returned to clients as `fraud_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAnalysis {
    pub is_fraud: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

impl FraudAnalysis {
    /// Whether a KYC submission with this analysis must go to manual review.
    #[must_use]
    pub fn requires_review(&self) -> bool {
        self.is_fraud && self.confidence > KYC_REJECT_CONFIDENCE
    }
}

#[must_use]
pub fn analyze_user(signals: &UserSignals<'_>) -> FraudAnalysis {
    let mut reasons = Vec::new();

    if signals.properties_posted > MAX_LISTINGS_WITHOUT_KYC && !signals.kyc_verified {
        reasons.push("User has posted many properties without KYC".to_owned());
    }

    let is_fraud = !reasons.is_empty();
    if !is_fraud {
        reasons.push("No suspicious patterns detected".to_owned());
    }

    tracing::debug!(
        email = signals.email,
        is_fraud,
        properties_posted = signals.properties_posted,
        "fraud analysis completed"
    );

    FraudAnalysis {
        is_fraud,
        confidence: if is_fraud { 0.8 } else { 0.1 },
        reasons,
    }
}
