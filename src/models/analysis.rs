use serde::{Deserialize, Serialize};

/// Body of `POST /api/tryon?action=analyze`.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub image_url: String,
}

/// Reply of the matching analysis endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub matching_analysis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_percentage: Option<u8>,
}

/// Parsed model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingAnalysis {
    pub percentage: Option<u8>,
    pub description: String,
}

impl From<MatchingAnalysis> for AnalyzeResponse {
    fn from(analysis: MatchingAnalysis) -> Self {
        Self {
            matching_analysis: analysis.description,
            match_percentage: analysis.percentage,
        }
    }
}
