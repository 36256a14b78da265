use claim_context::{BillCheck, DisplayMessage, PolicyRecord, PolicySummary};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct InsurerPlans {
    pub insurer: String,
    pub plans: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PolicyResponse {
    pub policy: PolicyRecord,
    pub summary: PolicySummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractBillRequest {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data_base64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BillResponse {
    pub bill_text: String,
    pub chars: usize,
}

#[derive(Debug, Deserialize)]
pub struct BillQuery {
    pub insurer: Option<String>,
    pub plan: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BillStatusResponse {
    pub bill_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<BillCheck>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub insurer: String,
    pub plan: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The assistant reply as the model produced it (trimmed).
    pub reply: String,
    /// The same reply reshaped for display.
    pub formatted: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<DisplayMessage>,
}
