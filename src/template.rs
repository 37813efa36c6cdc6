// 📦 Nested Template Format - What the template storage API loads and saves
//
// Field names and nesting (`fundingLines` / `calculations`) are fixed by the
// backend and must round-trip unchanged.

use serde::{Deserialize, Serialize};

use crate::tree::node::{
    AggregationType, CalculationType, FundingLineType, GroupRate, PercentageChangeBetweenAandB,
    ValueFormat,
};

// ============================================================================
// TEMPLATE CONTENT
// ============================================================================

/// Whole template document as stored by the backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_version: Option<String>,

    #[serde(default)]
    pub funding_lines: Vec<TemplateFundingLine>,
}

impl TemplateContent {
    pub fn new(funding_lines: Vec<TemplateFundingLine>) -> Self {
        TemplateContent {
            schema_version: None,
            template_version: None,
            funding_lines,
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ============================================================================
// FUNDING LINE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFundingLine {
    pub name: String,

    /// Code shown on statements; `null` for informational lines without one
    pub funding_line_code: Option<String>,

    pub template_line_id: u32,

    #[serde(rename = "type")]
    pub line_type: FundingLineType,

    #[serde(default)]
    pub funding_lines: Vec<TemplateFundingLine>,

    #[serde(default)]
    pub calculations: Vec<TemplateCalculation>,
}

// ============================================================================
// CALCULATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateCalculation {
    pub name: String,

    pub template_calculation_id: u32,

    #[serde(rename = "type")]
    pub calculation_type: CalculationType,

    pub aggregation_type: AggregationType,

    pub formula_text: String,

    pub value_format: ValueFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_enum_type_values: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_rate: Option<GroupRate>,

    #[serde(
        default,
        rename = "percentageChangeBetweenAandB",
        skip_serializing_if = "Option::is_none"
    )]
    pub percentage_change_between_a_and_b: Option<PercentageChangeBetweenAandB>,

    #[serde(default)]
    pub calculations: Vec<TemplateCalculation>,
}

// ============================================================================
// TESTS
// ============================================================================
