use serde::Deserialize;
use serde::Serialize;

/// A document the API accepts for creation.
///
/// Implementors render themselves to the JSON wire format. Add a new
/// document type by implementing this trait for its record.
pub trait Document: Serialize {
    /// The API's name for this document type.
    const DOC_TYPE: &'static str;

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// True when the document carries no data at all and submitting it
    /// would be a caller mistake.
    fn is_blank(&self) -> bool {
        false
    }
}

/// Introduction into circulation of goods produced in the RF
/// (`LP_INTRODUCE_GOODS`).
///
/// Absent fields are sent as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LpIntroduceGoods {
    pub description: Option<Description>,
    pub doc_id: Option<String>,
    pub doc_status: Option<String>,
    pub doc_type: Option<String>,
    #[serde(rename = "importRequest")]
    pub import_request: Option<bool>,
    pub owner_inn: Option<String>,
    pub participant_inn: Option<String>,
    pub producer_inn: Option<String>,
    pub production_date: Option<String>,
    pub production_type: Option<String>,
    pub products: Option<Vec<Product>>,
    pub reg_date: Option<String>,
    pub reg_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Description {
    #[serde(rename = "participantInn")]
    pub participant_inn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub certificate_document: Option<String>,
    pub certificate_document_date: Option<String>,
    pub certificate_document_number: Option<String>,
    pub owner_inn: Option<String>,
    pub producer_inn: Option<String>,
    pub production_date: Option<String>,
    pub tnved_code: Option<String>,
    pub uit_code: Option<String>,
    pub uitu_code: Option<String>,
}

impl Document for LpIntroduceGoods {
    const DOC_TYPE: &'static str = "LP_INTRODUCE_GOODS";

    fn is_blank(&self) -> bool {
        *self == Self::default()
    }
}

impl Description {
    pub fn new(participant_inn: impl Into<String>) -> Self {
        Self {
            participant_inn: Some(participant_inn.into()),
        }
    }
}
