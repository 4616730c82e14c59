use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

pub type RecordId = String;
pub type TransitId = String;

/// Discriminator field carried by every stored record.
pub const DOC_TYPE_FIELD: &str = "docType";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Asset {
    #[serde(rename = "ID")]
    pub id: RecordId,
    pub color: String,
    pub size: Number,
    pub owner: String,
    pub appraised_value: Number,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Customer {
    #[serde(rename = "ID")]
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    pub transit_id: TransitId,
}

/// A world-state record. The `docType` tag selects the variant on the wire.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "docType", rename_all = "lowercase")]
pub enum Record {
    Asset(Asset),
    Customer(Customer),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocType {
    Asset,
    Customer,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Asset => "asset",
            DocType::Customer => "customer",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "asset" => Some(DocType::Asset),
            "customer" => Some(DocType::Customer),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a decoded mapping does not match either record variant.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record has no docType")]
    MissingDocType,
    #[error("unknown docType {0:?}")]
    UnknownDocType(String),
    #[error("invalid {doc_type} fields: {source}")]
    Fields {
        doc_type: DocType,
        #[source]
        source: serde_json::Error,
    },
}

impl Record {
    pub fn id(&self) -> &str {
        match self {
            Record::Asset(asset) => &asset.id,
            Record::Customer(customer) => &customer.id,
        }
    }

    pub fn doc_type(&self) -> DocType {
        match self {
            Record::Asset(_) => DocType::Asset,
            Record::Customer(_) => DocType::Customer,
        }
    }

    /// Mapping form of the record, `docType` included.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Validates a decoded mapping against the two variants. The field set
    /// must match exactly: no missing fields, no extras, no type coercion.
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let mut fields: Map<String, Value> = match value {
            Value::Object(fields) => fields,
            _ => return Err(SchemaError::NotAnObject),
        };
        let doc_type = match fields.remove(DOC_TYPE_FIELD) {
            Some(Value::String(tag)) => {
                DocType::parse(&tag).ok_or(SchemaError::UnknownDocType(tag))?
            }
            Some(other) => return Err(SchemaError::UnknownDocType(other.to_string())),
            None => return Err(SchemaError::MissingDocType),
        };
        let rest = Value::Object(fields);
        let wrap = |source: serde_json::Error| SchemaError::Fields { doc_type, source };
        match doc_type {
            DocType::Asset => serde_json::from_value(rest).map(Record::Asset).map_err(wrap),
            DocType::Customer => serde_json::from_value(rest)
                .map(Record::Customer)
                .map_err(wrap),
        }
    }
}

impl From<Asset> for Record {
    fn from(asset: Asset) -> Self {
        Record::Asset(asset)
    }
}

impl From<Customer> for Record {
    fn from(customer: Customer) -> Self {
        Record::Customer(customer)
    }
}
