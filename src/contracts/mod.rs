//! The fare-transfer contract: customer enrollment against a transit catalog
//! plus the generic asset operations the contract started out with.
//!
//! Every operation runs against the ledger handle of the invoking
//! transaction. Validation happens before the first write, so an `Err` never
//! leaves a partial update behind.

use serde_json::{Number, Value};

use crate::catalog::TransitCatalog;
use crate::codec;
use crate::config::{ConfigError, FareConfig, InitConfig};
use crate::error::{ContractError, Result};
use crate::ledger::{state_root, LedgerStub, StateIterator};
use crate::records::{Asset, Customer, DocType, Record};

pub struct FareTransfer {
    catalog: TransitCatalog,
    seed: InitConfig,
}

impl FareTransfer {
    pub fn new(catalog: TransitCatalog) -> Self {
        Self {
            catalog,
            seed: InitConfig::default(),
        }
    }

    pub fn with_seed(mut self, seed: InitConfig) -> Self {
        self.seed = seed;
        self
    }

    pub fn from_config(config: &FareConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.transit_catalog()?).with_seed(config.init))
    }

    pub fn catalog(&self) -> &TransitCatalog {
        &self.catalog
    }

    /// Writes the demo world state. Existing values under the seed ids are
    /// overwritten.
    pub fn init_ledger<L: LedgerStub + ?Sized>(&self, ledger: &mut L) -> Result<()> {
        let mut records: Vec<Record> = Vec::new();
        if self.seed.seed_assets {
            records.extend(seed_assets().into_iter().map(Record::Asset));
        }
        if self.seed.seed_customers {
            records.extend(seed_customers().into_iter().map(Record::Customer));
        }
        for record in &records {
            store(ledger, record)?;
        }
        tracing::info!(records = records.len(), "seeded world state");
        Ok(())
    }

    pub fn enroll_customer<L: LedgerStub + ?Sized>(
        &self,
        ledger: &mut L,
        id: &str,
        first_name: &str,
        last_name: &str,
        transit_id: &str,
    ) -> Result<Customer> {
        if exists(&*ledger, id)? {
            return Err(ContractError::AlreadyExists { id: id.to_string() });
        }
        self.check_transit(transit_id)?;

        let customer = Customer {
            id: id.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            transit_id: transit_id.to_string(),
        };
        store(ledger, &Record::Customer(customer.clone()))?;
        tracing::debug!(id, transit_id, "enrolled customer");
        Ok(customer)
    }

    /// Returns the record stored under `id`, whichever variant it is.
    pub fn get_customer<L: LedgerStub + ?Sized>(&self, ledger: &L, id: &str) -> Result<Record> {
        load(ledger, id)
    }

    pub fn read_asset<L: LedgerStub + ?Sized>(&self, ledger: &L, id: &str) -> Result<Asset> {
        match load(ledger, id)? {
            Record::Asset(asset) => Ok(asset),
            Record::Customer(_) => Err(wrong_doc_type(id, DocType::Asset)),
        }
    }

    /// Moves the customer to another transit system. The record keeps its id.
    pub fn update_primary_transit<L: LedgerStub + ?Sized>(
        &self,
        ledger: &mut L,
        id: &str,
        new_transit_id: &str,
    ) -> Result<Customer> {
        self.check_transit(new_transit_id)?;
        let mut customer = match load(&*ledger, id)? {
            Record::Customer(customer) => customer,
            Record::Asset(_) => return Err(wrong_doc_type(id, DocType::Customer)),
        };
        customer.transit_id = new_transit_id.to_string();
        store(ledger, &Record::Customer(customer.clone()))?;
        tracing::debug!(id, transit_id = new_transit_id, "updated primary transit");
        Ok(customer)
    }

    pub fn delete_customer<L: LedgerStub + ?Sized>(&self, ledger: &mut L, id: &str) -> Result<()> {
        delete(ledger, id)
    }

    pub fn delete_asset<L: LedgerStub + ?Sized>(&self, ledger: &mut L, id: &str) -> Result<()> {
        delete(ledger, id)
    }

    pub fn customer_exists<L: LedgerStub + ?Sized>(&self, ledger: &L, id: &str) -> Result<bool> {
        exists(ledger, id)
    }

    pub fn asset_exists<L: LedgerStub + ?Sized>(&self, ledger: &L, id: &str) -> Result<bool> {
        exists(ledger, id)
    }

    pub fn create_asset<L: LedgerStub + ?Sized>(
        &self,
        ledger: &mut L,
        id: &str,
        color: &str,
        size: impl Into<Number>,
        owner: &str,
        appraised_value: impl Into<Number>,
    ) -> Result<Asset> {
        if exists(&*ledger, id)? {
            return Err(ContractError::AlreadyExists { id: id.to_string() });
        }
        let asset = Asset {
            id: id.to_string(),
            color: color.to_string(),
            size: codec::normalize_number(size.into()),
            owner: owner.to_string(),
            appraised_value: codec::normalize_number(appraised_value.into()),
        };
        store(ledger, &Record::Asset(asset.clone()))?;
        tracing::debug!(id, "created asset");
        Ok(asset)
    }

    /// Replaces every field of an existing asset except its id.
    pub fn update_asset<L: LedgerStub + ?Sized>(
        &self,
        ledger: &mut L,
        id: &str,
        color: &str,
        size: impl Into<Number>,
        owner: &str,
        appraised_value: impl Into<Number>,
    ) -> Result<Asset> {
        let mut asset = self.read_asset(&*ledger, id)?;
        asset.color = color.to_string();
        asset.size = codec::normalize_number(size.into());
        asset.owner = owner.to_string();
        asset.appraised_value = codec::normalize_number(appraised_value.into());
        store(ledger, &Record::Asset(asset.clone()))?;
        tracing::debug!(id, "updated asset");
        Ok(asset)
    }

    /// Sets a new owner and returns the previous one.
    pub fn transfer_asset<L: LedgerStub + ?Sized>(
        &self,
        ledger: &mut L,
        id: &str,
        new_owner: &str,
    ) -> Result<String> {
        let mut asset = self.read_asset(&*ledger, id)?;
        let old_owner = std::mem::replace(&mut asset.owner, new_owner.to_string());
        store(ledger, &Record::Asset(asset))?;
        tracing::debug!(id, from = %old_owner, to = new_owner, "transferred asset");
        Ok(old_owner)
    }

    /// Lazily lists the whole namespace in key order.
    pub fn get_all_customers<'a, L: LedgerStub + ?Sized>(
        &self,
        ledger: &'a L,
    ) -> Result<Listing<'a>> {
        let scan = ledger.get_state_by_range("", "")?;
        Ok(Listing { scan })
    }

    /// Drains the listing into a canonical JSON array: records as objects,
    /// undecodable values as strings.
    pub fn get_all_customers_json<L: LedgerStub + ?Sized>(&self, ledger: &L) -> Result<String> {
        let mut values = Vec::new();
        for entry in self.get_all_customers(ledger)? {
            values.push(entry?.to_value()?);
        }
        let bytes = codec::encode_value(&Value::Array(values))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Merkle root of the whole namespace; equal on every peer holding the
    /// same world state.
    pub fn state_root<L: LedgerStub + ?Sized>(&self, ledger: &L) -> Result<[u8; 32]> {
        let scan = ledger.get_state_by_range("", "")?;
        Ok(state_root(scan)?)
    }

    pub fn state_root_hex<L: LedgerStub + ?Sized>(&self, ledger: &L) -> Result<String> {
        Ok(hex::encode(self.state_root(ledger)?))
    }

    fn check_transit(&self, transit_id: &str) -> Result<()> {
        if self.catalog.is_valid(transit_id) {
            Ok(())
        } else {
            Err(ContractError::InvalidTransit {
                transit_id: transit_id.to_string(),
            })
        }
    }
}

/// One value from [`Listing`], tagged with the ledger key it was read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListedEntry {
    Record { key: String, record: Record },
    /// Stored bytes that are not a canonical record, untouched.
    Opaque { key: String, raw: Vec<u8> },
}

impl ListedEntry {
    /// Ledger key of the entry. May differ from the record's `ID` for values
    /// written by other contract versions.
    pub fn key(&self) -> &str {
        match self {
            ListedEntry::Record { key, .. } | ListedEntry::Opaque { key, .. } => key,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            ListedEntry::Record { record, .. } => Some(record),
            ListedEntry::Opaque { .. } => None,
        }
    }

    fn to_value(&self) -> Result<Value> {
        match self {
            ListedEntry::Record { record, .. } => record
                .to_value()
                .map_err(|err| ContractError::MalformedRecord(err.into())),
            ListedEntry::Opaque { raw, .. } => {
                Ok(Value::String(String::from_utf8_lossy(raw).into_owned()))
            }
        }
    }
}

/// Decoding view over a full-namespace scan. Releases the host cursor when
/// drained, closed or dropped.
#[derive(Debug)]
pub struct Listing<'a> {
    scan: StateIterator<'a>,
}

impl Listing<'_> {
    pub fn close(self) {
        self.scan.close();
    }
}

impl Iterator for Listing<'_> {
    type Item = Result<ListedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let kv = match self.scan.next()? {
            Ok(kv) => kv,
            Err(err) => return Some(Err(err.into())),
        };
        let entry = match codec::decode(&kv.value) {
            Ok(record) => ListedEntry::Record {
                key: kv.key,
                record,
            },
            Err(err) => {
                tracing::warn!(key = %kv.key, error = %err, "listing undecodable value as opaque");
                ListedEntry::Opaque {
                    key: kv.key,
                    raw: kv.value,
                }
            }
        };
        Some(Ok(entry))
    }
}

fn load<L: LedgerStub + ?Sized>(ledger: &L, id: &str) -> Result<Record> {
    let bytes = ledger
        .get_state(id)?
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ContractError::NotFound { id: id.to_string() })?;
    Ok(codec::decode(&bytes)?)
}

fn store<L: LedgerStub + ?Sized>(ledger: &mut L, record: &Record) -> Result<()> {
    let bytes = codec::encode(record)?;
    ledger.put_state(record.id(), bytes)?;
    Ok(())
}

fn exists<L: LedgerStub + ?Sized>(ledger: &L, id: &str) -> Result<bool> {
    Ok(ledger
        .get_state(id)?
        .is_some_and(|bytes| !bytes.is_empty()))
}

fn delete<L: LedgerStub + ?Sized>(ledger: &mut L, id: &str) -> Result<()> {
    if !exists(&*ledger, id)? {
        return Err(ContractError::NotFound { id: id.to_string() });
    }
    ledger.delete_state(id)?;
    tracing::debug!(id, "deleted record");
    Ok(())
}

fn wrong_doc_type(id: &str, expected: DocType) -> ContractError {
    ContractError::WrongDocType {
        id: id.to_string(),
        expected,
    }
}

fn seed_assets() -> Vec<Asset> {
    [
        ("asset1", "blue", 5, "Tomoko", 300),
        ("asset2", "red", 5, "Brad", 400),
        ("asset3", "green", 10, "Jin Soo", 500),
        ("asset4", "yellow", 10, "Max", 600),
        ("asset5", "black", 15, "Adriana", 700),
        ("asset6", "white", 15, "Michel", 800),
    ]
    .into_iter()
    .map(|(id, color, size, owner, appraised_value): (&str, &str, u64, &str, u64)| Asset {
        id: id.into(),
        color: color.into(),
        size: size.into(),
        owner: owner.into(),
        appraised_value: appraised_value.into(),
    })
    .collect()
}

fn seed_customers() -> Vec<Customer> {
    vec![Customer {
        id: "customer1".into(),
        first_name: "Brad".into(),
        last_name: "Pitt".into(),
        transit_id: "TTC".into(),
    }]
}
