//! Per-bank field extraction rules.
//!
//! Each bank entry pairs a sender-domain list with `field → label` patterns.
//! A label is spliced unescaped in front of `\s*:\s*(.+)`, so it may carry
//! regex syntax of its own (`Valor( Pago)?`). The value is always the last
//! capture group, after any groups the label defines.
//!
//! Bank selection is a linear scan in configuration order and the first
//! entry whose domain appears in the sender wins. Two banks sharing a
//! domain therefore resolve to whichever is listed first.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::ExtractError;
use crate::mail::RawMessage;
use crate::pipeline::types::{PROVENANCE_FIELDS, PaymentDetails};

/// Suffix appended to every label pattern.
const VALUE_SUFFIX: &str = r"\s*:\s*(.+)";

/// One bank's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankProfile {
    pub id: String,
    pub sender_domains: Vec<String>,
    pub fields: BTreeMap<String, String>,
}

/// Bank profiles in the order they were configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankRules {
    banks: Vec<BankProfile>,
}

impl BankRules {
    pub fn new(banks: Vec<BankProfile>) -> Self {
        Self { banks }
    }

    pub fn banks(&self) -> &[BankProfile] {
        &self.banks
    }

    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }
}

/// A bank entry as written in YAML: either the long form with explicit
/// domains, or a bare field map whose bank id doubles as the domain.
#[derive(Deserialize)]
#[serde(untagged)]
enum BankEntry {
    Full {
        sender_domains: Vec<String>,
        fields: BTreeMap<String, String>,
    },
    Fields(BTreeMap<String, String>),
}

impl<'de> Deserialize<'de> for BankRules {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedBanks;

        impl<'de> Visitor<'de> for OrderedBanks {
            type Value = BankRules;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of bank id to field rules")
            }

            fn visit_map<A>(self, mut map: A) -> Result<BankRules, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut banks = Vec::new();
                while let Some((id, entry)) = map.next_entry::<String, BankEntry>()? {
                    let (sender_domains, fields) = match entry {
                        BankEntry::Full {
                            sender_domains,
                            fields,
                        } => (sender_domains, fields),
                        BankEntry::Fields(fields) => (vec![id.clone()], fields),
                    };
                    banks.push(BankProfile {
                        id,
                        sender_domains,
                        fields,
                    });
                }
                Ok(BankRules { banks })
            }
        }

        deserializer.deserialize_map(OrderedBanks)
    }
}

/// A bank profile with its field patterns compiled.
#[derive(Debug)]
struct CompiledBank {
    id: String,
    domains: Vec<String>,
    fields: Vec<(String, Regex)>,
}

/// Applies bank rules to extracted attachment text.
#[derive(Debug)]
pub struct FieldExtractor {
    banks: Vec<CompiledBank>,
}

impl FieldExtractor {
    /// Compile every label pattern up front so a bad one fails at startup.
    pub fn new(rules: &BankRules) -> Result<Self, ExtractError> {
        let mut banks = Vec::with_capacity(rules.banks.len());
        for bank in &rules.banks {
            let mut fields = Vec::with_capacity(bank.fields.len());
            for (field, label) in &bank.fields {
                if PROVENANCE_FIELDS.contains(&field.as_str()) {
                    return Err(ExtractError::ReservedField {
                        bank: bank.id.clone(),
                        field: field.clone(),
                    });
                }
                let regex = Regex::new(&format!("{label}{VALUE_SUFFIX}")).map_err(|e| {
                    ExtractError::InvalidPattern {
                        bank: bank.id.clone(),
                        field: field.clone(),
                        reason: e.to_string(),
                    }
                })?;
                fields.push((field.clone(), regex));
            }
            banks.push(CompiledBank {
                id: bank.id.clone(),
                domains: bank
                    .sender_domains
                    .iter()
                    .map(|d| d.trim().to_lowercase())
                    .filter(|d| !d.is_empty())
                    .collect(),
                fields,
            });
        }
        Ok(Self { banks })
    }

    /// Id of the first bank whose domain appears in `sender`.
    pub fn select_bank(&self, sender: &str) -> Option<&str> {
        self.find_bank(sender).map(|b| b.id.as_str())
    }

    fn find_bank(&self, sender: &str) -> Option<&CompiledBank> {
        let sender = sender.to_lowercase();
        self.banks
            .iter()
            .find(|bank| bank.domains.iter().any(|d| sender.contains(d.as_str())))
    }

    /// Extract the selected bank's fields from `text`.
    ///
    /// Unmatched fields are simply absent. The result always carries the
    /// message's provenance; callers check [`PaymentDetails::is_empty`].
    pub fn extract(&self, text: &str, message: &RawMessage) -> Result<PaymentDetails, ExtractError> {
        let bank = self
            .find_bank(&message.sender)
            .ok_or_else(|| ExtractError::NoRuleMatch {
                sender: message.sender.clone(),
            })?;

        let mut details = PaymentDetails::for_message(message);
        for (field, regex) in &bank.fields {
            if let Some(value) = regex
                .captures(text)
                .and_then(|caps| caps.get(caps.len() - 1))
                .map(|m| m.as_str().trim())
                .filter(|v| !v.is_empty())
            {
                details.fields.insert(field.clone(), value.to_string());
            } else {
                debug!(id = %message.id, bank = %bank.id, field = %field, "Field not found");
            }
        }

        Ok(details)
    }
}
