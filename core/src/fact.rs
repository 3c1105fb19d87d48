//! Transaction facts: normalized compliance attributes per transaction.
//!
//! Facts are produced once by ingestion and never mutated here.
//! Every optional attribute is `None` when ingestion could not supply it;
//! predicates treat an absent attribute as "does not apply".

use crate::types::TransactionId;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SanctionsStatus {
    Clear,
    PotentialMatch,
    Hit,
}

impl SanctionsStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SanctionsStatus::Clear          => "CLEAR",
            SanctionsStatus::PotentialMatch => "POTENTIAL_MATCH",
            SanctionsStatus::Hit            => "HIT",
        }
    }
}

/// Presence of structured SWIFT fields on the underlying message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwiftFields {
    /// e.g. "MT103". Field checks only apply when this is set.
    pub message_type:      Option<String>,
    /// Field 50K.
    pub ordering_customer: bool,
    /// Field 59.
    pub beneficiary:       bool,
    /// Field 70.
    pub remittance_info:   bool,
    /// Field 71A.
    pub charges:           bool,
}

impl SwiftFields {
    pub fn message_present(&self) -> bool {
        self.message_type.as_deref().is_some_and(|m| !m.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionFact {
    pub transaction_id:              TransactionId,
    pub amount:                      f64,
    pub currency:                    Option<String>,
    pub channel:                     Option<String>,
    pub counterparty_country:        Option<String>,
    pub sanctions_status:            Option<SanctionsStatus>,
    pub aml_score:                   Option<f64>,
    pub pep:                         bool,
    pub kyc_due_date:                Option<NaiveDate>,
    pub edd_required:                bool,
    pub edd_performed:               bool,
    pub source_of_wealth_documented: Option<bool>,
    pub travel_rule_complete:        Option<bool>,
    pub virtual_asset_exposure:      bool,
    pub virtual_asset_disclosed:     bool,
    pub fx_spread_bps:               Option<f64>,
    pub daily_cash_total:            Option<f64>,
    pub daily_cash_count:            Option<u32>,
    pub cash_id_verified:            Option<bool>,
    /// Local booking time.
    pub booked_at:                   Option<NaiveDateTime>,
    pub swift:                       Option<SwiftFields>,
}

/// A single attribute value as seen by rule texts.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

/// Attribute names addressable from rule texts.
pub const KNOWN_FIELDS: &[&str] = &[
    "amount",
    "currency",
    "channel",
    "counterparty_country",
    "sanctions_status",
    "aml_score",
    "pep",
    "kyc_overdue",
    "edd_required",
    "edd_performed",
    "source_of_wealth_documented",
    "travel_rule_complete",
    "virtual_asset_exposure",
    "virtual_asset_disclosed",
    "fx_spread_bps",
    "daily_cash_total",
    "daily_cash_count",
    "cash_id_verified",
    "booking_hour",
    "weekend",
    "swift_message_type",
];

impl TransactionFact {
    pub fn sanctions(&self) -> SanctionsStatus {
        self.sanctions_status.unwrap_or(SanctionsStatus::Clear)
    }

    /// KYC review date already passed on the booking date.
    /// Unknown when either date is missing.
    pub fn kyc_overdue(&self) -> Option<bool> {
        let due = self.kyc_due_date?;
        let booked = self.booked_at?;
        Some(due < booked.date())
    }

    pub fn booking_hour(&self) -> Option<u32> {
        self.booked_at.map(|t| t.hour())
    }

    pub fn booked_on_weekend(&self) -> Option<bool> {
        self.booked_at
            .map(|t| matches!(t.weekday(), Weekday::Sat | Weekday::Sun))
    }

    /// SWIFT fields, only when a SWIFT message type is present.
    pub fn swift_message(&self) -> Option<&SwiftFields> {
        self.swift.as_ref().filter(|s| s.message_present())
    }

    /// Look up an attribute by its rule-text name.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        use FieldValue::{Flag, Number, Text};
        match name {
            "amount"               => Some(Number(self.amount)),
            "currency"             => self.currency.clone().map(Text),
            "channel"              => self.channel.clone().map(Text),
            "counterparty_country" => self.counterparty_country.clone().map(Text),
            "sanctions_status"     => Some(Text(self.sanctions().as_str().to_string())),
            "aml_score"            => self.aml_score.map(Number),
            "pep"                  => Some(Flag(self.pep)),
            "kyc_overdue"          => self.kyc_overdue().map(Flag),
            "edd_required"         => Some(Flag(self.edd_required)),
            "edd_performed"        => Some(Flag(self.edd_performed)),
            "source_of_wealth_documented" => self.source_of_wealth_documented.map(Flag),
            "travel_rule_complete" => self.travel_rule_complete.map(Flag),
            "virtual_asset_exposure"  => Some(Flag(self.virtual_asset_exposure)),
            "virtual_asset_disclosed" => Some(Flag(self.virtual_asset_disclosed)),
            "fx_spread_bps"        => self.fx_spread_bps.map(Number),
            "daily_cash_total"     => self.daily_cash_total.map(Number),
            "daily_cash_count"     => self.daily_cash_count.map(|c| Number(c as f64)),
            "cash_id_verified"     => self.cash_id_verified.map(Flag),
            "booking_hour"         => self.booking_hour().map(|h| Number(h as f64)),
            "weekend"              => self.booked_on_weekend().map(Flag),
            "swift_message_type"   => self
                .swift
                .as_ref()
                .and_then(|s| s.message_type.clone())
                .map(Text),
            _ => None,
        }
    }
}
