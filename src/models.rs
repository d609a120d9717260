use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Closed set of row categories. Stored and exported by `name()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowType {
    #[serde(rename = "TRADE")]
    Trade,
    #[serde(rename = "BRIDGEIN")]
    BridgeIn,
    #[serde(rename = "BRIDGEOUT")]
    BridgeOut,
    #[serde(rename = "INIT")]
    Init,
    #[serde(rename = "REWARD")]
    Reward,
    #[serde(rename = "LOSS")]
    Loss,
    #[serde(rename = "subEXTRAOUT")]
    SubExtraOut,
    #[serde(rename = "subEXTRAIN")]
    SubExtraIn,
    #[serde(rename = "BORROW")]
    Borrow,
    #[serde(rename = "subREBUY")]
    SubRebuy,
    #[serde(rename = "REPAY")]
    Repay,
    #[serde(rename = "subPRINCIPLE")]
    SubPrinciple,
    #[serde(rename = "subINTEREST")]
    SubInterest,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "subERROR")]
    SubError,
}

impl RowType {
    pub const ALL: &'static [RowType] = &[
        RowType::Trade,
        RowType::BridgeIn,
        RowType::BridgeOut,
        RowType::Init,
        RowType::Reward,
        RowType::Loss,
        RowType::SubExtraOut,
        RowType::SubExtraIn,
        RowType::Borrow,
        RowType::SubRebuy,
        RowType::Repay,
        RowType::SubPrinciple,
        RowType::SubInterest,
        RowType::Error,
        RowType::SubError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Trade => "TRADE",
            Self::BridgeIn => "BRIDGEIN",
            Self::BridgeOut => "BRIDGEOUT",
            Self::Init => "INIT",
            Self::Reward => "REWARD",
            Self::Loss => "LOSS",
            Self::SubExtraOut => "subEXTRAOUT",
            Self::SubExtraIn => "subEXTRAIN",
            Self::Borrow => "BORROW",
            Self::SubRebuy => "subREBUY",
            Self::Repay => "REPAY",
            Self::SubPrinciple => "subPRINCIPLE",
            Self::SubInterest => "subINTEREST",
            Self::Error => "ERROR",
            Self::SubError => "subERROR",
        }
    }

    /// Display label shown in listings.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Trade => "Trade",
            Self::BridgeIn => "Bridge In",
            Self::BridgeOut => "Bridge Out",
            Self::Init => "Initiate",
            Self::Reward => "Reward",
            Self::Loss => "Loss",
            Self::SubExtraOut => "\u{21aa}extraOut",
            Self::SubExtraIn => "\u{21aa}extraIn",
            Self::Borrow => "Borrow",
            Self::SubRebuy => "\u{21aa}ReBuy",
            Self::Repay => "Repay",
            Self::SubPrinciple => "\u{21aa}Principle",
            Self::SubInterest => "\u{21aa}Interest",
            Self::Error => "ERROR",
            Self::SubError => "\u{21aa}ERROR",
        }
    }

    /// Exact, case-sensitive lookup by name.
    pub fn from_name(name: &str) -> Option<RowType> {
        Self::ALL.iter().find(|t| t.name() == name).copied()
    }
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fee is either a fixed amount or computed later ("auto").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Fee {
    Auto,
    Amount(Decimal),
}

impl fmt::Display for Fee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fee::Auto => f.write_str("auto"),
            Fee::Amount(d) => write!(f, "{d}"),
        }
    }
}

impl FromStr for Fee {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Fee::Auto);
        }
        Decimal::from_str(s).map(Fee::Amount)
    }
}

impl From<Fee> for String {
    fn from(fee: Fee) -> Self {
        fee.to_string()
    }
}

impl TryFrom<String> for Fee {
    type Error = rust_decimal::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One ledger entry. Sub-rows point at their parent through `parent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    pub parent_id: Option<String>,
    pub is_sub_row: bool,
    pub date: String,
    pub row_type: RowType,
    pub in_amount: Option<Decimal>,
    pub in_currency: Option<String>,
    pub out_amount: Option<Decimal>,
    pub out_currency: Option<String>,
    pub fee_amount: Option<Fee>,
    pub fee_currency: Option<String>,
    pub usd_value: Option<Decimal>,
    pub network: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub note: Option<String>,
}

impl TransactionRecord {
    /// A blank top-level record of the given type.
    pub fn new(id: impl Into<String>, date: impl Into<String>, row_type: RowType) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            is_sub_row: false,
            date: date.into(),
            row_type,
            in_amount: None,
            in_currency: None,
            out_amount: None,
            out_currency: None,
            fee_amount: None,
            fee_currency: None,
            usd_value: None,
            network: String::new(),
            tags: Vec::new(),
            note: None,
        }
    }

    /// Attach this record under `parent_id`, marking it as a sub-row.
    pub fn child_of(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self.is_sub_row = true;
        self
    }
}

/// `t-<unix millis>-<6 random base36 chars>`
pub fn new_tx_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let millis = chrono::Utc::now().timestamp_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("t-{millis}-{suffix}")
}
